//! Animation targets: the tagged union the scheduler walks, plus the
//! shorthand normalization the configuration surface accepts.

use crate::data::DataSet;
use crate::error::BridgeError;
use crate::registry::{Snapshot, StoredAnimation};
use crate::Result;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};

/// One committed chart state to transition into. `style: Some(Value::Null)`
/// clears every style back to default; an absent field leaves existing
/// native state untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChartState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<DataSet>,
    #[serde(
        default,
        deserialize_with = "nullable_tree",
        skip_serializing_if = "Option::is_none"
    )]
    pub style: Option<Value>,
    #[serde(
        default,
        deserialize_with = "nullable_tree",
        skip_serializing_if = "Option::is_none"
    )]
    pub config: Option<Value>,
}

/// Keeps an explicit `null` distinguishable from an absent key: a present
/// field deserializes to `Some`, even when its value is `null`.
fn nullable_tree<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Some(Value::deserialize(deserializer)?))
}

impl ChartState {
    pub fn config(config: Value) -> Self {
        Self {
            config: Some(config),
            ..Self::default()
        }
    }

    pub fn style(style: Value) -> Self {
        Self {
            style: Some(style),
            ..Self::default()
        }
    }

    pub fn data(data: DataSet) -> Self {
        Self {
            data: Some(data),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub enum KeyframeTarget {
    State(ChartState),
    Snapshot(Snapshot),
}

#[derive(Debug, Clone)]
pub struct Keyframe {
    pub target: KeyframeTarget,
    pub options: Option<AnimOptions>,
}

/// What one animation request transitions the chart into.
#[derive(Debug, Clone)]
pub enum AnimTarget {
    /// Restore a stored snapshot as the single keyframe.
    Snapshot(Snapshot),
    /// Restore a stored animation wholesale.
    Animation(StoredAnimation),
    /// One or more keyframes applied in order.
    Keyframes(Vec<Keyframe>),
}

impl From<ChartState> for AnimTarget {
    fn from(state: ChartState) -> Self {
        AnimTarget::Keyframes(vec![Keyframe {
            target: KeyframeTarget::State(state),
            options: None,
        }])
    }
}

impl From<Snapshot> for AnimTarget {
    fn from(snapshot: Snapshot) -> Self {
        AnimTarget::Snapshot(snapshot)
    }
}

impl From<&Snapshot> for AnimTarget {
    fn from(snapshot: &Snapshot) -> Self {
        AnimTarget::Snapshot(snapshot.clone())
    }
}

impl From<StoredAnimation> for AnimTarget {
    fn from(animation: StoredAnimation) -> Self {
        AnimTarget::Animation(animation)
    }
}

impl From<&StoredAnimation> for AnimTarget {
    fn from(animation: &StoredAnimation) -> Self {
        AnimTarget::Animation(animation.clone())
    }
}

impl TryFrom<Value> for AnimTarget {
    type Error = BridgeError;

    /// A bare tree with none of `data`/`style`/`config` at the top level is
    /// shorthand for `{config: ...}`.
    fn try_from(value: Value) -> Result<AnimTarget> {
        let state = match &value {
            Value::Object(map)
                if map.contains_key("data")
                    || map.contains_key("style")
                    || map.contains_key("config") =>
            {
                serde_json::from_value::<ChartState>(value)?
            }
            _ => ChartState::config(value),
        };
        Ok(state.into())
    }
}

/// Animation options as a nested tree written through the same path-based
/// mechanism as configuration. Shorthands follow the public surface:
/// a number or duration string stands for `{duration: ...}`, an explicit
/// `null` for an instant transition.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimOptions(Value);

impl AnimOptions {
    /// `{duration: 0}` — the `null` shorthand.
    pub fn instant() -> Self {
        Self(json!({"duration": 0}))
    }

    pub fn duration_secs(seconds: f64) -> Self {
        Self(json!({ "duration": seconds }))
    }

    #[inline]
    pub fn tree(&self) -> &Value {
        &self.0
    }
}

impl From<f64> for AnimOptions {
    fn from(seconds: f64) -> Self {
        Self::duration_secs(seconds)
    }
}

impl From<&str> for AnimOptions {
    fn from(duration: &str) -> Self {
        Self(json!({ "duration": duration }))
    }
}

impl TryFrom<Value> for AnimOptions {
    type Error = BridgeError;

    fn try_from(value: Value) -> Result<AnimOptions> {
        match value {
            Value::Null => Ok(Self::instant()),
            Value::Number(n) => Ok(Self(json!({ "duration": n }))),
            Value::String(s) => Ok(Self(json!({ "duration": s }))),
            Value::Object(_) => Ok(Self(value)),
            other => Err(BridgeError::marshalling(format!(
                "invalid animation option: {other}"
            ))),
        }
    }
}

/// Expand the configuration shorthands into canonical form:
/// top-level channel names move under `channels`, a bare string/array/null
/// channel becomes `{set: ...}`, string-valued `set`/`attach`/`detach`
/// become single-element arrays, and an empty `set` array becomes `null`.
pub fn normalize_config(config: &mut Value, channel_names: &[String]) {
    let Some(map) = config.as_object_mut() else {
        return;
    };

    let hoisted: Vec<String> = channel_names
        .iter()
        .filter(|name| map.contains_key(name.as_str()))
        .cloned()
        .collect();
    if !hoisted.is_empty() {
        for name in hoisted {
            let value = map.remove(&name).unwrap();
            let channels = map
                .entry("channels".to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !channels.is_object() {
                *channels = Value::Object(Map::new());
            }
            channels.as_object_mut().unwrap().insert(name, value);
        }
    }

    if let Some(channels) = map.get_mut("channels").and_then(Value::as_object_mut) {
        for (_, channel) in channels.iter_mut() {
            normalize_channel(channel);
        }
    }
}

fn normalize_channel(channel: &mut Value) {
    if let Value::String(series) = channel {
        *channel = json!([series.clone()]);
    }
    if channel.is_null() || channel.is_array() {
        *channel = json!({ "set": channel.take() });
    }
    let Some(map) = channel.as_object_mut() else {
        return;
    };
    for field in ["set", "attach", "detach"] {
        if let Some(Value::String(series)) = map.get(field) {
            let single = json!([series.clone()]);
            map.insert(field.to_string(), single);
        }
    }
    if let Some(Value::Array(set)) = map.get("set") {
        if set.is_empty() {
            map.insert("set".to_string(), Value::Null);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channels() -> Vec<String> {
        ["x", "y", "color"].iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn top_level_channel_keys_move_under_channels() {
        let mut config = json!({"x": "Year", "title": "Sales"});
        normalize_config(&mut config, &channels());
        assert_eq!(
            config,
            json!({"title": "Sales", "channels": {"x": {"set": ["Year"]}}})
        );
    }

    #[test]
    fn channel_shorthands_expand() {
        let mut config = json!({"channels": {
            "x": ["Year"],
            "y": "Sales",
            "color": null
        }});
        normalize_config(&mut config, &channels());
        assert_eq!(
            config,
            json!({"channels": {
                "x": {"set": ["Year"]},
                "y": {"set": ["Sales"]},
                "color": {"set": null}
            }})
        );
    }

    #[test]
    fn string_set_attach_detach_become_arrays() {
        let mut config = json!({"channels": {"x": {"attach": "Year", "detach": "Sales"}}});
        normalize_config(&mut config, &channels());
        assert_eq!(
            config,
            json!({"channels": {"x": {"attach": ["Year"], "detach": ["Sales"]}}})
        );
    }

    #[test]
    fn empty_set_array_becomes_null() {
        let mut config = json!({"channels": {"x": {"set": []}}});
        normalize_config(&mut config, &channels());
        assert_eq!(config, json!({"channels": {"x": {"set": null}}}));
    }

    #[test]
    fn bare_tree_is_config_shorthand() {
        let target = AnimTarget::try_from(json!({"title": "Hello"})).unwrap();
        match target {
            AnimTarget::Keyframes(frames) => {
                assert_eq!(frames.len(), 1);
                match &frames[0].target {
                    KeyframeTarget::State(state) => {
                        assert_eq!(state.config, Some(json!({"title": "Hello"})));
                        assert!(state.style.is_none());
                    }
                    _ => panic!("expected state keyframe"),
                }
            }
            _ => panic!("expected keyframes"),
        }
    }

    #[test]
    fn explicit_style_null_is_preserved() {
        let target = AnimTarget::try_from(json!({"style": null})).unwrap();
        match target {
            AnimTarget::Keyframes(frames) => match &frames[0].target {
                KeyframeTarget::State(state) => {
                    assert_eq!(state.style, Some(Value::Null));
                    assert!(state.config.is_none());
                }
                _ => panic!("expected state keyframe"),
            },
            _ => panic!("expected keyframes"),
        }
    }

    #[test]
    fn option_shorthands() {
        assert_eq!(
            AnimOptions::try_from(Value::Null).unwrap(),
            AnimOptions::instant()
        );
        assert_eq!(
            AnimOptions::try_from(json!(0.5)).unwrap().tree(),
            &json!({"duration": 0.5})
        );
        assert_eq!(
            AnimOptions::try_from(json!("500ms")).unwrap().tree(),
            &json!({"duration": "500ms"})
        );
        assert!(AnimOptions::try_from(json!([1, 2])).is_err());
    }
}
