//! Path-based property proxy.
//!
//! The module cannot exchange structured data, only single leaf values at
//! dotted paths. The write path flattens a nested tree into per-leaf native
//! setter calls; the read path asks the module for the full path list and
//! rebuilds a nested tree from per-leaf getter calls.

use crate::error::BridgeError;
use crate::marshal::{decode_fault, read_string, with_str, with_str2};
use crate::path::PropertyPath;
use crate::registry::ManagedObject;
use crate::Result;
use plotwire_module_api::ChartModule;
use serde_json::{Map, Value};
use std::rc::Rc;

/// Which property tree of the chart a proxy is bound to.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ProxyTarget {
    Config,
    Style { computed: bool },
    /// Animation options have no native lister/getter; write-only.
    AnimOptions,
}

/// One bound (lister, getter, setter) triple over the chart handle.
#[derive(Clone)]
pub struct PropertyProxy {
    module: Rc<dyn ChartModule>,
    chart: Rc<ManagedObject>,
    target: ProxyTarget,
}

impl PropertyProxy {
    pub fn new(module: Rc<dyn ChartModule>, chart: Rc<ManagedObject>, target: ProxyTarget) -> Self {
        Self {
            module,
            chart,
            target,
        }
    }

    #[inline]
    pub fn target(&self) -> ProxyTarget {
        self.target
    }

    /// Every currently meaningful path of the bound tree.
    pub fn list(&self) -> Result<Vec<PropertyPath>> {
        let ptr = match self.target {
            ProxyTarget::Config => self.module.chart_param_list(),
            ProxyTarget::Style { .. } => self.module.style_param_list(),
            ProxyTarget::AnimOptions => {
                return Err(BridgeError::marshalling(
                    "animation options are write-only",
                ))
            }
        }
        .map_err(|e| decode_fault(&*self.module, e))?;
        let json = read_string(&*self.module, ptr)?;
        let raw: Vec<String> = serde_json::from_str(&json)?;
        raw.iter().map(|p| PropertyPath::parse(p)).collect()
    }

    /// Read one leaf as its raw wire string.
    pub fn get(&self, path: &PropertyPath) -> Result<String> {
        let chart = self.chart.handle()?;
        with_str(&self.module, path.as_str(), |p| {
            let value = match self.target {
                ProxyTarget::Config => self.module.chart_value(chart, p),
                ProxyTarget::Style { computed } => self.module.style_value(chart, p, computed),
                ProxyTarget::AnimOptions => {
                    return Err(BridgeError::marshalling(
                        "animation options are write-only",
                    ))
                }
            }
            .map_err(|e| decode_fault(&*self.module, e))?;
            read_string(&*self.module, value)
        })
    }

    /// Write one leaf as its wire string.
    pub fn set(&self, path: &PropertyPath, value: &str) -> Result<()> {
        let chart = self.chart.handle()?;
        with_str2(&self.module, path.as_str(), value, |p, v| {
            match self.target {
                ProxyTarget::Config => self.module.chart_set_value(chart, p, v),
                ProxyTarget::Style { .. } => self.module.style_set_value(chart, p, v),
                ProxyTarget::AnimOptions => self.module.anim_set_value(chart, p, v),
            }
            .map_err(|e| decode_fault(&*self.module, e))
        })
    }

    /// Flatten a nested tree into per-leaf setter calls, depth-first in key
    /// order. A `null` leaf is forwarded as the literal string `"null"`
    /// (clear everything under the path); absent keys are not visited.
    /// Arrays travel as JSON text at the leaf, never as indexed paths.
    pub fn write_tree(&self, tree: &Value) -> Result<()> {
        match tree {
            Value::Null => Ok(()),
            Value::Object(map) => self.walk(&PropertyPath::root(), map),
            _ => Err(BridgeError::marshalling(
                "property tree root must be an object",
            )),
        }
    }

    fn walk(&self, prefix: &PropertyPath, map: &Map<String, Value>) -> Result<()> {
        for (key, value) in map {
            let path = prefix.join(key)?;
            match value {
                Value::Object(child) => self.walk(&path, child)?,
                leaf => self.set(&path, &leaf_text(leaf)?)?,
            }
        }
        Ok(())
    }

    /// Rebuild the full tree from the module's path list. The result is an
    /// owned point-in-time snapshot of native state, not a live binding.
    pub fn read_tree(&self) -> Result<Value> {
        let mut root = Value::Object(Map::new());
        for path in self.list()? {
            let raw = self.get(&path)?;
            set_nested(&mut root, &path, decode_leaf(&raw));
        }
        Ok(root)
    }
}

/// Wire encoding of one leaf value. The protocol is uniformly string-based.
pub(crate) fn leaf_text(value: &Value) -> Result<String> {
    Ok(match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(_) | Value::Object(_) => serde_json::to_string(value)?,
    })
}

/// A value string beginning with `[` or `{` carries embedded JSON.
pub(crate) fn decode_leaf(raw: &str) -> Value {
    if raw.starts_with('[') || raw.starts_with('{') {
        if let Ok(parsed) = serde_json::from_str(raw) {
            return parsed;
        }
    }
    Value::String(raw.to_string())
}

/// Assign `value` at `path`, creating intermediate objects as needed. A
/// non-object intermediate left over from an earlier path is replaced.
pub(crate) fn set_nested(root: &mut Value, path: &PropertyPath, value: Value) {
    let segments: Vec<&str> = path.segments().collect();
    if segments.is_empty() {
        *root = value;
        return;
    }
    let mut cursor = root;
    for (i, segment) in segments.iter().enumerate() {
        if !cursor.is_object() {
            *cursor = Value::Object(Map::new());
        }
        let map = cursor.as_object_mut().unwrap();
        if i == segments.len() - 1 {
            map.insert((*segment).to_string(), value);
            return;
        }
        cursor = map
            .entry((*segment).to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn leaf_encoding() {
        assert_eq!(leaf_text(&Value::Null).unwrap(), "null");
        assert_eq!(leaf_text(&json!(true)).unwrap(), "true");
        assert_eq!(leaf_text(&json!(1.5)).unwrap(), "1.5");
        assert_eq!(leaf_text(&json!("Year")).unwrap(), "Year");
        assert_eq!(leaf_text(&json!(["Year"])).unwrap(), r#"["Year"]"#);
    }

    #[test]
    fn leaf_decoding_detects_embedded_json() {
        assert_eq!(decode_leaf(r#"["Year"]"#), json!(["Year"]));
        assert_eq!(decode_leaf(r#"{"min":0}"#), json!({"min": 0}));
        assert_eq!(decode_leaf("Year"), json!("Year"));
        // Malformed embedded JSON falls back to the raw string.
        assert_eq!(decode_leaf("[oops"), json!("[oops"));
    }

    #[test]
    fn set_nested_builds_intermediates() {
        let mut root = Value::Object(Map::new());
        let path = PropertyPath::parse("channels.x.set").unwrap();
        set_nested(&mut root, &path, json!(["Year"]));
        assert_eq!(root, json!({"channels": {"x": {"set": ["Year"]}}}));
    }

    #[test]
    fn set_nested_replaces_scalar_intermediates() {
        let mut root = Value::Object(Map::new());
        set_nested(
            &mut root,
            &PropertyPath::parse("a").unwrap(),
            json!("leaf"),
        );
        set_nested(&mut root, &PropertyPath::parse("a.b").unwrap(), json!(1));
        assert_eq!(root, json!({"a": {"b": 1}}));
    }
}
