use plotwire_bridge::{BridgeOptions, Chart, ChartState};
use plotwire_test_fixtures::MockModule;
use serde_json::json;
use std::rc::Rc;

fn ready_chart() -> (Rc<MockModule>, Chart) {
    let module = MockModule::new();
    let chart = Chart::new(BridgeOptions::default());
    chart
        .finish_loading(module.clone())
        .expect("mock module loads");
    (module, chart)
}

#[test]
fn written_config_leaves_read_back_expanded() {
    let (module, chart) = ready_chart();

    let handle = chart.animate(
        ChartState::config(json!({"channels": {"x": {"set": ["Year"]}}, "title": "Sales"})),
        None,
    );
    module.finish_animation(true);
    assert_eq!(handle.outcome(), Some(Ok(())));

    let config = chart.config().unwrap();
    assert_eq!(config["channels"]["x"]["set"], json!(["Year"]));
    assert_eq!(config["title"], json!("Sales"));
}

#[test]
fn channel_shorthand_normalizes_before_writing() {
    let (module, chart) = ready_chart();

    // top-level channel key, bare string series
    chart.animate_json(json!({"x": "Year"}), None).unwrap();
    module.finish_animation(true);

    assert_eq!(
        module.config_value_of("channels.x.set").unwrap(),
        r#"["Year"]"#
    );
    let config = chart.config().unwrap();
    assert_eq!(config["channels"]["x"]["set"], json!(["Year"]));
}

#[test]
fn numeric_leaves_are_stringified_on_the_wire() {
    let (module, chart) = ready_chart();

    chart.animate(ChartState::config(json!({"rotate": 90})), None);
    module.finish_animation(true);

    assert_eq!(module.config_value_of("rotate").unwrap(), "90");
}

#[test]
fn style_null_leaf_clears_to_default_distinct_from_absent() {
    let (module, chart) = ready_chart();

    chart.animate(ChartState::style(json!({"fontSize": "20px"})), None);
    module.finish_animation(true);
    assert_eq!(chart.style().unwrap()["fontSize"], json!("20px"));

    // null at the leaf clears it; the leaf is still present on read,
    // reporting the default value
    chart.animate(ChartState::style(json!({"fontSize": null})), None);
    module.finish_animation(true);
    let style = chart.style().unwrap();
    assert_eq!(style["fontSize"], json!("11px"));
}

#[test]
fn style_null_tree_clears_everything() {
    let (module, chart) = ready_chart();

    chart.animate(
        ChartState::style(json!({"fontSize": "20px", "title": {"fontSize": "40px"}})),
        None,
    );
    module.finish_animation(true);
    assert_eq!(module.style_value_of("title.fontSize").unwrap(), "40px");

    chart.animate(ChartState::style(json!(null)), None);
    module.finish_animation(true);
    assert_eq!(module.style_value_of("fontSize").unwrap(), "11px");
    assert_eq!(module.style_value_of("title.fontSize").unwrap(), "26px");
}

#[test]
fn nested_style_subtrees_flatten_to_dotted_paths() {
    let (module, chart) = ready_chart();

    chart.animate(
        ChartState::style(json!({"plot": {"marker": {"fillOpacity": 0.5}}})),
        None,
    );
    module.finish_animation(true);

    assert_eq!(
        module.style_value_of("plot.marker.fillOpacity").unwrap(),
        "0.5"
    );
    let style = chart.style().unwrap();
    assert_eq!(style["plot"]["marker"]["fillOpacity"], json!("0.5"));
}

#[test]
fn computed_style_reads_through_the_computed_getter() {
    let (module, chart) = ready_chart();

    let computed = chart.computed_style().unwrap();
    assert_eq!(computed["fontSize"], json!("11px"));
    assert!(module.call_count("style_value(fontSize,computed=true)") >= 1);
}

#[test]
fn every_marshalled_buffer_is_released() {
    let (module, chart) = ready_chart();

    chart.animate(
        ChartState::config(json!({"channels": {"y": {"set": ["Sales"]}}})),
        None,
    );
    module.finish_animation(true);
    let _ = chart.config().unwrap();
    let _ = chart.style().unwrap();

    assert_eq!(module.outstanding_host_allocs(), 0);
}

#[test]
fn buffers_are_released_on_the_error_path_too() {
    let (module, chart) = ready_chart();

    // unknown config path: the module faults the setter, the request
    // rejects, and no path/value buffer may leak
    let handle = chart.animate(ChartState::config(json!({"nonsense": 1})), None);
    assert!(matches!(
        handle.outcome(),
        Some(Err(plotwire_bridge::BridgeError::ModuleFault { .. }))
    ));
    assert_eq!(module.outstanding_host_allocs(), 0);
}

#[test]
fn channel_names_come_from_the_initial_config_read() {
    let (_module, chart) = ready_chart();
    let names = chart.channel_names().unwrap();
    assert!(names.contains(&"x".to_string()));
    assert!(names.contains(&"color".to_string()));
}
