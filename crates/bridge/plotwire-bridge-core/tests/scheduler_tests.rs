use plotwire_bridge::{
    AnimOptions, BridgeError, BridgeOptions, Chart, ChartState, DataSet, RequestState, Series,
};
use plotwire_bridge::DataValue;
use plotwire_test_fixtures::MockModule;
use serde_json::json;
use std::cell::Cell;
use std::rc::Rc;

fn ready_chart() -> (Rc<MockModule>, Chart) {
    let module = MockModule::new();
    let chart = Chart::new(BridgeOptions::default());
    chart
        .finish_loading(module.clone())
        .expect("mock module loads");
    (module, chart)
}

fn config_target(title: &str) -> ChartState {
    ChartState::config(json!({ "title": title }))
}

#[test]
fn unawaited_submissions_serialize_in_order() {
    let (module, chart) = ready_chart();

    let a = chart.animate(config_target("a"), None);
    let b = chart.animate(config_target("b"), None);
    let c = chart.animate(config_target("c"), None);

    // exactly one native animate call in flight
    assert_eq!(module.call_count("chart_animate"), 1);
    assert_eq!(a.state(), RequestState::Active);
    assert_eq!(b.state(), RequestState::Queued);
    assert_eq!(c.state(), RequestState::Queued);

    module.finish_animation(true);
    assert_eq!(a.outcome(), Some(Ok(())));
    assert_eq!(module.call_count("chart_animate"), 2);
    assert_eq!(b.state(), RequestState::Active);

    module.finish_animation(true);
    module.finish_animation(true);
    assert_eq!(module.call_count("chart_animate"), 3);
    assert_eq!(c.outcome(), Some(Ok(())));

    // targets were applied in submission order
    let writes: Vec<String> = module
        .calls()
        .into_iter()
        .filter(|call| call.starts_with("chart_set_value(title"))
        .collect();
    assert_eq!(
        writes,
        vec![
            "chart_set_value(title=a)",
            "chart_set_value(title=b)",
            "chart_set_value(title=c)"
        ]
    );
}

#[test]
fn canceled_animation_rejects_and_successor_still_runs() {
    let (module, chart) = ready_chart();

    let a = chart.animate(config_target("a"), None);
    let b = chart.animate(config_target("b"), None);

    // the module reports a as canceled
    module.finish_animation(false);
    assert_eq!(a.outcome(), Some(Err(BridgeError::Canceled)));
    assert!(a.outcome().unwrap().unwrap_err().is_cancellation());

    // b is not blocked by the rejected predecessor
    assert_eq!(b.state(), RequestState::Active);
    module.finish_animation(true);
    assert_eq!(b.outcome(), Some(Ok(())));
}

#[test]
fn apply_failure_rejects_without_native_call_and_queue_advances() {
    let (module, chart) = ready_chart();

    let a = chart.animate(config_target("a"), None);
    // mixed-type dimension values: marshalling failure during target apply
    let bad = chart.animate(
        ChartState::data(DataSet {
            series: vec![Series {
                name: "Year".into(),
                kind: None,
                unit: None,
                values: vec![DataValue::Text("2024".into()), DataValue::Number(1.0)],
            }],
            records: vec![],
        }),
        None,
    );
    let c = chart.animate(config_target("c"), None);

    module.finish_animation(true);
    assert_eq!(a.outcome(), Some(Ok(())));

    // bad rejected synchronously during activation, before any animate call
    assert!(matches!(
        bad.outcome(),
        Some(Err(BridgeError::Marshalling { .. }))
    ));
    assert!(!bad.is_activated());

    // c still activated; two native calls total, not three
    assert_eq!(c.state(), RequestState::Active);
    assert_eq!(module.call_count("chart_animate"), 2);
    module.finish_animation(true);
    assert_eq!(c.outcome(), Some(Ok(())));
}

#[test]
fn activation_is_exposed_on_the_completion_handle() {
    let (module, chart) = ready_chart();

    let a = chart.animate(config_target("a"), None);
    let b = chart.animate(config_target("b"), None);

    // a activated synchronously (queue was idle); control available
    // before completion
    assert!(a.is_activated());
    assert!(a.control().is_some());
    assert!(!a.is_settled());

    // b has not activated yet and exposes no control
    assert!(!b.is_activated());
    assert!(b.control().is_none());

    module.finish_animation(true);
    assert!(b.is_activated());
    module.finish_animation(true);
}

#[test]
fn control_commands_reach_the_module() {
    let (module, chart) = ready_chart();

    let a = chart.animate(config_target("a"), None);
    let control = a.control().unwrap();
    control.pause().unwrap();
    control.seek("50%").unwrap();
    control.play().unwrap();

    assert!(module.calls().contains(&"anim_control(pause,)".to_string()));
    assert!(module
        .calls()
        .contains(&"anim_control(seek,50%)".to_string()));
    module.finish_animation(true);
}

#[test]
fn canceling_a_queued_request_never_applies_its_target() {
    let (module, chart) = ready_chart();

    let a = chart.animate(config_target("a"), None);
    let b = chart.animate(config_target("b"), None);
    b.cancel().unwrap();
    assert_eq!(b.outcome(), Some(Err(BridgeError::Canceled)));

    module.finish_animation(true);
    assert_eq!(a.outcome(), Some(Ok(())));

    // b's config write never happened and no second animate was issued
    assert_eq!(module.call_count("chart_set_value(title=b)"), 0);
    assert_eq!(module.call_count("chart_animate"), 1);
    assert_eq!(chart.in_flight_animations().unwrap(), 0);
}

#[test]
fn canceling_the_active_request_goes_through_the_module() {
    let (module, chart) = ready_chart();

    let a = chart.animate(config_target("a"), None);
    a.cancel().unwrap();
    assert!(module
        .calls()
        .contains(&"anim_control(cancel,)".to_string()));

    // the module then reports the animation as canceled
    module.finish_animation(false);
    assert_eq!(a.outcome(), Some(Err(BridgeError::Canceled)));
}

#[test]
fn on_settled_fires_for_later_and_already_settled_requests() {
    let (module, chart) = ready_chart();

    let seen = Rc::new(Cell::new(0));
    let a = chart.animate(config_target("a"), None);
    let hits = seen.clone();
    a.on_settled(move |outcome| {
        assert!(outcome.is_ok());
        hits.set(hits.get() + 1);
    });
    module.finish_animation(true);
    assert_eq!(seen.get(), 1);

    // registering after settlement invokes immediately
    let hits = seen.clone();
    a.on_settled(move |_| hits.set(hits.get() + 1));
    assert_eq!(seen.get(), 2);
}

#[test]
fn animation_options_flow_through_the_options_proxy() {
    let (module, chart) = ready_chart();

    chart.animate(config_target("a"), AnimOptions::duration_secs(0.5));
    assert_eq!(module.anim_option("duration").unwrap(), "0.5");
    module.finish_animation(true);

    chart.animate_json(json!({"title": "b"}), Some(json!("500ms"))).unwrap();
    assert_eq!(module.anim_option("duration").unwrap(), "500ms");
    module.finish_animation(true);
}

#[test]
fn snapshot_restore_is_a_keyframe_target() {
    let (module, chart) = ready_chart();

    chart.animate(config_target("before"), None);
    module.finish_animation(true);

    let snapshot = chart.store().unwrap();
    chart.animate(config_target("after"), None);
    module.finish_animation(true);

    chart.animate(&snapshot, None);
    assert_eq!(module.call_count("restore_snapshot"), 1);
    // a snapshot keyframe still commits through set_keyframe
    assert_eq!(module.call_count("set_keyframe"), 3);
    module.finish_animation(true);
}

#[test]
fn stored_animation_restores_without_keyframing() {
    let (module, chart) = ready_chart();

    let a = chart.animate(config_target("a"), None);
    let stored = a.control().unwrap().store().unwrap();
    module.finish_animation(true);

    let keyframes_before = module.call_count("set_keyframe");
    chart.animate(&stored, None);
    assert_eq!(module.call_count("restore_anim"), 1);
    assert_eq!(module.call_count("set_keyframe"), keyframes_before);
    module.finish_animation(true);
}

#[test]
fn data_deltas_reach_the_data_entry_points() {
    let (module, chart) = ready_chart();

    chart.animate(
        ChartState::data(DataSet {
            series: vec![
                Series {
                    name: "Year".into(),
                    kind: None,
                    unit: None,
                    values: vec![
                        DataValue::Text("2024".into()),
                        DataValue::Text("2025".into()),
                    ],
                },
                Series {
                    name: "Sales".into(),
                    kind: None,
                    unit: Some("$".into()),
                    values: vec![DataValue::Number(10.0), DataValue::Number(20.0)],
                },
            ],
            records: vec![],
        }),
        None,
    );
    module.finish_animation(true);

    assert_eq!(module.series_names(), vec!["Year", "Sales"]);
    let info = chart.data_info().unwrap();
    assert_eq!(info.len(), 2);
    assert_eq!(info[1].unit.as_deref(), Some("$"));
}

#[test]
fn requests_parked_while_loading_flush_in_order() {
    let module = MockModule::new();
    let chart = Chart::new(BridgeOptions::default());

    let a = chart.animate(config_target("a"), None);
    let b = chart.animate(config_target("b"), None);
    assert_eq!(a.state(), RequestState::Queued);
    assert!(chart.config().is_err());

    chart.finish_loading(module.clone()).unwrap();
    assert_eq!(a.state(), RequestState::Active);
    assert_eq!(b.state(), RequestState::Queued);

    module.finish_animation(true);
    module.finish_animation(true);
    assert_eq!(a.outcome(), Some(Ok(())));
    assert_eq!(b.outcome(), Some(Ok(())));
}

#[test]
fn submitting_from_a_settlement_callback_queues_cleanly() {
    let (module, chart) = ready_chart();

    let chart = Rc::new(chart);
    let chained = Rc::new(Cell::new(false));

    let a = chart.animate(config_target("a"), None);
    let chart2 = chart.clone();
    let flag = chained.clone();
    a.on_settled(move |_| {
        let b = chart2.animate(config_target("b"), None);
        assert!(!b.is_settled());
        flag.set(true);
    });

    module.finish_animation(true);
    assert!(chained.get());
    // the chained request took over the single in-flight slot
    assert_eq!(module.call_count("chart_animate"), 2);
    assert_eq!(module.pending_animations(), 1);
    module.finish_animation(true);
}
