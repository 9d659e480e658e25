//! Cross-component pipelines through the in-process network host

use std::time::Duration;

use serde_json::json;
use sluice_components::register_builtins;
use sluice_engine::{
    next_lm, ComponentRegistry, NetworkBuilder, OutputCapture, StateRecord,
};

fn builtin_registry() -> ComponentRegistry {
    let mut registry = ComponentRegistry::new();
    register_builtins(&mut registry);
    registry
}

async fn expect_record(capture: &mut OutputCapture) -> StateRecord {
    tokio::time::timeout(Duration::from_secs(5), capture.recv())
        .await
        .expect("timed out waiting for a record")
        .expect("capture channel closed")
}

#[tokio::test]
async fn test_json_hash_splits_uppercases_and_rejoins() {
    let mut builder = NetworkBuilder::new(builtin_registry())
        .node("parse", "sluice/parse-json")
        .node("split", "sluice/splitter")
        .node("upper", "sluice/to-upper-case")
        .node("join", "sluice/joiner")
        .connect("parse", "output", "split", "vnid_hash")
        .connect("parse", "output", "join", "vnid_hash")
        .connect("split", "output", "upper", "string")
        .connect("upper", "output", "join", "input")
        .iip("parse", "input", json!(r#"{"1":"one","2":"two","3":"three"}"#));
    let mut out = builder.capture("join", "output");

    let mut network = builder.build().unwrap();
    network.start().unwrap();

    let record = expect_record(&mut out).await;
    assert_eq!(record.vnid, "");
    assert_eq!(
        record.data,
        Some(json!({"1": "ONE", "2": "TWO", "3": "THREE"}))
    );
    assert!(record.lm.is_some());
    assert!(record.group_lm.is_none());

    // one emission for the completed episode, not one per contribution
    assert!(out.try_recv().is_none());

    network.shutdown().await;
}

#[tokio::test]
async fn test_funnel_feeds_ids_one_at_a_time_through_a_feedback_loop() {
    let mut builder = NetworkBuilder::new(builtin_registry())
        .node("funnel", "sluice/funnel")
        .node("echo", "sluice/repeat")
        .connect("funnel", "output", "echo", "new_data")
        .connect("echo", "output", "funnel", "input");
    let feed = builder.input("funnel", "input").unwrap();
    let mut out = builder.capture("funnel", "output");

    let mut network = builder.build().unwrap();
    network.start().unwrap();

    for id in ["un", "deux", "trois"] {
        feed.send_value(json!(id)).unwrap();
        let record = expect_record(&mut out).await;
        assert_eq!(record.data, Some(json!(id)));
        assert_eq!(record.metadata("funnelId"), Some(&json!(id)));
    }

    network.shutdown().await;
}

#[tokio::test]
async fn test_transient_slice_disappears_after_its_emit() {
    let mut builder = NetworkBuilder::new(builtin_registry()).node("hop", "sluice/repeat");
    let feed = builder.input("hop", "new_data").unwrap();
    let mut out = builder.capture("hop", "output");

    let mut network = builder.build().unwrap();
    network.start().unwrap();

    feed.send(StateRecord::with_data("42", json!("answer"), next_lm()))
        .unwrap();

    let record = expect_record(&mut out).await;
    assert_eq!(record.vnid, "42");
    assert_eq!(record.data, Some(json!("answer")));

    let hop = network.node("hop").unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while hop.vni_count() != 0 {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("vni for '42' was not destroyed");

    network.shutdown().await;
}

#[tokio::test]
async fn test_upstream_failure_marks_downstream_stale_until_recovery() {
    let mut builder = NetworkBuilder::new(builtin_registry())
        .node("upper", "sluice/to-upper-case")
        .node("relay", "sluice/repeat")
        .connect("upper", "output", "relay", "new_data");
    let feed = builder.input("upper", "string").unwrap();
    let mut down = builder.capture("relay", "output");

    let mut network = builder.build().unwrap();
    network.start().unwrap();

    // a non-string payload fails the upper-caser; the relay goes stale
    feed.send_value(json!(42)).unwrap();
    let stale = expect_record(&mut down).await;
    assert!(stale.is_stale());
    assert!(stale.data.is_none());
    assert!(stale.lm.is_some());

    // recovery recomputes downstream exactly once
    feed.send_value(json!("word")).unwrap();
    let clean = expect_record(&mut down).await;
    assert_eq!(clean.data, Some(json!("WORD")));
    assert!(!clean.is_stale() && !clean.is_errored());

    assert_eq!(network.node("relay").unwrap().metrics().updates(), 1);

    network.shutdown().await;
}

#[tokio::test]
async fn test_unchanged_result_does_not_reemit() {
    let mut builder = NetworkBuilder::new(builtin_registry()).node("relay", "sluice/repeat");
    let feed = builder.input("relay", "new_data").unwrap();
    let mut out = builder.capture("relay", "output");

    let mut network = builder.build().unwrap();
    network.start().unwrap();

    feed.send_value(json!("x")).unwrap();
    let first = expect_record(&mut out).await;
    assert_eq!(first.data, Some(json!("x")));

    // same payload again: the updater runs but the stamp stays put,
    // so the very next emission is the changed value
    feed.send_value(json!("x")).unwrap();
    feed.send_value(json!("y")).unwrap();

    let second = expect_record(&mut out).await;
    assert_eq!(second.data, Some(json!("y")));
    assert_ne!(second.lm, first.lm);
    assert!(out.try_recv().is_none());

    network.shutdown().await;
}

#[tokio::test]
async fn test_gate_waits_for_every_attached_socket() {
    let mut builder = NetworkBuilder::new(builtin_registry()).node("gate", "sluice/and-gate");
    let left = builder.input("gate", "input").unwrap();
    let right = builder.input("gate", "input").unwrap();
    let mut out = builder.capture("gate", "output");

    let mut network = builder.build().unwrap();
    network.start().unwrap();

    // half-filled fan-in must not trigger
    left.send_value(json!("x")).unwrap();
    right.send_value(json!("y")).unwrap();

    let record = expect_record(&mut out).await;
    assert_eq!(record.data, Some(json!(["x", "y"])));

    // agreeing sockets collapse to a single value
    left.send_value(json!("y")).unwrap();
    let record = expect_record(&mut out).await;
    assert_eq!(record.data, Some(json!("y")));

    network.shutdown().await;
}

#[tokio::test]
async fn test_failure_reports_on_the_error_channel_not_the_output() {
    let mut builder = NetworkBuilder::new(builtin_registry())
        .node("upper", "sluice/to-upper-case")
        .iip("upper", "string", json!(7));
    let mut errs = builder.capture("upper", "error");
    let mut outs = builder.capture("upper", "output");

    let mut network = builder.build().unwrap();
    network.start().unwrap();

    let failure = expect_record(&mut errs).await;
    assert_eq!(
        failure.data,
        Some(json!("toUppercase requires an input string parameter!"))
    );
    assert!(failure.lm.is_some());

    // the output port only carries the errored flag, never data
    let flagged = expect_record(&mut outs).await;
    assert!(flagged.is_errored());
    assert!(flagged.data.is_none());
    assert!(outs.try_recv().is_none());

    network.shutdown().await;
}
