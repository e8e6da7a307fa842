// tests/sensor_poller.rs
#![cfg(unix)]

mod common;
use crate::common::builders::sensor_spec;
use crate::common::{FakeTransport, init_tracing, runner, with_timeout};

use std::error::Error;
use std::sync::Arc;
use std::time::{Duration, Instant};

use mqtt_executor::bridge::sensor::sensor_payload;
use mqtt_executor::bridge::{Closable, SensorPoller};
use mqtt_executor::config::SensorSpec;
use mqtt_executor::exec::RunOutcome;
use mqtt_executor::types::QoS;

type TestResult = Result<(), Box<dyn Error>>;

fn poller_with(sensors: Vec<SensorSpec>) -> (Arc<FakeTransport>, Arc<SensorPoller<FakeTransport>>) {
    init_tracing();
    let transport = FakeTransport::new();
    let (_registry, runner) = runner();
    let poller = SensorPoller::new(Arc::clone(&transport), runner, sensors, QoS::AtMostOnce);
    (transport, poller)
}

#[test]
fn payload_for_each_outcome() {
    assert_eq!(sensor_payload(RunOutcome::Success("42".to_string())), "42");
    assert_eq!(
        sensor_payload(RunOutcome::Failed {
            output: "oops".to_string(),
            reason: "exit status 2".to_string(),
        }),
        "<FAILED> exit status 2"
    );
    assert_eq!(
        sensor_payload(RunOutcome::Cancelled("partial".to_string())),
        "<FAILED> cancelled"
    );
}

#[tokio::test]
async fn first_run_is_immediate_then_on_interval() -> TestResult {
    let (transport, poller) = poller_with(vec![sensor_spec(
        "answer",
        "tele/answer",
        Duration::from_secs(1),
        "echo",
        &["42"],
    )]);

    let started = Instant::now();
    poller.start();

    let first = transport.wait_for_payloads("tele/answer", 1).await;
    assert_eq!(first, vec!["42"]);
    assert!(started.elapsed() < Duration::from_secs(1));

    let both = transport.wait_for_payloads("tele/answer", 2).await;
    assert_eq!(both, vec!["42", "42"]);
    assert!(started.elapsed() >= Duration::from_millis(900));

    poller.stop(Duration::from_secs(5)).await?;
    Ok(())
}

#[tokio::test]
async fn failures_are_published_with_reason() -> TestResult {
    let (transport, poller) = poller_with(vec![sensor_spec(
        "broken",
        "tele/broken",
        Duration::from_secs(60),
        "false",
        &[],
    )]);

    poller.start();
    let payloads = transport.wait_for_payloads("tele/broken", 1).await;
    assert_eq!(payloads, vec!["<FAILED> exit status 1"]);

    poller.stop(Duration::from_secs(5)).await?;
    Ok(())
}

#[tokio::test]
async fn retain_flag_and_qos_are_applied() -> TestResult {
    let mut spec = sensor_spec("load", "tele/load", Duration::from_secs(60), "echo", &["0.5"]);
    spec.retained = true;
    let (transport, poller) = poller_with(vec![spec]);

    poller.start();
    transport.wait_for_payloads("tele/load", 1).await;

    let published = transport.published();
    assert!(published[0].retain);
    assert_eq!(published[0].qos, QoS::AtMostOnce);

    poller.stop(Duration::from_secs(5)).await?;
    Ok(())
}

#[tokio::test]
async fn sensors_run_independently() -> TestResult {
    let (transport, poller) = poller_with(vec![
        sensor_spec("a", "tele/a", Duration::from_secs(60), "echo", &["a"]),
        sensor_spec("b", "tele/b", Duration::from_secs(60), "echo", &["b"]),
    ]);

    poller.start();
    assert_eq!(transport.wait_for_payloads("tele/a", 1).await, vec!["a"]);
    assert_eq!(transport.wait_for_payloads("tele/b", 1).await, vec!["b"]);

    poller.stop(Duration::from_secs(5)).await?;
    Ok(())
}

#[tokio::test]
async fn nothing_is_published_after_stop() -> TestResult {
    let (transport, poller) = poller_with(vec![sensor_spec(
        "tick",
        "tele/tick",
        Duration::from_millis(100),
        "echo",
        &["tick"],
    )]);

    poller.start();
    transport.wait_for_payloads("tele/tick", 2).await;

    poller.stop(Duration::from_secs(5)).await?;
    let count = transport.payloads("tele/tick").len();

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(transport.payloads("tele/tick").len(), count);
    Ok(())
}

#[tokio::test]
async fn close_reports_in_flight_run_as_cancelled() -> TestResult {
    let (transport, poller) = poller_with(vec![sensor_spec(
        "slow",
        "tele/slow",
        Duration::from_secs(60),
        "sleep",
        &["30"],
    )]);

    poller.start();
    tokio::time::sleep(Duration::from_millis(200)).await;

    with_timeout(poller.close(Duration::from_secs(5))).await?;
    // Published before the loop returned, so already recorded once close is done.
    assert_eq!(transport.payloads("tele/slow"), vec!["<FAILED> cancelled"]);
    Ok(())
}
