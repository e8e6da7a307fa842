// tests/cli_and_broker.rs

use std::time::Duration;

use clap::Parser;

use mqtt_executor::cli::CliArgs;
use mqtt_executor::cli::LogLevel;
use mqtt_executor::logging::{DEFAULT_DIRECTIVES, filter_directives};
use mqtt_executor::transport::BrokerAddress;
use mqtt_executor::types::QoS;

#[test]
fn broker_uri_forms() {
    let tcp = BrokerAddress::parse("tcp://127.0.0.1:1883").unwrap();
    assert_eq!(tcp.host, "127.0.0.1");
    assert_eq!(tcp.port, 1883);

    let mqtt = BrokerAddress::parse("mqtt://broker.local:8883").unwrap();
    assert_eq!(mqtt.to_string(), "broker.local:8883");

    let bare = BrokerAddress::parse("broker.local").unwrap();
    assert_eq!(bare.port, 1883);
}

#[test]
fn broker_uri_errors() {
    assert!(BrokerAddress::parse("").is_err());
    assert!(BrokerAddress::parse("ws://broker:80").is_err());
    assert!(BrokerAddress::parse("tcp://broker:notaport").is_err());
    assert!(BrokerAddress::parse("tcp://:1883").is_err());
}

#[test]
fn cli_defaults() {
    let args = CliArgs::try_parse_from(["mqtt-executor", "--broker", "tcp://localhost:1883"]).unwrap();

    assert_eq!(args.sub_qos, QoS::AtMostOnce);
    assert_eq!(args.pub_qos, QoS::AtMostOnce);
    assert_eq!(args.client_id, "mqtt-executor");
    assert_eq!(args.config, "./config.json");
    assert_eq!(args.device_id, "mqtt-executor");
    assert_eq!(args.device_name(), "mqtt-executor");
    assert!(!args.home_assistant);
    assert_eq!(args.home_assistant_topic, "homeassistant/");
    assert_eq!(args.shutdown_timeout, Duration::from_secs(20));
    assert!(!args.dry_run);
}

#[test]
fn cli_overrides() {
    let args = CliArgs::try_parse_from([
        "mqtt-executor",
        "--broker",
        "tcp://localhost:1883",
        "--sub-qos",
        "1",
        "--pub-qos",
        "2",
        "--device-id",
        "nas",
        "--device-name",
        "My NAS",
        "--shutdown-timeout",
        "1m 30s",
        "--home-assistant",
    ])
    .unwrap();

    assert_eq!(args.sub_qos, QoS::AtLeastOnce);
    assert_eq!(args.pub_qos, QoS::ExactlyOnce);
    assert_eq!(args.device_name(), "My NAS");
    assert_eq!(args.shutdown_timeout, Duration::from_secs(90));
    assert!(args.home_assistant);
}

#[test]
fn cli_rejects_bad_values() {
    assert!(CliArgs::try_parse_from(["mqtt-executor"]).is_err());
    assert!(
        CliArgs::try_parse_from(["mqtt-executor", "--broker", "b", "--pub-qos", "3"]).is_err()
    );
    assert!(
        CliArgs::try_parse_from(["mqtt-executor", "--broker", "b", "--shutdown-timeout", "soon"])
            .is_err()
    );
}

#[test]
fn log_filter_priority() {
    assert_eq!(filter_directives(None, None), DEFAULT_DIRECTIVES);
    assert_eq!(filter_directives(None, Some("  ")), DEFAULT_DIRECTIVES);
    assert_eq!(
        filter_directives(None, Some("mqtt_executor=debug,rumqttc=info")),
        "mqtt_executor=debug,rumqttc=info"
    );
    assert_eq!(
        filter_directives(Some(LogLevel::Debug), Some("error")),
        "debug,rumqttc=warn"
    );
    assert_eq!(filter_directives(Some(LogLevel::Trace), None), "trace");
}
