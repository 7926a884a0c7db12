//! Ticks through the controller against a mock bus

mod common;

use common::{controller, test_config, MockBus, MockDevice, MockEngine, MockSource};
use hasi_core::{Command, ParseError, VarStrAssignment};
use hasi_server::{Connection, Controller, ControllerError};
use hasi_stores::ManualClock;
use tempfile::TempDir;

fn connect_error(engine: MockEngine, bus: MockBus) -> (String, String) {
    let dir = TempDir::new().unwrap();
    let clock = ManualClock::new();
    let err = Controller::new(test_config(dir.path()), Box::new(engine), Box::new(bus), clock.shared())
        .unwrap_err();
    match err {
        ControllerError::Parse(ParseError::InvalidDeviceId { id, reason }) => (id, reason),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_unknown_device_is_rejected() {
    let sensor = MockDevice::new("sensor", 1, 0);
    let engine = MockEngine::new().with_rule("[on_pump.1]", vec![]);

    let (id, reason) = connect_error(engine, MockBus::new(&[&sensor]));
    assert_eq!(id, "pump.1");
    assert_eq!(reason, "unknown device pump");
}

#[test]
fn test_channel_out_of_range_is_rejected() {
    let sensor = MockDevice::new("sensor", 2, 0);
    let engine = MockEngine::new().with_rule("[on_sensor.3]", vec![]);
    let (_, reason) = connect_error(engine, MockBus::new(&[&sensor]));
    assert_eq!(reason, "invalid input device channel (min:1, max:2)");

    let relay = MockDevice::new("relay", 0, 4);
    let engine = MockEngine::new().with_output("relay.5");
    let (_, reason) = connect_error(engine, MockBus::new(&[&relay]));
    assert_eq!(reason, "invalid output device channel (min:1, max:4)");
}

#[test]
fn test_malformed_device_id_is_rejected() {
    let sensor = MockDevice::new("sensor", 1, 0);
    let engine = MockEngine::new().with_rule("[on_sensor.1.2]", vec![]);
    let (_, reason) = connect_error(engine, MockBus::new(&[&sensor]));
    assert_eq!(reason, "too many dots");
}

#[tokio::test]
async fn test_connections_are_resolved() {
    let dir = TempDir::new().unwrap();
    let sensor = MockDevice::new("sensor", 2, 0);
    let relay = MockDevice::new("relay", 0, 2);
    let engine = MockEngine::new()
        .with_rule("[on_sensor.2]", vec![])
        .with_output("relay");
    let controller = controller(dir.path(), engine, MockBus::new(&[&sensor, &relay]));

    assert_eq!(
        controller.inputs().await,
        vec![Connection {
            name: "sensor.2".to_string(),
            device: "sensor".to_string(),
            channel: 1,
        }]
    );
    assert_eq!(controller.outputs().await[0].channel, 0);
    assert_eq!(controller.poll_devices().await, vec!["sensor".to_string()]);
}

#[tokio::test]
async fn test_tick_reads_inputs_and_writes_outputs() {
    let dir = TempDir::new().unwrap();
    let sensor = MockDevice::new("sensor", 1, 0);
    let relay = MockDevice::new("relay", 0, 2);
    let engine = MockEngine::new()
        .with_rule("[on_sensor.1]", vec![Command::output("relay.2", 1.0)])
        .with_rule("[off_sensor.1]", vec![Command::output("relay.2", 0.0)])
        .with_output("relay.2");
    let controller = controller(dir.path(), engine, MockBus::new(&[&sensor, &relay]));

    controller.tick().await;
    assert_eq!(sensor.polls(), 1);
    assert!(relay.writes().is_empty());
    assert_eq!(relay.applies(), 1);

    sensor.set_input(0, 1.0);
    controller.tick().await;
    assert_eq!(relay.writes(), vec![(1, 1.0)]);
    assert!(controller
        .current_vas()
        .await
        .contains(&VarStrAssignment::new("sensor.1", 1.0)));

    controller.tick().await;
    assert_eq!(relay.writes().len(), 1);

    sensor.set_input(0, 0.0);
    controller.tick().await;
    assert_eq!(relay.writes(), vec![(1, 1.0), (1, 0.0)]);
    assert_eq!(relay.applies(), 4);
}

#[tokio::test]
async fn test_inactive_device_keeps_its_value() {
    let dir = TempDir::new().unwrap();
    let sensor = MockDevice::new("sensor", 1, 0);
    let engine = MockEngine::new().with_rule("[change_sensor.1]", vec![]);
    let controller = controller(dir.path(), engine, MockBus::new(&[&sensor]));

    sensor.state.lock().unwrap().active = false;
    sensor.set_input(0, 1.0);

    // the first cycle reads regardless
    controller.tick().await;
    assert_eq!(sensor.reads(), 1);

    sensor.set_input(0, 0.0);
    controller.tick().await;
    assert_eq!(sensor.reads(), 1);
    assert!(controller
        .current_vas()
        .await
        .contains(&VarStrAssignment::new("sensor.1", 1.0)));

    sensor.state.lock().unwrap().active = true;
    controller.tick().await;
    assert_eq!(sensor.reads(), 2);
    assert!(controller
        .current_vas()
        .await
        .contains(&VarStrAssignment::new("sensor.1", 0.0)));
}

#[tokio::test]
async fn test_activation_commands_reach_the_bus() {
    let dir = TempDir::new().unwrap();
    let sensor = MockDevice::new("sensor", 1, 0);
    let lcd = MockDevice::new("lcd", 0, 1);
    let engine = MockEngine::new().with_rule(
        "[on_sensor.1]",
        vec![Command::activation(hasi_core::ActivationAction::Deactivate, "lcd")],
    );
    let controller = controller(dir.path(), engine, MockBus::new(&[&sensor, &lcd]));

    controller.tick().await;
    sensor.set_input(0, 1.0);
    controller.tick().await;
    assert!(!lcd.is_active());
}

#[tokio::test]
async fn test_command_sources_and_publish_skip() {
    let dir = TempDir::new().unwrap();
    let sensor = MockDevice::new("sensor", 1, 0);
    let relay = MockDevice::new("relay", 0, 1);
    let engine = MockEngine::new()
        .with_rule("[change_sensor.1]", vec![])
        .with_output("relay.1");
    let mut config = test_config(dir.path());
    config.remote_update_skip = 2;
    let source = MockSource::default();
    let controller = Controller::new(
        config,
        Box::new(engine),
        Box::new(MockBus::new(&[&sensor, &relay])),
        ManualClock::new().shared(),
    )
    .unwrap()
    .with_command_source(Box::new(source.clone()));

    source.push("relay.1 = 1");
    controller.tick().await;
    assert_eq!(relay.writes(), vec![(0, 1.0)]);
    assert!(source.pending.lock().unwrap().is_empty());

    // published on the first tick, then every third
    assert_eq!(source.publish_count(), 1);
    for _ in 0..3 {
        controller.tick().await;
    }
    assert_eq!(source.publish_count(), 2);
}

#[tokio::test]
async fn test_bad_command_line_is_not_fatal() {
    let dir = TempDir::new().unwrap();
    let relay = MockDevice::new("relay", 0, 1);
    let engine = MockEngine::new().with_output("relay.1");
    let controller = controller(dir.path(), engine, MockBus::new(&[&relay]));

    assert!(controller.execute_line("not an assignment").await.is_ok());
    assert!(relay.writes().is_empty());

    controller.execute_line("relay.1 = 1").await.unwrap();
    assert_eq!(relay.writes(), vec![(0, 1.0)]);
    assert_eq!(relay.applies(), 1);
}

#[tokio::test]
async fn test_unknown_output_is_skipped() {
    let dir = TempDir::new().unwrap();
    let relay = MockDevice::new("relay", 0, 1);
    let engine = MockEngine::new().with_output("relay.1");
    let controller = controller(dir.path(), engine, MockBus::new(&[&relay]));

    controller.execute_line("lamp = 1").await.unwrap();
    assert!(relay.writes().is_empty());
}

#[tokio::test]
async fn test_state_is_saved() {
    let dir = TempDir::new().unwrap();
    let sensor = MockDevice::new("sensor", 1, 0);
    let engine = MockEngine::new().with_rule("[on_sensor.1]", vec![Command::state("mode", 3.0)]);
    let controller = controller(dir.path(), engine, MockBus::new(&[&sensor]));

    controller.tick().await;
    sensor.set_input(0, 1.0);
    controller.tick().await;
    controller.save_state().await.unwrap();

    let saved = std::fs::read_to_string(dir.path().join("states.save")).unwrap();
    assert_eq!(saved, "mode 3\n");
}
