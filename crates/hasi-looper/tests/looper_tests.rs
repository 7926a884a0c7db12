//! End-to-end cycles through the looper, its stores and its managers

mod common;

use common::{looper_in, single_device_bus, MockEngine};
use hasi_core::{
    ActivationAction, Command, ExecuteResult, StopWatchAction, TimerAction, VarStrAssignment,
};
use hasi_looper::EventLogging;
use hasi_stores::ManualClock;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

fn door(value: f64) -> Vec<VarStrAssignment> {
    vec![VarStrAssignment::new("door", value)]
}

#[test]
fn test_activation_reaches_the_bus() {
    let dir = TempDir::new().unwrap();
    let clock = ManualClock::new();
    let engine = MockEngine::new().with_rule(
        "[on_door]",
        vec![Command::activation(ActivationAction::Deactivate, "lcd")],
    );
    let mut looper = looper_in(dir.path(), &clock, engine);
    let (bus, lcd_active) = single_device_bus("lcd");
    looper.connect_activations(bus);

    looper.execute(&door(0.0)).unwrap();
    assert!(*lcd_active.lock().unwrap());

    looper.execute(&door(1.0)).unwrap();
    assert!(!*lcd_active.lock().unwrap());
}

#[test]
fn test_activation_of_unknown_device_fails_the_cycle() {
    let dir = TempDir::new().unwrap();
    let clock = ManualClock::new();
    let engine = MockEngine::new().with_rule(
        "[on_door]",
        vec![Command::activation(ActivationAction::Activate, "pump")],
    );
    let mut looper = looper_in(dir.path(), &clock, engine);
    looper.connect_activations(single_device_bus("lcd").0);

    looper.execute(&door(0.0)).unwrap();
    assert!(looper.execute(&door(1.0)).is_err());
}

#[derive(Default)]
struct Recorder(Mutex<Vec<(String, Vec<VarStrAssignment>)>>);

impl hasi_core::ScriptRunner for Recorder {
    fn run(&self, script: &str, vas: &[VarStrAssignment]) -> ExecuteResult<()> {
        self.0.lock().unwrap().push((script.to_string(), vas.to_vec()));
        Ok(())
    }
}

#[test]
fn test_script_execute_sees_the_cycle_values() {
    let dir = TempDir::new().unwrap();
    let clock = ManualClock::new();
    let engine = MockEngine::new().with_rule(
        "[on_door]",
        vec![Command::script_execute("alarm.hsc")],
    );
    let mut looper = looper_in(dir.path(), &clock, engine);
    let recorder = Arc::new(Recorder::default());
    looper.set_script_runner(recorder.clone());

    looper.execute(&door(0.0)).unwrap();
    looper.execute(&door(1.0)).unwrap();
    looper.shutdown_scripts(Duration::from_secs(5));

    let runs = recorder.0.lock().unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].0, "alarm.hsc");
    assert!(runs[0].1.contains(&VarStrAssignment::new("on_door", 1.0)));
}

#[test]
fn test_commands_apply_in_emission_order() {
    let dir = TempDir::new().unwrap();
    let clock = ManualClock::new();
    let engine = MockEngine::new()
        .with_rule(
            "[on_door]",
            vec![
                Command::state("mode", 1.0),
                Command::output("lamp", 1.0),
                Command::state("mode", 2.0),
                Command::output("lamp", 0.0),
            ],
        )
        .with_variable("[state_mode]");
    let mut looper = looper_in(dir.path(), &clock, engine);

    looper.execute(&door(0.0)).unwrap();
    let out = looper.execute(&door(1.0)).unwrap();
    assert_eq!(
        out,
        vec![
            VarStrAssignment::new("lamp", 1.0),
            VarStrAssignment::new("lamp", 0.0),
        ]
    );

    looper.execute(&door(1.0)).unwrap();
    assert_eq!(looper.current_vas().get_by_raw_name("state_mode"), Some(2.0));
}

#[test]
fn test_stopwatch_measures_between_cycles() {
    let dir = TempDir::new().unwrap();
    let clock = ManualClock::new();
    let engine = MockEngine::new()
        .with_rule(
            "[on_door]",
            vec![Command::stopwatch(StopWatchAction::Start, "open")],
        )
        .with_rule(
            "[off_door]",
            vec![Command::stopwatch(StopWatchAction::Stop, "open")],
        )
        .with_variable("[stopWatch_open]");
    let mut looper = looper_in(dir.path(), &clock, engine);

    looper.execute(&door(0.0)).unwrap();
    looper.execute(&door(1.0)).unwrap();
    clock.advance_seconds(3);
    looper.execute(&door(0.0)).unwrap();
    clock.advance_seconds(10);
    looper.execute(&door(0.0)).unwrap();

    assert_eq!(
        looper.current_vas().get_by_raw_name("stopWatch_open"),
        Some(3000.0)
    );
}

#[test]
fn test_stores_survive_a_restart() {
    let dir = TempDir::new().unwrap();
    let clock = ManualClock::new();
    let engine = MockEngine::new()
        .with_rule(
            "[on_door]",
            vec![
                Command::timer(TimerAction::Set, "light", 60_000.0),
                Command::state("mode", 4.0),
            ],
        )
        .with_variable("[timer_remaining_light]")
        .with_variable("[state_mode]");

    let mut looper = looper_in(dir.path(), &clock, engine.clone());
    looper.execute(&door(0.0)).unwrap();
    looper.execute(&door(1.0)).unwrap();
    clock.advance_seconds(20);
    looper.save_state().unwrap();
    drop(looper);

    let mut restarted = looper_in(dir.path(), &clock, engine);
    // the stores are only read once a cycle runs
    assert_eq!(
        restarted.current_vas().get_by_raw_name("state_mode"),
        Some(0.0)
    );
    restarted.execute(&door(1.0)).unwrap();
    let vas = restarted.current_vas();
    assert_eq!(vas.get_by_raw_name("state_mode"), Some(4.0));
    assert_eq!(vas.get_by_raw_name("timer_remaining_light"), Some(40_000.0));
}

#[test]
fn test_event_log_file() {
    let dir = TempDir::new().unwrap();
    let clock = ManualClock::new();
    let engine = MockEngine::new().with_rule("[on_door]", vec![Command::output("lamp", 1.0)]);
    let mut looper = looper_in(dir.path(), &clock, engine);
    looper.set_event_logging(EventLogging::File);

    looper.execute(&door(0.0)).unwrap();
    looper.execute(&door(1.0)).unwrap();

    let log = std::fs::read_to_string(dir.path().join("events.log")).unwrap();
    assert!(log.contains("Triggers:"));
    assert!(log.contains(" [door (on_input)] = 1"));
    assert!(log.contains("Resulting internal Commands:\n [lamp] = 1"));
}

#[test]
fn test_parse_commands_uses_the_engine() {
    let dir = TempDir::new().unwrap();
    let clock = ManualClock::new();
    let mut looper = looper_in(dir.path(), &clock, MockEngine::new().with_variable("[door]"));

    let commands = looper.parse_commands("lamp = 1").unwrap();
    let out = looper.evaluate_commands(commands).unwrap();
    assert_eq!(out, vec![VarStrAssignment::new("lamp", 1.0)]);
    assert!(looper.parse_commands("nonsense").is_err());
}
