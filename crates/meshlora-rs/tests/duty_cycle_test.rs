// crates/meshlora-rs/tests/duty_cycle_test.rs

mod harness;

use harness::*;
use meshlora_rs::{DutyState, NodeConfig, RadioEvent, TimerId};

fn leaf_node() -> TestNode {
    build_node(NodeConfig::new(NODE_B, SINK).with_fixed_relay(NODE_A), &[])
}

#[test]
fn test_idle_node_sleeps_at_window_end() {
    let mut node = router_node(NODE_A);
    node.start();
    assert_eq!(node.timers().value(TimerId::DutyCycle), Some(3_000));
    assert!(node.timers().is_running(TimerId::DutyCycle));
    node.radio_mut().clear();

    fire(&mut node, TimerId::DutyCycle);

    assert_eq!(node.duty_state(), DutyState::Asleep);
    assert_eq!(
        node.radio().calls,
        vec![RadioCall::Standby, RadioCall::Sleep]
    );
    assert_eq!(node.timers().value(TimerId::DutyCycle), Some(1_000));

    fire(&mut node, TimerId::DutyCycle);

    assert_eq!(node.duty_state(), DutyState::Awake);
    assert_eq!(node.timers().value(TimerId::DutyCycle), Some(3_000));
    assert_eq!(node.radio().last_call(), Some(&RadioCall::Receive(0)));
}

#[test]
fn test_exchange_in_flight_completes_before_sleep() {
    let mut node = leaf_node();
    node.start();
    fire(&mut node, TimerId::SensorData);
    clear_cad(&mut node);
    deliver(&mut node, RadioEvent::TxDone);

    // The awake window ends while the RTS listen window is open.
    fire(&mut node, TimerId::DutyCycle);
    assert_eq!(node.duty_state(), DutyState::MidSleep);
    assert_ne!(node.radio().last_call(), Some(&RadioCall::Sleep));

    receive(&mut node, &ack1(NODE_B, 2));
    assert_eq!(node.radio().channel_of_last_send(), Some(hop_frequency(2)));

    deliver(&mut node, RadioEvent::TxDone);
    assert_eq!(node.statistics().data_sent, 1);
    assert_eq!(node.duty_state(), DutyState::Asleep);
    assert_eq!(node.timers().value(TimerId::DutyCycle), Some(1_000));
}

#[test]
fn test_timeout_at_window_end_sleeps() {
    let mut node = leaf_node();
    node.start();
    fire(&mut node, TimerId::SensorData);
    clear_cad(&mut node);
    deliver(&mut node, RadioEvent::TxDone);
    fire(&mut node, TimerId::DutyCycle);

    deliver(&mut node, RadioEvent::RxTimeout);

    assert_eq!(node.duty_state(), DutyState::Asleep);
    // The RTS is not repeated once the window has closed.
    assert_eq!(node.radio().sent_frames().len(), 1);
    assert_eq!(node.queues().outgoing.len(), 1);
}

#[test]
fn test_asleep_node_defers_dispatch_until_wake() {
    let mut node = leaf_node();
    node.start();
    fire(&mut node, TimerId::DutyCycle);
    assert_eq!(node.duty_state(), DutyState::Asleep);
    node.radio_mut().clear();

    fire(&mut node, TimerId::SensorData);
    assert_eq!(node.queues().outgoing.len(), 1);
    assert!(node.radio().calls.is_empty());

    fire(&mut node, TimerId::Backoff);
    fire(&mut node, TimerId::CadRepeat);
    assert!(node.radio().calls.is_empty());

    fire(&mut node, TimerId::DutyCycle);
    assert_eq!(node.duty_state(), DutyState::Awake);
    assert_eq!(node.radio().last_call(), Some(&RadioCall::StartCad));
}

#[test]
fn test_sink_never_duty_cycles() {
    let mut sink = sink_node();
    sink.start();
    assert_eq!(sink.timers().value(TimerId::DutyCycle), None);
    assert_eq!(sink.timers().value(TimerId::SensorData), None);
    assert_eq!(sink.duty_state(), DutyState::Awake);
}
