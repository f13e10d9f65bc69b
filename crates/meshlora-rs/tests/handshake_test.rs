// crates/meshlora-rs/tests/handshake_test.rs

mod harness;

use harness::*;
use meshlora_rs::frame::{Codec, DataFrame};
use meshlora_rs::node::{AckWait, TxKind};
use meshlora_rs::node::config::DEFAULT_APP_PAYLOAD;
use meshlora_rs::{Address, NodeConfig, RadioEvent, TimerId};

/// Node B reaching the sink through the fixed relay A.
fn leaf_node(script: &[u32]) -> TestNode {
    build_node(
        NodeConfig::new(NODE_B, SINK).with_fixed_relay(NODE_A),
        script,
    )
}

/// Node A forwarding straight to the sink.
fn relay_node(script: &[u32]) -> TestNode {
    build_node(NodeConfig::new(NODE_A, SINK).with_fixed_relay(SINK), script)
}

/// Queues one sensor reading and runs CAD until the RTS1 is on the air.
fn send_rts1(node: &mut TestNode) {
    fire(node, TimerId::SensorData);
    assert_eq!(node.radio().last_call(), Some(&RadioCall::StartCad));
    clear_cad(node);
    deliver(node, RadioEvent::TxDone);
}

#[test]
fn test_data_is_sent_on_negotiated_hop() {
    let mut node = leaf_node(&[]);
    node.start();

    fire(&mut node, TimerId::SensorData);
    assert_eq!(node.queues().outgoing.len(), 1);

    clear_cad(&mut node);
    assert_eq!(node.radio().last_sent(), Some(rts1(NODE_A, NODE_B)));
    assert_eq!(node.radio().channel_of_last_send(), Some(CONTROL_FREQUENCY));

    deliver(&mut node, RadioEvent::TxDone);
    assert_eq!(node.radio().last_receive(), Some(300));

    receive(&mut node, &ack1(NODE_B, 5));
    assert_eq!(node.last_tx_kind(), TxKind::Data);
    assert_eq!(node.radio().channel_of_last_send(), Some(hop_frequency(5)));

    let sent = node.radio().last_sent().unwrap();
    let frame = DataFrame::deserialize(&sent).unwrap();
    assert_eq!(frame.source, NODE_B);
    assert_eq!(frame.next_hop, NODE_A);
    assert_eq!(frame.sequence, 0);
    assert_eq!(frame.payload, DEFAULT_APP_PAYLOAD);

    deliver(&mut node, RadioEvent::TxDone);
    assert!(node.queues().outgoing.is_empty());
    assert_eq!(node.statistics().data_sent, 1);
    assert_eq!(node.tx_hop(), None);
    assert_eq!(node.radio().last_call(), Some(&RadioCall::Receive(0)));
    assert_eq!(node.radio().channel_of_last_receive(), Some(CONTROL_FREQUENCY));
}

#[test]
fn test_rts1_receiver_reserves_hop_and_relays() {
    let mut node = relay_node(&[3]);
    node.start();

    receive(&mut node, &rts1(NODE_A, NODE_B));
    assert_eq!(node.radio().last_sent(), Some(ack1(NODE_B, 3)));
    assert_eq!(node.ack_wait(), AckWait::Waiting);
    assert_eq!(node.rx_hop().map(|h| h.get()), Some(3));
    assert_eq!(node.radio().channel_of_last_send(), Some(CONTROL_FREQUENCY));

    deliver(&mut node, RadioEvent::TxDone);
    assert_eq!(node.radio().last_receive(), Some(300));
    assert_eq!(node.radio().channel_of_last_receive(), Some(hop_frequency(3)));

    receive(&mut node, &data(NODE_B, NODE_A, 9));
    assert_eq!(node.statistics().relays_received.get(&NODE_B), Some(&1));
    assert_eq!(node.ack_wait(), AckWait::None);
    assert_eq!(node.rx_hop(), None);
    assert_eq!(node.queues().relay.len(), 1);
    assert_eq!(node.radio().last_call(), Some(&RadioCall::StartCad));

    // Forward the frame to the sink.
    clear_cad(&mut node);
    assert_eq!(node.radio().last_sent(), Some(rts1(SINK, NODE_A)));
    deliver(&mut node, RadioEvent::TxDone);
    receive(&mut node, &ack1(NODE_A, 0));

    assert_eq!(node.radio().last_sent(), Some(data(NODE_B, SINK, 9)));
    assert_eq!(node.radio().channel_of_last_send(), Some(hop_frequency(0)));

    deliver(&mut node, RadioEvent::TxDone);
    assert!(node.queues().relay.is_empty());
    assert_eq!(node.statistics().relays_sent.get(&NODE_B), Some(&1));
    assert_eq!(node.statistics().relay_origin_mismatches, 0);
}

#[test]
fn test_full_relay_queue_answers_rts1_with_own_backlog() {
    let config = NodeConfig::new(NODE_A, SINK)
        .with_fixed_relay(SINK)
        .with_queue_capacities(6, 1);
    let mut node = build_node(config, &[0]);
    node.start();

    receive(&mut node, &rts1(NODE_A, NODE_B));
    deliver(&mut node, RadioEvent::TxDone);
    receive(&mut node, &data(NODE_B, NODE_A, 1));
    assert!(node.queues().relay.is_full());
    assert_eq!(node.radio().sent_frames().len(), 1);

    receive(&mut node, &rts1(NODE_A, Address(4)));

    // No ACK1: the node contends to push its own relay backlog instead.
    assert_eq!(node.radio().sent_frames().len(), 1);
    assert_eq!(node.radio().last_call(), Some(&RadioCall::StartCad));
    assert_eq!(node.ack_wait(), AckWait::None);
}

#[test]
fn test_foreign_ack0_while_idle_listens_for_random_interval() {
    let mut node = build_node(NodeConfig::new(NODE_A, SINK), &[120]);
    node.start();
    node.radio_mut().clear();

    receive(&mut node, &ack0(Address(7)));

    assert!(node.radio().sent_frames().is_empty());
    let timeout = node.radio().last_receive().unwrap();
    assert!((56..=150).contains(&timeout));
    assert_eq!(timeout, 120);
    assert_eq!(node.statistics().contention_backoffs, 1);
}

#[test]
fn test_foreign_ack_during_rts_arms_backoff_timer() {
    let mut node = leaf_node(&[90]);
    node.start();
    send_rts1(&mut node);
    assert_eq!(node.last_tx_kind(), TxKind::Rts);

    receive(&mut node, &ack1(Address(9), 2));

    assert!(node.timers().is_running(TimerId::Backoff));
    assert_eq!(node.timers().value(TimerId::Backoff), Some(90));
    assert_eq!(node.radio().sent_frames().len(), 1);

    fire(&mut node, TimerId::Backoff);
    assert_eq!(node.radio().last_call(), Some(&RadioCall::StartCad));
}

#[test]
fn test_rts_window_expiry_resends_rts() {
    let mut node = leaf_node(&[]);
    node.start();
    send_rts1(&mut node);

    deliver(&mut node, RadioEvent::RxTimeout);

    let sent = node.radio().sent_frames();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1], rts1(NODE_A, NODE_B));
}

#[test]
fn test_rx_error_during_rts_window_listens_again() {
    let mut node = leaf_node(&[]);
    node.start();
    send_rts1(&mut node);

    deliver(&mut node, RadioEvent::RxError);

    assert_eq!(node.statistics().rx_errors, 1);
    assert_eq!(node.radio().last_call(), Some(&RadioCall::Receive(300)));
}

#[test]
fn test_cad_activity_listens_then_retries() {
    let mut node = leaf_node(&[180]);
    node.start();
    fire(&mut node, TimerId::SensorData);

    deliver(&mut node, RadioEvent::CadDone { activity: true });
    assert_eq!(node.radio().last_receive(), Some(180));

    deliver(&mut node, RadioEvent::RxTimeout);
    assert_eq!(node.radio().last_call(), Some(&RadioCall::StartCad));
}

#[test]
fn test_missed_data_releases_reservation_after_two_retries() {
    let mut node = relay_node(&[4]);
    node.start();
    receive(&mut node, &rts1(NODE_A, NODE_B));
    deliver(&mut node, RadioEvent::TxDone);

    // Two overheard frames: keep waiting on the hop channel.
    for _ in 0..2 {
        receive(&mut node, &rts1(Address(9), Address(8)));
        assert_eq!(node.ack_wait(), AckWait::Waiting);
        assert_eq!(node.radio().last_receive(), Some(300));
        assert_eq!(node.radio().channel_of_last_receive(), Some(hop_frequency(4)));
    }

    receive(&mut node, &rts1(Address(9), Address(8)));
    assert_eq!(node.statistics().handshakes_abandoned, 1);
    assert_eq!(node.ack_wait(), AckWait::None);
    assert_eq!(node.rx_hop(), None);
    assert_eq!(node.radio().last_receive(), Some(0));
    assert_eq!(node.radio().channel_of_last_receive(), Some(CONTROL_FREQUENCY));
}

#[test]
fn test_no_data_after_ack_returns_to_control_channel() {
    let mut node = relay_node(&[6]);
    node.start();
    receive(&mut node, &rts1(NODE_A, NODE_B));
    deliver(&mut node, RadioEvent::TxDone);

    // Two empty windows: the hop stays reserved and the node listens again.
    for _ in 0..2 {
        deliver(&mut node, RadioEvent::RxTimeout);
        assert_eq!(node.ack_wait(), AckWait::Waiting);
        assert_eq!(node.rx_hop().map(|h| h.get()), Some(6));
        assert_eq!(node.radio().last_call(), Some(&RadioCall::Receive(300)));
        assert_eq!(node.radio().channel_of_last_receive(), Some(hop_frequency(6)));
    }

    deliver(&mut node, RadioEvent::RxTimeout);

    assert_eq!(node.statistics().handshakes_abandoned, 1);
    assert_eq!(node.ack_wait(), AckWait::None);
    assert_eq!(node.rx_hop(), None);
    assert_eq!(node.radio().last_call(), Some(&RadioCall::Receive(0)));
    assert_eq!(node.radio().channel_of_last_receive(), Some(CONTROL_FREQUENCY));
}

#[test]
fn test_rx_error_while_waiting_for_data_stays_on_hop() {
    let mut node = relay_node(&[4]);
    node.start();
    receive(&mut node, &rts1(NODE_A, NODE_B));
    deliver(&mut node, RadioEvent::TxDone);

    deliver(&mut node, RadioEvent::RxError);

    assert_eq!(node.statistics().rx_errors, 1);
    assert_eq!(node.ack_wait(), AckWait::Waiting);
    assert_eq!(node.radio().last_call(), Some(&RadioCall::Receive(300)));
    assert_eq!(node.radio().channel_of_last_receive(), Some(hop_frequency(4)));

    // The payload still gets through on the reserved hop.
    receive(&mut node, &data(NODE_B, NODE_A, 3));
    assert_eq!(node.queues().relay.len(), 1);
    assert_eq!(node.statistics().handshakes_abandoned, 0);
}

#[test]
fn test_foreign_ack_after_rts_window_closed_only_listens() {
    let mut node = leaf_node(&[90, 180, 70]);
    node.start();
    send_rts1(&mut node);
    assert!(node.is_rts_window_open());

    receive(&mut node, &ack1(Address(9), 2));
    assert!(!node.is_rts_window_open());
    assert_eq!(node.timers().value(TimerId::Backoff), Some(90));

    // Contend again and find the channel busy.
    fire(&mut node, TimerId::Backoff);
    deliver(&mut node, RadioEvent::CadDone { activity: true });
    assert_eq!(node.radio().last_receive(), Some(180));
    assert_eq!(node.last_tx_kind(), TxKind::Rts);

    // No RTS is outstanding, so the node just listens out the other exchange.
    receive(&mut node, &ack0(Address(7)));
    assert_eq!(node.radio().last_receive(), Some(70));
    assert_eq!(node.timers().value(TimerId::Backoff), Some(90));
    assert_eq!(node.statistics().contention_backoffs, 2);
    assert_eq!(node.radio().sent_frames().len(), 1);
}

#[test]
fn test_rts0_is_answered_with_ack0() {
    let mut node = build_node(NodeConfig::new(NODE_A, SINK), &[]);
    node.start();

    receive(&mut node, &rts0(SINK));
    assert_eq!(node.radio().last_sent(), Some(ack0(SINK)));
    assert_eq!(node.ack_wait(), AckWait::Waiting);

    deliver(&mut node, RadioEvent::TxDone);
    assert_eq!(node.radio().last_receive(), Some(300));

    // The advertisement arrives; the node grants one more window before dispatching.
    receive(&mut node, &router(SINK, &[(SINK, 0)]));
    assert_eq!(node.ack_wait(), AckWait::Retrying);
    assert_eq!(node.radio().last_call(), Some(&RadioCall::Receive(300)));
    assert!(node.routing_table().is_sink_reachable());
}

#[test]
fn test_tx_timeout_backs_off() {
    let mut node = leaf_node(&[77]);
    node.start();
    fire(&mut node, TimerId::SensorData);
    clear_cad(&mut node);

    deliver(&mut node, RadioEvent::TxTimeout);

    assert_eq!(node.statistics().tx_timeouts, 1);
    assert!(node.timers().is_running(TimerId::Backoff));
    assert_eq!(node.timers().value(TimerId::Backoff), Some(77));
    // Own data stays queued for the next attempt.
    assert_eq!(node.queues().outgoing.len(), 1);
}

#[test]
fn test_refused_send_backs_off() {
    let mut sink = build_node(NodeConfig::new(SINK, SINK), &[60]);
    sink.radio_mut().refuse_send = true;
    sink.start();
    clear_cad(&mut sink);

    assert!(sink.radio().sent_frames().is_empty());
    assert_eq!(sink.timers().value(TimerId::Backoff), Some(60));
    assert!(sink.timers().is_running(TimerId::Backoff));
}

#[test]
fn test_ack1_without_pending_payload_is_not_answered() {
    let mut node = build_node(NodeConfig::new(NODE_A, SINK), &[]);
    node.start();

    receive(&mut node, &ack1(NODE_A, 1));

    assert!(node.radio().sent_frames().is_empty());
    assert_eq!(node.tx_hop(), None);
    assert_eq!(node.radio().last_call(), Some(&RadioCall::Receive(0)));
}
