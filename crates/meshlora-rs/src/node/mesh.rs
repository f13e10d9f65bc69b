// crates/meshlora-rs/src/node/mesh.rs

use super::config::NodeConfig;
use super::events::{EventSlot, ProtocolState, RadioEvent};
use super::scheduler::AdvertScheduler;
use super::state::{AckWait, DeliveredFrame, DutyState, NodeStatistics, TxKind};
use crate::frame::{Codec, DataFrame};
use crate::hal::{MeshError, RadioInterface, RandomSource, TimerId, TimerService};
use crate::queue::TransmitQueues;
use crate::routing::RoutingTable;
use crate::types::{APP_PAYLOAD_LEN, Address, DATA_FRAME_LEN, HopIndex, MAX_FRAME_LEN, SEQUENCE_MODULUS};
use alloc::collections::VecDeque;
use alloc::vec::Vec;
use log::{debug, info, trace, warn};

/// One mesh node: the protocol context plus the hardware it drives.
///
/// Driver interrupt handlers report completions through `on_radio_event`
/// and `on_timer_fired`; those only record the event. The application's main
/// loop calls `poll`, which runs the protocol to completion for whatever was
/// recorded.
pub struct MeshNode<R: RadioInterface, T: TimerService, G: RandomSource> {
    pub(super) config: NodeConfig,
    pub(super) radio: R,
    pub(super) timers: T,
    pub(super) rng: G,
    pub(super) events: EventSlot,
    pub(super) routes: RoutingTable,
    pub(super) queues: TransmitQueues,
    pub(super) adverts: AdvertScheduler,
    pub(super) stats: NodeStatistics,
    pub(super) inbox: VecDeque<DeliveredFrame>,
    /// Frame most recently handed to the radio.
    pub(super) last_tx: TxKind,
    /// The peer cleared us to send the pending payload.
    pub(super) got_ack: bool,
    /// Listening for the answer to our RTS.
    pub(super) rts_window_open: bool,
    pub(super) advert_pending: bool,
    pub(super) advert_timer_started: bool,
    /// A receive without timeout is running.
    pub(super) rx_continuous: bool,
    pub(super) tx_hop: Option<HopIndex>,
    pub(super) rx_hop: Option<HopIndex>,
    pub(super) ack_wait: AckWait,
    pub(super) missed_data: u8,
    pub(super) cad_clear: u8,
    pub(super) duty: DutyState,
    pub(super) last_rssi: i16,
    pub(super) last_snr: i8,
    pub(super) data_seq: u8,
    pub(super) tx_buffer: [u8; MAX_FRAME_LEN],
    started: bool,
}

impl<R: RadioInterface, T: TimerService, G: RandomSource> MeshNode<R, T, G> {
    /// Creates a node. The radio is not touched until `start`.
    pub fn new(config: NodeConfig, radio: R, timers: T, rng: G) -> Result<Self, MeshError> {
        config.validate()?;

        let routes = match config.fixed_relay {
            Some(relay) => RoutingTable::with_fixed_relay(
                config.address,
                config.sink,
                relay,
                config.routing_capacity,
            ),
            None => RoutingTable::new(config.address, config.sink, config.routing_capacity),
        };
        let queues = TransmitQueues::new(config.outgoing_capacity, config.relay_capacity);
        let adverts = AdvertScheduler::new(
            config.timings.router_min_interval_ms,
            config.timings.router_max_interval_ms,
        );

        info!(
            "[node {}] Created ({}, sink {}).",
            config.address,
            match (config.is_sink(), config.fixed_relay) {
                (true, _) => "sink",
                (false, Some(_)) => "fixed relay",
                (false, None) => "router",
            },
            config.sink
        );

        Ok(Self {
            config,
            radio,
            timers,
            rng,
            events: EventSlot::default(),
            routes,
            queues,
            adverts,
            stats: NodeStatistics::default(),
            inbox: VecDeque::new(),
            last_tx: TxKind::Nothing,
            got_ack: false,
            rts_window_open: false,
            advert_pending: false,
            advert_timer_started: false,
            rx_continuous: false,
            tx_hop: None,
            rx_hop: None,
            ack_wait: AckWait::None,
            missed_data: 0,
            cad_clear: 0,
            duty: DutyState::Awake,
            last_rssi: 0,
            last_snr: 0,
            data_seq: 0,
            tx_buffer: [0; MAX_FRAME_LEN],
            started: false,
        })
    }

    /// Brings the radio up and starts the protocol.
    ///
    /// The sink immediately contends for the channel to seed the tree with
    /// its advertisement; every other node listens on the control channel
    /// and starts its sensor and duty-cycle timers.
    pub fn start(&mut self) {
        if self.started {
            warn!("[node {}] start() called twice; ignoring.", self.address());
            return;
        }
        self.started = true;

        let radio = &self.config.radio;
        self.radio.set_channel(radio.control_frequency_hz);
        self.radio.set_tx_config(&radio.tx_config());
        self.radio.set_rx_config(&radio.rx_config());

        if self.is_sink() {
            info!("[node {}] Sink up, seeding the routing tree.", self.address());
            self.advert_pending = true;
            self.send_pending(TxKind::Router);
            return;
        }

        self.timers
            .set_value(TimerId::SensorData, self.config.timings.data_interval_ms);
        self.timers.start(TimerId::SensorData);
        self.listen(0);
        self.timers
            .set_value(TimerId::DutyCycle, self.config.timings.awake_ms);
        self.timers.start(TimerId::DutyCycle);
        info!("[node {}] Up, listening on the control channel.", self.address());
    }

    /// Records a radio completion. Called from the driver's interrupt context.
    ///
    /// Only one radio event is held; an unconsumed one is replaced.
    pub fn on_radio_event(&mut self, event: RadioEvent) {
        if let Some(stale) = self.events.put_radio(event) {
            trace!(
                "[node {}] Unconsumed {:?} replaced by {:?}.",
                self.address(),
                stale.protocol_state(),
                event.protocol_state()
            );
        }
    }

    /// Records a timer expiry. Called from the timer interrupt context.
    pub fn on_timer_fired(&mut self, timer: TimerId) {
        self.events.put_timer(timer);
    }

    /// Runs the protocol for every recorded event. Returns true if anything was handled.
    pub fn poll(&mut self) -> bool {
        let mut handled = false;
        if let Some(event) = self.events.take_radio() {
            self.handle_radio_event(event);
            handled = true;
        }
        while let Some(timer) = self.events.take_timer() {
            self.handle_timer(timer);
            handled = true;
        }
        handled
    }

    /// Queues a DATA frame carrying `payload` for the sink.
    pub fn queue_data(&mut self, payload: [u8; APP_PAYLOAD_LEN]) -> Result<(), MeshError> {
        if self.is_sink() {
            return Err(MeshError::InvalidConfig("the sink does not originate data"));
        }
        let frame = DataFrame {
            sequence: self.data_seq,
            source: self.address(),
            // Rewritten with the current route when the frame goes out.
            next_hop: self.routes.next_hop_to_sink().unwrap_or(self.config.sink),
            payload,
        };
        let mut buffer = [0u8; DATA_FRAME_LEN];
        let len = frame.serialize(&mut buffer)?;
        match self.queues.enqueue_outgoing(&buffer[..len], self.address()) {
            Ok(()) => {
                self.data_seq = ((self.data_seq as u32 + 1) % SEQUENCE_MODULUS) as u8;
                debug!(
                    "[node {}] Queued DATA seq {} ({} pending).",
                    self.address(),
                    frame.sequence,
                    self.queues.outgoing.len()
                );
                Ok(())
            }
            Err(e) => {
                if e == MeshError::QueueFull {
                    self.stats.outgoing_lost = self.stats.outgoing_lost.saturating_add(1);
                    warn!(
                        "[node {}] Outgoing queue full, DATA seq {} dropped.",
                        self.address(),
                        frame.sequence
                    );
                }
                Err(e)
            }
        }
    }

    /// Replaces the payload carried by periodic DATA frames.
    pub fn set_application_payload(&mut self, payload: [u8; APP_PAYLOAD_LEN]) {
        self.config.app_payload = payload;
    }

    /// Drains the frames delivered to the sink since the last call.
    pub fn take_delivered(&mut self) -> Vec<DeliveredFrame> {
        self.inbox.drain(..).collect()
    }

    pub fn address(&self) -> Address {
        self.config.address
    }

    pub fn is_sink(&self) -> bool {
        self.config.is_sink()
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// What the next `poll` will handle, `Idle` if no radio event is pending.
    pub fn protocol_state(&self) -> ProtocolState {
        self.events.protocol_state()
    }

    pub fn duty_state(&self) -> DutyState {
        self.duty
    }

    pub fn routing_table(&self) -> &RoutingTable {
        &self.routes
    }

    pub fn queues(&self) -> &TransmitQueues {
        &self.queues
    }

    pub fn statistics(&self) -> &NodeStatistics {
        &self.stats
    }

    pub fn advert_scheduler(&self) -> &AdvertScheduler {
        &self.adverts
    }

    pub fn is_advert_pending(&self) -> bool {
        self.advert_pending
    }

    pub fn last_tx_kind(&self) -> TxKind {
        self.last_tx
    }

    /// True while the node waits for the ACK to its RTS.
    pub fn is_rts_window_open(&self) -> bool {
        self.rts_window_open
    }

    pub fn ack_wait(&self) -> AckWait {
        self.ack_wait
    }

    /// Hop channel negotiated for our next payload, if any.
    pub fn tx_hop(&self) -> Option<HopIndex> {
        self.tx_hop
    }

    /// Hop channel we promised to listen on, if any.
    pub fn rx_hop(&self) -> Option<HopIndex> {
        self.rx_hop
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    pub fn timers(&self) -> &T {
        &self.timers
    }

    pub fn timers_mut(&mut self) -> &mut T {
        &mut self.timers
    }
}
