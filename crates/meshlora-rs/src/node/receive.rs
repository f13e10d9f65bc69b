// crates/meshlora-rs/src/node/receive.rs

use super::events::RxFrame;
use super::mesh::MeshNode;
use super::state::{AckWait, DeliveredFrame, DutyState, NodeStatistics, TxKind};
use crate::frame::{
    Ack0Frame, Ack1Frame, Codec, DataFrame, MeshFrame, RouterFrame, deserialize_frame,
};
use crate::hal::{MeshError, RadioInterface, RandomSource, TimerService};
use crate::types::{Address, DELIVERED_INBOX_CAPACITY, HopIndex, MAX_MISSED_DATA};
use log::{debug, error, info, trace, warn};

impl<R: RadioInterface, T: TimerService, G: RandomSource> MeshNode<R, T, G> {
    /// Handles a received payload.
    pub(super) fn handle_rx_done(&mut self, mut rx: RxFrame) {
        let frame = match deserialize_frame(rx.payload()) {
            Ok(frame) => frame,
            Err(MeshError::ForeignFrame) => {
                trace!("[node {}] Ignoring foreign frame.", self.address());
                self.resume_after_ignored_frame();
                return;
            }
            Err(e) => {
                debug!("[node {}] Dropping malformed mesh frame: {}", self.address(), e);
                self.resume_after_ignored_frame();
                return;
            }
        };

        self.last_rssi = rx.rssi;
        self.last_snr = rx.snr;
        let me = self.address();

        match frame {
            MeshFrame::Router(router) => self.handle_router(router),
            MeshFrame::Data(data) if data.next_hop == me => self.handle_data(data, &mut rx),
            MeshFrame::Rts0(rts) => {
                if !self.hold_reservation() {
                    self.reply_ack0(rts.source);
                }
            }
            MeshFrame::Ack0(ack) => {
                if self.hold_reservation() {
                    return;
                }
                if ack.target == me {
                    debug!("[node {}] ACK0 received, sending advertisement.", me);
                    self.got_ack = true;
                    self.send_pending(TxKind::Router);
                } else {
                    self.contention_backoff(ack.target);
                }
            }
            MeshFrame::Ack1(ack) => {
                if self.hold_reservation() {
                    return;
                }
                if ack.target == me {
                    self.handle_ack1_for_me(ack);
                } else {
                    self.contention_backoff(ack.target);
                }
            }
            MeshFrame::Rts1(rts) if rts.next_hop == me => {
                if self.hold_reservation() {
                    return;
                }
                if self.queues.relay.is_full() {
                    // No busy signal exists; the best this node can do is drain its own backlog.
                    debug!(
                        "[node {}] Relay queue full, answering RTS1 from {} with own relay.",
                        me, rts.source
                    );
                    self.send_pending(TxKind::Relay);
                } else {
                    self.reply_ack1(rts.source);
                }
            }
            other => {
                trace!("[node {}] Overheard {:?}.", me, other.frame_type());
                if self.hold_reservation() {
                    return;
                }
                if self.duty == DutyState::MidSleep {
                    self.enter_sleep();
                } else {
                    self.check_and_send(false);
                }
            }
        }
    }

    /// Continues after a frame that does not concern the protocol. No state changes.
    fn resume_after_ignored_frame(&mut self) {
        if self.ack_wait != AckWait::None {
            self.listen(self.config.timings.wait_for_data_ms);
        } else {
            self.dispatch_next();
        }
    }

    /// Keeps listening for the frame an ACK announced, on the reserved hop.
    /// Returns true while the reservation holds.
    ///
    /// The peer gets `MAX_MISSED_DATA` further windows; after that the
    /// reservation is released and the node reverts to the control channel.
    pub(super) fn hold_reservation(&mut self) -> bool {
        if self.ack_wait != AckWait::Waiting {
            return false;
        }
        if self.missed_data >= MAX_MISSED_DATA {
            warn!(
                "[node {}] Announced frame never arrived, releasing reservation.",
                self.address()
            );
            self.missed_data = 0;
            self.ack_wait = AckWait::None;
            self.rx_hop = None;
            self.stats.handshakes_abandoned = self.stats.handshakes_abandoned.saturating_add(1);
            return false;
        }
        self.missed_data += 1;
        self.listen(self.config.timings.wait_for_data_ms);
        true
    }

    /// Another node won the channel. Wait a random interval before trying again.
    fn contention_backoff(&mut self, winner: Address) {
        self.stats.contention_backoffs = self.stats.contention_backoffs.saturating_add(1);
        let delay = self.random_backoff();
        debug!(
            "[node {}] Channel granted to {}, deferring {} ms.",
            self.address(),
            winner,
            delay
        );
        if self.rts_window_open {
            self.start_backoff(delay);
        } else {
            self.listen(delay);
        }
    }

    fn reply_ack0(&mut self, target: Address) {
        self.ack_wait = AckWait::Waiting;
        self.missed_data = 0;
        match (Ack0Frame { target }).serialize(&mut self.tx_buffer) {
            Ok(len) => {
                debug!("[node {}] RTS0 from {}, replying ACK0.", self.address(), target);
                self.transmit(TxKind::Ack, len);
            }
            Err(e) => {
                error!("[node {}] Failed to encode ACK0: {}", self.address(), e);
                self.check_and_send(false);
            }
        }
    }

    fn reply_ack1(&mut self, target: Address) {
        let hops = self.config.radio.hop_frequencies.len() as u32;
        let pick = self.rng.random_range(0, hops.saturating_sub(1));
        let Ok(hop) = HopIndex::try_from(pick as u8) else {
            error!("[node {}] Random hop {} out of range.", self.address(), pick);
            self.check_and_send(false);
            return;
        };
        self.rx_hop = Some(hop);
        self.ack_wait = AckWait::Waiting;
        self.missed_data = 0;
        match (Ack1Frame { target, hop }).serialize(&mut self.tx_buffer) {
            Ok(len) => {
                debug!(
                    "[node {}] RTS1 from {}, replying ACK1 on hop {}.",
                    self.address(),
                    target,
                    hop.get()
                );
                self.transmit(TxKind::Ack, len);
            }
            Err(e) => {
                error!("[node {}] Failed to encode ACK1: {}", self.address(), e);
                self.rx_hop = None;
                self.check_and_send(false);
            }
        }
    }

    fn handle_ack1_for_me(&mut self, ack: Ack1Frame) {
        let kind = if !self.queues.relay.is_empty() {
            TxKind::Relay
        } else if !self.queues.outgoing.is_empty() {
            TxKind::Data
        } else {
            error!(
                "[node {}] ACK1 received with no DATA or RELAY pending.",
                self.address()
            );
            self.check_and_send(false);
            return;
        };

        if ack.hop.as_usize() >= self.config.radio.hop_frequencies.len() {
            warn!(
                "[node {}] ACK1 names hop {} outside our hop table; staying on control channel.",
                self.address(),
                ack.hop.get()
            );
            self.tx_hop = None;
        } else {
            self.tx_hop = Some(ack.hop);
        }
        self.got_ack = true;
        self.send_pending(kind);
    }

    fn handle_router(&mut self, router: RouterFrame) {
        self.rx_hop = None;
        self.missed_data = 0;

        if self.routes.fixed_relay().is_some() {
            if !self.advert_timer_started {
                self.advert_timer_started = true;
                self.arm_advert_timer();
            }
        } else if router.source != self.address() {
            let mut changed = false;
            for route in &router.routes {
                match self
                    .routes
                    .update(router.source, route.destination, route.cost, self.last_rssi)
                {
                    Ok(update) if update.changed() => {
                        changed = true;
                        info!(
                            "[node {}] Route to {} via {} (cost {}, RSSI {}).",
                            self.address(),
                            route.destination,
                            router.source,
                            route.cost.saturating_add(1),
                            self.last_rssi
                        );
                    }
                    Ok(_) => {}
                    Err(e) => error!(
                        "[node {}] Cannot learn route to {}: {}",
                        self.address(),
                        route.destination,
                        e
                    ),
                }
            }
            if changed {
                self.advert_pending = true;
                self.adverts.reset();
                if self.advert_timer_started {
                    self.arm_advert_timer();
                }
            }
        }

        self.check_and_send(true);
    }

    fn handle_data(&mut self, data: DataFrame, rx: &mut RxFrame) {
        self.rx_hop = None;
        self.missed_data = 0;

        if self.is_sink() {
            NodeStatistics::bump(&mut self.stats.delivered, data.source);
            info!(
                "[node {}] DATA seq {} from {} delivered (RSSI {}, SNR {}).",
                self.address(),
                data.sequence,
                data.source,
                rx.rssi,
                rx.snr
            );
            if self.inbox.len() >= DELIVERED_INBOX_CAPACITY {
                self.stats.inbox_overflow = self.stats.inbox_overflow.saturating_add(1);
            } else {
                self.inbox.push_back(DeliveredFrame {
                    source: data.source,
                    sequence: data.sequence,
                    payload: data.payload,
                    rssi: rx.rssi,
                });
            }
            self.check_and_send(true);
            return;
        }

        NodeStatistics::bump(&mut self.stats.relays_received, data.source);
        self.ack_wait = AckWait::None;

        let Some(next_hop) = self.routes.next_hop_to_sink() else {
            warn!(
                "[node {}] No route to the sink, dropping frame from {}.",
                self.address(),
                data.source
            );
            self.stats.unroutable_relays = self.stats.unroutable_relays.saturating_add(1);
            self.dispatch_next();
            return;
        };

        if let Err(e) = DataFrame::rewrite_next_hop(rx.payload_mut(), next_hop) {
            error!("[node {}] Cannot rewrite relay frame: {}", self.address(), e);
            self.dispatch_next();
            return;
        }
        match self.queues.enqueue_relay(rx.payload(), data.source) {
            Ok(()) => debug!(
                "[node {}] Relaying seq {} from {} via {}.",
                self.address(),
                data.sequence,
                data.source,
                next_hop
            ),
            Err(e) => {
                self.stats.relay_lost = self.stats.relay_lost.saturating_add(1);
                warn!(
                    "[node {}] Relay frame from {} dropped: {}",
                    self.address(),
                    data.source,
                    e
                );
            }
        }
        self.send_pending(TxKind::Relay);
    }
}
