// crates/meshlora-rs/src/node/dispatch.rs

use super::mesh::MeshNode;
use super::state::{AckWait, DutyState, TxKind};
use crate::frame::{Codec, DataFrame, RouterFrame, Rts0Frame, Rts1Frame};
use crate::hal::{MeshError, RadioInterface, RadioStatus, RandomSource, TimerId, TimerService};
use log::{debug, error, trace, warn};

impl<R: RadioInterface, T: TimerService, G: RandomSource> MeshNode<R, T, G> {
    /// Bounded settling delay between standby and the next radio command.
    pub(super) fn settle(&mut self) {
        self.timers.delay_ms(self.config.timings.settle_ms);
    }

    /// Leaves a continuous receive so the radio can be reconfigured.
    pub(super) fn stop_listening(&mut self) {
        if self.rx_continuous {
            self.radio.standby();
            self.rx_continuous = false;
            self.settle();
        }
    }

    /// Receives on the current receive channel. A timeout of 0 listens until further notice.
    pub(super) fn listen(&mut self, timeout_ms: u32) {
        self.rts_window_open = false;
        let frequency = self.config.radio.frequency(self.rx_hop);
        self.radio.set_channel(frequency);
        self.radio.receive(timeout_ms);
        self.rx_continuous = timeout_ms == 0;
        trace!(
            "[node {}] RX {} Hz, timeout {} ms.",
            self.address(),
            frequency,
            timeout_ms
        );
    }

    /// Listens for the answer to the RTS just sent.
    pub(super) fn open_rts_window(&mut self) {
        self.listen(self.config.timings.rts_listen_ms);
        self.rts_window_open = true;
    }

    pub(super) fn random_backoff(&mut self) -> u32 {
        let t = &self.config.timings;
        self.rng.random_range(t.backoff_min_ms, t.backoff_max_ms)
    }

    /// Arms the backoff timer; its expiry re-runs dispatch.
    pub(super) fn start_backoff(&mut self, duration_ms: u32) {
        self.rts_window_open = false;
        self.timers.stop(TimerId::Backoff);
        self.timers.set_value(TimerId::Backoff, duration_ms);
        self.timers.start(TimerId::Backoff);
        debug!("[node {}] Backing off {} ms.", self.address(), duration_ms);
    }

    /// Sends `tx_buffer[..len]` on the transmit channel.
    pub(super) fn transmit(&mut self, kind: TxKind, len: usize) {
        self.last_tx = kind;
        self.rts_window_open = false;
        let frequency = self.config.radio.frequency(self.tx_hop);
        trace!(
            "[node {}] TX {:?} {} bytes on {} Hz, {} ms on air (t={} ms): {:02X?}",
            self.address(),
            kind,
            len,
            frequency,
            self.radio.time_on_air(len),
            self.timers.now_ms(),
            &self.tx_buffer[..len]
        );
        self.settle();
        self.radio.set_channel(frequency);
        if let Err(e) = self.radio.send(&self.tx_buffer[..len]) {
            warn!(
                "[node {}] Radio refused {:?} frame: {}. Backing off.",
                self.address(),
                kind,
                e
            );
            self.got_ack = false;
            self.tx_hop = None;
            let delay = self.random_backoff();
            self.start_backoff(delay);
        }
    }

    /// Sends the pending payload of `kind` if a peer cleared us, otherwise
    /// starts contending for the channel with CAD.
    pub(super) fn send_pending(&mut self, kind: TxKind) {
        if !self.got_ack {
            self.stop_listening();
            self.rts_window_open = false;
            self.cad_clear = 0;
            self.radio.start_cad();
            debug!("[node {}] {:?} pending, running CAD.", self.address(), kind);
            return;
        }

        if self.rx_continuous {
            self.radio.standby();
            self.rx_continuous = false;
        }

        match self.encode_pending(kind) {
            Ok(Some(len)) => self.transmit(kind, len),
            Ok(None) => {
                error!(
                    "[node {}] Cleared to send {:?} but nothing is pending.",
                    self.address(),
                    kind
                );
                self.got_ack = false;
                self.tx_hop = None;
                self.dispatch_next();
            }
            Err(e) => {
                error!(
                    "[node {}] Failed to encode {:?} frame: {}",
                    self.address(),
                    kind,
                    e
                );
                if kind == TxKind::Router {
                    self.advert_pending = false;
                }
                self.got_ack = false;
                self.tx_hop = None;
                self.dispatch_next();
            }
        }
    }

    /// Writes the frame for `kind` into `tx_buffer`.
    fn encode_pending(&mut self, kind: TxKind) -> Result<Option<usize>, MeshError> {
        match kind {
            TxKind::Relay => {
                let Some(entry) = self.queues.relay.peek().copied() else {
                    return Ok(None);
                };
                let bytes = entry.as_bytes();
                self.tx_buffer[..bytes.len()].copy_from_slice(bytes);
                Ok(Some(bytes.len()))
            }
            TxKind::Data => {
                let Some(entry) = self.queues.outgoing.peek().copied() else {
                    return Ok(None);
                };
                let Some(next_hop) = self.routes.next_hop_to_sink() else {
                    return Ok(None);
                };
                let bytes = entry.as_bytes();
                let len = bytes.len();
                self.tx_buffer[..len].copy_from_slice(bytes);
                // The route may have changed since the frame was queued.
                DataFrame::rewrite_next_hop(&mut self.tx_buffer[..len], next_hop)?;
                Ok(Some(len))
            }
            TxKind::Router => {
                let frame = RouterFrame {
                    from_sink: self.is_sink(),
                    sequence: self.adverts.sequence(),
                    source: self.address(),
                    routes: self.routes.advertised_routes(),
                };
                frame.serialize(&mut self.tx_buffer).map(Some)
            }
            TxKind::Nothing | TxKind::Rts | TxKind::Ack => Ok(None),
        }
    }

    /// True if a DATA or RELAY frame is waiting and can be routed.
    pub(super) fn has_payload_pending(&self) -> bool {
        !self.queues.relay.is_empty()
            || (!self.queues.outgoing.is_empty() && self.routes.is_sink_reachable())
    }

    /// Sends the RTS matching what is pending. Returns false if nothing is.
    pub(super) fn send_rts(&mut self) -> bool {
        let me = self.address();
        let encoded = if self.has_payload_pending() {
            match self.routes.next_hop_to_sink() {
                Some(next_hop) => Rts1Frame {
                    next_hop,
                    source: me,
                }
                .serialize(&mut self.tx_buffer),
                None => return false,
            }
        } else if self.advert_pending {
            Rts0Frame { source: me }.serialize(&mut self.tx_buffer)
        } else {
            return false;
        };

        match encoded {
            Ok(len) => {
                self.transmit(TxKind::Rts, len);
                true
            }
            Err(e) => {
                error!("[node {}] Failed to encode RTS: {}", me, e);
                false
            }
        }
    }

    /// Decides what follows a completed exchange or a received frame.
    ///
    /// `got_frame` is true when the frame just received was one this node was
    /// waiting for. A reservation granted with an ACK gets one extra listen
    /// window after the first frame; any other outcome releases it.
    pub(super) fn check_and_send(&mut self, got_frame: bool) {
        if got_frame {
            match self.ack_wait {
                AckWait::Waiting => {
                    self.ack_wait = AckWait::Retrying;
                    self.listen(self.config.timings.wait_for_data_ms);
                    return;
                }
                AckWait::Retrying => self.ack_wait = AckWait::None,
                AckWait::None => {}
            }
        } else if self.ack_wait != AckWait::None {
            debug!("[node {}] Reservation released.", self.address());
            self.ack_wait = AckWait::None;
        }
        self.dispatch_next();
    }

    /// Picks the next job by priority: relay, own data, advertisement, listen.
    pub(super) fn dispatch_next(&mut self) {
        if self.duty == DutyState::Asleep {
            trace!("[node {}] Asleep, dispatch deferred.", self.address());
            return;
        }

        if !self.queues.relay.is_empty() {
            debug!("[node {}] Dispatch: relay.", self.address());
            self.send_pending(TxKind::Relay);
        } else if !self.queues.outgoing.is_empty() && self.routes.is_sink_reachable() {
            debug!("[node {}] Dispatch: data.", self.address());
            self.send_pending(TxKind::Data);
        } else if self.advert_pending {
            debug!("[node {}] Dispatch: router advertisement.", self.address());
            self.send_pending(TxKind::Router);
        } else {
            let status = self.radio.status();
            if status != RadioStatus::Idle {
                warn!(
                    "[node {}] Unexpected radio status {:?} while idle; forcing standby.",
                    self.address(),
                    status
                );
                self.stats.unexpected_status = self.stats.unexpected_status.saturating_add(1);
                self.radio.standby();
                self.rx_continuous = false;
                self.settle();
            }
            if self.duty == DutyState::MidSleep {
                self.enter_sleep();
            } else {
                self.listen(0);
            }
        }
    }
}
