// crates/meshlora-rs/src/node/radio.rs

use super::events::RadioEvent;
use super::mesh::MeshNode;
use super::state::{AckWait, DutyState, NodeStatistics, TxKind};
use crate::frame::DataFrame;
use crate::hal::{RadioInterface, RadioStatus, RandomSource, TimerId, TimerService};
use crate::types::{CAD_CLEAR_ROUNDS, MAX_MISSED_DATA};
use log::{debug, error, info, warn};

impl<R: RadioInterface, T: TimerService, G: RandomSource> MeshNode<R, T, G> {
    pub(super) fn handle_radio_event(&mut self, event: RadioEvent) {
        if !matches!(event, RadioEvent::CadDone { .. }) {
            self.park_radio();
        }
        match event {
            RadioEvent::TxDone => self.handle_tx_done(),
            RadioEvent::RxDone(frame) => self.handle_rx_done(frame),
            RadioEvent::TxTimeout => self.handle_tx_timeout(),
            RadioEvent::RxTimeout => self.handle_rx_timeout(),
            RadioEvent::RxError => self.handle_rx_error(),
            RadioEvent::CadDone { activity } => self.handle_cad_done(activity),
        }
    }

    /// Puts the radio to sleep after a completed operation.
    fn park_radio(&mut self) {
        self.stop_listening();
        self.radio.sleep();
    }

    fn sleep_or_dispatch(&mut self) {
        if self.duty == DutyState::MidSleep {
            self.enter_sleep();
        } else {
            self.check_and_send(false);
        }
    }

    fn handle_tx_done(&mut self) {
        match self.last_tx {
            TxKind::Rts => self.open_rts_window(),
            TxKind::Ack => {
                if self.ack_wait == AckWait::Waiting {
                    self.listen(self.config.timings.wait_for_data_ms);
                } else {
                    warn!(
                        "[node {}] ACK sent without a pending reservation.",
                        self.address()
                    );
                    self.check_and_send(false);
                }
            }
            TxKind::Router => {
                self.tx_hop = None;
                self.rx_hop = None;
                self.got_ack = false;
                self.advert_pending = false;
                self.stats.adverts_sent = self.stats.adverts_sent.saturating_add(1);
                if self.adverts.record_sent() {
                    info!(
                        "[node {}] Advertisement interval now {} ms.",
                        self.address(),
                        self.adverts.interval_ms()
                    );
                    if self.advert_timer_started {
                        self.arm_advert_timer();
                    }
                }
                info!(
                    "[node {}] Advertisement sent ({} routes).",
                    self.address(),
                    self.routes.len()
                );
                if !self.advert_timer_started {
                    self.advert_timer_started = true;
                    self.arm_advert_timer();
                }
                self.sleep_or_dispatch();
            }
            TxKind::Data => {
                self.tx_hop = None;
                self.rx_hop = None;
                self.got_ack = false;
                self.queues.outgoing.advance();
                self.stats.data_sent = self.stats.data_sent.saturating_add(1);
                info!(
                    "[node {}] DATA sent ({} still queued).",
                    self.address(),
                    self.queues.outgoing.len()
                );
                self.sleep_or_dispatch();
            }
            TxKind::Relay => {
                self.tx_hop = None;
                self.rx_hop = None;
                self.got_ack = false;
                if let Some(entry) = self.queues.relay.peek().copied() {
                    match DataFrame::peek_source(entry.as_bytes()) {
                        Ok(source) if source == entry.origin => {}
                        Ok(source) => {
                            error!(
                                "[node {}] Relay entry origin {} disagrees with frame source {}.",
                                self.address(),
                                entry.origin,
                                source
                            );
                            self.stats.relay_origin_mismatches =
                                self.stats.relay_origin_mismatches.saturating_add(1);
                        }
                        Err(e) => {
                            error!(
                                "[node {}] Relay entry unreadable: {}",
                                self.address(),
                                e
                            );
                            self.stats.relay_origin_mismatches =
                                self.stats.relay_origin_mismatches.saturating_add(1);
                        }
                    }
                    NodeStatistics::bump(&mut self.stats.relays_sent, entry.origin);
                    info!(
                        "[node {}] Relayed frame from {}.",
                        self.address(),
                        entry.origin
                    );
                }
                self.queues.relay.advance();
                self.sleep_or_dispatch();
            }
            TxKind::Nothing => {
                warn!("[node {}] TX done with nothing in flight.", self.address());
                self.check_and_send(false);
            }
        }
    }

    fn handle_tx_timeout(&mut self) {
        self.stats.tx_timeouts = self.stats.tx_timeouts.saturating_add(1);
        self.rts_window_open = false;
        warn!(
            "[node {}] Transmit timeout on {:?}.",
            self.address(),
            self.last_tx
        );
        if self.duty == DutyState::MidSleep {
            self.enter_sleep();
            return;
        }
        self.got_ack = false;
        self.tx_hop = None;
        let delay = self.random_backoff();
        self.start_backoff(delay);
    }

    fn handle_rx_timeout(&mut self) {
        if self.hold_reservation() {
            debug!(
                "[node {}] Nothing on the reserved channel yet, listening again ({}/{}).",
                self.address(),
                self.missed_data,
                MAX_MISSED_DATA
            );
            return;
        }
        self.rx_hop = None;
        if self.duty == DutyState::MidSleep {
            self.enter_sleep();
            return;
        }
        if self.rts_window_open {
            debug!("[node {}] No ACK within the RTS window, resending.", self.address());
            if !self.send_rts() {
                self.check_and_send(false);
            }
        } else {
            self.check_and_send(false);
        }
    }

    /// Forces standby if the radio is not idle after a failed operation.
    fn recover_radio(&mut self) {
        let status = self.radio.status();
        if status != RadioStatus::Idle {
            warn!(
                "[node {}] Unexpected radio status {:?} after RX error.",
                self.address(),
                status
            );
            self.stats.unexpected_status = self.stats.unexpected_status.saturating_add(1);
            self.radio.standby();
            self.settle();
        }
    }

    fn handle_rx_error(&mut self) {
        self.stats.rx_errors = self.stats.rx_errors.saturating_add(1);
        if self.ack_wait == AckWait::Waiting {
            self.recover_radio();
            if !self.hold_reservation() {
                self.sleep_or_dispatch();
            }
            return;
        }

        self.rx_hop = None;
        if self.duty == DutyState::MidSleep {
            self.enter_sleep();
            return;
        }

        self.recover_radio();
        debug!("[node {}] RX error, listening again.", self.address());
        if self.rts_window_open {
            self.open_rts_window();
        } else if self.ack_wait == AckWait::Retrying {
            self.listen(self.config.timings.wait_for_data_ms);
        } else {
            self.listen(0);
        }
    }

    fn handle_cad_done(&mut self, activity: bool) {
        if self.duty == DutyState::MidSleep {
            self.cad_clear = 0;
            self.enter_sleep();
            return;
        }
        if activity {
            self.cad_clear = 0;
            let t = &self.config.timings;
            let delay = self.rng.random_range(t.backoff_min_ms, t.cad_backoff_max_ms);
            debug!(
                "[node {}] Channel busy, listening {} ms.",
                self.address(),
                delay
            );
            self.listen(delay);
            return;
        }

        self.cad_clear += 1;
        if self.cad_clear >= CAD_CLEAR_ROUNDS {
            self.cad_clear = 0;
            if !self.send_rts() {
                debug!("[node {}] Channel clear but nothing to send.", self.address());
                self.dispatch_next();
            }
        } else {
            self.timers
                .set_value(TimerId::CadRepeat, self.config.timings.cad_repeat_ms);
            self.timers.start(TimerId::CadRepeat);
        }
    }
}
