// crates/meshlora-rs/src/node/tick.rs

use super::mesh::MeshNode;
use super::state::{DutyState, TxKind};
use crate::hal::{RadioInterface, RandomSource, TimerId, TimerService};
use log::{debug, info, trace};

impl<R: RadioInterface, T: TimerService, G: RandomSource> MeshNode<R, T, G> {
    pub(super) fn handle_timer(&mut self, timer: TimerId) {
        trace!("[node {}] Timer {:?} fired.", self.address(), timer);
        match timer {
            TimerId::Advertisement => self.on_advert_timer(),
            TimerId::SensorData => self.on_sensor_timer(),
            TimerId::Backoff => self.check_and_send(false),
            TimerId::DutyCycle => self.on_duty_timer(),
            TimerId::CadRepeat => {
                if self.duty != DutyState::Asleep {
                    self.radio.start_cad();
                }
            }
        }
    }

    /// (Re)starts the advertisement timer with the current interval.
    pub(super) fn arm_advert_timer(&mut self) {
        self.timers.stop(TimerId::Advertisement);
        self.timers
            .set_value(TimerId::Advertisement, self.adverts.interval_ms());
        self.timers.start(TimerId::Advertisement);
    }

    fn on_advert_timer(&mut self) {
        self.arm_advert_timer();
        if self.advert_pending {
            return;
        }
        self.advert_pending = true;
        if self.rx_continuous && self.duty != DutyState::MidSleep {
            self.send_pending(TxKind::Router);
        }
    }

    fn on_sensor_timer(&mut self) {
        self.timers.start(TimerId::SensorData);
        if self.is_sink() || !self.routes.is_sink_reachable() {
            return;
        }
        let payload = self.config.app_payload;
        // A full queue is counted and logged by queue_data.
        let _ = self.queue_data(payload);
        if self.rx_continuous && self.duty != DutyState::MidSleep && !self.queues.outgoing.is_empty()
        {
            self.send_pending(TxKind::Data);
        }
    }

    fn on_duty_timer(&mut self) {
        match self.duty {
            DutyState::Awake => {
                self.duty = DutyState::MidSleep;
                debug!("[node {}] Awake window over.", self.address());
                if self.rx_continuous {
                    self.enter_sleep();
                }
            }
            DutyState::Asleep => {
                self.duty = DutyState::Awake;
                info!(
                    "[node {}] Awake (t={} ms).",
                    self.address(),
                    self.timers.now_ms()
                );
                self.timers
                    .set_value(TimerId::DutyCycle, self.config.timings.awake_ms);
                self.timers.start(TimerId::DutyCycle);
                self.check_and_send(false);
            }
            DutyState::MidSleep => {
                trace!("[node {}] Duty timer while finishing an exchange.", self.address());
            }
        }
    }

    /// Stops the radio and starts the sleep window.
    pub(super) fn enter_sleep(&mut self) {
        self.stop_listening();
        self.rts_window_open = false;
        self.radio.sleep();
        self.duty = DutyState::Asleep;
        self.timers.stop(TimerId::DutyCycle);
        self.timers
            .set_value(TimerId::DutyCycle, self.config.timings.sleep_ms);
        self.timers.start(TimerId::DutyCycle);
        info!(
            "[node {}] Asleep (t={} ms).",
            self.address(),
            self.timers.now_ms()
        );
    }
}
