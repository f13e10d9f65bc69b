// crates/meshlora-rs-sim/src/air.rs

//! The shared radio medium.
//!
//! `VirtualAir` knows which nodes can hear each other and which frames are
//! currently on the air. It does not know about radio modes; whether a
//! receiver actually picks up a frame is decided by its `SimRadio`.

use log::trace;
use std::collections::BTreeMap;

/// Noise floor used to derive a link SNR from its RSSI.
pub const NOISE_FLOOR_DBM: i16 = -120;

/// Quality of a one-way link between two nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
    pub rssi: i16,
    pub snr: i8,
}

impl Link {
    pub fn new(rssi: i16) -> Self {
        let snr = (rssi - NOISE_FLOOR_DBM).clamp(-20, 20) as i8;
        Self { rssi, snr }
    }
}

/// A frame on the air.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transmission {
    pub id: u64,
    /// Index of the sending node.
    pub sender: usize,
    pub channel_hz: u32,
    pub bytes: Vec<u8>,
    pub start_ms: u64,
    pub end_ms: u64,
}

#[derive(Debug, Default)]
pub struct VirtualAir {
    links: BTreeMap<(usize, usize), Link>,
    in_flight: Vec<Transmission>,
    next_id: u64,
    delivered: u64,
}

impl VirtualAir {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connects `a` and `b` in both directions.
    pub fn connect(&mut self, a: usize, b: usize, rssi: i16) {
        let link = Link::new(rssi);
        self.links.insert((a, b), link);
        self.links.insert((b, a), link);
    }

    pub fn disconnect(&mut self, a: usize, b: usize) {
        self.links.remove(&(a, b));
        self.links.remove(&(b, a));
    }

    /// Link from `sender` as heard by `receiver`.
    pub fn link(&self, sender: usize, receiver: usize) -> Option<Link> {
        self.links.get(&(sender, receiver)).copied()
    }

    pub fn neighbours(&self, node: usize) -> impl Iterator<Item = usize> + '_ {
        self.links
            .keys()
            .filter(move |(from, _)| *from == node)
            .map(|&(_, to)| to)
    }

    /// Puts a frame on the air and returns its id.
    pub fn begin(
        &mut self,
        sender: usize,
        channel_hz: u32,
        bytes: Vec<u8>,
        start_ms: u64,
        end_ms: u64,
    ) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        trace!(
            "[air] #{} from node {} on {} Hz, {}..{} ms, {} bytes",
            id,
            sender,
            channel_hz,
            start_ms,
            end_ms,
            bytes.len()
        );
        self.in_flight.push(Transmission {
            id,
            sender,
            channel_hz,
            bytes,
            start_ms,
            end_ms,
        });
        id
    }

    /// Removes and returns every frame whose airtime is over at `now_ms`.
    pub fn finish(&mut self, now_ms: u64) -> Vec<Transmission> {
        let mut done = Vec::new();
        self.in_flight.retain(|tx| {
            if tx.end_ms <= now_ms {
                done.push(tx.clone());
                false
            } else {
                true
            }
        });
        self.delivered += done.len() as u64;
        done
    }

    /// RSSI of the strongest other frame `receiver` hears on `channel_hz`,
    /// ignoring `except`.
    pub fn strongest_interferer(
        &self,
        receiver: usize,
        channel_hz: u32,
        except: Option<u64>,
    ) -> Option<i16> {
        self.in_flight
            .iter()
            .filter(|tx| Some(tx.id) != except && tx.channel_hz == channel_hz)
            .filter(|tx| tx.sender != receiver)
            .filter_map(|tx| self.link(tx.sender, receiver))
            .map(|link| link.rssi)
            .max()
    }

    /// True if `receiver` hears any frame on `channel_hz` other than `except`.
    pub fn is_busy(&self, receiver: usize, channel_hz: u32, except: Option<u64>) -> bool {
        self.strongest_interferer(receiver, channel_hz, except)
            .is_some()
    }

    pub fn in_flight(&self) -> &[Transmission] {
        &self.in_flight
    }

    /// Number of frames that have completed their airtime.
    pub fn completed(&self) -> u64 {
        self.delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_links_are_symmetric() {
        let mut air = VirtualAir::new();
        air.connect(0, 1, -70);
        assert_eq!(air.link(0, 1), air.link(1, 0));
        assert_eq!(air.link(0, 2), None);
        assert_eq!(air.neighbours(0).collect::<Vec<_>>(), vec![1]);

        air.disconnect(1, 0);
        assert_eq!(air.link(0, 1), None);
    }

    #[test]
    fn test_snr_is_clamped() {
        assert_eq!(Link::new(-60).snr, 20);
        assert_eq!(Link::new(-130).snr, -10);
        assert_eq!(Link::new(-150).snr, -20);
    }

    #[test]
    fn test_finish_only_returns_expired_frames() {
        let mut air = VirtualAir::new();
        let first = air.begin(0, 100, vec![1], 0, 10);
        air.begin(1, 100, vec![2], 5, 20);

        let done = air.finish(10);
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].id, first);
        assert_eq!(air.in_flight().len(), 1);
        assert_eq!(air.completed(), 1);
    }

    #[test]
    fn test_busy_requires_link_and_channel() {
        let mut air = VirtualAir::new();
        air.connect(0, 1, -80);
        let id = air.begin(0, 100, vec![1], 0, 10);

        assert!(air.is_busy(1, 100, None));
        assert!(!air.is_busy(1, 200, None));
        assert!(!air.is_busy(2, 100, None));
        assert!(!air.is_busy(0, 100, None));
        assert!(!air.is_busy(1, 100, Some(id)));
    }

    #[test]
    fn test_strongest_interferer_picks_loudest_link() {
        let mut air = VirtualAir::new();
        air.connect(0, 2, -90);
        air.connect(1, 2, -65);
        air.begin(0, 100, vec![1], 0, 10);
        let loud = air.begin(1, 100, vec![2], 0, 10);

        assert_eq!(air.strongest_interferer(2, 100, None), Some(-65));
        assert_eq!(air.strongest_interferer(2, 100, Some(loud)), Some(-90));
    }
}
