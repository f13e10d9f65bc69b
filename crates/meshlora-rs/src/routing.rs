//! Distance-vector routing table.
//!
//! Only routes toward the sink are ever learned. The table is keyed by
//! destination; the sink holds a zero-cost entry for itself and a fixed relay
//! holds a hard-wired entry that advertisements never touch.

use crate::frame::AdvertisedRoute;
use crate::hal::MeshError;
use crate::types::Address;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;

/// A learned route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteEntry {
    pub next_hop: Address,
    pub cost: u8,
    /// RSSI of the advertisement the route was learned from, used as tie-break.
    pub rssi: i16,
}

/// Outcome of offering an advertised route to the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteUpdate {
    /// Nothing changed.
    Ignored,
    /// A destination was learned for the first time.
    Inserted,
    /// An existing entry was replaced by a cheaper (or equally cheap, stronger) path.
    Improved,
}

impl RouteUpdate {
    pub fn changed(self) -> bool {
        !matches!(self, RouteUpdate::Ignored)
    }
}

#[derive(Debug, Clone)]
pub struct RoutingTable {
    own: Address,
    sink: Address,
    capacity: usize,
    fixed_relay: Option<Address>,
    entries: BTreeMap<Address, RouteEntry>,
}

impl RoutingTable {
    /// Creates a table for a node that discovers its route by advertisements.
    /// The sink starts with its own zero-cost entry.
    pub fn new(own: Address, sink: Address, capacity: usize) -> Self {
        let mut entries = BTreeMap::new();
        if own == sink {
            entries.insert(
                own,
                RouteEntry {
                    next_hop: own,
                    cost: 0,
                    rssi: 0,
                },
            );
        }
        Self {
            own,
            sink,
            capacity,
            fixed_relay: None,
            entries,
        }
    }

    /// Creates a table whose sink route is hard-wired through `relay`.
    pub fn with_fixed_relay(own: Address, sink: Address, relay: Address, capacity: usize) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(
            sink,
            RouteEntry {
                next_hop: relay,
                cost: 0,
                rssi: 0,
            },
        );
        Self {
            own,
            sink,
            capacity,
            fixed_relay: Some(relay),
            entries,
        }
    }

    /// Offers the route `source` advertised for `destination` at `advertised_cost`.
    ///
    /// The entry is replaced only by a strictly lower cost, or an equal cost
    /// received with a strictly better RSSI. Fixed-relay tables never change.
    pub fn update(
        &mut self,
        source: Address,
        destination: Address,
        advertised_cost: u8,
        rssi: i16,
    ) -> Result<RouteUpdate, MeshError> {
        if self.fixed_relay.is_some() || destination == self.own || destination != self.sink {
            return Ok(RouteUpdate::Ignored);
        }

        let cost = advertised_cost.saturating_add(1);
        let offered = RouteEntry {
            next_hop: source,
            cost,
            rssi,
        };

        match self.entries.get_mut(&destination) {
            Some(entry) => {
                let better = cost < entry.cost || (cost == entry.cost && rssi > entry.rssi);
                if better {
                    *entry = offered;
                    Ok(RouteUpdate::Improved)
                } else {
                    Ok(RouteUpdate::Ignored)
                }
            }
            None => {
                if self.entries.len() >= self.capacity {
                    return Err(MeshError::RoutingTableFull);
                }
                self.entries.insert(destination, offered);
                Ok(RouteUpdate::Inserted)
            }
        }
    }

    pub fn get(&self, destination: Address) -> Option<&RouteEntry> {
        self.entries.get(&destination)
    }

    pub fn is_sink_reachable(&self) -> bool {
        self.entries.contains_key(&self.sink)
    }

    pub fn next_hop_to_sink(&self) -> Option<Address> {
        self.entries.get(&self.sink).map(|e| e.next_hop)
    }

    pub fn sink_route(&self) -> Option<&RouteEntry> {
        self.entries.get(&self.sink)
    }

    pub fn fixed_relay(&self) -> Option<Address> {
        self.fixed_relay
    }

    /// All known destinations with their costs, in address order, as they go into a ROUTER frame.
    pub fn advertised_routes(&self) -> Vec<AdvertisedRoute> {
        self.entries
            .iter()
            .map(|(&destination, entry)| AdvertisedRoute {
                destination,
                cost: entry.cost,
            })
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Address, &RouteEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
