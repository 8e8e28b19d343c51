//! Key to partition routing
//!
//! Every operation on an entity is hashed to one queue, and each consumer
//! owns a contiguous run of queues. Routing is what serializes operations on
//! a single entity, so the hash must be stable across processes and builds.

use xxhash_rust::xxh64::xxh64;

use crate::types::{Error, Result};

/// Seed for the routing hash. Changing it reshuffles every entity.
pub const ROUTING_HASH_SEED: u64 = 0;

/// Map `key` to a queue index in `[0, total_queues)`.
pub fn route_to_queue(key: &str, total_queues: u32) -> Result<u32> {
    if total_queues == 0 {
        return Err(Error::invariant("total_queues must be greater than zero"));
    }
    let hash = xxh64(key.as_bytes(), ROUTING_HASH_SEED);
    Ok((hash % u64::from(total_queues)) as u32)
}

/// Map `key` to the consumer that owns its queue.
///
/// `total_queues` must be a multiple of `queues_per_consumer`; otherwise the
/// last consumer would own a partial run and the topology is rejected.
pub fn route_to_consumer(key: &str, total_queues: u32, queues_per_consumer: u32) -> Result<u32> {
    check_topology(total_queues, queues_per_consumer)?;
    Ok(route_to_queue(key, total_queues)? / queues_per_consumer)
}

/// Validate a queue/consumer topology
pub fn check_topology(total_queues: u32, queues_per_consumer: u32) -> Result<()> {
    if total_queues == 0 {
        return Err(Error::invariant("total_queues must be greater than zero"));
    }
    if queues_per_consumer == 0 {
        return Err(Error::invariant("queues_per_consumer must be greater than zero"));
    }
    if total_queues % queues_per_consumer != 0 {
        return Err(Error::invariant(format!(
            "total_queues ({total_queues}) is not a multiple of queues_per_consumer ({queues_per_consumer})"
        )));
    }
    Ok(())
}

/// A validated routing topology
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Topology {
    total_queues: u32,
    queues_per_consumer: u32,
}

/// Where one key lands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    /// Queue index in `[0, total_queues)`
    pub queue: u32,
    /// Owning consumer in `[0, consumers)`
    pub consumer: u32,
    /// Queue index local to the consumer
    pub local_queue: u32,
}

impl Topology {
    /// Build a topology, rejecting invalid shapes
    pub fn new(total_queues: u32, queues_per_consumer: u32) -> Result<Self> {
        check_topology(total_queues, queues_per_consumer)?;
        Ok(Self { total_queues, queues_per_consumer })
    }

    /// Total number of queues
    pub fn total_queues(&self) -> u32 {
        self.total_queues
    }

    /// Queues owned by each consumer
    pub fn queues_per_consumer(&self) -> u32 {
        self.queues_per_consumer
    }

    /// Number of consumers
    pub fn consumers(&self) -> u32 {
        self.total_queues / self.queues_per_consumer
    }

    /// Route a key
    pub fn route(&self, key: &str) -> Route {
        let queue = (xxh64(key.as_bytes(), ROUTING_HASH_SEED) % u64::from(self.total_queues)) as u32;
        Route {
            queue,
            consumer: queue / self.queues_per_consumer,
            local_queue: queue % self.queues_per_consumer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn route_to_queue_is_deterministic() {
        let a = route_to_queue("user:1234", 16).unwrap();
        let b = route_to_queue("user:1234", 16).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn route_to_queue_stays_in_bounds() {
        for key in ["", "a", "abc", "a much longer key than the others", "ünïcödé"] {
            assert!(route_to_queue(key, 16).unwrap() < 16);
        }
    }

    #[test]
    fn route_to_queue_spreads_keys() {
        let used: HashSet<u32> = (0..100)
            .map(|i| route_to_queue(&format!("key_{i}"), 16).unwrap())
            .collect();
        assert!(used.len() > 1);
    }

    #[test]
    fn route_to_queue_matches_xxh64() {
        // Pinned so a hash crate upgrade cannot silently reshuffle entities.
        assert_eq!(xxh64(b"", 0), 0xEF46DB3751D8E999);
        assert_eq!(route_to_queue("", 16).unwrap(), (0xEF46DB3751D8E999u64 % 16) as u32);
    }

    #[test]
    fn route_to_consumer_matches_topology() {
        let queue = route_to_queue("user:1234", 16).unwrap();
        assert_eq!(route_to_consumer("user:1234", 16, 4).unwrap(), queue / 4);
        assert!(route_to_consumer("k", 16, 4).unwrap() < 4);
    }

    #[test]
    fn single_consumer_owns_everything() {
        assert_eq!(route_to_consumer("k1", 8, 8).unwrap(), 0);
        assert_eq!(route_to_consumer("k2", 8, 8).unwrap(), 0);
    }

    #[test]
    fn one_queue_per_consumer() {
        let queue = route_to_queue("user:42", 8).unwrap();
        assert_eq!(route_to_consumer("user:42", 8, 1).unwrap(), queue);
    }

    #[test]
    fn invalid_topologies_are_rejected() {
        assert!(matches!(route_to_queue("k", 0), Err(Error::Invariant(_))));
        assert!(matches!(route_to_consumer("k", 16, 0), Err(Error::Invariant(_))));
        assert!(matches!(route_to_consumer("k", 10, 4), Err(Error::Invariant(_))));
        assert!(Topology::new(10, 4).is_err());
    }

    #[test]
    fn topology_route_agrees_with_free_functions() {
        let topo = Topology::new(16, 4).unwrap();
        assert_eq!(topo.consumers(), 4);
        let route = topo.route("entity-7");
        assert_eq!(route.queue, route_to_queue("entity-7", 16).unwrap());
        assert_eq!(route.consumer, route_to_consumer("entity-7", 16, 4).unwrap());
        assert_eq!(route.consumer * 4 + route.local_queue, route.queue);
    }

    proptest! {
        #[test]
        fn queue_in_range(key in ".*", q in 1u32..1024) {
            prop_assert!(route_to_queue(&key, q).unwrap() < q);
        }

        #[test]
        fn consumer_is_queue_divided(key in ".*", consumers in 1u32..64, per in 1u32..16) {
            let total = consumers * per;
            let queue = route_to_queue(&key, total).unwrap();
            prop_assert_eq!(route_to_consumer(&key, total, per).unwrap(), queue / per);
            prop_assert!(route_to_consumer(&key, total, per).unwrap() < consumers);
        }
    }
}
