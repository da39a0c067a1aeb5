//! Pairing pool and port bookkeeping
//!
//! A port path lives in exactly one place at a time: the free pool, an explicit
//! mapping, or an automatic assignment. Explicit mappings come from
//! configuration and are never handed back to the pool; automatic ones return
//! to the tail of the pool when their controller goes away.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use tracing::{debug, info, warn};

use super::PortInfo;

/// Pairing behaviour, fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortPolicy {
    /// Hand out pool ports to controllers without an explicit mapping.
    pub auto_pairing: bool,
    /// Refresh the pool from port discovery.
    pub auto_discovery: bool,
}

impl PortPolicy {
    /// Auto pairing only without explicit mappings; discovery only when
    /// auto pairing and no fixed port list was given.
    pub fn derive(has_explicit_mappings: bool, has_port_list: bool) -> Self {
        let auto_pairing = !has_explicit_mappings;
        Self {
            auto_pairing,
            auto_discovery: auto_pairing && !has_port_list,
        }
    }
}

/// Where a port path currently sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortState {
    Unknown,
    Available,
    Reserved { index: usize, explicit: bool },
}

/// Result of one discovery pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RescanOutcome {
    pub removed: Vec<String>,
    pub added: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PortRegistry {
    policy: PortPolicy,
    pool: VecDeque<String>,
    explicit: HashMap<usize, String>,
    automatic: HashMap<usize, String>,
    exhausted_reported: HashSet<usize>,
}

impl PortRegistry {
    pub fn new(
        policy: PortPolicy,
        explicit: HashMap<usize, String>,
        seed: impl IntoIterator<Item = String>,
    ) -> Self {
        let mapped: HashSet<&String> = explicit.values().collect();
        let mut pool = VecDeque::new();
        for path in seed {
            if mapped.contains(&path) || pool.contains(&path) {
                continue;
            }
            pool.push_back(path);
        }
        Self {
            policy,
            pool,
            explicit,
            automatic: HashMap::new(),
            exhausted_reported: HashSet::new(),
        }
    }

    pub fn policy(&self) -> PortPolicy {
        self.policy
    }

    /// Free ports, head first.
    pub fn available(&self) -> impl Iterator<Item = &str> {
        self.pool.iter().map(String::as_str)
    }

    pub fn has_explicit(&self, index: usize) -> bool {
        self.explicit.contains_key(&index)
    }

    /// Port for a controller index: its explicit mapping, a port it already
    /// holds, or the head of the pool when auto pairing is on.
    pub fn assign(&mut self, index: usize) -> Option<String> {
        if let Some(path) = self.explicit.get(&index) {
            return Some(path.clone());
        }
        if let Some(path) = self.automatic.get(&index) {
            return Some(path.clone());
        }
        if !self.policy.auto_pairing {
            return None;
        }
        match self.pool.pop_front() {
            Some(path) => {
                info!("Auto-paired controller {} to {}", index, path);
                self.automatic.insert(index, path.clone());
                self.exhausted_reported.remove(&index);
                Some(path)
            }
            None => {
                if self.exhausted_reported.insert(index) {
                    warn!("No free serial port for controller {}; waiting", index);
                }
                None
            }
        }
    }

    /// Give an automatically assigned port back to the end of the pool.
    pub fn release(&mut self, index: usize) -> Option<String> {
        self.exhausted_reported.remove(&index);
        let path = self.automatic.remove(&index)?;
        if !self.pool.contains(&path) {
            info!("Released {} back to the pool", path);
            self.pool.push_back(path.clone());
        }
        Some(path)
    }

    pub fn state(&self, path: &str) -> PortState {
        if let Some((&index, _)) = self.explicit.iter().find(|(_, p)| p.as_str() == path) {
            return PortState::Reserved {
                index,
                explicit: true,
            };
        }
        if let Some((&index, _)) = self.automatic.iter().find(|(_, p)| p.as_str() == path) {
            return PortState::Reserved {
                index,
                explicit: false,
            };
        }
        if self.pool.iter().any(|p| p == path) {
            return PortState::Available;
        }
        PortState::Unknown
    }

    /// Reconcile with a fresh discovery result.
    ///
    /// `bound` holds the ports sessions currently point at. Known paths missing
    /// from `discovered` are evicted from the pool and from every mapping, and
    /// returned so the caller can tear down bound sessions. Newly seen paths
    /// that nothing uses are appended to the pool.
    pub fn rescan(&mut self, discovered: &[PortInfo], bound: &HashSet<String>) -> RescanOutcome {
        let present: HashSet<&str> = discovered.iter().map(|p| p.path.as_str()).collect();

        let known: BTreeSet<String> = self
            .pool
            .iter()
            .chain(self.explicit.values())
            .chain(self.automatic.values())
            .chain(bound.iter())
            .cloned()
            .collect();

        let mut outcome = RescanOutcome::default();
        for path in known {
            if present.contains(path.as_str()) {
                continue;
            }
            self.evict(&path);
            outcome.removed.push(path);
        }

        for port in discovered {
            let in_use = bound.contains(&port.path)
                || self.explicit.values().any(|p| *p == port.path)
                || self.automatic.values().any(|p| *p == port.path);
            if in_use || self.pool.contains(&port.path) {
                continue;
            }
            info!(
                "Discovered {} ({}); available for pairing",
                port.path, port.description
            );
            self.pool.push_back(port.path.clone());
            outcome.added.push(port.path.clone());
        }

        outcome
    }

    fn evict(&mut self, path: &str) {
        if let Some(pos) = self.pool.iter().position(|p| p == path) {
            self.pool.remove(pos);
            warn!("{} removed; dropping it from the pool", path);
        }
        self.explicit.retain(|_, p| p != path);
        self.automatic.retain(|_, p| p != path);
        debug!("Evicted {} from every mapping", path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(path: &str) -> PortInfo {
        PortInfo {
            path: path.to_string(),
            description: "USB Serial".to_string(),
            has_usb_ids: true,
            manufacturer: None,
        }
    }

    fn auto_registry(ports: &[&str]) -> PortRegistry {
        PortRegistry::new(
            PortPolicy::derive(false, false),
            HashMap::new(),
            ports.iter().map(|p| p.to_string()),
        )
    }

    fn pool(registry: &PortRegistry) -> Vec<&str> {
        registry.available().collect()
    }

    #[test]
    fn policy_derivation() {
        assert_eq!(
            PortPolicy::derive(false, false),
            PortPolicy {
                auto_pairing: true,
                auto_discovery: true
            }
        );
        assert_eq!(
            PortPolicy::derive(false, true),
            PortPolicy {
                auto_pairing: true,
                auto_discovery: false
            }
        );
        assert_eq!(
            PortPolicy::derive(true, false),
            PortPolicy {
                auto_pairing: false,
                auto_discovery: false
            }
        );
    }

    #[test]
    fn fifo_assignment_and_tail_release() {
        let mut registry = auto_registry(&["/dev/ttyUSB0", "/dev/ttyUSB1", "/dev/ttyUSB2"]);

        assert_eq!(registry.assign(0).as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(registry.assign(1).as_deref(), Some("/dev/ttyUSB1"));
        assert_eq!(pool(&registry), vec!["/dev/ttyUSB2"]);

        // Asking again returns the same port instead of a new one
        assert_eq!(registry.assign(0).as_deref(), Some("/dev/ttyUSB0"));

        assert_eq!(registry.release(0).as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(pool(&registry), vec!["/dev/ttyUSB2", "/dev/ttyUSB0"]);
        assert_eq!(registry.assign(5).as_deref(), Some("/dev/ttyUSB2"));
    }

    #[test]
    fn exhausted_pool() {
        let mut registry = auto_registry(&["/dev/ttyUSB0"]);
        assert!(registry.assign(0).is_some());
        assert_eq!(registry.assign(1), None);
        assert_eq!(registry.assign(1), None);
        registry.release(0);
        assert_eq!(registry.assign(1).as_deref(), Some("/dev/ttyUSB0"));
    }

    #[test]
    fn explicit_mapping_wins_and_is_never_released() {
        let explicit = HashMap::from([(0, "/dev/ttyACM0".to_string())]);
        let mut registry = PortRegistry::new(
            PortPolicy::derive(true, false),
            explicit,
            vec!["/dev/ttyACM0".to_string(), "/dev/ttyACM1".to_string()],
        );

        // The mapped path never enters the pool
        assert_eq!(pool(&registry), vec!["/dev/ttyACM1"]);
        assert_eq!(registry.assign(0).as_deref(), Some("/dev/ttyACM0"));
        // No auto pairing while explicit mappings exist
        assert_eq!(registry.assign(1), None);

        assert_eq!(registry.release(0), None);
        assert_eq!(pool(&registry), vec!["/dev/ttyACM1"]);
        assert_eq!(
            registry.state("/dev/ttyACM0"),
            PortState::Reserved {
                index: 0,
                explicit: true
            }
        );
    }

    #[test]
    fn rescan_removes_missing_and_appends_new() {
        let mut registry = auto_registry(&["/dev/ttyUSB0", "/dev/ttyUSB1"]);
        assert_eq!(registry.assign(0).as_deref(), Some("/dev/ttyUSB0"));
        let bound = HashSet::from(["/dev/ttyUSB0".to_string()]);

        let outcome = registry.rescan(&[info("/dev/ttyUSB1"), info("/dev/ttyUSB2")], &bound);
        assert_eq!(outcome.removed, vec!["/dev/ttyUSB0".to_string()]);
        assert_eq!(outcome.added, vec!["/dev/ttyUSB2".to_string()]);
        assert_eq!(pool(&registry), vec!["/dev/ttyUSB1", "/dev/ttyUSB2"]);
        assert_eq!(registry.state("/dev/ttyUSB0"), PortState::Unknown);

        // The controller no longer holds a port and pairs again from the pool
        assert_eq!(registry.assign(0).as_deref(), Some("/dev/ttyUSB1"));
    }

    #[test]
    fn rediscovered_port_rejoins_the_pool() {
        let mut registry = auto_registry(&["/dev/ttyUSB0"]);
        let outcome = registry.rescan(&[], &HashSet::new());
        assert_eq!(outcome.removed, vec!["/dev/ttyUSB0".to_string()]);
        assert!(pool(&registry).is_empty());

        let outcome = registry.rescan(&[info("/dev/ttyUSB0")], &HashSet::new());
        assert_eq!(outcome.added, vec!["/dev/ttyUSB0".to_string()]);
        assert_eq!(registry.state("/dev/ttyUSB0"), PortState::Available);
    }

    #[test]
    fn rescan_never_duplicates_bound_paths() {
        let mut registry = auto_registry(&[]);
        let bound = HashSet::from(["/dev/ttyUSB3".to_string()]);
        let outcome = registry.rescan(&[info("/dev/ttyUSB3")], &bound);
        assert!(outcome.added.is_empty());
        assert!(outcome.removed.is_empty());
        assert!(pool(&registry).is_empty());
    }

    #[test]
    fn seed_is_deduplicated() {
        let registry = auto_registry(&["/dev/ttyUSB0", "/dev/ttyUSB0", "/dev/ttyUSB1"]);
        assert_eq!(pool(&registry), vec!["/dev/ttyUSB0", "/dev/ttyUSB1"]);
    }
}
