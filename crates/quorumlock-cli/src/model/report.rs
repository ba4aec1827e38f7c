//! JSON output of each command

use std::collections::HashMap;

use quorumlock_core::{LockHandle, LockToken, StoreHealth};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct AcquireReport {
    pub name: String,
    pub key: String,
    pub token: LockToken,
    pub validity_ms: u64,
    pub stores: usize,
    pub quorum: usize,
}

impl AcquireReport {
    pub fn new(handle: &LockHandle, quorum: usize) -> Self {
        Self {
            name: handle.name().to_string(),
            key: handle.key().to_string(),
            token: handle.token().clone(),
            validity_ms: handle.remaining().as_millis() as u64,
            stores: handle.acquired_stores(),
            quorum,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReleaseReport {
    pub name: String,
    pub removed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct HoldReport {
    pub name: String,
    pub token: LockToken,
    pub held_ms: u64,
    pub extensions: u32,
    pub lost: bool,
    pub interrupted: bool,
    pub removed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreValue {
    pub store: String,
    pub token: Option<LockToken>,
}

/// Per-store values and the majority view derived from them.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub name: String,
    pub stores: Vec<StoreValue>,
    pub quorum: usize,
    /// Token carried by at least a quorum of stores, if any
    pub holder: Option<LockToken>,
    /// Stores carrying the most common token
    pub agreeing: usize,
}

impl StatusReport {
    pub fn new(name: &str, values: Vec<(String, Option<LockToken>)>, quorum: usize) -> Self {
        let mut counts: HashMap<&LockToken, usize> = HashMap::new();
        for token in values.iter().filter_map(|(_, token)| token.as_ref()) {
            *counts.entry(token).or_default() += 1;
        }
        let (leader, agreeing) = counts
            .into_iter()
            .max_by_key(|(_, count)| *count)
            .map(|(token, count)| (Some(token.clone()), count))
            .unwrap_or((None, 0));
        let holder = leader.filter(|_| agreeing >= quorum);

        Self {
            name: name.to_string(),
            stores: values
                .into_iter()
                .map(|(store, token)| StoreValue { store, token })
                .collect(),
            quorum,
            holder,
            agreeing,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PingReport {
    pub stores: Vec<StoreHealth>,
    pub healthy: usize,
    pub quorum: usize,
    /// Enough stores answer to acquire locks
    pub available: bool,
}

impl PingReport {
    pub fn new(stores: Vec<StoreHealth>, quorum: usize) -> Self {
        let healthy = stores.iter().filter(|s| s.healthy).count();
        Self {
            stores,
            healthy,
            quorum,
            available: healthy >= quorum,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(store: &str, token: Option<&str>) -> (String, Option<LockToken>) {
        (store.to_string(), token.map(LockToken::from))
    }

    #[test]
    fn test_status_with_majority_holder() {
        let report = StatusReport::new(
            "jobs",
            vec![
                value("a", Some("t1")),
                value("b", Some("t1")),
                value("c", Some("t2")),
            ],
            2,
        );
        assert_eq!(report.holder, Some(LockToken::from("t1")));
        assert_eq!(report.agreeing, 2);
        assert_eq!(report.stores.len(), 3);
    }

    #[test]
    fn test_status_without_majority() {
        let report = StatusReport::new(
            "jobs",
            vec![
                value("a", Some("t1")),
                value("b", None),
                value("c", None),
                value("d", Some("t2")),
                value("e", None),
            ],
            3,
        );
        assert_eq!(report.holder, None);
        assert_eq!(report.agreeing, 1);

        let report = StatusReport::new("jobs", vec![value("a", None)], 1);
        assert_eq!(report.holder, None);
        assert_eq!(report.agreeing, 0);
    }

    #[test]
    fn test_ping_report() {
        let health = |store: &str, healthy: bool| StoreHealth {
            store: store.to_string(),
            healthy,
            error: (!healthy).then(|| "down".to_string()),
        };
        let report = PingReport::new(vec![health("a", true), health("b", false), health("c", true)], 2);
        assert_eq!(report.healthy, 2);
        assert!(report.available);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["stores"][1]["error"], "down");
        assert!(json["stores"][0].get("error").is_none());
    }
}
