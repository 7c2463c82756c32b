use crate::collab::Peer;
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt::Display;

/// Outcome of a single check, serialized as `ok`, `skipped` or the error text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Ok,
    Skipped,
    Error(String),
}

impl CheckOutcome {
    pub fn is_error(&self) -> bool {
        matches!(self, CheckOutcome::Error(_))
    }
}

impl Display for CheckOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckOutcome::Ok => f.write_str("ok"),
            CheckOutcome::Skipped => f.write_str("skipped"),
            CheckOutcome::Error(message) => f.write_str(message),
        }
    }
}

impl Serialize for CheckOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Everything one cycle found out.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub api_server_direct: CheckOutcome,
    pub api_server_dns: CheckOutcome,
    pub me_ingress: CheckOutcome,
    pub me_service: CheckOutcome,
    /// Outcome of the neighbour discovery itself
    pub neighbourhood_state: CheckOutcome,
    /// Eligible neighbours discovered this cycle
    pub neighbourhood: Vec<Peer>,
    /// Outcome per checked neighbour, keyed by its metric label
    pub neighbour_checks: BTreeMap<String, CheckOutcome>,
    pub checked_at: DateTime<Utc>,
}

impl CheckResult {
    pub fn outcomes(&self) -> impl Iterator<Item = &CheckOutcome> {
        [
            &self.api_server_direct,
            &self.api_server_dns,
            &self.me_ingress,
            &self.me_service,
            &self.neighbourhood_state,
        ]
        .into_iter()
        .chain(self.neighbour_checks.values())
    }

    pub fn has_error(&self) -> bool {
        self.outcomes().any(CheckOutcome::is_error)
    }

    /// A result where nothing ran.
    pub fn skipped() -> Self {
        Self {
            api_server_direct: CheckOutcome::Skipped,
            api_server_dns: CheckOutcome::Skipped,
            me_ingress: CheckOutcome::Skipped,
            me_service: CheckOutcome::Skipped,
            neighbourhood_state: CheckOutcome::Skipped,
            neighbourhood: Vec::new(),
            neighbour_checks: BTreeMap::new(),
            checked_at: Utc::now(),
        }
    }
}

#[cfg(test)]
impl CheckResult {
    pub fn example() -> Self {
        Self {
            api_server_direct: CheckOutcome::Ok,
            api_server_dns: CheckOutcome::Ok,
            me_ingress: CheckOutcome::Skipped,
            me_service: CheckOutcome::Ok,
            neighbourhood_state: CheckOutcome::Ok,
            neighbourhood: Vec::new(),
            neighbour_checks: BTreeMap::new(),
            checked_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_has_error() {
        let mut result = CheckResult::example();
        assert!(!result.has_error());

        result
            .neighbour_checks
            .insert("path_node-a".to_string(), CheckOutcome::Ok);
        assert!(!result.has_error());

        result.neighbour_checks.insert(
            "path_node-b".to_string(),
            CheckOutcome::Error("503 Service Unavailable".to_string()),
        );
        assert!(result.has_error());

        let mut result = CheckResult::example();
        result.neighbourhood_state = CheckOutcome::Error("forbidden".to_string());
        assert!(result.has_error());
    }

    #[test]
    fn test_serialization() -> anyhow::Result<()> {
        let mut result = CheckResult::example();
        result.api_server_dns = CheckOutcome::Error("dns lookup failed".to_string());
        result
            .neighbour_checks
            .insert("path_node-a".to_string(), CheckOutcome::Ok);
        result.neighbourhood.push(Peer::example("node-a"));

        let value = serde_json::to_value(&result)?;

        assert_eq!(value["api_server_direct"], json!("ok"));
        assert_eq!(value["api_server_dns"], json!("dns lookup failed"));
        assert_eq!(value["me_ingress"], json!("skipped"));
        assert_eq!(value["neighbourhood_state"], json!("ok"));
        assert_eq!(value["neighbour_checks"]["path_node-a"], json!("ok"));
        assert_eq!(value["neighbourhood"][0]["node_name"], json!("node-a"));
        assert_eq!(value["neighbourhood"][0]["pod_ip"], json!("127.0.0.1"));
        assert_eq!(value["neighbourhood"][0]["phase"], json!("schedulable"));

        Ok(())
    }
}
