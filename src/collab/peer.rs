use crate::collab::ring::{NodeDigest, node_digest};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use strum::{Display, EnumString};

/// Whether the node a peer runs on accepts new workloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NodePhase {
    Schedulable,
    Unschedulable,
    Unknown,
}

/// Another agent discovered in the cluster, identified by its node's name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    pub node_name: String,
    pub node_hash: NodeDigest,
    pub pod_name: String,
    pub pod_ip: IpAddr,
    pub host_ip: Option<IpAddr>,
    pub phase: NodePhase,
}

impl Peer {
    pub fn new(
        node_name: String,
        pod_name: String,
        pod_ip: IpAddr,
        host_ip: Option<IpAddr>,
        phase: NodePhase,
    ) -> Self {
        Self {
            node_hash: node_digest(&node_name),
            node_name,
            pod_name,
            pod_ip,
            host_ip,
            phase,
        }
    }

    /// Metrics are attributed per physical host, not per agent instance.
    pub fn metric_label(&self) -> String {
        format!("path_{}", self.node_name)
    }

    pub fn probe_url(&self, port: u16) -> String {
        format!("http://{}/alwayshappy", SocketAddr::new(self.pod_ip, port))
    }

    #[cfg(test)]
    pub fn example(node_name: &str) -> Self {
        Self::new(
            node_name.to_string(),
            format!("netnurse-{node_name}"),
            IpAddr::from([127, 0, 0, 1]),
            None,
            NodePhase::Schedulable,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;

    #[test]
    fn test_probe_url() {
        let mut peer = Peer::example("node-a");
        assert_eq!(peer.probe_url(8080), "http://127.0.0.1:8080/alwayshappy");

        peer.pod_ip = IpAddr::V6(Ipv6Addr::LOCALHOST);
        assert_eq!(peer.probe_url(8080), "http://[::1]:8080/alwayshappy");
    }

    #[test]
    fn test_metric_label_uses_node_name() {
        let peer = Peer::example("worker-3.domain.tld");
        assert_eq!(peer.metric_label(), "path_worker-3.domain.tld");
    }

    #[test]
    fn test_node_phase_serialization() {
        assert_eq!(NodePhase::Unschedulable.to_string(), "unschedulable");
        assert_eq!(
            serde_json::to_string(&NodePhase::Schedulable).unwrap(),
            "\"schedulable\""
        );
        assert_eq!("unknown".parse::<NodePhase>().unwrap(), NodePhase::Unknown);
    }
}
