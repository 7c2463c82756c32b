use crate::collab::peer::{NodePhase, Peer};
use crate::config::DiscoveryConfig;
use anyhow::{Context, Result};
use futures::{StreamExt, stream};
use itertools::Itertools;
use log::{debug, warn};
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::net::IpAddr;
use url::Url;

const NODE_LOOKUP_CONCURRENCY: usize = 8;

pub trait PeerProvider {
    /// Lists the agents matching `label_selector` in `namespace`, one per node.
    fn list(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> impl Future<Output = Result<Vec<Peer>>> + Send;
}

#[derive(Debug, Deserialize)]
struct PodList {
    items: Vec<Pod>,
}

#[derive(Debug, Deserialize)]
struct Pod {
    metadata: ObjectMeta,
    #[serde(default)]
    spec: Option<PodSpec>,
    #[serde(default)]
    status: Option<PodStatus>,
}

#[derive(Debug, Deserialize)]
struct ObjectMeta {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PodSpec {
    node_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PodStatus {
    #[serde(rename = "podIP")]
    pod_ip: Option<String>,
    #[serde(rename = "hostIP")]
    host_ip: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Node {
    #[serde(default)]
    spec: Option<NodeSpec>,
}

#[derive(Debug, Deserialize)]
struct NodeSpec {
    #[serde(default)]
    unschedulable: bool,
}

struct PodAddress {
    pod_name: String,
    node_name: String,
    pod_ip: IpAddr,
    host_ip: Option<IpAddr>,
}

impl Pod {
    fn into_address(self) -> Option<PodAddress> {
        let node_name = self.spec?.node_name?;
        let status = self.status?;
        let pod_ip = status.pod_ip?.parse().ok()?;
        let host_ip = status.host_ip.and_then(|ip| ip.parse().ok());

        Some(PodAddress {
            pod_name: self.metadata.name,
            node_name,
            pod_ip,
            host_ip,
        })
    }
}

/// Discovers peers through the Kubernetes API server.
pub struct KubernetesPeerProvider {
    client: Client,
    api_url: Url,
    token: Option<String>,
}

impl KubernetesPeerProvider {
    pub fn new(client: Client, api_url: Url, token: Option<String>) -> Self {
        Self {
            client,
            api_url,
            token,
        }
    }

    /// Authenticates with the pod's service account token.
    pub fn in_cluster(discovery: &DiscoveryConfig, client: Client) -> Result<Self> {
        let api_url: Url = discovery
            .api_server_url
            .parse()
            .with_context(|| format!("invalid api server url {}", discovery.api_server_url))?;

        let token_path = discovery.service_account_dir.join("token");
        let token = match std::fs::read_to_string(&token_path) {
            Ok(token) => Some(token.trim().to_string()),
            Err(e) => {
                warn!(
                    "cannot read service account token {}: {e}",
                    token_path.display()
                );
                None
            }
        };

        Ok(Self::new(client, api_url, token))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let mut request = self.client.get(url);

        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?.error_for_status()?;

        Ok(response.json().await?)
    }

    async fn node_phase(&self, node_name: &str) -> NodePhase {
        let node = match self.api_url.join(&format!("api/v1/nodes/{node_name}")) {
            Ok(url) => self.get_json::<Node>(url).await,
            Err(e) => Err(e.into()),
        };

        match node {
            Ok(node) if node.spec.as_ref().is_some_and(|spec| spec.unschedulable) => {
                NodePhase::Unschedulable
            }
            Ok(_) => NodePhase::Schedulable,
            Err(e) => {
                warn!("cannot look up node {node_name}: {e:#}");
                NodePhase::Unknown
            }
        }
    }
}

impl PeerProvider for KubernetesPeerProvider {
    async fn list(&self, namespace: &str, label_selector: &str) -> Result<Vec<Peer>> {
        let mut url = self
            .api_url
            .join(&format!("api/v1/namespaces/{namespace}/pods"))?;
        url.query_pairs_mut()
            .append_pair("labelSelector", label_selector);

        let pods: PodList = self
            .get_json(url)
            .await
            .context("failed to list neighbour pods")?;

        let addresses: Vec<PodAddress> = pods
            .items
            .into_iter()
            .filter_map(|pod| {
                let pod_name = pod.metadata.name.clone();
                let address = pod.into_address();
                if address.is_none() {
                    debug!("skipping pod {pod_name}: not scheduled or without address");
                }
                address
            })
            .unique_by(|address| address.node_name.clone())
            .collect();

        let node_names: Vec<String> = addresses.iter().map(|a| a.node_name.clone()).collect();

        let phases: HashMap<String, NodePhase> = stream::iter(node_names)
            .map(|node_name| async move {
                let phase = self.node_phase(&node_name).await;
                (node_name, phase)
            })
            .buffer_unordered(NODE_LOOKUP_CONCURRENCY)
            .collect()
            .await;

        let peers = addresses
            .into_iter()
            .map(|address| {
                let phase = phases
                    .get(&address.node_name)
                    .copied()
                    .unwrap_or(NodePhase::Unknown);

                Peer::new(
                    address.node_name,
                    address.pod_name,
                    address.pod_ip,
                    address.host_ip,
                    phase,
                )
            })
            .collect();

        Ok(peers)
    }
}
