use crate::eager_env;
use anyhow::{Result, bail};
use log::warn;
use std::path::PathBuf;
use std::time::Duration;

/// Which of the fixed checks run. A disabled check reports `skipped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnabledChecks {
    pub api_server_direct: bool,
    pub api_server_dns: bool,
    pub me_ingress: bool,
    pub me_service: bool,
    pub neighbourhood: bool,
}

#[cfg(test)]
impl EnabledChecks {
    pub fn all() -> Self {
        Self {
            api_server_direct: true,
            api_server_dns: true,
            me_ingress: true,
            me_service: true,
            neighbourhood: true,
        }
    }

    pub fn none() -> Self {
        Self {
            api_server_direct: false,
            api_server_dns: false,
            me_ingress: false,
            me_service: false,
            neighbourhood: false,
        }
    }
}

/// Full URLs probed by the fixed checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckTargets {
    pub api_server_direct: String,
    pub api_server_dns: String,
    pub me_ingress: String,
    pub me_service: String,
}

#[derive(Debug, Clone)]
pub struct CheckerConfig {
    /// Name of the node this agent runs on
    pub node_name: String,
    pub targets: CheckTargets,
    pub enabled: EnabledChecks,
    pub namespace: String,
    pub neighbour_filter: String,
    /// 0 disables neighbour filtering entirely
    pub neighbour_limit: usize,
    pub neighbour_port: u16,
    pub neighbour_concurrency: usize,
    pub allow_unschedulable: bool,
    pub check_interval: Duration,
    pub cache_ttl: Duration,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub client_timeout: Duration,
    pub extra_ca: Vec<PathBuf>,
    pub insecure: bool,
    pub reuse_connections: bool,
}

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub api_server_url: String,
    pub service_account_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub hostname: String,
    pub shutdown_grace: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub checker: CheckerConfig,
    pub transport: TransportConfig,
    pub discovery: DiscoveryConfig,
    pub server: ServerConfig,
    pub histogram_buckets: Vec<f64>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let api_host = &*eager_env::KUBERNETES_SERVICE_HOST;
        let api_port = &*eager_env::KUBERNETES_SERVICE_PORT;

        let mut enabled = EnabledChecks {
            api_server_direct: *eager_env::CHECK_API_SERVER_DIRECT,
            api_server_dns: *eager_env::CHECK_API_SERVER_DNS,
            me_ingress: *eager_env::CHECK_ME_INGRESS,
            me_service: *eager_env::CHECK_ME_SERVICE,
            neighbourhood: *eager_env::CHECK_NEIGHBOURHOOD,
        };

        if api_host.is_empty() && enabled.api_server_direct {
            warn!("KUBERNETES_SERVICE_HOST is not set, skipping api_server_direct");
            enabled.api_server_direct = false;
        }
        if eager_env::INGRESS_URL.is_empty() && enabled.me_ingress {
            warn!("NETNURSE_INGRESS_URL is not set, skipping me_ingress");
            enabled.me_ingress = false;
        }
        if eager_env::SERVICE_URL.is_empty() && enabled.me_service {
            warn!("NETNURSE_SERVICE_URL is not set, skipping me_service");
            enabled.me_service = false;
        }

        let targets = CheckTargets {
            api_server_direct: format!("https://{api_host}:{api_port}/version"),
            api_server_dns: format!(
                "https://kubernetes.default.svc.{}:{api_port}/version",
                *eager_env::CLUSTER_DOMAIN
            ),
            me_ingress: always_happy_url(&eager_env::INGRESS_URL),
            me_service: always_happy_url(&eager_env::SERVICE_URL),
        };

        let check_interval = Duration::from_secs(*eager_env::CHECK_INTERVAL_SECONDS);
        if check_interval.is_zero() {
            bail!("NETNURSE_CHECK_INTERVAL_SECONDS must be greater than 0");
        }

        let checker = CheckerConfig {
            node_name: eager_env::NODE_NAME.clone(),
            targets,
            enabled,
            namespace: eager_env::NAMESPACE.clone(),
            neighbour_filter: eager_env::NEIGHBOUR_FILTER.clone(),
            neighbour_limit: *eager_env::NEIGHBOUR_LIMIT,
            neighbour_port: *eager_env::NEIGHBOUR_PORT,
            neighbour_concurrency: (*eager_env::NEIGHBOUR_CONCURRENCY).max(1),
            allow_unschedulable: *eager_env::ALLOW_UNSCHEDULABLE,
            check_interval,
            cache_ttl: Duration::from_secs(*eager_env::CACHE_TTL_SECONDS),
            request_timeout: Duration::from_secs(*eager_env::REQUEST_TIMEOUT_SECONDS),
        };

        let service_account_dir = PathBuf::from(&*eager_env::SERVICE_ACCOUNT_DIR);

        // The cluster CA signs the api server certificate for both the checks and discovery
        let mut extra_ca = parse_path_list(&eager_env::EXTRA_CA);
        extra_ca.push(service_account_dir.join("ca.crt"));

        let transport = TransportConfig {
            client_timeout: Duration::from_secs(*eager_env::CLIENT_TIMEOUT_SECONDS),
            extra_ca,
            insecure: *eager_env::INSECURE,
            reuse_connections: *eager_env::REUSE_CONNECTIONS,
        };

        let discovery = DiscoveryConfig {
            api_server_url: format!("https://{api_host}:{api_port}"),
            service_account_dir,
        };

        let server = ServerConfig {
            port: *eager_env::PORT,
            hostname: eager_env::HOSTNAME.clone(),
            shutdown_grace: Duration::from_secs(*eager_env::SHUTDOWN_SECONDS),
        };

        Ok(Self {
            checker,
            transport,
            discovery,
            server,
            histogram_buckets: parse_histogram_buckets(&eager_env::HISTOGRAM_BUCKETS)?,
        })
    }
}

fn always_happy_url(base: &str) -> String {
    format!("{}/alwayshappy", base.trim_end_matches('/'))
}

fn parse_path_list(paths: &str) -> Vec<PathBuf> {
    paths
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .collect()
}

/// Parses a comma separated list of strictly increasing bucket bounds.
pub fn parse_histogram_buckets(raw: &str) -> Result<Vec<f64>> {
    let buckets = raw
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<f64>()
                .map_err(|e| anyhow::anyhow!("invalid histogram bucket '{s}': {e}"))
        })
        .collect::<Result<Vec<_>>>()?;

    if buckets.is_empty() {
        bail!("at least one histogram bucket is required");
    }

    if buckets.windows(2).any(|w| w[0] >= w[1]) {
        bail!("histogram buckets must be strictly increasing");
    }

    Ok(buckets)
}

#[cfg(test)]
impl CheckerConfig {
    pub fn example() -> Self {
        Self {
            node_name: "node-self".to_string(),
            targets: CheckTargets {
                api_server_direct: "http://127.0.0.1:1/version".to_string(),
                api_server_dns: "http://127.0.0.1:1/version".to_string(),
                me_ingress: "http://127.0.0.1:1/alwayshappy".to_string(),
                me_service: "http://127.0.0.1:1/alwayshappy".to_string(),
            },
            enabled: EnabledChecks::none(),
            namespace: "netnurse".to_string(),
            neighbour_filter: "app=netnurse".to_string(),
            neighbour_limit: 10,
            neighbour_port: 8080,
            neighbour_concurrency: 4,
            allow_unschedulable: false,
            check_interval: Duration::from_secs(5),
            cache_ttl: Duration::from_secs(5),
            request_timeout: Duration::from_secs(1),
        }
    }
}
