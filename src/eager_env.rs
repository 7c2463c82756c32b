use std::env;
use std::sync::LazyLock;

macro_rules! env_default {
    ($env_name:expr) => {
        panic!("Missing required environment variable: {}", $env_name)
    };
    ($env_name:expr, $default:expr) => {
        String::from($default)
    };
}

macro_rules! define_env_vars {
    ($(($name:ident, $env_name:expr, $type:ty $(, $default:expr)?)),* $(,)?) => {
        $(
            pub static $name: LazyLock<$type> = LazyLock::new(|| {
                let val = env::var($env_name)
                    .unwrap_or_else(|_| env_default!($env_name $(, $default)?));
                val.parse::<$type>().unwrap_or_else(|_| {
                    panic!(
                        "Failed to parse environment variable {} with value '{}' as {}",
                        $env_name,
                        val,
                        stringify!($type)
                    )
                })
            });
        )*

        /// Force initialization of all environment variables at startup
        /// Call this early in main() to fail fast if any env vars are missing
        pub fn check_env() {
            $(
                let _ = &*$name;
            )*
        }
    };
}

// Variables without a default are required
define_env_vars!(
    (NODE_NAME, "NETNURSE_NODE_NAME", String),
    (HOSTNAME, "HOSTNAME", String, ""),
    (PORT, "NETNURSE_PORT", u16, "8080"),
    (INGRESS_URL, "NETNURSE_INGRESS_URL", String, ""),
    (SERVICE_URL, "NETNURSE_SERVICE_URL", String, ""),
    (KUBERNETES_SERVICE_HOST, "KUBERNETES_SERVICE_HOST", String, ""),
    (KUBERNETES_SERVICE_PORT, "KUBERNETES_SERVICE_PORT", String, "443"),
    (CLUSTER_DOMAIN, "NETNURSE_CLUSTER_DOMAIN", String, "cluster.local"),
    (NAMESPACE, "NETNURSE_NAMESPACE", String, "default"),
    (
        NEIGHBOUR_FILTER,
        "NETNURSE_NEIGHBOUR_FILTER",
        String,
        "app.kubernetes.io/name=netnurse"
    ),
    (NEIGHBOUR_LIMIT, "NETNURSE_NEIGHBOUR_LIMIT", usize, "10"),
    (NEIGHBOUR_PORT, "NETNURSE_NEIGHBOUR_PORT", u16, "8080"),
    (
        NEIGHBOUR_CONCURRENCY,
        "NETNURSE_NEIGHBOUR_CONCURRENCY",
        usize,
        "10"
    ),
    (
        ALLOW_UNSCHEDULABLE,
        "NETNURSE_ALLOW_UNSCHEDULABLE",
        bool,
        "false"
    ),
    (
        CHECK_API_SERVER_DIRECT,
        "NETNURSE_CHECK_API_SERVER_DIRECT",
        bool,
        "true"
    ),
    (
        CHECK_API_SERVER_DNS,
        "NETNURSE_CHECK_API_SERVER_DNS",
        bool,
        "true"
    ),
    (CHECK_ME_INGRESS, "NETNURSE_CHECK_ME_INGRESS", bool, "true"),
    (CHECK_ME_SERVICE, "NETNURSE_CHECK_ME_SERVICE", bool, "true"),
    (
        CHECK_NEIGHBOURHOOD,
        "NETNURSE_CHECK_NEIGHBOURHOOD",
        bool,
        "true"
    ),
    (
        CHECK_INTERVAL_SECONDS,
        "NETNURSE_CHECK_INTERVAL_SECONDS",
        u64,
        "5"
    ),
    (CACHE_TTL_SECONDS, "NETNURSE_CACHE_TTL_SECONDS", u64, "5"),
    (
        REQUEST_TIMEOUT_SECONDS,
        "NETNURSE_REQUEST_TIMEOUT_SECONDS",
        u64,
        "5"
    ),
    (
        CLIENT_TIMEOUT_SECONDS,
        "NETNURSE_CLIENT_TIMEOUT_SECONDS",
        u64,
        "10"
    ),
    (SHUTDOWN_SECONDS, "NETNURSE_SHUTDOWN_SECONDS", u64, "5"),
    (EXTRA_CA, "NETNURSE_EXTRA_CA", String, ""),
    (INSECURE, "NETNURSE_INSECURE", bool, "false"),
    (REUSE_CONNECTIONS, "NETNURSE_REUSE_CONNECTIONS", bool, "false"),
    (
        HISTOGRAM_BUCKETS,
        "NETNURSE_HISTOGRAM_BUCKETS",
        String,
        ".005,.01,.025,.05,.1,.25,.5,1,2.5,5,10"
    ),
    (
        SERVICE_ACCOUNT_DIR,
        "NETNURSE_SERVICE_ACCOUNT_DIR",
        String,
        "/var/run/secrets/kubernetes.io/serviceaccount"
    ),
);
