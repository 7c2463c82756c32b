use crate::config::TransportConfig;
use anyhow::{Context, Result, bail};
use log::error;
use reqwest::{Certificate, Client, tls::Version};
use std::path::Path;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const TCP_KEEPALIVE: Duration = Duration::from_secs(30);
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Reads every certificate of a PEM bundle.
pub fn load_certificates(path: &Path) -> Result<Vec<Certificate>> {
    let pem = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let certificates = Certificate::from_pem_bundle(&pem)
        .with_context(|| format!("parsing {}", path.display()))?;

    if certificates.is_empty() {
        bail!("no certificates found in {}", path.display());
    }

    Ok(certificates)
}

/// Builds the HTTP client shared by all checks.
///
/// Extra trust bundles that cannot be loaded are logged and ignored: the client then falls
/// back to the platform roots, still enforcing TLS 1.2 or newer.
pub fn build_client(config: &TransportConfig) -> Result<Client> {
    let mut builder = Client::builder()
        .timeout(config.client_timeout)
        .connect_timeout(CONNECT_TIMEOUT)
        .tcp_keepalive(TCP_KEEPALIVE)
        .pool_idle_timeout(POOL_IDLE_TIMEOUT)
        .min_tls_version(Version::TLS_1_2)
        .danger_accept_invalid_certs(config.insecure);

    if !config.reuse_connections {
        builder = builder.pool_max_idle_per_host(0);
    }

    for path in &config.extra_ca {
        match load_certificates(path) {
            Ok(certificates) => {
                for certificate in certificates {
                    builder = builder.add_root_certificate(certificate);
                }
            }
            Err(e) => error!("cannot use extra CA bundle, falling back to system roots: {e:#}"),
        }
    }

    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::NamedTempFile;

    fn pem_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn transport_config(extra_ca: Vec<PathBuf>) -> TransportConfig {
        TransportConfig {
            client_timeout: Duration::from_secs(1),
            extra_ca,
            insecure: false,
            reuse_connections: false,
        }
    }

    #[test]
    fn test_load_certificates_missing_file() {
        let result = load_certificates(Path::new("/nonexistent/netnurse/ca.pem"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_certificates_without_certificates() {
        let file = pem_file("not a certificate\n");

        assert!(load_certificates(file.path()).is_err());
    }

    #[test]
    fn test_build_client_degrades_on_bad_ca() {
        let file = pem_file("garbage");
        let config = transport_config(vec![
            file.path().to_path_buf(),
            PathBuf::from("/nonexistent.pem"),
        ]);

        assert!(build_client(&config).is_ok());
    }

    #[tokio::test]
    async fn test_client_reaches_plain_http() -> Result<()> {
        let server = httpmock::MockServer::start();
        let mock = server.mock(|when, then| {
            when.path("/version");
            then.status(200);
        });

        let client = build_client(&transport_config(Vec::new()))?;
        let response = client.get(server.url("/version")).send().await?;

        assert_eq!(response.status(), 200);
        mock.assert();

        Ok(())
    }
}
