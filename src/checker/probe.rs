use crate::metrics::InstrumentationSink;
use anyhow::{Result, bail};
use log::trace;
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Sent along every neighbour check with the name of the checking node.
pub const NEIGHBOUR_ORIGIN_HEADER: &str = "NETNURSE-NEIGHBOUR-ORIGIN";

/// Reports a request as finished when dropped, whichever way it ended.
struct InFlight<'a> {
    sink: &'a dyn InstrumentationSink,
    status: Option<u16>,
}

impl<'a> InFlight<'a> {
    fn start(sink: &'a dyn InstrumentationSink) -> Self {
        sink.request_started();
        Self { sink, status: None }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.sink.request_finished(self.status);
    }
}

/// Timed GET requests that only accept `200 OK`.
#[derive(Clone)]
pub struct Prober {
    client: Client,
    request_timeout: Duration,
    sink: Arc<dyn InstrumentationSink>,
}

impl Prober {
    pub fn new(
        client: Client,
        request_timeout: Duration,
        sink: Arc<dyn InstrumentationSink>,
    ) -> Self {
        Self {
            client,
            request_timeout,
            sink,
        }
    }

    /// Fails with the response status line for anything but `200 OK`, and with
    /// `check cancelled` as soon as `cancel` fires.
    pub async fn get(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        cancel: &CancellationToken,
    ) -> Result<()> {
        trace!("probing {url}");

        let mut request = self.client.get(url).timeout(self.request_timeout);

        for (key, value) in headers {
            request = request.header(*key, *value);
        }

        let mut in_flight = InFlight::start(self.sink.as_ref());

        let response = tokio::select! {
            _ = cancel.cancelled() => bail!("check cancelled"),
            response = request.send() => response?,
        };

        let status = response.status();
        in_flight.status = Some(status.as_u16());
        drop(in_flight);
        if status != StatusCode::OK {
            bail!("{status}");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::testing::RecordingSink;
    use httpmock::prelude::*;
    use std::sync::atomic::Ordering;
    use std::time::Instant;

    fn prober(request_timeout: Duration) -> Prober {
        Prober::new(
            Client::new(),
            request_timeout,
            Arc::new(RecordingSink::default()),
        )
    }

    #[tokio::test]
    async fn test_probe_success() -> Result<()> {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/alwayshappy");
            then.status(200).body("OK");
        });

        prober(Duration::from_secs(5))
            .get(&server.url("/alwayshappy"), &[], &CancellationToken::new())
            .await?;

        mock.assert();

        Ok(())
    }

    #[tokio::test]
    async fn test_probe_reports_status_line() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/version");
            then.status(503);
        });

        let result = prober(Duration::from_secs(5))
            .get(&server.url("/version"), &[], &CancellationToken::new())
            .await;

        let error = result.expect_err("503 should fail the probe");
        assert_eq!(error.to_string(), "503 Service Unavailable");
    }

    #[tokio::test]
    async fn test_probe_timeout() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/slow");
            then.status(200).delay(Duration::from_secs(5)).body("");
        });

        let start = Instant::now();
        let result = prober(Duration::from_secs(1))
            .get(&server.url("/slow"), &[], &CancellationToken::new())
            .await;

        assert!(result.is_err());
        // Should timeout early
        assert!(start.elapsed() < Duration::from_secs(3));

        mock.assert();
    }

    #[tokio::test]
    async fn test_probe_cancellation() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/slow");
            then.status(200).delay(Duration::from_secs(10)).body("");
        });

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let result = prober(Duration::from_secs(30))
            .get(&server.url("/slow"), &[], &cancel)
            .await;

        assert_eq!(result.unwrap_err().to_string(), "check cancelled");
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_probe_sends_headers() -> Result<()> {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/alwayshappy")
                .header(NEIGHBOUR_ORIGIN_HEADER, "node-self");
            then.status(200);
        });

        prober(Duration::from_secs(5))
            .get(
                &server.url("/alwayshappy"),
                &[(NEIGHBOUR_ORIGIN_HEADER, "node-self")],
                &CancellationToken::new(),
            )
            .await?;

        mock.assert();

        Ok(())
    }

    #[tokio::test]
    async fn test_probe_unreachable() {
        let result = prober(Duration::from_secs(1))
            .get(
                "http://127.0.0.1:1/alwayshappy",
                &[],
                &CancellationToken::new(),
            )
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_get_reports_client_requests() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/alwayshappy");
            then.status(200);
        });
        server.mock(|when, then| {
            when.method(GET).path("/version");
            then.status(503);
        });

        let sink = Arc::new(RecordingSink::default());
        let prober = Prober::new(Client::new(), Duration::from_secs(5), sink.clone());
        let cancel = CancellationToken::new();

        assert!(prober.get(&server.url("/alwayshappy"), &[], &cancel).await.is_ok());
        assert!(prober.get(&server.url("/version"), &[], &cancel).await.is_err());
        assert!(prober.get("http://127.0.0.1:1/", &[], &cancel).await.is_err());

        assert_eq!(sink.requests_started.load(Ordering::SeqCst), 3);
        assert_eq!(
            *sink.responses.lock().unwrap(),
            vec![Some(200), Some(503), None]
        );
    }
}
