mod health;
mod openapi;
mod status;

use crate::{
    checker::{Checker, cache::Snapshot},
    collab::PeerProvider,
    metrics::PrometheusSink,
};
use actix_web::{
    App, HttpResponse, HttpServer,
    dev::Server,
    web::{self, Data},
};
use futures::future::BoxFuture;
use std::{
    net::TcpListener,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use utoipa::OpenApi;
use utoipa_actix_web::AppExt;

pub use openapi::ApiDoc;

pub type AppState = Arc<AppStateInner>;

/// What `/alive` reports on.
pub trait StatusSource: Send + Sync {
    fn node_name(&self) -> &str;

    fn current(&self) -> BoxFuture<'_, Snapshot>;
}

impl<P: PeerProvider + Send + Sync> StatusSource for Checker<P> {
    fn node_name(&self) -> &str {
        Checker::node_name(self)
    }

    fn current(&self) -> BoxFuture<'_, Snapshot> {
        Box::pin(self.get_current())
    }
}

pub struct AppStateInner {
    pub status: Arc<dyn StatusSource>,
    pub metrics: Arc<PrometheusSink>,
    pub hostname: String,
    ready: AtomicBool,
}

impl AppStateInner {
    pub fn new(
        status: Arc<dyn StatusSource>,
        metrics: Arc<PrometheusSink>,
        hostname: String,
    ) -> Self {
        Self {
            status,
            metrics,
            hostname,
            ready: AtomicBool::new(true),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Makes `/ready` fail so the endpoint is taken out of rotation.
    pub fn mark_not_ready(&self) {
        self.ready.store(false, Ordering::SeqCst);
    }
}

/// Binds the routes to `listener`. The returned server must be awaited to run.
///
/// Signal handling is left to the caller, which owns the shutdown sequence.
pub fn start_server(state: AppState, listener: TcpListener) -> std::io::Result<Server> {
    let data = Data::new(state);

    let server = HttpServer::new(move || {
        App::new()
            .into_utoipa_app()
            .openapi(ApiDoc::openapi())
            .configure(health::configure_routes)
            .configure(status::configure_routes)
            .app_data(data.clone())
            .openapi_service(|api| {
                web::resource("/api/openapi.json").route(web::get().to(move || {
                    let api = api.clone();
                    async move { HttpResponse::Ok().json(api) }
                }))
            })
            .into_app()
    })
    .disable_signals()
    .listen(listener)?
    .run();

    Ok(server)
}


#[cfg(test)]
mod tests {
    use super::testing::{start_server_test, test_state};
    use crate::collab::discovery::testing::StaticPeers;
    use crate::config::CheckerConfig;

    #[tokio::test]
    async fn test_openapi_endpoint() {
        let state = test_state(CheckerConfig::example(), StaticPeers::new(Vec::new()));
        let port = start_server_test(state);

        let response = reqwest::get(format!("http://127.0.0.1:{port}/api/openapi.json"))
            .await
            .unwrap();
        assert_eq!(response.status(), 200);

        let doc: serde_json::Value = response.json().await.unwrap();
        assert!(doc["paths"]["/alive"].is_object());
        assert!(doc["paths"]["/alwayshappy"].is_object());
    }
}
