use crate::{checker::result::CheckResult, server::AppState};
use actix_web::{
    HttpRequest, HttpResponse, get,
    http::header::{ContentType, HeaderMap},
    web::Data,
};
use log::error;
use serde::Serialize;
use std::collections::BTreeMap;
use utoipa_actix_web::service_config::ServiceConfig;

pub fn configure_routes(config: &mut ServiceConfig) {
    config.service(alive).service(metrics);
}

#[derive(Serialize)]
struct AliveResponse<'a> {
    hostname: &'a str,
    node_name: &'a str,
    headers: BTreeMap<String, String>,
    checks: &'a CheckResult,
}

fn header_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| Some((name.to_string(), value.to_str().ok()?.to_string())))
        .collect()
}

#[utoipa::path(
    summary = "Latest reachability result",
    description = "Serves the cached check result, running a new cycle first if it is stale",
    responses(
        (status = 200, description = "Every check passed"),
        (status = 500, description = "At least one check failed")
    ),
    tags = ["status"],
    operation_id = "getAlive"
)]
#[get("/alive")]
pub async fn alive(req: HttpRequest, app_state: Data<AppState>) -> HttpResponse {
    let snapshot = app_state.status.current().await;

    let body = AliveResponse {
        hostname: &app_state.hostname,
        node_name: app_state.status.node_name(),
        headers: header_map(req.headers()),
        checks: &snapshot.result,
    };

    if snapshot.is_healthy() {
        HttpResponse::Ok().json(body)
    } else {
        HttpResponse::InternalServerError().json(body)
    }
}

#[utoipa::path(
    summary = "Prometheus metrics",
    responses(
        (status = 200, description = "Metrics in the text exposition format"),
        (status = 500, description = "Metrics could not be encoded")
    ),
    tags = ["status"]
)]
#[get("/metrics")]
pub async fn metrics(app_state: Data<AppState>) -> HttpResponse {
    match app_state.metrics.render() {
        Ok(text) => HttpResponse::Ok()
            .content_type(ContentType::plaintext())
            .body(text),
        Err(e) => {
            error!("failed to encode metrics: {e:#}");
            HttpResponse::InternalServerError().finish()
        }
    }
}
