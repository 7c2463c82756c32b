use crate::server::AppState;
use actix_web::{HttpResponse, get, web::Data};
use utoipa_actix_web::service_config::ServiceConfig;

pub fn configure_routes(config: &mut ServiceConfig) {
    config.service(always_happy).service(ready);
}

#[utoipa::path(
    responses(
        (status = 200, description = "Always OK, the target of ingress, service and neighbour checks")
    ),
    tags = ["health"]
)]
#[get("/alwayshappy")]
pub async fn always_happy() -> HttpResponse {
    HttpResponse::Ok().body("OK")
}

#[utoipa::path(
    responses(
        (status = 200, description = "Ready to receive traffic"),
        (status = 503, description = "Shutting down")
    ),
    tags = ["health"]
)]
#[get("/ready")]
pub async fn ready(app_state: Data<AppState>) -> HttpResponse {
    if app_state.is_ready() {
        HttpResponse::Ok().body("OK")
    } else {
        HttpResponse::ServiceUnavailable().body("shutting down")
    }
}

#[cfg(test)]
mod tests {
    use crate::collab::discovery::testing::StaticPeers;
    use crate::config::CheckerConfig;
    use crate::server::testing::{start_server_test, test_state};

    #[tokio::test]
    async fn test_always_happy() {
        let state = test_state(CheckerConfig::example(), StaticPeers::new(Vec::new()));
        let port = start_server_test(state);

        let response = reqwest::get(format!("http://127.0.0.1:{port}/alwayshappy"))
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(response.text().await.unwrap(), "OK");
    }

    #[tokio::test]
    async fn test_ready_until_shutdown() {
        let state = test_state(CheckerConfig::example(), StaticPeers::new(Vec::new()));
        let port = start_server_test(state.clone());
        let url = format!("http://127.0.0.1:{port}/ready");

        let response = reqwest::get(&url).await.unwrap();
        assert_eq!(response.status(), 200);

        state.mark_not_ready();

        let response = reqwest::get(&url).await.unwrap();
        assert_eq!(response.status(), 503);

        // Still answering the checks of the neighbours meanwhile
        let response = reqwest::get(format!("http://127.0.0.1:{port}/alwayshappy"))
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }
}
