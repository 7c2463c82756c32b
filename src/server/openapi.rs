use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(title = "netnurse", description = "Per-node network reachability agent"),
    tags(
        (name = "health", description = "Liveness and readiness of the agent itself."),
        (name = "status", description = "Reachability results and metrics."),
    )
)]
pub struct ApiDoc;
