//! REST API handlers.
//!
//! Each handler derives a request deadline, calls one provider component,
//! and wraps the result in the JSON envelope.

use std::time::Duration;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use dbgrid_core::{
    Deadline, DeprovisionRequest, ProviderError, ProviderResult, ProvisionReply, TunablesQuery,
    UpdateTunablesRequest,
};
use tracing::{debug, info};

use crate::ApiState;
use crate::error::{ApiError, ApiResponse, status_for};

/// Header carrying the caller's deadline in milliseconds.
pub const REQUEST_TIMEOUT_HEADER: &str = "x-request-timeout-ms";

/// Deadline from the request header, else the configured default.
pub fn request_deadline(headers: &HeaderMap, default: Duration) -> ProviderResult<Deadline> {
    let Some(value) = headers.get(REQUEST_TIMEOUT_HEADER) else {
        return Ok(Deadline::after(default));
    };
    let millis: u64 = value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .filter(|ms| *ms > 0)
        .ok_or_else(|| {
            ProviderError::InvalidArgument(format!("{REQUEST_TIMEOUT_HEADER} must be a positive integer"))
        })?;
    Ok(Deadline::after(Duration::from_millis(millis)))
}

fn deadline(state: &ApiState, headers: &HeaderMap) -> Result<Deadline, ApiError> {
    Ok(request_deadline(headers, state.config.request_timeout)?)
}

fn bad_body(rejection: JsonRejection) -> ApiError {
    ApiError(ProviderError::InvalidArgument(rejection.body_text()))
}

// ── Resources ──────────────────────────────────────────────────

/// POST /provider/provision
pub async fn provision(State(state): State<ApiState>, headers: HeaderMap) -> Result<Response, ApiError> {
    let deadline = deadline(&state, &headers)?;
    let provisioned = state.engine.provision(&deadline).await?;
    Ok((StatusCode::CREATED, ApiResponse::ok(ProvisionReply::from(provisioned))).into_response())
}

/// POST /provider/deprovision
pub async fn deprovision(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Result<Json<DeprovisionRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = body.map_err(bad_body)?;
    let deadline = deadline(&state, &headers)?;
    state.engine.deprovision(&req.id, &deadline).await?;
    Ok(ApiResponse::ok(serde_json::json!({})).into_response())
}

// ── Tunables ───────────────────────────────────────────────────

/// GET /provider/tunables
pub async fn get_tunables(
    State(state): State<ApiState>,
    headers: HeaderMap,
    query: Result<Query<TunablesQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) =
        query.map_err(|r| ApiError(ProviderError::InvalidArgument(r.body_text())))?;
    debug!(provider = %query.provider, resource = %query.resource, "get tunables");
    let deadline = deadline(&state, &headers)?;
    let tunables = state.tunables.get(&deadline).await?;
    Ok(ApiResponse::ok(tunables).into_response())
}

/// PUT /provider/tunables
///
/// `version` in the body is the version the caller read; the stored blob
/// comes back at `version + 1`.
pub async fn update_tunables(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Result<Json<UpdateTunablesRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = body.map_err(bad_body)?;
    let deadline = deadline(&state, &headers)?;
    let stored = state.tunables.update(req.data, req.version, &deadline).await?;
    info!(provider = %req.provider, resource = %req.resource, version = stored.version, "tunables updated via api");
    Ok(ApiResponse::ok(stored).into_response())
}

// ── Status ─────────────────────────────────────────────────────

/// GET /status
pub async fn status(State(state): State<ApiState>, headers: HeaderMap) -> Result<Response, ApiError> {
    let deadline = deadline(&state, &headers)?;
    let health = state.health.check(&deadline).await;
    let reply = health.to_reply();

    if health.is_healthy() {
        return Ok(ApiResponse::ok(reply).into_response());
    }
    let kind = match &health {
        dbgrid_health::HealthState::Unhealthy { reason } => Some(reason.kind()),
        _ => None,
    };
    let body = ApiResponse {
        success: false,
        error: reply.detail.clone(),
        data: Some(reply),
        kind,
    };
    Ok((status_for(dbgrid_core::ErrorKind::Unavailable), Json(body)).into_response())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use axum::http::HeaderValue;
    use dbgrid_core::{Flavor, ProviderConfig, Tunables};
    use dbgrid_gateway::StatementKind;
    use http_body_util::BodyExt;

    use super::*;
    use crate::InMemoryCluster;

    fn test_state() -> (ApiState, InMemoryCluster) {
        let mut config = ProviderConfig::new(Flavor::Postgres);
        config.admin_password = "adminpw".to_string();
        config.app_id = "app1".to_string();
        let config = Arc::new(config);
        let cluster = InMemoryCluster::new(&config);
        (ApiState::new(config, cluster.collaborators()), cluster)
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn deadline_header_parsing() {
        let mut headers = HeaderMap::new();
        assert!(request_deadline(&headers, Duration::from_secs(1)).is_ok());

        headers.insert(REQUEST_TIMEOUT_HEADER, HeaderValue::from_static("250"));
        assert!(request_deadline(&headers, Duration::from_secs(1)).is_ok());

        for bad in ["0", "soon", "-5"] {
            headers.insert(REQUEST_TIMEOUT_HEADER, HeaderValue::from_static(bad));
            let err = request_deadline(&headers, Duration::from_secs(1)).unwrap_err();
            assert!(matches!(err, ProviderError::InvalidArgument(_)), "{bad}");
        }
    }

    #[tokio::test]
    async fn provision_returns_created_with_env() {
        let (state, cluster) = test_state();
        let resp = provision(State(state), HeaderMap::new()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let body = body_json(resp).await;
        assert_eq!(body["success"], true);
        let id = body["data"]["id"].as_str().unwrap();
        assert!(id.starts_with("/databases/"));
        assert!(body["data"]["env"]["DATABASE_URL"].as_str().unwrap().starts_with("postgres://"));
        assert_eq!(cluster.driver.principals().len(), 1);
    }

    #[tokio::test]
    async fn deprovision_bogus_id_is_bad_request() {
        let (state, cluster) = test_state();
        let req = DeprovisionRequest {
            id: "/databases/bogus".to_string(),
        };
        let err = deprovision(State(state), HeaderMap::new(), Ok(Json(req)))
            .await
            .unwrap_err();
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = body_json(resp).await;
        assert_eq!(body["kind"], "invalid_argument");
        assert_eq!(cluster.driver.connection_count(), 0);
    }

    #[tokio::test]
    async fn update_then_stale_update_conflicts() {
        let (state, cluster) = test_state();
        cluster.peer.set_tunables(Tunables {
            data: BTreeMap::new(),
            version: 3,
        });

        let req = || UpdateTunablesRequest {
            provider: "pg".into(),
            resource: "abc".into(),
            data: BTreeMap::from([("max_conn".to_string(), "100".to_string())]),
            version: 3,
        };
        let resp = update_tunables(State(state.clone()), HeaderMap::new(), Ok(Json(req())))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["data"]["version"], 4);
        assert_eq!(cluster.peer.tunables().data["max_conn"], "100");

        let err = update_tunables(State(state), HeaderMap::new(), Ok(Json(req())))
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
        assert_eq!(cluster.peer.tunables().version, 4);
    }

    #[tokio::test]
    async fn status_not_yet_scaled_is_ok() {
        let (state, cluster) = test_state();
        cluster.peer.set_status(dbgrid_tunables::LeaderStatus::read_only());

        let resp = status(State(state), HeaderMap::new()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["data"]["state"], "healthy");
        assert_eq!(body["data"]["detail"], "not yet scaled");
    }

    #[tokio::test]
    async fn status_unhealthy_is_503() {
        let (state, cluster) = test_state();
        cluster
            .driver
            .fail_on(StatementKind::Ping, ProviderError::Internal("shutting down".into()));

        let resp = status(State(state), HeaderMap::new()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(resp).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["data"]["state"], "unhealthy");
        assert_eq!(body["kind"], "internal");
    }
}
