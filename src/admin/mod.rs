//! Read-only status API.
//!
//! # Routes
//! - `GET /admin/status`: version and pending operation count
//! - `GET /admin/operations`: operation counts per state and type
//! - `GET /admin/network`: liveness, last heartbeat, listener bookmark
//!
//! Every route requires `Authorization: Bearer <admin.api_key>`.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{middleware, routing::get, Router};
use tower_http::trace::TraceLayer;

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::config::HeartbeatConfig;
use crate::storage::ids::NetworkId;
use crate::storage::Store;

#[derive(Clone)]
pub struct AdminState {
    pub store: Store,
    pub network_id: NetworkId,
    pub network_name: String,
    pub heartbeat: HeartbeatConfig,
    pub api_key: Arc<str>,
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/operations", get(get_operations))
        .route("/admin/network", get(get_network))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{unix_now, ServiceResult};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    const KEY: &str = "admin-secret-key-0001";

    fn router() -> (Router, Store, NetworkId) {
        let store = Store::in_memory();
        let network_id = store
            .atomic(|t| -> ServiceResult<_> {
                let network = t.get_or_create_network("testnet");
                t.create_address(network, 1)?;
                let now = unix_now();
                t.update_heartbeat(network, 12, now, now)?;
                Ok(network)
            })
            .unwrap();
        let state = AdminState {
            store: store.clone(),
            network_id,
            network_name: "testnet".into(),
            heartbeat: HeartbeatConfig::default(),
            api_key: Arc::from(KEY),
        };
        (setup_admin_router(state), store, network_id)
    }

    async fn get(router: &Router, path: &str, key: Option<&str>) -> (StatusCode, serde_json::Value) {
        let mut req = Request::builder().uri(path);
        if let Some(key) = key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }
        let resp = router.clone().oneshot(req.body(Body::empty()).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn test_requires_bearer_key() {
        let (router, _, _) = router();
        assert_eq!(get(&router, "/admin/status", None).await.0, StatusCode::UNAUTHORIZED);
        assert_eq!(get(&router, "/admin/status", Some("wrong")).await.0, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_status_and_operation_counts() {
        let (router, _, _) = router();
        let (status, body) = get(&router, "/admin/status", Some(KEY)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["pending_operations"], 1);

        let (_, body) = get(&router, "/admin/operations", Some(KEY)).await;
        assert_eq!(body["total"], 1);
        assert_eq!(body["by_state"]["waiting"], 1);
        assert_eq!(body["by_type"]["address_creation"], 1);
    }

    #[tokio::test]
    async fn test_network_reports_heartbeat() {
        let (router, _, _) = router();
        let (status, body) = get(&router, "/admin/network", Some(KEY)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["alive"], true);
        assert_eq!(body["heartbeat"]["block_number"], 12);
        assert!(body["event_bookmark"].is_null());
    }
}
