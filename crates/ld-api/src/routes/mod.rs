pub mod instances;

use axum::Router;
use axum::middleware;
use axum::routing::{get, post};

use crate::auth::auth_middleware;
use crate::state::AppState;

pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/instances", post(instances::create_instance))
        .route(
            "/instances/{id}",
            get(instances::get_instance)
                .put(instances::update_instance)
                .delete(instances::delete_instance),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use http_body_util::BodyExt;
    use ld_infra::mock::MockRemote;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::config::AppConfig;

    const KEY: &str = "test-key";

    fn app() -> (Arc<MockRemote>, Router) {
        let mock = Arc::new(MockRemote::with_catalog());
        let state = AppState {
            orchestrator: Arc::new(mock.orchestrator()),
            config: AppConfig {
                listen_addr: ([127, 0, 0, 1], 0).into(),
                control_plane_api_key: KEY.into(),
            },
        };
        (mock, api_router(state))
    }

    fn desired() -> Value {
        json!({
            "image": "Debian 9",
            "kernel": "Latest 64 bit",
            "name": "web1",
            "region": "Dallas, TX, USA",
            "size": 1024,
            "ssh_key": "ssh-ed25519 AAAA",
            "root_password": "hunter2",
        })
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("authorization", format!("Bearer {KEY}"));
        let req = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn missing_or_wrong_key_is_rejected() {
        let (mock, app) = app();

        let req = Request::get("/instances/1").body(Body::empty()).unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let req = Request::get("/instances/1")
            .header("authorization", "Bearer nope")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn instance_lifecycle() {
        let (mock, app) = app();

        let (status, created) = send(&app, Method::POST, "/instances", Some(desired())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["name"], "web1");
        assert_eq!(created["size"], 1024);
        assert_eq!(created["swap_size"], 512);
        assert_eq!(created["connection"]["protocol"], "ssh");
        assert!(created.get("root_password").is_none());
        assert!(!created.to_string().contains("hunter2"));
        let id = created["linode_id"].as_i64().unwrap();
        let uri = format!("/instances/{id}");

        let (status, read) = send(&app, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(read["region"], "Dallas, TX, USA");

        let mut update = desired();
        update["group"] = json!("db");
        update["stored_credentials"] = created["credentials"].clone();
        let (status, updated) = send(&app, Method::PUT, &uri, Some(update)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["group"], "db");

        let (status, _) = send(&app, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(mock.linode(ld_infra::types::LinodeId(id)).is_none());

        let (status, body) = send(&app, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("linode"));
    }

    #[tokio::test]
    async fn interrupted_provision_reports_progress() {
        let (mock, app) = app();
        mock.fail_on("create_config");

        let (status, body) = send(&app, Method::POST, "/instances", Some(desired())).await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["step"], "create_config");
        assert!(body["committed"]["linode_id"].is_i64());
        assert!(body["committed"]["root_disk_id"].is_i64());
        assert!(body["committed"]["config_id"].is_null());
    }

    #[tokio::test]
    async fn unknown_region_is_not_found() {
        let (mock, app) = app();
        let mut body = desired();
        body["region"] = json!("Atlantis");

        let (status, body) = send(&app, Method::POST, "/instances", Some(body)).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["step"], "resolve_placement");
        assert!(mock.mutations().is_empty());
    }

    #[tokio::test]
    async fn disabling_private_networking_is_unprocessable() {
        let (mock, app) = app();
        let mut body = desired();
        body["private_networking"] = json!(true);
        let (_, created) = send(&app, Method::POST, "/instances", Some(body)).await;
        let uri = format!("/instances/{}", created["linode_id"]);
        mock.clear_calls();

        let (status, body) = send(&app, Method::PUT, &uri, Some(desired())).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["step"], "preflight");
        assert_eq!(body["committed"], json!([]));
        assert!(mock.mutations().is_empty());
    }

    #[tokio::test]
    async fn changed_credentials_are_unprocessable() {
        let (_mock, app) = app();
        let (_, created) = send(&app, Method::POST, "/instances", Some(desired())).await;
        let uri = format!("/instances/{}", created["linode_id"]);

        let mut update = desired();
        update["root_password"] = json!("hunter3");
        update["stored_credentials"] = created["credentials"].clone();
        let (status, _) = send(&app, Method::PUT, &uri, Some(update)).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn non_numeric_id_is_bad_request() {
        let (_mock, app) = app();
        let (status, _) = send(&app, Method::GET, "/instances/web1", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
