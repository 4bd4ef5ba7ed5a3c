//! Router assembly (§4.I). One `axum::routing::get`/`post`/`put`/`delete`
//! call per table row, CORS wide open (the UI is a local, unauthenticated
//! client of its own daemon — §4.M/N ambient stack, not a public API
//! surface) and the access-log middleware wrapping everything.

pub mod computers;
pub mod hosts;
pub mod pairing;
pub mod settings;
pub mod stream;
pub mod system;

use axum::http::StatusCode;
use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use crate::logging::access_log;
use crate::state::SharedState;

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

pub fn build(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/computers", get(computers::get_computers))
        .route("/apps", get(computers::get_apps))
        .route("/hideapp", put(computers::put_hideapp))
        .route("/razerid/availability", get(computers::get_razerid_availability))
        .route("/pair", get(pairing::get_pair))
        .route("/pairstate", get(pairing::get_pairstate))
        .route("/cancelpair", get(pairing::get_cancelpair))
        .route("/stream", get(stream::get_stream))
        .route("/streamstate", get(stream::get_streamstate))
        .route("/quitapp", get(stream::get_quitapp))
        .route("/quitstate", get(stream::get_quitstate))
        .route("/addcomputer", post(hosts::post_addcomputer))
        .route("/addstate", get(hosts::get_addstate))
        .route("/deletecomputer", delete(hosts::delete_computer))
        .route("/deletestate", get(hosts::get_deletestate))
        .route("/settings", get(settings::get_settings).put(settings::put_settings))
        .route("/settings/reset", put(settings::put_settings_reset))
        .route("/settings/screeninfo", get(settings::get_screeninfo))
        .route("/exit", get(system::get_exit))
        .route("/alive", get(system::get_alive))
        .route("/XRazerJWT", post(system::post_xrazerjwt))
        .route("/something", get(system::get_something))
        .fallback(not_found)
        .layer(axum::middleware::from_fn(access_log))
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use http_body_util::BodyExt;
    use hostlink_core::{AppPaths, BoxArtWorker, PollerManager, Registry, SettingsStore, StreamSession, TaskManager, TransportConfig};
    use hostlink_crypto::Identity;
    use tower::ServiceExt;

    use super::build;
    use crate::state::{AppState, FederatedTokenHolder, LoggingEventSink};

    fn test_state() -> (tempfile::TempDir, crate::state::SharedState) {
        let dir = tempfile::tempdir().unwrap();
        let paths = Arc::new(AppPaths::at(dir.path().to_path_buf()));
        let events = Arc::new(LoggingEventSink);
        let registry = Arc::new(
            Registry::load(paths.hosts_file(), events.clone() as Arc<dyn hostlink_core::EventSink>).unwrap(),
        );
        let settings = Arc::new(SettingsStore::load(paths.settings_file()).unwrap());
        let identity = Arc::new(Identity::generate().unwrap());
        let transport_config = TransportConfig {
            identity_pem: Arc::new(format!("{}\n{}", identity.cert_pem(), identity.private_key_pem())),
            client_unique_id: Arc::new(identity.unique_id().to_string()),
        };
        let poller_manager = Arc::new(PollerManager::new(Arc::clone(&registry), transport_config.clone()));
        let boxart = BoxArtWorker::spawn(Arc::clone(&paths));
        let state = Arc::new(AppState {
            registry,
            poller_manager,
            tasks: Arc::new(TaskManager::new()),
            settings,
            identity,
            transport_config,
            boxart,
            paths,
            stream_session: Arc::new(StreamSession::new()),
            events,
            federated_token: parking_lot::Mutex::new(FederatedTokenHolder::default()),
            shutdown: tokio::sync::watch::channel(false).0,
            started_at: std::time::Instant::now(),
        });
        (dir, state)
    }

    #[tokio::test]
    async fn alive_returns_200() {
        let (_dir, state) = test_state();
        let app = build(state);
        let response = app
            .oneshot(axum::http::Request::builder().uri("/alive").body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }

    #[tokio::test]
    async fn computers_with_no_hosts_is_an_empty_array() {
        let (_dir, state) = test_state();
        let app = build(state);
        let response = app
            .oneshot(axum::http::Request::builder().uri("/computers").body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed, serde_json::json!([]));
    }

    #[tokio::test]
    async fn pair_with_invalid_uuid_is_bad_request() {
        let (_dir, state) = test_state();
        let app = build(state);
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/pair?computer=not-a-uuid")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let (_dir, state) = test_state();
        let app = build(state);
        let response = app
            .oneshot(axum::http::Request::builder().uri("/nope").body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::NOT_FOUND);
    }
}
