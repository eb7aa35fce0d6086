//! HTTP shell around the resolver registry.
//!
//! Two routes: a liveness probe and the lookup endpoint. The lookup
//! handler runs the cache-aside flow (cache fetch, resolver lookup,
//! cache add) and maps the error taxonomy onto status codes: client
//! input problems become 400s, everything else a 500. An address no
//! source knows is not an error; it answers 200 with a null body.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, trace};

use crate::cache::LookupCache;
use crate::error::GeoError;
use crate::record::GeoRecord;
use crate::resolver::SourceRegistry;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SourceRegistry>,
    pub cache: Option<Arc<LookupCache>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Deserialize)]
pub struct LookupQuery {
    pub source: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/_ping", get(ping))
        .route("/v1/ip/:address", get(lookup_ip))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

async fn ping() -> &'static str {
    "pong"
}

async fn lookup_ip(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(query): Query<LookupQuery>,
) -> Result<Json<Option<GeoRecord>>, (StatusCode, Json<ErrorBody>)> {
    let source = query
        .source
        .unwrap_or_else(|| state.registry.default_source().to_string());
    debug!(%address, %source, "fetching");

    if let Some(cache) = &state.cache {
        if let Some(record) = cache.fetch(&source, &address) {
            trace!(%address, "returning cached value");
            return Ok(Json(Some(record)));
        }
        trace!(%address, %source, "not found in cache");
    }

    let resolver = state.registry.get(&source).map_err(reject)?;
    let record = resolver.lookup(&address, false).await.map_err(reject)?;

    if let (Some(cache), Some(record)) = (&state.cache, &record) {
        trace!(%address, "adding to cache");
        cache.add(&source, record);
    }

    Ok(Json(record))
}

fn reject(err: GeoError) -> (StatusCode, Json<ErrorBody>) {
    let status = if err.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        error!(%err, "lookup failed");
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (
        status,
        Json(ErrorBody {
            error: err.to_string(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Settings, SourceSettings};
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::collections::HashMap;
    use tower::ServiceExt;

    fn empty_state(default_source: &str) -> AppState {
        AppState {
            registry: Arc::new(SourceRegistry::new(HashMap::new(), default_source)),
            cache: None,
        }
    }

    /// A registry with one enabled dataset source that has no datasets
    /// configured: valid addresses resolve to "not found".
    fn beta_state(cache: Option<Arc<LookupCache>>) -> AppState {
        let mut settings = Settings::default();
        settings.default_source = "beta".to_string();
        settings.sources.insert(
            "beta".to_string(),
            SourceSettings {
                enabled: true,
                ..SourceSettings::default()
            },
        );
        AppState {
            registry: Arc::new(SourceRegistry::from_settings(&settings).unwrap()),
            cache,
        }
    }

    async fn body_string(response: axum::response::Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_ping() {
        let app = router(empty_state("beta"));
        let response = app
            .oneshot(Request::builder().uri("/_ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "pong");
    }

    #[tokio::test]
    async fn test_unknown_source_is_a_bad_request() {
        let app = router(empty_state("beta"));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/ip/192.0.2.1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: ErrorBody = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body.error, "unknown source 'beta'");
    }

    #[tokio::test]
    async fn test_invalid_address_is_a_bad_request() {
        let app = router(beta_state(None));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/ip/not-an-address")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: ErrorBody = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body.error, "invalid IP address");
    }

    #[tokio::test]
    async fn test_not_found_answers_null() {
        let app = router(beta_state(None));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/ip/192.0.2.1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "null");
    }

    #[tokio::test]
    async fn test_cached_record_short_circuits_the_resolver() {
        let cache = Arc::new(LookupCache::new(16));
        let record = GeoRecord::new("192.0.2.1", "beta", false);
        cache.add("beta", &record);

        let app = router(beta_state(Some(cache)));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/ip/192.0.2.1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let served: GeoRecord = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(served, record);
    }

    #[tokio::test]
    async fn test_explicit_source_query_overrides_the_default() {
        let app = router(beta_state(None));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/ip/192.0.2.1?source=missing")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: ErrorBody = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body.error, "unknown source 'missing'");
    }
}
