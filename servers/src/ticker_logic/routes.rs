//! # HTTP Routes
//!
//! Read-only JSON view over the shared [`TickerContext`].
//!
//! - `GET /currency/all` returns `{"currencies": [...]}` in registration order.
//! - `GET /currency/{symbol}` returns one record, or `404` for unknown symbols.
//! - `GET /health` returns the feed status, `503` when disconnected or stale.
//!
//! Currency responses carry `X-Feed-State` and `X-Feed-Last-Update` so a client
//! can tell a frozen cache from a live one without the record body changing.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use lib_common::core::{FeedState, FeedStatus, TickerContext, TickerRecord};
use serde::Serialize;
use thiserror::Error;

const FEED_STATE_HEADER: HeaderName = HeaderName::from_static("x-feed-state");
const FEED_LAST_UPDATE_HEADER: HeaderName = HeaderName::from_static("x-feed-last-update");

#[derive(Clone)]
pub struct RouteState {
    ctx: Arc<TickerContext>,
    stale_after: Duration,
}

impl RouteState {
    pub fn new(ctx: Arc<TickerContext>, stale_after: Duration) -> Self {
        Self { ctx, stale_after }
    }

    /// `"stale"` when streaming but silent for longer than `stale_after`.
    fn feed_state_label(&self) -> &'static str {
        let health = self.ctx.health();
        match health.state() {
            FeedState::Streaming if health.is_stale(self.stale_after) => "stale",
            state => state.as_str(),
        }
    }

    fn feed_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(FEED_STATE_HEADER, HeaderValue::from_static(self.feed_state_label()));
        if let Some(ts) = self.ctx.health().last_update() {
            if let Ok(value) = HeaderValue::from_str(&ts.to_rfc3339()) {
                headers.insert(FEED_LAST_UPDATE_HEADER, value);
            }
        }
        headers
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unsupported symbol {symbol}")]
    UnsupportedSymbol { symbol: String, supported: Vec<String> },
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        match self {
            ApiError::UnsupportedSymbol { supported, .. } => (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({ "error": message, "supported": supported })),
            )
                .into_response(),
        }
    }
}

#[derive(Serialize)]
struct AllCurrencies {
    currencies: Vec<TickerRecord>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthBody {
    #[serde(flatten)]
    status: FeedStatus,
    stale: bool,
    symbols: usize,
}

pub fn router(state: RouteState) -> Router {
    Router::new()
        .route("/currency/all", get(all_currencies))
        .route("/currency/{symbol}", get(single_currency))
        .route("/health", get(health_handler))
        .with_state(state)
}

async fn all_currencies(State(state): State<RouteState>) -> Response {
    let body = AllCurrencies {
        currencies: state.ctx.read_all(),
    };
    (state.feed_headers(), Json(body)).into_response()
}

async fn single_currency(
    State(state): State<RouteState>,
    Path(symbol): Path<String>,
) -> Result<Response, ApiError> {
    match state.ctx.read_symbol(&symbol) {
        Some(record) => Ok((state.feed_headers(), Json(record)).into_response()),
        None => {
            log::debug!("Request for unsupported symbol {}", symbol);
            Err(ApiError::UnsupportedSymbol {
                symbol,
                supported: state.ctx.registry().symbols().to_vec(),
            })
        }
    }
}

async fn health_handler(State(state): State<RouteState>) -> Response {
    let health = state.ctx.health();
    let stale = health.is_stale(state.stale_after);
    let status = health.snapshot();
    let code = if stale || status.state == FeedState::Disconnected {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    let body = HealthBody {
        status,
        stale,
        symbols: state.ctx.registry().len(),
    };
    (code, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lib_common::core::{Quote, StaticFields};

    fn state() -> RouteState {
        let ctx = TickerContext::new(vec!["ETHBTC".to_string(), "BTCUSD".to_string()]).unwrap();
        RouteState::new(Arc::new(ctx), Duration::from_secs(60))
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_single_currency_returns_record() {
        let state = state();
        let slot = state.ctx.lookup("ETHBTC").unwrap();
        state.ctx.set_static(
            slot,
            StaticFields {
                id: "ETH".to_string(),
                full_name: "Ethereum".to_string(),
                fee_currency: "BTC".to_string(),
            },
        );
        state.ctx.write_quote(
            slot,
            Quote {
                ask: "0.054464".to_string(),
                bid: "0.054463".to_string(),
                last: "0.054463".to_string(),
                open: "0.057133".to_string(),
                low: "0.053615".to_string(),
                high: "0.057559".to_string(),
            },
        );
        state.ctx.health().set_state(FeedState::Streaming);
        state.ctx.health().record_update(None);

        let resp = single_currency(State(state), Path("ETHBTC".to_string())).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[&FEED_STATE_HEADER], "streaming");
        assert!(resp.headers().contains_key(&FEED_LAST_UPDATE_HEADER));
        assert_eq!(
            body_json(resp).await,
            serde_json::json!({
                "id": "ETH",
                "fullName": "Ethereum",
                "ask": "0.054464",
                "bid": "0.054463",
                "last": "0.054463",
                "open": "0.057133",
                "low": "0.053615",
                "high": "0.057559",
                "feeCurrency": "BTC"
            })
        );
    }

    #[tokio::test]
    async fn test_unknown_symbol_is_404_with_supported_list() {
        let err = single_currency(State(state()), Path("XXXYYY".to_string()))
            .await
            .unwrap_err();
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            body_json(resp).await,
            serde_json::json!({ "error": "Unsupported symbol XXXYYY", "supported": ["ETHBTC", "BTCUSD"] })
        );
    }

    #[tokio::test]
    async fn test_all_currencies_in_registration_order() {
        let resp = all_currencies(State(state())).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[&FEED_STATE_HEADER], "initializing");
        assert!(!resp.headers().contains_key(&FEED_LAST_UPDATE_HEADER));
        let body = body_json(resp).await;
        let currencies = body["currencies"].as_array().unwrap();
        assert_eq!(currencies.len(), 2);
        assert_eq!(currencies[0]["ask"], "");
    }

    #[tokio::test]
    async fn test_silent_streaming_feed_is_reported_stale() {
        let state = state();
        state.ctx.health().set_state(FeedState::Streaming);
        state
            .ctx
            .health()
            .record_update_at(chrono::Utc::now() - chrono::Duration::minutes(10), None);

        let resp = all_currencies(State(state.clone())).await;
        assert_eq!(resp.headers()[&FEED_STATE_HEADER], "stale");
        assert!(resp.headers().contains_key(&FEED_LAST_UPDATE_HEADER));

        let resp = health_handler(State(state)).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(resp).await;
        assert_eq!(body["state"], "streaming");
        assert_eq!(body["stale"], true);
    }

    #[tokio::test]
    async fn test_health_reports_disconnect() {
        let state = state();
        state.ctx.health().set_state(FeedState::Streaming);
        let resp = health_handler(State(state.clone())).await;
        assert_eq!(resp.status(), StatusCode::OK);

        state.ctx.health().set_state(FeedState::Disconnected);
        let resp = health_handler(State(state)).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(resp).await;
        assert_eq!(body["state"], "disconnected");
        assert_eq!(body["stale"], true);
        assert_eq!(body["symbols"], 2);
    }
}
