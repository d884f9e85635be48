use std::future::Future;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::engine::analytics::WindowAggregator;
use crate::types::{AssetPair, PriceWatcherError};

const DEFAULT_WINDOW_DAYS: i64 = 1;

#[derive(Serialize)]
struct HealthResp {
    status: &'static str,
}

#[derive(Deserialize)]
struct PriceParams {
    token0: String,
    token1: String,
    window_days: Option<i64>,
}

impl PriceParams {
    fn pair(&self) -> AssetPair {
        AssetPair::new(self.token0.clone(), self.token1.clone())
    }

    fn window(&self) -> i64 {
        self.window_days.unwrap_or(DEFAULT_WINDOW_DAYS)
    }
}

#[derive(Serialize)]
struct PriceResp {
    pair: String,
    /// Exact decimal rendering.
    value: String,
    /// Lossy, for display.
    value_f64: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    window_days: Option<i64>,
}

impl PriceResp {
    fn new(pair: &AssetPair, value: Decimal, window_days: Option<i64>) -> Self {
        Self { pair: pair.to_string(), value: value.to_string(), value_f64: value.to_f64(), window_days }
    }
}

struct ApiError(PriceWatcherError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            PriceWatcherError::NoData(_) | PriceWatcherError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::BAD_REQUEST,
        };
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult = std::result::Result<Json<PriceResp>, ApiError>;

async fn last_price(State(aggregator): State<WindowAggregator>, Query(params): Query<PriceParams>) -> ApiResult {
    let pair = params.pair();
    let value = aggregator.last_price(&pair).map_err(ApiError)?;
    Ok(Json(PriceResp::new(&pair, value, None)))
}

async fn average(State(aggregator): State<WindowAggregator>, Query(params): Query<PriceParams>) -> ApiResult {
    let pair = params.pair();
    let value = aggregator.average(&pair, params.window()).map_err(ApiError)?;
    Ok(Json(PriceResp::new(&pair, value, Some(params.window()))))
}

async fn change(State(aggregator): State<WindowAggregator>, Query(params): Query<PriceParams>) -> ApiResult {
    let pair = params.pair();
    let value = aggregator.percent_change(&pair, params.window()).map_err(ApiError)?;
    Ok(Json(PriceResp::new(&pair, value, Some(params.window()))))
}

/// Read-only query surface over the recorded history.
pub fn router(aggregator: WindowAggregator) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(HealthResp { status: "ok" }) }))
        .route("/price/last", get(last_price))
        .route("/price/average", get(average))
        .route("/price/change", get(change))
        .with_state(aggregator)
}

/// Serve until `shutdown` resolves.
pub async fn serve<F>(aggregator: WindowAggregator, addr: &str, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr: std::net::SocketAddr = addr.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "starting API server");
    axum::serve(listener, router(aggregator)).with_graceful_shutdown(shutdown).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_data_maps_to_not_found() {
        let status = ApiError(PriceWatcherError::NoData("a-b".into())).into_response().status();
        assert_eq!(status, StatusCode::NOT_FOUND);
        let status = ApiError(PriceWatcherError::NotFound("a-b".into())).into_response().status();
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn other_errors_are_bad_requests() {
        let status = ApiError(PriceWatcherError::InvalidWindow(-1)).into_response().status();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn response_carries_exact_and_float_values() {
        let resp = PriceResp::new(&AssetPair::new("weth", "dai"), Decimal::new(106655, 4), Some(7));
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["value"], "10.6655");
        assert!((json["value_f64"].as_f64().unwrap() - 10.6655).abs() < 1e-9);
        assert_eq!(json["pair"], "weth-dai");
    }
}
