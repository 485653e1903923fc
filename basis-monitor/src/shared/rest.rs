/// HTTP client for the records API and the simulator's order endpoint.

use crate::error::FetchError;
use crate::shared::records::{PositionRecord, TradeRecord};
use crate::shared::types::{OrderKind, OrderRequest, OrderResponse};
use reqwest::Response;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Error body returned by the records API on failure
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Deserialize)]
struct HealthBody {
    status: String,
}

/// Read-only records API plus the order pass-through
#[derive(Debug, Clone)]
pub struct RecordsClient {
    http: reqwest::Client,
    records_url: Url,
    simulator_url: Url,
}

impl RecordsClient {
    pub fn new(records_url: Url, simulator_url: Url, timeout: Duration) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Http {
                url: records_url.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            http,
            records_url: as_base(records_url),
            simulator_url: as_base(simulator_url),
        })
    }

    /// `GET /trade-records`
    pub async fn trade_records(&self) -> Result<Vec<TradeRecord>, FetchError> {
        let url = self.records_url.join("trade-records")?;
        let records: Vec<TradeRecord> = self.get_json(url).await?;
        info!("Fetched {} trade records", records.len());
        Ok(records)
    }

    /// `GET /position-records`
    pub async fn position_records(&self) -> Result<Vec<PositionRecord>, FetchError> {
        let url = self.records_url.join("position-records")?;
        let records: Vec<PositionRecord> = self.get_json(url).await?;
        info!("Fetched {} position records", records.len());
        Ok(records)
    }

    /// `GET /health`, true when the API reports `ok`
    pub async fn health(&self) -> Result<bool, FetchError> {
        let url = self.records_url.join("health")?;
        let body: HealthBody = self.get_json(url).await?;
        Ok(body.status == "ok")
    }

    /// `POST /order` on the simulator. The returned status is not interpreted.
    pub async fn submit_order(&self, request: &OrderRequest) -> Result<OrderResponse, FetchError> {
        if request.order_type == OrderKind::Limit && request.price.is_none() {
            return Err(FetchError::InvalidRequest(
                "limit order requires a price".to_string(),
            ));
        }

        let url = self.simulator_url.join("order")?;
        debug!(?request, "Submitting order to {}", url);

        let response = self
            .http
            .post(url.clone())
            .json(request)
            .send()
            .await
            .map_err(|e| http_error(&url, e))?;

        let order: OrderResponse = read_json(&url, response).await?;
        info!(id = %order.id, status = ?order.status, "Order submitted");
        Ok(order)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, FetchError> {
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| http_error(&url, e))?;

        read_json(&url, response).await
    }
}

/// Ensure `join` appends to the configured path instead of replacing its last segment
fn as_base(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

fn http_error(url: &Url, error: reqwest::Error) -> FetchError {
    FetchError::Http {
        url: url.to_string(),
        reason: error.to_string(),
    }
}

async fn read_json<T: DeserializeOwned>(url: &Url, response: Response) -> Result<T, FetchError> {
    let status = response.status();
    let body = response.text().await.map_err(|e| http_error(url, e))?;

    if !status.is_success() {
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|body| body.error)
            .unwrap_or_else(|_| body.chars().take(200).collect());
        return Err(FetchError::Status {
            url: url.to_string(),
            status: status.as_u16(),
            message,
        });
    }

    serde_json::from_str(&body).map_err(|e| FetchError::Decode {
        url: url.to_string(),
        reason: e.to_string(),
    })
}
