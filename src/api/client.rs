use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{header, Client, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::error::StoreError;
use super::store::ScheduleStore;
use super::types::*;
use crate::config::Config;
use crate::schedule::YearMonth;

/// HTTP client for the schedule endpoints of the club server
pub struct StoreClient {
    client: Client,
    base_url: String,
    session_cookie: Option<String>,
}

impl StoreClient {
    pub fn new(config: &Config) -> Result<Self> {
        let base_url = config
            .base_url()
            .context("Store URL not configured")?;

        let client = Client::builder()
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url,
            session_cookie: config
                .session_token
                .as_ref()
                .map(|token| format!("session={}", token)),
        })
    }

    fn with_session(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.session_cookie {
            Some(cookie) => request.header(header::COOKIE, cookie),
            None => request,
        }
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, StoreError> {
        let url = format!("{}{}", self.base_url, endpoint);

        let request = self.client
            .get(&url)
            .header(header::ACCEPT, "application/json");
        let response = self.with_session(request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Transport(format!("GET {} failed: {} - {}", endpoint, status, body)));
        }

        Ok(response.json::<T>().await?)
    }

    async fn post<T: DeserializeOwned, B: serde::Serialize>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, StoreError> {
        let url = format!("{}{}", self.base_url, endpoint);

        let request = self.client
            .post(&url)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "application/json")
            .json(body);
        let response = self.with_session(request).send().await?;

        decode_reply(endpoint, response).await
    }
}

/// The server answers refusals (400/403) with a JSON `{ok: false, error}`
/// body, so the body is decoded before the status is considered.
async fn decode_reply<T: DeserializeOwned>(endpoint: &str, response: Response) -> Result<T, StoreError> {
    let status = response.status();
    let body = response.text().await?;

    match serde_json::from_str::<T>(&body) {
        Ok(reply) => Ok(reply),
        Err(e) if status.is_success() => {
            warn!(endpoint, error = %e, "undecodable store reply");
            Err(StoreError::Malformed(e.to_string()))
        }
        Err(_) => Err(StoreError::Transport(format!("POST {} failed: {} - {}", endpoint, status, body))),
    }
}

#[async_trait]
impl ScheduleStore for StoreClient {
    async fn load_month(&self, month: YearMonth) -> Result<MonthSnapshot, StoreError> {
        debug!(%month, "loading month snapshot");
        self.get(&format!("/schedule/snapshot?m={}", month)).await
    }

    async fn save_cell(&self, request: &SaveCellRequest) -> Result<CellAck, StoreError> {
        let reply: SaveCellResponse = self.post("/schedule/save-one", request).await?;
        reply.into_ack()
    }

    async fn save_month(&self, request: &BulkSaveRequest) -> Result<BulkAck, StoreError> {
        let reply: BulkSaveResponse = self.post("/schedule/save", request).await?;
        reply.into_ack()
    }
}
