use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::Serialize;
use tracing::info;

use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};
use crate::session::MapStyle;

/// The payload the export endpoint accepts: viewport center as a
/// `[lng, lat]` pair, an integer zoom, and the style classifier.
#[derive(Debug, Clone, Serialize)]
pub struct ExportRequest {
    pub center: [f64; 2],
    pub zoom: i32,
    #[serde(rename = "mapType")]
    pub map_type: MapStyle,
}

#[async_trait]
pub trait ExportClient: Send + Sync {
    async fn export(&self, request: &ExportRequest) -> AppResult<Vec<u8>>;
}

/// Posts export requests to the server-side renderer and streams the
/// image payload back.
#[derive(Clone)]
pub struct HttpExportClient {
    http: Client,
    endpoint: String,
}

impl HttpExportClient {
    pub fn new(config: &AppConfig) -> AppResult<Self> {
        let http = Client::builder()
            .user_agent(concat!("slopemap/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            endpoint: config.export_endpoint.clone(),
        })
    }
}

#[async_trait]
impl ExportClient for HttpExportClient {
    async fn export(&self, request: &ExportRequest) -> AppResult<Vec<u8>> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|err| AppError::ExportFailed(err.to_string()))?;

        if !response.status().is_success() {
            return Err(AppError::ExportFailed(format!(
                "server returned {}",
                response.status()
            )));
        }

        let mut stream = response.bytes_stream();
        let mut buffer = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|err| AppError::ExportFailed(err.to_string()))?;
            buffer.extend_from_slice(&chunk);
        }

        info!(bytes = buffer.len(), zoom = request.zoom, "map export downloaded");
        Ok(buffer)
    }
}
