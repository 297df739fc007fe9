use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::SecretString;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};

/// Credentials handed back by the maps-config endpoint. Either field
/// may be absent; bootstrap only needs one of them.
#[derive(Clone)]
pub struct MapCredentials {
    pub client_id: Option<String>,
    pub subscription_key: Option<SecretString>,
}

/// How the host should authenticate the embedded map. The client id
/// wins over the subscription key when both are returned.
#[derive(Clone)]
pub enum AuthMethod {
    ClientId(String),
    SubscriptionKey(SecretString),
}

impl MapCredentials {
    pub fn is_usable(&self) -> bool {
        self.client_id.is_some() || self.subscription_key.is_some()
    }

    pub fn preferred_auth(&self) -> Option<AuthMethod> {
        if let Some(id) = self.client_id.clone() {
            return Some(AuthMethod::ClientId(id));
        }
        self.subscription_key.clone().map(AuthMethod::SubscriptionKey)
    }
}

#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn fetch(&self) -> AppResult<MapCredentials>;
}

/// The two SDK resources bootstrap acquires, in load order: the map
/// engine first, then its drawing extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdkResource {
    MapControl,
    DrawingModule,
}

impl SdkResource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SdkResource::MapControl => "map_control",
            SdkResource::DrawingModule => "drawing_module",
        }
    }
}

#[async_trait]
pub trait ResourceLoader: Send + Sync {
    async fn acquire(&self, resource: SdkResource) -> AppResult<()>;
}

/// Fetches credentials from the maps-config endpoint.
#[derive(Clone)]
pub struct HttpCredentialSource {
    http: Client,
    endpoint: String,
}

#[derive(Deserialize)]
struct CredentialsResponse {
    #[serde(rename = "clientId")]
    client_id: Option<String>,
    #[serde(rename = "subscriptionKey")]
    subscription_key: Option<String>,
}

impl HttpCredentialSource {
    pub fn new(config: &AppConfig) -> AppResult<Self> {
        Ok(Self {
            http: build_http_client(config)?,
            endpoint: config.maps_config_endpoint.clone(),
        })
    }
}

#[async_trait]
impl CredentialSource for HttpCredentialSource {
    async fn fetch(&self) -> AppResult<MapCredentials> {
        debug!(endpoint = %self.endpoint, "fetching map credentials");
        let response: CredentialsResponse = self
            .http
            .get(&self.endpoint)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(MapCredentials {
            client_id: response.client_id.filter(|v| !v.trim().is_empty()),
            subscription_key: response
                .subscription_key
                .filter(|v| !v.trim().is_empty())
                .map(SecretString::from),
        })
    }
}

/// Pulls the SDK scripts over HTTP so the host can inject them.
#[derive(Clone)]
pub struct HttpResourceLoader {
    http: Client,
    map_control_url: String,
    drawing_module_url: String,
}

impl HttpResourceLoader {
    pub fn new(config: &AppConfig) -> AppResult<Self> {
        Ok(Self {
            http: build_http_client(config)?,
            map_control_url: config.map_control_url.clone(),
            drawing_module_url: config.drawing_module_url.clone(),
        })
    }

    fn url_for(&self, resource: SdkResource) -> &str {
        match resource {
            SdkResource::MapControl => &self.map_control_url,
            SdkResource::DrawingModule => &self.drawing_module_url,
        }
    }
}

#[async_trait]
impl ResourceLoader for HttpResourceLoader {
    async fn acquire(&self, resource: SdkResource) -> AppResult<()> {
        let url = self.url_for(resource);
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|err| AppError::ResourceLoadFailed(format!("{}: {err}", resource.as_str())))?;

        if !response.status().is_success() {
            return Err(AppError::ResourceLoadFailed(format!(
                "{}: server returned {}",
                resource.as_str(),
                response.status()
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| AppError::ResourceLoadFailed(format!("{}: {err}", resource.as_str())))?;
        if body.is_empty() {
            return Err(AppError::ResourceLoadFailed(format!(
                "{}: empty script body",
                resource.as_str()
            )));
        }

        info!(resource = resource.as_str(), bytes = body.len(), "sdk resource acquired");
        Ok(())
    }
}

fn build_http_client(config: &AppConfig) -> AppResult<Client> {
    let client = Client::builder()
        .user_agent(concat!("slopemap/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(config.http_timeout_secs))
        .build()?;
    Ok(client)
}
