//! Consul HTTP backend
//!
//! Implements `KvStore` over the agent's `/v1/kv` and `/v1/session` endpoints.

use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ConsulClientConfig;
use crate::constants::{
    CONSUL_SESSION_TTL_MAX, CONSUL_SESSION_TTL_MIN, TOKEN_HEADER, consul_api_path,
};
use crate::error::{Result, StoreError};
use crate::model::{KeyValue, PutOptions, SessionBehavior, SessionOptions};
use crate::store::KvStore;

/// KV pair as returned by `GET /v1/kv/<key>`
#[derive(Debug, Deserialize)]
struct KvPairDto {
    #[serde(rename = "Key")]
    key: String,
    #[serde(rename = "Value", default)]
    value: Option<String>, // Base64 encoded
    #[serde(rename = "ModifyIndex", default)]
    modify_index: u64,
    #[serde(rename = "LockIndex", default)]
    lock_index: u64,
    #[serde(rename = "Session", default)]
    session: Option<String>,
}

impl KvPairDto {
    fn into_key_value(self) -> Result<KeyValue> {
        let value = match self.value {
            Some(encoded) => {
                let bytes = BASE64
                    .decode(encoded.as_bytes())
                    .map_err(|e| StoreError::Decode(format!("value of '{}': {}", self.key, e)))?;
                String::from_utf8(bytes)
                    .map_err(|e| StoreError::Decode(format!("value of '{}': {}", self.key, e)))?
            }
            None => String::new(),
        };
        Ok(KeyValue {
            key: self.key,
            value,
            modify_index: self.modify_index,
            lock_index: self.lock_index,
            session: self.session,
        })
    }
}

/// Body of `PUT /v1/session/create`
#[derive(Debug, Serialize)]
struct SessionCreateBody<'a> {
    #[serde(rename = "Name", skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(rename = "TTL")]
    ttl: String,
    #[serde(rename = "Behavior")]
    behavior: SessionBehavior,
    #[serde(rename = "LockDelay", skip_serializing_if = "Option::is_none")]
    lock_delay: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SessionCreateResponse {
    #[serde(rename = "ID")]
    id: String,
}

/// `KvStore` backed by a Consul agent
pub struct ConsulKvClient {
    client: Client,
    config: ConsulClientConfig,
    base_url: Url,
}

impl ConsulKvClient {
    /// Create a new client. Does not contact the agent.
    pub fn new(config: ConsulClientConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.read_timeout_ms))
            .build()?;
        let base_url = Url::parse(&config.address)?;

        Ok(Self {
            client,
            config,
            base_url,
        })
    }

    /// Create a client for a single agent address with default settings
    pub fn from_address(address: &str) -> anyhow::Result<Self> {
        Self::new(ConsulClientConfig::new(address))
    }

    pub fn config(&self) -> &ConsulClientConfig {
        &self.config
    }

    /// Build a full URL from an API path and an optional trailing key
    fn build_url(&self, path: &str, key: Option<&str>) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                StoreError::Other(anyhow::anyhow!(
                    "address '{}' cannot be a base URL",
                    self.config.address
                ))
            })?;
            segments.pop_if_empty();
            segments.extend(path.trim_start_matches('/').split('/'));
            if let Some(key) = key {
                segments.extend(key.trim_start_matches('/').split('/'));
            }
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let mut builder = self.client.request(method, url);
        if let Some(token) = &self.config.token {
            builder = builder.header(TOKEN_HEADER, token);
        }
        if let Some(dc) = &self.config.datacenter {
            builder = builder.query(&[("dc", dc)]);
        }
        builder
    }
}

/// Turn non-2xx responses into `StoreError::Status`
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        let body = response.text().await.unwrap_or_default();
        Err(StoreError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl KvStore for ConsulKvClient {
    async fn get(&self, key: &str) -> Result<Option<KeyValue>> {
        let url = self.build_url(consul_api_path::KV, Some(key))?;
        let response = self.request(Method::GET, url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let pairs: Vec<KvPairDto> = check_status(response).await?.json().await?;
        pairs
            .into_iter()
            .next()
            .map(KvPairDto::into_key_value)
            .transpose()
    }

    async fn put(&self, key: &str, value: &str, options: &PutOptions) -> Result<bool> {
        let url = self.build_url(consul_api_path::KV, Some(key))?;

        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(session_id) = &options.acquire_session {
            query.push(("acquire", session_id.clone()));
        }
        if let Some(session_id) = &options.release_session {
            query.push(("release", session_id.clone()));
        }
        if let Some(cas) = options.cas_index {
            query.push(("cas", cas.to_string()));
        }

        debug!("PUT kv '{}' with {:?}", key, query);

        let response = self
            .request(Method::PUT, url)
            .query(&query)
            .body(value.to_string())
            .send()
            .await?;
        let body = check_status(response).await?.text().await?;

        match body.trim() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(StoreError::Decode(format!(
                "expected true/false from kv put, got '{}'",
                other
            ))),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let url = self.build_url(consul_api_path::KV, Some(key))?;
        let response = self.request(Method::DELETE, url).send().await?;
        check_status(response).await?;
        Ok(())
    }

    async fn create_session(&self, options: &SessionOptions) -> Result<String> {
        if !(CONSUL_SESSION_TTL_MIN..=CONSUL_SESSION_TTL_MAX).contains(&options.ttl) {
            return Err(StoreError::InvalidRequest(format!(
                "session TTL {:?} outside Consul's range of {:?} to {:?}",
                options.ttl, CONSUL_SESSION_TTL_MIN, CONSUL_SESSION_TTL_MAX
            )));
        }

        let url = self.build_url(consul_api_path::SESSION_CREATE, None)?;
        let body = SessionCreateBody {
            name: options.name.as_deref(),
            ttl: format!("{}s", options.ttl.as_secs()),
            behavior: options.behavior,
            lock_delay: options
                .lock_delay
                .map(|delay| format!("{}ms", delay.as_millis())),
        };

        let response = self.request(Method::PUT, url).json(&body).send().await?;
        let created: SessionCreateResponse = check_status(response).await?.json().await?;

        debug!("Created Consul session {}", created.id);
        Ok(created.id)
    }

    async fn renew_session(&self, session_id: &str) -> Result<bool> {
        let url = self.build_url(consul_api_path::SESSION_RENEW, Some(session_id))?;
        let response = self.request(Method::PUT, url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        check_status(response).await?;
        Ok(true)
    }
}
