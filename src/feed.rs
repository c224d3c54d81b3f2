use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::KiraError;

pub trait CatalogFeed: Send + Sync {
    fn fetch_available(&self) -> Result<Option<Vec<FeedEntry>>, KiraError>;
}

impl<T: CatalogFeed + ?Sized> CatalogFeed for Box<T> {
    fn fetch_available(&self) -> Result<Option<Vec<FeedEntry>>, KiraError> {
        (**self).fetch_available()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedMeta {
    pub identity_hash: String,
    #[serde(default)]
    pub notes: String,
    pub short_name: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub index_version: String,
    #[serde(default)]
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEntry {
    pub meta: FeedMeta,
    pub url: String,
}

#[derive(Clone)]
pub struct HttpCatalogFeed {
    client: Client,
    url: String,
}

impl HttpCatalogFeed {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, KiraError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("kira-reflib/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| KiraError::CatalogHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| KiraError::CatalogHttp(err.to_string()))?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

impl CatalogFeed for HttpCatalogFeed {
    fn fetch_available(&self) -> Result<Option<Vec<FeedEntry>>, KiraError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .map_err(|err| KiraError::CatalogHttp(err.to_string()))?;
        if response.status() != StatusCode::OK {
            warn!(url = %self.url, status = %response.status(), "reference feed unavailable");
            return Ok(None);
        }
        let body = response
            .text()
            .map_err(|err| KiraError::CatalogHttp(err.to_string()))?;
        let entries = parse_feed(&body)?;
        debug!(url = %self.url, entries = entries.len(), "fetched reference feed");
        Ok(Some(entries))
    }
}

pub fn parse_feed(body: &str) -> Result<Vec<FeedEntry>, KiraError> {
    serde_json::from_str(body).map_err(|err| KiraError::CatalogParse(err.to_string()))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoFeed;

impl CatalogFeed for NoFeed {
    fn fetch_available(&self) -> Result<Option<Vec<FeedEntry>>, KiraError> {
        Ok(None)
    }
}
