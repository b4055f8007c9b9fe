//! HTTP lookup against the FSA `Establishments` search endpoint.

use std::time::Duration;

use async_trait::async_trait;
use ratelink_core::{Candidate, Lookup, LookupError, LookupResponse};
use reqwest::header::ACCEPT;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "http://api.ratings.food.gov.uk";
const API_VERSION: &str = "2";

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },
}

/// Connection settings for [`RatingsClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Service root, e.g. `http://api.ratings.food.gov.uk` (no trailing slash needed).
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Deserialize)]
struct EstablishmentsPage {
    establishments: Vec<Value>,
}

/// Client for the ratings service's establishment search.
pub struct RatingsClient {
    client: reqwest::Client,
    base_url: String,
}

impl RatingsClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn request(&self, name: &str, postcode: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/Establishments", self.base_url);
        self.client
            .get(url)
            .query(&[("name", name), ("address", postcode)])
            .header(ACCEPT, "application/json")
            .header("x-api-version", API_VERSION)
    }

    /// Search by name and postcode.
    ///
    /// Only transport failures and non-success statuses are errors; a body
    /// that is not an establishment list comes back as
    /// [`LookupResponse::Unparsable`].
    pub async fn search(&self, name: &str, postcode: &str) -> Result<LookupResponse, ClientError> {
        debug!(name, postcode, "searching establishments");
        let resp = self.request(name, postcode).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::Server {
                status: status.as_u16(),
                body,
            });
        }

        let body = resp.text().await?;
        let response = parse_establishments(&body);
        if let LookupResponse::Establishments(found) = &response {
            debug!(name, postcode, count = found.len(), "search complete");
        }
        Ok(response)
    }
}

#[async_trait]
impl Lookup for RatingsClient {
    async fn lookup(&self, name: &str, postcode: &str) -> Result<LookupResponse, LookupError> {
        self.search(name, postcode)
            .await
            .map_err(LookupError::transport)
    }
}

/// Decode a search response body. Entries that are not JSON objects are dropped.
pub fn parse_establishments(body: &str) -> LookupResponse {
    let page: EstablishmentsPage = match serde_json::from_str(body) {
        Ok(page) => page,
        Err(err) => return LookupResponse::Unparsable(err.to_string()),
    };

    let total = page.establishments.len();
    let candidates: Vec<Candidate> = page
        .establishments
        .into_iter()
        .filter_map(Candidate::from_value)
        .collect();
    if candidates.len() < total {
        warn!(dropped = total - candidates.len(), "ignored non-object establishments");
    }
    LookupResponse::Establishments(candidates)
}
