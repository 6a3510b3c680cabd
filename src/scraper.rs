use async_trait::async_trait;
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::{Client, Response};
use std::time::Duration;

use crate::error::Result;
use crate::fetcher::{classify_reqwest_error, classify_status, FetchOutcome};

/// Direct-URL HTTP source for collection pages and their artwork.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, url: &str) -> FetchOutcome<String>;

    async fn fetch_bytes(&self, url: &str) -> FetchOutcome<Vec<u8>>;
}

pub struct CollectionScraper {
    client: Client,
}

impl CollectionScraper {
    /// `timeout` is the client-side ceiling; callers still wrap every attempt
    /// in their own retry policy timeout.
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,*/*;q=0.8"),
        );
        if let Ok(ua) = HeaderValue::from_str(user_agent) {
            headers.insert(USER_AGENT, ua);
        }

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .cookie_store(true)
            .build()?;

        Ok(Self::from_client(client))
    }

    pub fn from_client(client: Client) -> Self {
        CollectionScraper { client }
    }

    async fn get(&self, url: &str) -> FetchOutcome<Response> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        let status = resp.status();
        debug!("GET {} -> {}", url, status);
        match classify_status(status.as_u16()) {
            Some(err) => Err(err),
            None => Ok(resp),
        }
    }
}

#[async_trait]
impl PageSource for CollectionScraper {
    async fn fetch_page(&self, url: &str) -> FetchOutcome<String> {
        let resp = self.get(url).await?;
        resp.text().await.map_err(|e| classify_reqwest_error(&e))
    }

    async fn fetch_bytes(&self, url: &str) -> FetchOutcome<Vec<u8>> {
        let resp = self.get(url).await?;
        let bytes = resp.bytes().await.map_err(|e| classify_reqwest_error(&e))?;
        Ok(bytes.to_vec())
    }
}
