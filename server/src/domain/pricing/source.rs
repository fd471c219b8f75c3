//! Price table sources

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use super::{PriceTable, PricingError};

const HTTP_TIMEOUT_SECS: u64 = 30;

#[async_trait]
pub trait PricingSource: Send + Sync {
    /// Short label for logs.
    fn name(&self) -> &str;

    async fn fetch(&self) -> Result<PriceTable, PricingError>;
}

/// LiteLLM JSON served over HTTP.
pub struct HttpPricingSource {
    url: String,
    client: reqwest::Client,
}

impl HttpPricingSource {
    pub fn new(url: impl Into<String>) -> Result<Self, PricingError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .user_agent(concat!("agtrace/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl PricingSource for HttpPricingSource {
    fn name(&self) -> &str {
        &self.url
    }

    async fn fetch(&self) -> Result<PriceTable, PricingError> {
        let resp = self.client.get(&self.url).send().await?;
        if !resp.status().is_success() {
            return Err(PricingError::Status(resp.status().as_u16()));
        }
        let text = resp.text().await?;
        PriceTable::from_litellm_json(&text)
    }
}

/// LiteLLM JSON on local disk.
#[derive(Debug, Clone)]
pub struct FilePricingSource {
    path: PathBuf,
    label: String,
}

impl FilePricingSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let label = path.display().to_string();
        Self { path, label }
    }
}

#[async_trait]
impl PricingSource for FilePricingSource {
    fn name(&self) -> &str {
        &self.label
    }

    async fn fetch(&self) -> Result<PriceTable, PricingError> {
        let json = tokio::fs::read_to_string(&self.path).await?;
        PriceTable::from_litellm_json(&json)
    }
}

/// Fixed in-memory table.
#[derive(Debug, Clone, Default)]
pub struct StaticPricingSource {
    table: PriceTable,
}

impl StaticPricingSource {
    pub fn new(table: PriceTable) -> Self {
        Self { table }
    }
}

#[async_trait]
impl PricingSource for StaticPricingSource {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch(&self) -> Result<PriceTable, PricingError> {
        Ok(self.table.clone())
    }
}
