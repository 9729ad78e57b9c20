use std::time::Duration;

use reqwest::Client;
use shared::protocol::{CatalogPayload, CatalogProduct};
use thiserror::Error;
use tracing::{error, info};

use crate::submit::DEFAULT_REQUEST_TIMEOUT;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to load catalog: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("catalog endpoint responded with status {0}")]
    Status(u16),
}

/// Read-only access to the product listing.
pub struct CatalogClient {
    http: Client,
    api_base: String,
    timeout: Duration,
}

impl CatalogClient {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self::with_client(Client::new(), api_base)
    }

    pub fn with_client(http: Client, api_base: impl Into<String>) -> Self {
        Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn products_url(&self) -> String {
        format!("{}/productos", self.api_base)
    }

    pub async fn fetch(&self) -> Result<Vec<CatalogProduct>, CatalogError> {
        let res = self
            .http
            .get(self.products_url())
            .timeout(self.timeout)
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(CatalogError::Status(res.status().as_u16()));
        }
        let payload: CatalogPayload = res.json().await?;
        Ok(payload.into_products())
    }

    /// Catalog failures never reach the cart: they are logged and the
    /// listing is shown empty.
    pub async fn load_or_empty(&self) -> Vec<CatalogProduct> {
        match self.fetch().await {
            Ok(products) => {
                info!(product_count = products.len(), "catalog loaded");
                products
            }
            Err(err) => {
                error!(error = %err, url = %self.products_url(), "catalog load failed");
                Vec::new()
            }
        }
    }
}
