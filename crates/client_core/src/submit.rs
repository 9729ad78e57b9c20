use std::{
    fmt,
    str::FromStr,
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use chrono::{DateTime, Utc};
use reqwest::Client;
use shared::{
    domain::CustomerDetails,
    error::{ApiError, ErrorCode},
    protocol::OrderRequest,
};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::cart::CartModel;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// What to do when an order is submitted while another is still in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubmitPolicy {
    /// Let concurrent submissions race; nothing is deduplicated.
    Allow,
    /// Reject a submission while another one is awaiting the server.
    #[default]
    LockDuringSubmit,
}

impl FromStr for SubmitPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "allow" => Ok(Self::Allow),
            "lock" | "lock_during_submit" | "lock-during-submit" => Ok(Self::LockDuringSubmit),
            other => Err(format!(
                "unknown submit policy '{other}' (expected 'allow' or 'lock')"
            )),
        }
    }
}

impl fmt::Display for SubmitPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => f.write_str("allow"),
            Self::LockDuringSubmit => f.write_str("lock"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("sign in before placing an order")]
    Unauthenticated,
    #[error("an order is already being submitted")]
    InFlight,
    #[error("failed to encode order items: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("order submission failed: {message}")]
    Failed {
        status: Option<u16>,
        code: Option<ErrorCode>,
        message: String,
    },
}

impl SubmitError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Failed { status, .. } => *status,
            _ => None,
        }
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            Self::Failed { code, .. } => *code,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for SubmitError {
    fn from(value: reqwest::Error) -> Self {
        let status = value.status().map(|status| status.as_u16());
        Self::Failed {
            status,
            code: status.map(ErrorCode::from_status),
            message: value.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionReceipt {
    pub submitted_at: DateTime<Utc>,
    pub item_count: usize,
    pub total: u64,
    /// The cart changed while the request was pending; those changes were
    /// cleared along with the submitted items.
    pub discarded_edits: bool,
}

/// Sends the cart to the order endpoint and clears it once the server
/// confirms. The cart lock is only held while taking the snapshot and while
/// clearing, never across the request.
pub struct OrderSubmitter {
    http: Client,
    api_base: String,
    policy: SubmitPolicy,
    timeout: Duration,
    in_flight: AtomicBool,
}

struct InFlightGuard<'a>(Option<&'a AtomicBool>);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if let Some(flag) = self.0 {
            flag.store(false, Ordering::Release);
        }
    }
}

impl OrderSubmitter {
    pub fn new(api_base: impl Into<String>, policy: SubmitPolicy) -> Self {
        Self::with_client(Client::new(), api_base, policy)
    }

    pub fn with_client(http: Client, api_base: impl Into<String>, policy: SubmitPolicy) -> Self {
        Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            policy,
            timeout: DEFAULT_REQUEST_TIMEOUT,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn orders_url(&self) -> String {
        format!("{}/pedidos", self.api_base)
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub async fn submit(
        &self,
        cart: &Mutex<CartModel>,
        customer: &CustomerDetails,
        credential: Option<&str>,
    ) -> Result<SubmissionReceipt, SubmitError> {
        let Some(credential) = credential.map(str::trim).filter(|value| !value.is_empty()) else {
            warn!("order submission refused: no credential");
            return Err(SubmitError::Unauthenticated);
        };
        let _guard = self.begin()?;

        let items = cart.lock().await.snapshot();
        let request = OrderRequest::from_snapshot(customer, &items).map_err(SubmitError::Encode)?;

        if let Err(error) = self.send(&request, credential).await {
            warn!(
                %error,
                status = ?error.status(),
                total = request.total,
                "order submission failed; cart left unchanged"
            );
            return Err(error);
        }

        let discarded_edits = {
            let mut cart = cart.lock().await;
            let discarded_edits = cart.items() != items.as_slice();
            cart.clear().await;
            discarded_edits
        };
        if discarded_edits {
            warn!(
                submitted_items = items.len(),
                "cart changed while the order was pending; those changes were cleared"
            );
        }
        let receipt = SubmissionReceipt {
            submitted_at: Utc::now(),
            item_count: items.len(),
            total: request.total,
            discarded_edits,
        };
        info!(
            item_count = receipt.item_count,
            total = receipt.total,
            "order submitted; cart cleared"
        );
        Ok(receipt)
    }

    fn begin(&self) -> Result<InFlightGuard<'_>, SubmitError> {
        match self.policy {
            SubmitPolicy::Allow => Ok(InFlightGuard(None)),
            SubmitPolicy::LockDuringSubmit => {
                if self
                    .in_flight
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    warn!("order submission refused: another submission is in flight");
                    return Err(SubmitError::InFlight);
                }
                Ok(InFlightGuard(Some(&self.in_flight)))
            }
        }
    }

    async fn send(&self, request: &OrderRequest, credential: &str) -> Result<(), SubmitError> {
        let res = self
            .http
            .post(self.orders_url())
            .bearer_auth(credential)
            .json(request)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = res.status();
        if status.is_success() {
            return Ok(());
        }
        let body = res.text().await.unwrap_or_default();
        let api_error = ApiError::from_response(status.as_u16(), &body);
        Err(SubmitError::Failed {
            status: Some(status.as_u16()),
            code: Some(api_error.code),
            message: api_error.message,
        })
    }
}

#[cfg(test)]
#[path = "tests/submit_tests.rs"]
mod tests;
