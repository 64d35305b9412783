// crates/core/src/sink.rs
//! Pluggable delivery boundary for progress payloads.
//!
//! Two strategies behind one trait: a fire-and-forget POST, and a
//! redirect-aware POST that follows 307s within a bounded budget. The
//! redirect-aware variant exists because the scheduler may sit behind a
//! load balancer that redirects progress posts to the node currently
//! owning the job's state; the sink follows that redirect and falls back
//! to the default URL once the target goes stale.

use async_trait::async_trait;
use reqwest::header::LOCATION;
use reqwest::{Client, StatusCode, Url};

use crate::error::DeliveryError;
use crate::record::ProgressPayload;

/// Transport boundary the updater delegates to. Mutated only from the
/// updater task's single send path, so implementations need no locking
/// around their own state.
#[async_trait]
pub trait DeliverySink: Send {
    async fn send(&mut self, payload: &ProgressPayload) -> Result<(), DeliveryError>;
}

/// One POST to the callback URL; success is exactly HTTP 202.
pub struct SimpleSink {
    client: Client,
    callback_url: Url,
}

impl SimpleSink {
    pub fn new(client: Client, callback_url: Url) -> Self {
        Self {
            client,
            callback_url,
        }
    }
}

#[async_trait]
impl DeliverySink for SimpleSink {
    async fn send(&mut self, payload: &ProgressPayload) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(self.callback_url.clone())
            .json(payload)
            .send()
            .await
            .map_err(|source| DeliveryError::Network { source })?;

        match response.status() {
            StatusCode::ACCEPTED => Ok(()),
            status => Err(DeliveryError::UnexpectedStatus {
                status: status.as_u16(),
            }),
        }
    }
}

/// Redirect-aware POST with a bounded follow budget and URL fallback.
///
/// Keeps a *current* URL, initialized to the default callback URL. A 202
/// leaves the current URL in place for the next send; a 307 swaps in the
/// `Location` target and retries; anything else (any other status, network
/// error, exhausted budget) fails the send and resets the current URL to
/// the default so a one-time redirect never pins the sink to a stale
/// endpoint.
///
/// The supplied client must have redirect following disabled
/// (`redirect::Policy::none()`) so the 307 is visible here.
pub struct RedirectSink {
    client: Client,
    default_url: Url,
    current_url: Url,
    max_redirect_follow: u32,
}

impl RedirectSink {
    pub fn new(client: Client, default_url: Url, max_redirect_follow: u32) -> Self {
        Self {
            client,
            current_url: default_url.clone(),
            default_url,
            max_redirect_follow,
        }
    }

    pub fn current_url(&self) -> &Url {
        &self.current_url
    }

    fn fail(&mut self, error: DeliveryError) -> DeliveryError {
        self.current_url = self.default_url.clone();
        error
    }
}

#[async_trait]
impl DeliverySink for RedirectSink {
    async fn send(&mut self, payload: &ProgressPayload) -> Result<(), DeliveryError> {
        let max_attempts = self.max_redirect_follow + 1;

        for _attempt in 0..max_attempts {
            let response = match self
                .client
                .post(self.current_url.clone())
                .json(payload)
                .send()
                .await
            {
                Ok(r) => r,
                Err(source) => return Err(self.fail(DeliveryError::Network { source })),
            };

            match response.status() {
                StatusCode::ACCEPTED => return Ok(()),
                StatusCode::TEMPORARY_REDIRECT => {
                    let location = match response
                        .headers()
                        .get(LOCATION)
                        .and_then(|v| v.to_str().ok())
                    {
                        Some(l) => l.to_string(),
                        None => return Err(self.fail(DeliveryError::MissingLocation)),
                    };
                    // Location may be relative; resolve against the URL we
                    // just posted to.
                    let target = match self.current_url.join(&location) {
                        Ok(url) => url,
                        Err(_) => {
                            return Err(self.fail(DeliveryError::InvalidLocation { location }))
                        }
                    };
                    tracing::debug!(target = %target, "following progress callback redirect");
                    self.current_url = target;
                }
                status => {
                    return Err(self.fail(DeliveryError::UnexpectedStatus {
                        status: status.as_u16(),
                    }))
                }
            }
        }

        Err(self.fail(DeliveryError::RedirectBudgetExhausted {
            attempts: max_attempts,
        }))
    }
}
