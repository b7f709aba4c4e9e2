//! Transport to the rental ledger.
//!
//! The reconciler talks to the server through the [`LedgerApi`] trait so
//! tests can substitute an in-process fake. [`HttpLedger`] is the real
//! implementation over the REST surface.

use crate::error::ApiFailure;
use async_trait::async_trait;
use atelier_engine::{
    ApiResponse, EntityKind, NewRental, ProbeOutcome, Rental, RentalPatch,
};
use std::time::Duration;

/// Header carrying the client-generated mutation id so replays are safe
/// to retry.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Default timeout for the active health probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default timeout for regular requests.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// The remote rental ledger as the reconciler sees it.
#[async_trait]
pub trait LedgerApi: Send + Sync {
    /// Active reachability check. Never errors: unreachable is an answer.
    async fn probe(&self) -> ProbeOutcome;

    async fn create_rental(
        &self,
        rental: &NewRental,
        idempotency_key: &str,
    ) -> Result<Rental, ApiFailure>;

    async fn update_rental(
        &self,
        id: i64,
        patch: &RentalPatch,
        idempotency_key: &str,
    ) -> Result<Rental, ApiFailure>;

    async fn cancel_rental(&self, id: i64, idempotency_key: &str) -> Result<(), ApiFailure>;

    /// Full pull of one collection for post-drain reconciliation.
    async fn fetch_collection(
        &self,
        entity: EntityKind,
    ) -> Result<Vec<serde_json::Value>, ApiFailure>;
}

/// HTTP implementation of [`LedgerApi`].
pub struct HttpLedger {
    base_url: String,
    bearer: Option<String>,
    http: reqwest::Client,
    probe_timeout: Duration,
}

impl HttpLedger {
    /// Build a transport for `base_url` (no trailing slash).
    pub fn new(base_url: impl Into<String>, bearer: Option<String>) -> Result<Self, ApiFailure> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ApiFailure::Transport(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            bearer,
            http,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        })
    }

    /// Override the probe timeout.
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.bearer {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// Send a request and unwrap the ledger's response envelope.
    async fn send_enveloped<T: serde::de::DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<T, ApiFailure> {
        let response = req
            .send()
            .await
            .map_err(|e| ApiFailure::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let envelope: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| ApiFailure::Transport(format!("malformed response: {e}")))?;

        if envelope.success {
            envelope.data.ok_or_else(|| ApiFailure::Rejected {
                status,
                message: "response envelope carried no data".to_string(),
            })
        } else {
            Err(ApiFailure::Rejected {
                status,
                message: envelope
                    .message
                    .or(envelope.error)
                    .unwrap_or_else(|| "request failed".to_string()),
            })
        }
    }
}

#[async_trait]
impl LedgerApi for HttpLedger {
    async fn probe(&self) -> ProbeOutcome {
        let result = self
            .http
            .get(self.url("/health"))
            .timeout(self.probe_timeout)
            .send()
            .await;
        match result {
            Ok(response) if response.status().is_success() => ProbeOutcome::Reachable,
            Ok(response) => {
                tracing::debug!(status = %response.status(), "health probe got non-success");
                ProbeOutcome::Unreachable
            }
            Err(e) => {
                tracing::debug!(error = %e, "health probe failed");
                ProbeOutcome::Unreachable
            }
        }
    }

    async fn create_rental(
        &self,
        rental: &NewRental,
        idempotency_key: &str,
    ) -> Result<Rental, ApiFailure> {
        let req = self
            .authed(self.http.post(self.url("/rentals")))
            .header(IDEMPOTENCY_HEADER, idempotency_key)
            .json(rental);
        self.send_enveloped(req).await
    }

    async fn update_rental(
        &self,
        id: i64,
        patch: &RentalPatch,
        idempotency_key: &str,
    ) -> Result<Rental, ApiFailure> {
        let req = self
            .authed(self.http.put(self.url(&format!("/rentals/{id}"))))
            .header(IDEMPOTENCY_HEADER, idempotency_key)
            .json(patch);
        self.send_enveloped(req).await
    }

    async fn cancel_rental(&self, id: i64, idempotency_key: &str) -> Result<(), ApiFailure> {
        let req = self
            .authed(self.http.delete(self.url(&format!("/rentals/{id}"))))
            .header(IDEMPOTENCY_HEADER, idempotency_key);
        // Cancel returns an envelope without a data payload.
        let response = req
            .send()
            .await
            .map_err(|e| ApiFailure::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let envelope: ApiResponse<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| ApiFailure::Transport(format!("malformed response: {e}")))?;
        if envelope.success {
            Ok(())
        } else {
            Err(ApiFailure::Rejected {
                status,
                message: envelope
                    .message
                    .or(envelope.error)
                    .unwrap_or_else(|| "request failed".to_string()),
            })
        }
    }

    async fn fetch_collection(
        &self,
        entity: EntityKind,
    ) -> Result<Vec<serde_json::Value>, ApiFailure> {
        let path = format!("/{}?limit=100", entity.collection());
        let req = self.authed(self.http.get(self.url(&path)));
        self.send_enveloped(req).await
    }
}
