//! Signed identity-provider webhooks, deduplicated through the ledger.
//!
//! Order matters: the signature is checked and the payload parsed before
//! the ledger is touched, so forged or malformed deliveries never claim a
//! key.

pub mod events;
pub mod handlers;

use std::sync::Arc;

use chrono::Utc;
use orgplane_auth::AuthConfig;
use orgplane_auth::signature::{self, SignedEnvelope};
use orgplane_core::error::{PlaneError, PlaneResult};
use orgplane_core::models::idempotency::IdempotencyKey;
use orgplane_core::repository::{GlobalUserRepository, IdempotencyRepository, TenantRepository};
use serde_json::{Value, json};
use tracing::{error, info, warn};

use crate::ledger::{BeginOutcome, IdempotencyLedger};
use events::{EventPayload, IdentityEvent};
pub use handlers::{EventHandlers, HandlerOutcome};

/// One delivery as received over HTTP.
#[derive(Debug, Clone, Default)]
pub struct WebhookEnvelope {
    pub id: String,
    pub timestamp: String,
    pub signature: String,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Processed(HandlerOutcome),
    /// Stored outcome of an earlier delivery of the same event.
    Replayed(Value),
    /// Another delivery of the same event is still being handled.
    InFlight,
}

impl Delivery {
    /// Response body. Object outcomes are flattened next to `success`.
    pub fn to_json(&self) -> Value {
        let (mut body, cached) = match self {
            Delivery::Processed(outcome) => (
                serde_json::to_value(outcome).unwrap_or(Value::Null),
                false,
            ),
            Delivery::Replayed(value) => (value.clone(), true),
            Delivery::InFlight => (
                json!({ "action": "duplicate", "reason": "already_processing" }),
                false,
            ),
        };
        match body.as_object_mut() {
            Some(map) => {
                map.insert("success".into(), Value::Bool(true));
                if cached {
                    map.insert("cached".into(), Value::Bool(true));
                }
                body
            }
            None => json!({ "success": true, "cached": cached, "result": body }),
        }
    }
}

pub struct WebhookRouter<T, U, R>
where
    T: TenantRepository,
    U: GlobalUserRepository,
    R: IdempotencyRepository,
{
    handlers: EventHandlers<T, U>,
    ledger: Arc<IdempotencyLedger<R>>,
    auth: Arc<AuthConfig>,
}

impl<T, U, R> WebhookRouter<T, U, R>
where
    T: TenantRepository,
    U: GlobalUserRepository,
    R: IdempotencyRepository,
{
    pub fn new(
        handlers: EventHandlers<T, U>,
        ledger: Arc<IdempotencyLedger<R>>,
        auth: Arc<AuthConfig>,
    ) -> Self {
        Self {
            handlers,
            ledger,
            auth,
        }
    }

    pub async fn handle(&self, envelope: &WebhookEnvelope) -> PlaneResult<Delivery> {
        signature::verify(
            &self.auth.webhook_secret,
            &SignedEnvelope {
                id: &envelope.id,
                timestamp: &envelope.timestamp,
                signature: &envelope.signature,
            },
            &envelope.payload,
            self.auth.webhook_tolerance_secs,
            Utc::now().timestamp(),
        )?;

        let payload = EventPayload::parse(&envelope.payload)?;
        let event_type = payload.event_type.clone();
        let event = IdentityEvent::from_payload(payload)?;
        let key = IdempotencyKey::webhook(&event_type, &envelope.id);

        match self.ledger.begin(&key).await? {
            BeginOutcome::Started => {}
            BeginOutcome::AlreadyCompleted(result) => {
                info!(event_type = %event_type, event_id = %envelope.id, "Replaying handled event");
                return Ok(Delivery::Replayed(result));
            }
            BeginOutcome::AlreadyProcessing => {
                info!(event_type = %event_type, event_id = %envelope.id, "Event already in flight");
                return Ok(Delivery::InFlight);
            }
            BeginOutcome::PreviouslyFailed(reason) => {
                warn!(event_type = %event_type, event_id = %envelope.id, "Replaying failed event");
                return Err(PlaneError::Internal(format!(
                    "event {} previously failed: {reason}",
                    envelope.id
                )));
            }
        }

        info!(event_type = %event_type, event_id = %envelope.id, "Handling event");
        match self.handlers.dispatch(event).await {
            Ok(outcome) => {
                let stored = serde_json::to_value(&outcome)
                    .map_err(|e| PlaneError::Internal(format!("outcome encoding: {e}")))?;
                self.ledger.complete(&key, &stored).await?;
                Ok(Delivery::Processed(outcome))
            }
            Err(e) => {
                error!(event_type = %event_type, event_id = %envelope.id, error = %e, "Event handler failed");
                // Handlers are idempotent, so a storage hiccup lets the
                // provider's retry start over.
                let recorded = if e.is_transient() {
                    self.ledger.release(&key).await
                } else {
                    self.ledger.fail(&key, &e.to_string()).await
                };
                if let Err(ledger_err) = recorded {
                    error!(key = %key, error = %ledger_err, "Could not record event failure");
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replay_is_flagged_cached() {
        let body = Delivery::Replayed(json!({ "action": "user_created" })).to_json();
        assert_eq!(body["cached"], true);
        assert_eq!(body["action"], "user_created");
        assert_eq!(body["success"], true);
    }

    #[test]
    fn in_flight_reports_duplicate() {
        let body = Delivery::InFlight.to_json();
        assert_eq!(body["action"], "duplicate");
        assert_eq!(body["reason"], "already_processing");
    }
}
