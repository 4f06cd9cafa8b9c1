//! orgplane engine: idempotency ledger, connection router, provisioning
//! state machine, self-registration, webhook routing and the identity token
//! bridge.

pub mod bridge;
pub mod config;
pub mod ledger;
pub mod provisioning;
pub mod registration;
pub mod router;
pub mod webhook;

pub use bridge::TokenBridge;
pub use config::EngineConfig;
pub use ledger::{BeginOutcome, IdempotencyLedger, SweepReport, spawn_janitor};
pub use provisioning::{Provisioner, ProvisioningQueue};
pub use registration::{
    RegistrationInput, RegistrationOutcome, RegistrationResult, RegistrationService,
    RegistrationStatus,
};
pub use router::ConnectionRouter;
pub use webhook::{Delivery, EventHandlers, HandlerOutcome, WebhookEnvelope, WebhookRouter};
