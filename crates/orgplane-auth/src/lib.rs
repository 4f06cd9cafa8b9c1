//! orgplane auth: foreign credential verification, downstream token
//! minting, password hashing and webhook signatures.

pub mod config;
pub mod error;
pub mod password;
pub mod signature;
pub mod token;
pub mod verifier;

pub use config::AuthConfig;
pub use error::AuthError;
pub use token::{DownstreamClaims, TokenType};
pub use verifier::{CredentialVerifier, SessionLookup, VerifierChain, VerifierOutcome};
