//! orgplane core: domain models, repository traits, downstream
//! collaborator contracts, slug derivation and the shared error type.

pub mod downstream;
pub mod error;
pub mod models;
pub mod repository;
pub mod slug;

pub use error::{PlaneError, PlaneResult};
