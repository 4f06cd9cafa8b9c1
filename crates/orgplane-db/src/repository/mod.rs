//! SurrealDB repository implementations.

mod idempotency;
mod tenant;
mod user;

pub use idempotency::SurrealIdempotencyRepository;
pub use tenant::SurrealTenantRepository;
pub use user::SurrealGlobalUserRepository;
