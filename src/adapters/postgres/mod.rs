//! PostgreSQL adapters - Database implementations for repository ports.
//!
//! - `PostgresSubscriptionRepository` - one row per user, compare-and-swap on `revision`

mod subscription_repository;

pub use subscription_repository::PostgresSubscriptionRepository;
