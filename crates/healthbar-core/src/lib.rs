//! Health Bar core library.
//!
//! Shared building blocks for the Health Bar backend: the domain model, the
//! JSON response envelope, credential handling, the trust boundary between
//! the gateway and the backend services, persistence, the access guard and
//! the prescription blob store.
//!
//! # Modules
//!
//! - [`model`]: users, profiles, access grants, visits and prescriptions
//! - [`envelope`]: the `{success, message, data, error}` response shape
//! - [`error`]: API errors and their HTTP mapping
//! - [`config`]: service configuration (TOML file, environment, CLI)
//! - [`logging`]: tracing initialisation and request logging
//! - [`credentials`]: bearer token issuance/verification and password hashing
//! - [`trust`]: the identity propagator and the [`trust::AuthContext`]
//!   extractor
//! - [`store`]: `SQLite` persistence and repositories
//! - [`permissions`]: the doctor access grant store
//! - [`guard`]: per-request access decisions
//! - [`blob`]: on-disk storage for uploaded prescription files
//! - [`extract`]: request extractors that reject with the envelope shape

pub mod blob;
pub mod config;
pub mod credentials;
pub mod envelope;
pub mod error;
pub mod extract;
pub mod guard;
pub mod logging;
pub mod model;
pub mod permissions;
pub mod store;
pub mod trust;

pub use envelope::ApiResponse;
pub use error::ApiError;
pub use model::Role;
