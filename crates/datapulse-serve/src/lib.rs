//! Datapulse Serve - HTTP API for dataset popularity.
//!
//! Records dataset views and downloads into ClickHouse and ranks the most
//! popular datasets, enriched with metadata from an external CKAN-style
//! registry.
//!
//! # Authentication
//!
//! Mutating endpoints require `Authorization: Bearer <secret>` with the
//! shared secret from `DATAPULSE_SECRET_KEY`. The ranking endpoint is public.
//!
//! # Architecture
//!
//! - **AppState**: Shared state (event store, registry client, configuration)
//! - **Store**: [`EventStore`] trait with ClickHouse and in-memory backends
//! - **Registry**: [`MetadataSource`] trait with a CKAN client
//! - **Enrich**: Sequential, quota-bounded metadata enrichment
//! - **Routes**: Endpoint handlers

mod auth;
pub mod enrich;
mod error;
pub mod registry;
mod routes;
mod state;
pub mod store;

pub use self::auth::require_auth;
pub use self::error::ApiError;
pub use self::registry::{CkanRegistry, LookupError, MetadataSource};
pub use self::routes::{MAX_BODY_BYTES, cors_layer, router};
pub use self::state::{AppState, Config};
pub use self::store::{ClickHouseStore, EventStore, MemoryStore, StoreError};
