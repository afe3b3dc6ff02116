#![doc = include_str!("../README.md")]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

mod macros;

mod auth;
mod client;
mod context;
mod endpoint;
pub mod errors;
pub mod operations;
mod query;
pub mod subscribe;
mod telemetry;
pub mod transport;

#[cfg(test)]
mod testing;

pub mod prelude;

// --- PUBLIC API EXPORTS ---
// Client handle and configuration
pub use client::config::Config;
pub use client::core::{PubSubClient, PubSubClientBuilder};
// Endpoint contract and executor
pub use endpoint::status::{ExecutionError, ExecutionResult, Executed, StatusCategory, StatusMetadata};
pub use endpoint::{Endpoint, EndpointBase, HttpMethod, OperationType, execute};
// Shared collaborators
pub use auth::{CredentialSource, TokenManager};
pub use context::{CancelReason, Context};
pub use query::QueryParams;
pub use telemetry::TelemetryManager;
pub use transport::{ReqwestTransport, Transport, TransportRequest, TransportResponse};

// Error and result types
pub use errors::{BuildError, Error, Result, TransportError, ValidationError};

// Re-exports
pub use pubsub_common::{
    permissions::{Permission, PermissionSet, Ttl},
    token::{ResourceType, Token, TokenResources},
};
pub use tokio_util::sync::CancellationToken;
