//! Common imports for quick starts.

// Common
pub use crate::{BuildError, Error, Result};

// Client
pub use crate::{Config, PubSubClient, PubSubClientBuilder};

// Executing requests
pub use crate::{Context, Endpoint, Executed, ExecutionResult, StatusCategory, StatusMetadata};

// Long-lived subscriptions
pub use crate::subscribe::{RetryPolicy, SubscribeEvent, Subscriber};

// Access management
pub use crate::{Permission, PermissionSet, ResourceType, Token, Ttl};
