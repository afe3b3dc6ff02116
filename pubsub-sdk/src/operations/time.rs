//! Server time.

use serde_json::Value;

use crate::endpoint::response::parse_json;
use crate::endpoint::{Endpoint, EndpointBase, OperationType, impl_common_options};
use crate::errors::{Error, Result, ValidationError};
use crate::{PubSubClient, StatusMetadata};

/// Fetch the service's current timetoken. Needs no keys.
#[derive(Debug, Clone)]
pub struct Time {
    base: EndpointBase,
}

/// Response of [`Time`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeResult {
    /// Current time as a 17-digit timetoken (100 ns units since the unix epoch).
    pub timetoken: u64,
}

impl Time {
    pub(crate) fn new(client: PubSubClient) -> Self {
        Self {
            base: EndpointBase::new(client),
        }
    }
}

impl_common_options!(Time);

impl Endpoint for Time {
    type Response = TimeResult;

    fn base(&self) -> &EndpointBase {
        &self.base
    }

    fn operation(&self) -> OperationType {
        OperationType::Time
    }

    fn validate(&self) -> std::result::Result<(), ValidationError> {
        Ok(())
    }

    fn build_path(&self) -> std::result::Result<String, ValidationError> {
        Ok("/time/0".to_string())
    }

    fn is_auth_required(&self) -> bool {
        false
    }

    fn parse_response(&self, body: &[u8], status: &StatusMetadata) -> Result<TimeResult> {
        let items: Vec<Value> = parse_json(self.operation(), body, status)?;
        items
            .first()
            .and_then(super::timetoken)
            .map(|timetoken| TimeResult { timetoken })
            .ok_or_else(|| Error::parsing(self.operation(), body, "expected [timetoken]"))
    }
}

impl PubSubClient {
    /// Server time.
    pub fn time(&self) -> Time {
        Time::new(self.clone())
    }
}
