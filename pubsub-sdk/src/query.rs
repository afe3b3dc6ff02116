//! Ordered query parameters and the default query every request carries.

use pubsub_common::constants::query_keys::{REQUEST_ID, SDK, UUID};
use pubsub_common::encoding::encode_query;

use crate::client::config::Config;
use crate::telemetry::TelemetryManager;

/// SDK identifier sent as `pnsdk` on every request.
pub(crate) const SDK_IDENTIFIER: &str = concat!("PubSub-Rust/", env!("CARGO_PKG_VERSION"));

/// Insertion-ordered query parameters with unique keys.
///
/// [`QueryParams::set`] replaces an existing key in place, so merging several layers
/// (defaults, operation parameters, caller extras) is deterministic: the last writer wins and
/// the original position is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    /// Empty parameter list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace `key`.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.0.push((key, value)),
        }
        self
    }

    /// Insert `key` only if it is not present yet.
    pub fn set_if_absent(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let key = key.into();
        if !self.contains(&key) {
            self.0.push((key, value.into()));
        }
        self
    }

    /// Value of `key`, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Whether `key` is present.
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Remove `key`, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let index = self.0.iter().position(|(k, _)| k == key)?;
        Some(self.0.remove(index).1)
    }

    /// Overlay `other` onto `self`; every key of `other` wins.
    pub fn merge(&mut self, other: QueryParams) -> &mut Self {
        for (key, value) in other.0 {
            self.set(key, value);
        }
        self
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if there are no parameters.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over `(key, value)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Borrow the pairs as a slice.
    pub fn as_slice(&self) -> &[(String, String)] {
        &self.0
    }

    /// Percent-encoded `k=v&...` rendering, in order.
    pub fn to_query_string(&self) -> String {
        encode_query(self.iter())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for QueryParams {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut params = QueryParams::new();
        params.extend(iter);
        params
    }
}

impl<K: Into<String>, V: Into<String>> Extend<(K, V)> for QueryParams {
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        for (key, value) in iter {
            self.set(key, value);
        }
    }
}

/// Parameters every request carries, regardless of operation: `uuid`, `pnsdk`, a fresh
/// `requestid`, and the telemetry latency averages (`l_<op>`) when telemetry is enabled.
pub(crate) fn default_query(config: &Config, telemetry: &TelemetryManager) -> QueryParams {
    let mut query = QueryParams::new();
    query
        .set(UUID, config.user_id.as_str())
        .set(SDK, SDK_IDENTIFIER)
        .set(REQUEST_ID, uuid::Uuid::new_v4().to_string());
    query.extend(telemetry.query_params());
    query
}
