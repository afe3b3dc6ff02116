//! Access-manager v3 tokens.
//!
//! A token is a base64url-encoded CBOR map issued by the grant-token endpoint:
//!
//! ```text
//! { "v": 2, "t": <issued at, unix seconds>, "ttl": <minutes>,
//!   "res": { "chan": {name: bits}, "grp": {..}, "uuid": {..} },
//!   "pat": { "chan": {regex: bits}, "grp": {..}, "uuid": {..} },
//!   "meta": {..}, "uuid": <authorized uuid>, "sig": <bytes> }
//! ```
//!
//! The client never verifies the signature; it only needs to know which resources a token
//! covers so it can pick the right credential for a request.

use std::collections::BTreeMap;

use base64::{
    Engine,
    engine::general_purpose::{URL_SAFE_NO_PAD, STANDARD_NO_PAD},
};
use serde_cbor::Value;

use crate::permissions::PermissionSet;

/// The kind of resource a permission applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceType {
    /// A channel.
    Channel,
    /// A channel group.
    Group,
    /// A user id.
    Uuid,
}

impl ResourceType {
    /// Key used for this resource type inside a token and a grant-token body.
    pub const fn token_key(self) -> &'static str {
        match self {
            ResourceType::Channel => "chan",
            ResourceType::Group => "grp",
            ResourceType::Uuid => "uuid",
        }
    }

    /// Key used for this resource type inside a grant-token request body.
    pub const fn body_key(self) -> &'static str {
        match self {
            ResourceType::Channel => "channels",
            ResourceType::Group => "groups",
            ResourceType::Uuid => "uuids",
        }
    }
}

/// Permission maps for every resource type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenResources {
    /// Channel name (or pattern) to permissions.
    pub channels: BTreeMap<String, PermissionSet>,
    /// Channel group name (or pattern) to permissions.
    pub groups: BTreeMap<String, PermissionSet>,
    /// User id (or pattern) to permissions.
    pub uuids: BTreeMap<String, PermissionSet>,
}

impl TokenResources {
    /// Borrow the map for one resource type.
    pub fn get(&self, kind: ResourceType) -> &BTreeMap<String, PermissionSet> {
        match kind {
            ResourceType::Channel => &self.channels,
            ResourceType::Group => &self.groups,
            ResourceType::Uuid => &self.uuids,
        }
    }

    /// Mutable access to the map for one resource type.
    pub fn get_mut(&mut self, kind: ResourceType) -> &mut BTreeMap<String, PermissionSet> {
        match kind {
            ResourceType::Channel => &mut self.channels,
            ResourceType::Group => &mut self.groups,
            ResourceType::Uuid => &mut self.uuids,
        }
    }

    /// True if no resource of any type is present.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty() && self.groups.is_empty() && self.uuids.is_empty()
    }

    /// Iterate over `(type, name, permissions)` for every entry.
    pub fn entries(&self) -> impl Iterator<Item = (ResourceType, &String, &PermissionSet)> {
        [ResourceType::Channel, ResourceType::Group, ResourceType::Uuid]
            .into_iter()
            .flat_map(move |kind| self.get(kind).iter().map(move |(n, p)| (kind, n, p)))
    }
}

/// A decoded access token.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// Token format version.
    pub version: u64,
    /// Issue time in unix seconds.
    pub timestamp: u64,
    /// Lifetime in minutes.
    pub ttl: u64,
    /// The user id this token is restricted to, if any.
    pub authorized_uuid: Option<String>,
    /// Exact resource grants.
    pub resources: TokenResources,
    /// Regular-expression pattern grants.
    pub patterns: TokenResources,
    /// Free-form metadata attached at grant time.
    pub meta: serde_json::Value,
    /// Opaque service signature.
    pub signature: Vec<u8>,
}

impl Token {
    /// Decode a token string as returned by the grant-token endpoint.
    ///
    /// Both the URL-safe and the standard base64 alphabets are accepted, padded or not.
    pub fn parse(token: &str) -> Result<Self, Error> {
        let trimmed = token.trim().trim_end_matches('=');
        if trimmed.is_empty() {
            return Err(Error::Empty);
        }

        let bytes = URL_SAFE_NO_PAD
            .decode(trimmed)
            .or_else(|_| STANDARD_NO_PAD.decode(trimmed))?;

        let value: Value = serde_cbor::from_slice(&bytes)?;
        let Value::Map(map) = value else {
            return Err(Error::Malformed("token root is not a map".into()));
        };

        let mut token = Token {
            version: 0,
            timestamp: 0,
            ttl: 0,
            authorized_uuid: None,
            resources: TokenResources::default(),
            patterns: TokenResources::default(),
            meta: serde_json::Value::Null,
            signature: Vec::new(),
        };

        for (key, value) in map {
            let Some(key) = key_str(&key) else { continue };
            match key.as_str() {
                "v" => token.version = as_u64(&value, "v")?,
                "t" => token.timestamp = as_u64(&value, "t")?,
                "ttl" => token.ttl = as_u64(&value, "ttl")?,
                "uuid" => token.authorized_uuid = key_str(&value),
                "res" => token.resources = resources(&value, "res")?,
                "pat" => token.patterns = resources(&value, "pat")?,
                "meta" => token.meta = to_json(&value),
                "sig" => {
                    if let Value::Bytes(sig) = value {
                        token.signature = sig;
                    }
                }
                // Unknown fields belong to newer token versions.
                _ => {}
            }
        }

        Ok(token)
    }

    /// Whether this token explicitly names `name` as a resource of type `kind`.
    pub fn covers(&self, kind: ResourceType, name: &str) -> bool {
        self.resources.get(kind).contains_key(name)
    }
}

fn key_str(value: &Value) -> Option<String> {
    match value {
        Value::Text(text) => Some(text.clone()),
        Value::Bytes(bytes) => String::from_utf8(bytes.clone()).ok(),
        _ => None,
    }
}

fn as_u64(value: &Value, field: &str) -> Result<u64, Error> {
    match value {
        Value::Integer(n) => u64::try_from(*n)
            .map_err(|_| Error::Malformed(format!("`{field}` is not a non-negative integer"))),
        _ => Err(Error::Malformed(format!("`{field}` is not an integer"))),
    }
}

fn resources(value: &Value, field: &str) -> Result<TokenResources, Error> {
    let Value::Map(map) = value else {
        return Err(Error::Malformed(format!("`{field}` is not a map")));
    };

    let mut out = TokenResources::default();
    for kind in [ResourceType::Channel, ResourceType::Group, ResourceType::Uuid] {
        let entry = map
            .iter()
            .find(|(k, _)| key_str(k).as_deref() == Some(kind.token_key()));
        let Some((_, Value::Map(entries))) = entry else {
            continue;
        };

        let target = out.get_mut(kind);
        for (name, bits) in entries {
            let Some(name) = key_str(name) else { continue };
            let bits = as_u64(bits, kind.token_key())?;
            target.insert(name, PermissionSet::from_bits(bits));
        }
    }
    Ok(out)
}

fn to_json(value: &Value) -> serde_json::Value {
    use serde_json::Value as Json;

    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Integer(n) => i64::try_from(*n)
            .map(Json::from)
            .or_else(|_| u64::try_from(*n).map(Json::from))
            .unwrap_or_else(|_| Json::String(n.to_string())),
        Value::Float(f) => serde_json::Number::from_f64(*f).map_or(Json::Null, Json::Number),
        Value::Bytes(bytes) => Json::String(String::from_utf8_lossy(bytes).into_owned()),
        Value::Text(text) => Json::String(text.clone()),
        Value::Array(items) => Json::Array(items.iter().map(to_json).collect()),
        Value::Map(map) => Json::Object(
            map.iter()
                .filter_map(|(k, v)| key_str(k).map(|k| (k, to_json(v))))
                .collect(),
        ),
        Value::Tag(_, inner) => to_json(inner),
        _ => Json::Null,
    }
}

/// Token decoding failures.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The token string was empty.
    #[error("Token: empty token")]
    Empty,
    /// Not valid base64.
    #[error("Token: invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    /// Not valid CBOR.
    #[error("Token: invalid CBOR: {0}")]
    Cbor(#[from] serde_cbor::Error),
    /// Valid CBOR with an unexpected shape.
    #[error("Token: malformed token: {0}")]
    Malformed(String),
}
