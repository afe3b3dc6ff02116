//! Credential resolution and request signing.
//!
//! A request carries at most one `auth` credential, picked in this order:
//! 1. the explicit credential set on the request,
//! 2. a token stored for one of the exact resources the request touches,
//! 3. the client-wide token set with [`TokenManager::set_token`],
//! 4. the legacy `auth_key` from the configuration.
//!
//! Independently of that, every request is signed when the client has a secret key.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use pubsub_common::constants::query_keys::{AUTH, SIGNATURE, TIMESTAMP};
use pubsub_common::signature::{SignatureInput, sign};
use pubsub_common::token::{self, ResourceType, Token};

use crate::endpoint::HttpMethod;
use crate::query::QueryParams;

/// Where the credential attached to a request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// Set on the request itself.
    Explicit,
    /// Stored for a resource the request touches.
    Resource,
    /// The client-wide token.
    ClientToken,
    /// The configured legacy auth key.
    AuthKey,
}

#[derive(Debug, Default)]
struct TokenState {
    client_token: Option<String>,
    by_resource: HashMap<(ResourceType, String), String>,
}

/// Token cache shared by every clone of a client. Reads never block each other.
#[derive(Debug, Default)]
pub struct TokenManager {
    state: RwLock<TokenState>,
}

impl TokenManager {
    /// An empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the client-wide token. An empty string clears it.
    pub fn set_token(&self, token: impl Into<String>) {
        let token = token.into();
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.client_token = (!token.is_empty()).then_some(token);
    }

    /// The client-wide token, if set.
    pub fn token(&self) -> Option<String> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.client_token.clone()
    }

    /// Parse `token` and index it under every exact resource it grants.
    ///
    /// Pattern grants are not indexed; use [`TokenManager::set_token`] for those.
    pub fn store_token(&self, token: &str) -> Result<Token, token::Error> {
        let parsed = Token::parse(token)?;

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        for (kind, name, _) in parsed.resources.entries() {
            state
                .by_resource
                .insert((kind, name.clone()), token.to_string());
        }
        Ok(parsed)
    }

    /// Store `token` for a single resource without parsing it.
    pub fn store_token_for(&self, kind: ResourceType, name: impl Into<String>, token: impl Into<String>) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.by_resource.insert((kind, name.into()), token.into());
    }

    /// Token stored for exactly this resource.
    pub fn token_for(&self, kind: ResourceType, name: &str) -> Option<String> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.by_resource.get(&(kind, name.to_string())).cloned()
    }

    /// Forget every stored token.
    pub fn clear(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        *state = TokenState::default();
    }

    /// Pick the credential for a request. The first resource with a stored token wins.
    pub fn resolve(
        &self,
        explicit: Option<&str>,
        resources: &[(ResourceType, &str)],
        auth_key: &str,
    ) -> Option<(CredentialSource, String)> {
        if let Some(explicit) = explicit.filter(|e| !e.is_empty()) {
            return Some((CredentialSource::Explicit, explicit.to_string()));
        }

        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let resource_token = resources
            .iter()
            .find_map(|(kind, name)| state.by_resource.get(&(*kind, (*name).to_string())));
        if let Some(token) = resource_token {
            return Some((CredentialSource::Resource, token.clone()));
        }
        if let Some(token) = &state.client_token {
            return Some((CredentialSource::ClientToken, token.clone()));
        }

        (!auth_key.is_empty()).then(|| (CredentialSource::AuthKey, auth_key.to_string()))
    }

    /// Resolve the credential and set it as `auth` on `query`.
    pub(crate) fn apply(
        &self,
        query: &mut QueryParams,
        explicit: Option<&str>,
        resources: &[(ResourceType, &str)],
        auth_key: &str,
    ) -> Option<CredentialSource> {
        let (source, credential) = self.resolve(explicit, resources, auth_key)?;
        query.set(AUTH, credential);
        Some(source)
    }
}

/// Add `timestamp` and `signature` to a fully assembled query.
///
/// A caller-supplied `timestamp` is kept and signed; `signature` is always recomputed. Must run
/// after every other mutation of `query`.
pub(crate) fn sign_request(
    secret_key: &str,
    publish_key: &str,
    method: HttpMethod,
    path: &str,
    query: &mut QueryParams,
    body: &[u8],
    now_secs: u64,
) {
    query.set_if_absent(TIMESTAMP, now_secs.to_string());

    let signature = sign(
        secret_key,
        &SignatureInput {
            method: method.as_str(),
            publish_key,
            path,
            query: query.as_slice(),
            body,
        },
    );
    query.set(SIGNATURE, signature);
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
    use pubsub_common::signature::verify;

    use super::*;

    fn token_granting(channel: &str) -> String {
        use serde_cbor::Value;

        let mut chan = BTreeMap::new();
        chan.insert(Value::Text(channel.into()), Value::Integer(3));
        let mut res = BTreeMap::new();
        res.insert(Value::Text("chan".into()), Value::Map(chan));
        let mut root = BTreeMap::new();
        root.insert(Value::Text("v".into()), Value::Integer(2));
        root.insert(Value::Text("t".into()), Value::Integer(1_700_000_000));
        root.insert(Value::Text("ttl".into()), Value::Integer(60));
        root.insert(Value::Text("res".into()), Value::Map(res));

        let bytes = serde_cbor::to_vec(&Value::Map(root)).unwrap();
        URL_SAFE_NO_PAD.encode(bytes)
    }

    #[test]
    fn precedence_is_explicit_resource_client_auth_key() {
        let tokens = TokenManager::new();
        let resources = [(ResourceType::Channel, "lobby")];

        assert_eq!(tokens.resolve(None, &resources, ""), None);
        assert_eq!(
            tokens.resolve(None, &resources, "legacy"),
            Some((CredentialSource::AuthKey, "legacy".into()))
        );

        tokens.set_token("client-wide");
        assert_eq!(
            tokens.resolve(None, &resources, "legacy"),
            Some((CredentialSource::ClientToken, "client-wide".into()))
        );

        let lobby = token_granting("lobby");
        let parsed = tokens.store_token(&lobby).unwrap();
        assert!(parsed.covers(ResourceType::Channel, "lobby"));
        assert_eq!(
            tokens.resolve(None, &resources, "legacy"),
            Some((CredentialSource::Resource, lobby.clone()))
        );
        // Another channel falls back to the client token.
        assert_eq!(
            tokens
                .resolve(None, &[(ResourceType::Channel, "other")], "")
                .map(|(s, _)| s),
            Some(CredentialSource::ClientToken)
        );

        assert_eq!(
            tokens.resolve(Some("explicit"), &resources, "legacy"),
            Some((CredentialSource::Explicit, "explicit".into()))
        );
    }

    #[test]
    fn empty_set_token_clears_and_clear_forgets_all() {
        let tokens = TokenManager::new();
        tokens.set_token("abc");
        tokens.store_token_for(ResourceType::Uuid, "alice", "t-alice");
        assert_eq!(tokens.token().as_deref(), Some("abc"));

        tokens.set_token("");
        assert_eq!(tokens.token(), None);
        assert_eq!(
            tokens.token_for(ResourceType::Uuid, "alice").as_deref(),
            Some("t-alice")
        );

        tokens.clear();
        assert_eq!(tokens.token_for(ResourceType::Uuid, "alice"), None);
    }

    #[test]
    fn invalid_tokens_are_rejected() {
        let tokens = TokenManager::new();
        assert!(tokens.store_token("").is_err());
        assert!(tokens.store_token("***").is_err());
    }

    #[test]
    fn apply_sets_auth() {
        let tokens = TokenManager::new();
        let mut query = QueryParams::new();
        assert_eq!(tokens.apply(&mut query, None, &[], ""), None);
        assert!(!query.contains("auth"));

        assert_eq!(
            tokens.apply(&mut query, None, &[], "key"),
            Some(CredentialSource::AuthKey)
        );
        assert_eq!(query.get("auth"), Some("key"));
    }

    #[test]
    fn signing_adds_verifiable_signature() {
        let mut query: QueryParams = [("uuid", "alice"), ("pnsdk", "sdk")].into_iter().collect();
        let path = "/v3/pam/sub-key/grant";
        sign_request("secret", "pub-key", HttpMethod::Post, path, &mut query, b"{}", 1_700_000_000);

        assert_eq!(query.get("timestamp"), Some("1700000000"));
        let signature = query.get("signature").unwrap().to_string();
        assert!(signature.starts_with("v2."));

        let input = SignatureInput {
            method: "POST",
            publish_key: "pub-key",
            path,
            query: query.as_slice(),
            body: b"{}",
        };
        assert!(verify("secret", &input, &signature));

        // Mutating any parameter invalidates it.
        let mut tampered = query.clone();
        tampered.set("uuid", "mallory");
        let input = SignatureInput {
            query: tampered.as_slice(),
            ..input
        };
        assert!(!verify("secret", &input, &signature));
    }

    #[test]
    fn caller_timestamp_is_signed_and_caller_signature_replaced() {
        let mut query: QueryParams = [("timestamp", "42"), ("signature", "v2.forged")]
            .into_iter()
            .collect();
        sign_request("secret", "pub", HttpMethod::Get, "/time/0", &mut query, b"", 99);
        assert_eq!(query.get("timestamp"), Some("42"));

        let signature = query.get("signature").unwrap().to_string();
        assert_ne!(signature, "v2.forged");
        let input = SignatureInput {
            method: "GET",
            publish_key: "pub",
            path: "/time/0",
            query: query.as_slice(),
            body: b"",
        };
        assert!(verify("secret", &input, &signature));
    }
}
