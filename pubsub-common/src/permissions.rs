//! Access-manager permissions and their wire encoding.
//!
//! Each [`Permission`] owns exactly one bit; a [`PermissionSet`] is encoded as the bitwise OR of
//! the bits it contains:
//!
//! | permission | bit   |
//! |------------|-------|
//! | read       | `1`   |
//! | write      | `2`   |
//! | manage     | `4`   |
//! | delete     | `8`   |
//! | create     | `16`  |
//! | get        | `32`  |
//! | update     | `64`  |
//! | join       | `128` |
//!
//! Decoding tests every known bit independently and ignores any other bit.

use std::collections::BTreeMap;
use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::constants::ttl_bounds::{MAX_MINUTES, MIN_MINUTES};

/// A single capability on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Permission {
    /// Subscribe / fetch history.
    Read,
    /// Publish / signal.
    Write,
    /// Manage channel groups and presence.
    Manage,
    /// Delete messages and metadata.
    Delete,
    /// Create resources.
    Create,
    /// Read metadata.
    Get,
    /// Update metadata.
    Update,
    /// Join a channel as a member.
    Join,
}

impl Permission {
    /// Every permission, in bit order.
    pub const ALL: [Permission; 8] = [
        Permission::Read,
        Permission::Write,
        Permission::Manage,
        Permission::Delete,
        Permission::Create,
        Permission::Get,
        Permission::Update,
        Permission::Join,
    ];

    /// The bit this permission owns in the wire bitmask.
    pub const fn bit(self) -> u32 {
        match self {
            Permission::Read => 1,
            Permission::Write => 2,
            Permission::Manage => 4,
            Permission::Delete => 8,
            Permission::Create => 16,
            Permission::Get => 32,
            Permission::Update => 64,
            Permission::Join => 128,
        }
    }

    /// Short flag used by the legacy (v2) grant query string.
    pub const fn flag(self) -> &'static str {
        match self {
            Permission::Read => "r",
            Permission::Write => "w",
            Permission::Manage => "m",
            Permission::Delete => "d",
            Permission::Create => "c",
            Permission::Get => "g",
            Permission::Update => "u",
            Permission::Join => "j",
        }
    }
}

impl Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Permission::Read => "read",
            Permission::Write => "write",
            Permission::Manage => "manage",
            Permission::Delete => "delete",
            Permission::Create => "create",
            Permission::Get => "get",
            Permission::Update => "update",
            Permission::Join => "join",
        };
        f.write_str(name)
    }
}

/// Boolean capabilities granted on one resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionSet {
    /// See [`Permission::Read`].
    pub read: bool,
    /// See [`Permission::Write`].
    pub write: bool,
    /// See [`Permission::Manage`].
    pub manage: bool,
    /// See [`Permission::Delete`].
    pub delete: bool,
    /// See [`Permission::Create`].
    pub create: bool,
    /// See [`Permission::Get`].
    pub get: bool,
    /// See [`Permission::Update`].
    pub update: bool,
    /// See [`Permission::Join`].
    pub join: bool,
}

impl PermissionSet {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns this set with `permission` added.
    pub fn with(mut self, permission: Permission) -> Self {
        *self.slot_mut(permission) = true;
        self
    }

    /// Whether `permission` is part of this set.
    pub fn contains(&self, permission: Permission) -> bool {
        match permission {
            Permission::Read => self.read,
            Permission::Write => self.write,
            Permission::Manage => self.manage,
            Permission::Delete => self.delete,
            Permission::Create => self.create,
            Permission::Get => self.get,
            Permission::Update => self.update,
            Permission::Join => self.join,
        }
    }

    /// True when no capability is set.
    pub fn is_empty(&self) -> bool {
        self.to_bits() == 0
    }

    /// Iterate over the permissions contained in this set, in bit order.
    pub fn iter(&self) -> impl Iterator<Item = Permission> + '_ {
        Permission::ALL
            .into_iter()
            .filter(move |permission| self.contains(*permission))
    }

    /// Encode into the wire bitmask.
    pub fn to_bits(&self) -> u32 {
        self.iter().fold(0, |bits, permission| bits | permission.bit())
    }

    /// Decode a wire bitmask. Bits that do not belong to a known [`Permission`] are ignored.
    pub fn from_bits(bits: u64) -> Self {
        Permission::ALL
            .into_iter()
            .filter(|permission| bits & u64::from(permission.bit()) != 0)
            .collect()
    }

    fn slot_mut(&mut self, permission: Permission) -> &mut bool {
        match permission {
            Permission::Read => &mut self.read,
            Permission::Write => &mut self.write,
            Permission::Manage => &mut self.manage,
            Permission::Delete => &mut self.delete,
            Permission::Create => &mut self.create,
            Permission::Get => &mut self.get,
            Permission::Update => &mut self.update,
            Permission::Join => &mut self.join,
        }
    }
}

impl FromIterator<Permission> for PermissionSet {
    fn from_iter<T: IntoIterator<Item = Permission>>(iter: T) -> Self {
        iter.into_iter()
            .fold(PermissionSet::default(), PermissionSet::with)
    }
}

impl From<&[Permission]> for PermissionSet {
    fn from(value: &[Permission]) -> Self {
        value.iter().copied().collect()
    }
}

impl Display for PermissionSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names = self.iter().map(|p| p.to_string()).collect::<Vec<_>>();
        write!(f, "[{}]", names.join(","))
    }
}

/// Encode a resource map into its bitmask map.
///
/// Only resources present in `resources` appear in the output; a resource whose set is empty
/// is still emitted (with `0`) because its presence expresses intent.
pub fn encode_resources(resources: &BTreeMap<String, PermissionSet>) -> BTreeMap<String, u32> {
    resources
        .iter()
        .map(|(name, set)| (name.clone(), set.to_bits()))
        .collect()
}

/// Decode a bitmask map into permission sets.
pub fn decode_resources(resources: &BTreeMap<String, u64>) -> BTreeMap<String, PermissionSet> {
    resources
        .iter()
        .map(|(name, bits)| (name.clone(), PermissionSet::from_bits(*bits)))
        .collect()
}

/// Lifetime of a grant.
///
/// Wire values: [`Ttl::ServiceDefault`] is `-1`, [`Ttl::NoExpiry`] is `0`, and
/// [`Ttl::Minutes`] is the minute count, passed through as given.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Ttl {
    /// Never set by the caller; the service applies its own default.
    #[default]
    ServiceDefault,
    /// Explicitly `0`.
    NoExpiry,
    /// Minutes, documented range `[1, 525600]`.
    Minutes(u32),
}

impl Ttl {
    /// Wire sentinel for [`Ttl::ServiceDefault`].
    pub const SERVICE_DEFAULT_SENTINEL: i64 = -1;

    /// Map a caller-supplied minute count, `0` meaning [`Ttl::NoExpiry`].
    pub fn minutes(minutes: u32) -> Self {
        match minutes {
            0 => Ttl::NoExpiry,
            n => Ttl::Minutes(n),
        }
    }

    /// Value sent on the wire.
    pub fn to_wire(self) -> i64 {
        match self {
            Ttl::ServiceDefault => Self::SERVICE_DEFAULT_SENTINEL,
            Ttl::NoExpiry => 0,
            Ttl::Minutes(n) => i64::from(n),
        }
    }

    /// Inverse of [`Ttl::to_wire`]. Any negative value is the service default.
    pub fn from_wire(value: i64) -> Self {
        match value {
            v if v < 0 => Ttl::ServiceDefault,
            0 => Ttl::NoExpiry,
            v => Ttl::Minutes(u32::try_from(v).unwrap_or(u32::MAX)),
        }
    }

    /// Client-side range check. [`Ttl::ServiceDefault`] and [`Ttl::NoExpiry`] are always valid.
    pub fn validate(self) -> Result<(), Error> {
        match self {
            Ttl::Minutes(n) if !(MIN_MINUTES..=MAX_MINUTES).contains(&n) => {
                Err(Error::TtlOutOfRange(n))
            }
            _ => Ok(()),
        }
    }
}

/// Errors raised by client-side permission checks.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// TTL outside the documented range.
    #[error("Invalid TTL: {0} minutes is outside [1, 525600]")]
    TtlOutOfRange(u32),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(perms: &[Permission]) -> PermissionSet {
        PermissionSet::from(perms)
    }

    #[test]
    fn read_write_manage_is_seven() {
        let rwm = set(&[Permission::Read, Permission::Write, Permission::Manage]);
        assert_eq!(rwm.to_bits(), 7);

        let with_delete = rwm.with(Permission::Delete);
        assert_eq!(with_delete.to_bits(), 15);
    }

    #[test]
    fn every_bit_is_distinct() {
        let mut seen = 0u32;
        for permission in Permission::ALL {
            assert_eq!(seen & permission.bit(), 0, "{permission} reuses a bit");
            seen |= permission.bit();
        }
        assert_eq!(seen, 255);
    }

    #[test]
    fn bits_round_trip_for_every_subset() {
        for bits in 0u32..=255 {
            let decoded = PermissionSet::from_bits(u64::from(bits));
            assert_eq!(decoded.to_bits(), bits);
        }
    }

    #[test]
    fn unknown_bits_are_ignored() {
        let decoded = PermissionSet::from_bits(1 | 256 | 1024);
        assert_eq!(decoded, set(&[Permission::Read]));
    }

    #[test]
    fn absent_resources_stay_absent() {
        let mut resources = BTreeMap::new();
        resources.insert("ch".to_string(), set(&[Permission::Read]));
        resources.insert("empty".to_string(), PermissionSet::new());

        let encoded = encode_resources(&resources);
        assert_eq!(encoded.len(), 2);
        assert_eq!(encoded["ch"], 1);
        assert_eq!(encoded["empty"], 0);
        assert!(!encoded.contains_key("other"));

        assert_eq!(decode_resources(&encoded_u64(&encoded)), resources);
    }

    fn encoded_u64(map: &BTreeMap<String, u32>) -> BTreeMap<String, u64> {
        map.iter().map(|(k, v)| (k.clone(), u64::from(*v))).collect()
    }

    #[test]
    fn ttl_wire_values() {
        assert_eq!(Ttl::default().to_wire(), -1);
        assert_eq!(Ttl::minutes(0).to_wire(), 0);
        assert_eq!(Ttl::minutes(60).to_wire(), 60);

        assert_eq!(Ttl::from_wire(-1), Ttl::ServiceDefault);
        assert_eq!(Ttl::from_wire(0), Ttl::NoExpiry);
        assert_eq!(Ttl::from_wire(15), Ttl::Minutes(15));
    }

    #[test]
    fn ttl_range_validation() {
        assert!(Ttl::ServiceDefault.validate().is_ok());
        assert!(Ttl::NoExpiry.validate().is_ok());
        assert!(Ttl::Minutes(1).validate().is_ok());
        assert!(Ttl::Minutes(525_600).validate().is_ok());
        assert_eq!(
            Ttl::Minutes(525_601).validate(),
            Err(Error::TtlOutOfRange(525_601))
        );
        // Out-of-range values are still rendered as given.
        assert_eq!(Ttl::Minutes(525_601).to_wire(), 525_601);
    }

    #[test]
    fn display_lists_permissions() {
        let rw = set(&[Permission::Write, Permission::Read]);
        assert_eq!(rw.to_string(), "[read,write]");
    }
}
