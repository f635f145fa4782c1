//! Event stream identification and positioning types.
//!
//! This module defines strong types for stream identification (`StreamId`),
//! tenant partitioning (`TenantId`), per-stream positions (`Version`, with
//! `VersionRange` for reads) and positions in the cross-stream log
//! (`GlobalPosition`).
//!
//! `Version` and `GlobalPosition` are deliberately distinct types. A stream
//! version counts events inside one stream; a global position orders events
//! across every stream. Conversions between them and plain integers are
//! explicit and named.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for `StreamId` parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid stream ID: {0}")]
pub struct ParseStreamIdError(String);

/// Unique identifier for an event stream (aggregate instance).
///
/// A stream ID is derived deterministically from an aggregate's domain
/// identifier and stays stable for the aggregate's lifetime. For example:
/// - `"cart-12345"`
/// - `"account-abc-def"`
///
/// # Validation
///
/// - `FromStr::from_str()`: Validates input (rejects empty strings)
/// - `From::from()` and `new()`: No validation (for internal use with trusted input)
///
/// # Examples
///
/// ```
/// use eventloom_core::stream::StreamId;
///
/// let stream_id = StreamId::new("cart-12345");
/// assert_eq!(stream_id.as_str(), "cart-12345");
///
/// let parsed: StreamId = "account-abc".parse().unwrap();
/// assert_eq!(parsed, StreamId::new("account-abc"));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamId(String);

impl StreamId {
    /// Create a new `StreamId` from a string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Build the stream ID for one instance of an aggregate type.
    ///
    /// The result is `"{aggregate_type}-{instance}"`, which keeps every stream
    /// of one aggregate type under a common prefix for filtered global reads.
    ///
    /// # Examples
    ///
    /// ```
    /// use eventloom_core::stream::StreamId;
    ///
    /// let id = StreamId::for_aggregate("cart", "42");
    /// assert_eq!(id.as_str(), "cart-42");
    /// ```
    #[must_use]
    pub fn for_aggregate(aggregate_type: &str, instance: impl fmt::Display) -> Self {
        Self(format!("{aggregate_type}-{instance}"))
    }

    /// Get the stream ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this stream ID starts with `prefix`.
    #[must_use]
    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }

    /// Convert the `StreamId` into its inner `String`.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for StreamId {
    type Err = ParseStreamIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ParseStreamIdError("Stream ID cannot be empty".to_string()));
        }
        Ok(Self(s.to_string()))
    }
}

impl From<String> for StreamId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for StreamId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for StreamId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Partition key for multi-tenant deployments.
///
/// The empty tenant means single-tenant mode. Every store is indexed by
/// `(TenantId, StreamId)`, so two tenants may own streams with the same name
/// without seeing each other's events.
///
/// # Examples
///
/// ```
/// use eventloom_core::stream::TenantId;
///
/// assert!(TenantId::empty().is_empty());
/// assert_eq!(TenantId::new("acme").as_str(), "acme");
/// assert_eq!(TenantId::default(), TenantId::empty());
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TenantId(String);

impl TenantId {
    /// Create a tenant ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The single-tenant partition.
    #[must_use]
    pub const fn empty() -> Self {
        Self(String::new())
    }

    /// Whether this is the single-tenant partition.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Get the tenant ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "<default>")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Event version number within one stream.
///
/// Versions start at 0 (the stream has no events yet) and increment by 1 for
/// each event appended. The version is the unit of optimistic concurrency:
///
/// - When appending events, you specify the expected version
/// - If the stream's current version doesn't match, the append fails
/// - This prevents lost updates in concurrent scenarios
///
/// # Examples
///
/// ```
/// use eventloom_core::stream::Version;
///
/// let v0 = Version::NOT_CREATED;
/// let v1 = v0.next();
/// assert_eq!(v1, Version::new(1));
/// assert_eq!(v1 + 4, Version::new(5));
/// assert_eq!(Version::new(5).value(), 5);
/// ```
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Version(u64);

impl Version {
    /// The version of a stream that has no events yet.
    pub const NOT_CREATED: Self = Self(0);

    /// Create a new `Version` with the given value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the version number.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Get the next version (current + 1).
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Check if this is the "no events yet" version.
    #[must_use]
    pub const fn is_not_created(self) -> bool {
        self.0 == 0
    }

    /// Subtract `rhs`, returning `None` instead of going below zero.
    #[must_use]
    pub const fn checked_sub(self, rhs: u64) -> Option<Self> {
        match self.0.checked_sub(rhs) {
            Some(value) => Some(Self(value)),
            None => None,
        }
    }

    /// Number of versions between `earlier` and `self` (zero if `earlier` is ahead).
    #[must_use]
    pub const fn distance_from(self, earlier: Self) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Version {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Version> for u64 {
    fn from(version: Version) -> Self {
        version.0
    }
}

/// Offset a version forward by `rhs` events.
impl std::ops::Add<u64> for Version {
    type Output = Self;

    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

/// Offset a version backward by `rhs` events, saturating at `NOT_CREATED`.
///
/// Use [`Version::checked_sub`] when going below zero indicates a bug.
impl std::ops::Sub<u64> for Version {
    type Output = Self;

    fn sub(self, rhs: u64) -> Self::Output {
        Self(self.0.saturating_sub(rhs))
    }
}

/// Upper bound of a stream read.
///
/// `End` is the "end of stream" sentinel. It only ever appears as a read
/// bound, so it has no representation as a stored `Version`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpperBound {
    /// Read up to and including this version.
    Version(Version),
    /// Read to whatever the stream's last event is.
    End,
}

impl UpperBound {
    /// Whether `version` lies at or below this bound.
    #[must_use]
    pub fn admits(self, version: Version) -> bool {
        match self {
            Self::Version(to) => version <= to,
            Self::End => true,
        }
    }
}

impl fmt::Display for UpperBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Version(v) => write!(f, "{v}"),
            Self::End => write!(f, "end"),
        }
    }
}

/// Half-open range of stream versions `(after, to]`.
///
/// # Examples
///
/// ```
/// use eventloom_core::stream::{UpperBound, Version, VersionRange};
///
/// let range = VersionRange::after(Version::new(3));
/// assert!(!range.contains(Version::new(3)));
/// assert!(range.contains(Version::new(4)));
///
/// let bounded = VersionRange::new(Version::new(0), UpperBound::Version(Version::new(2)));
/// assert!(bounded.contains(Version::new(2)));
/// assert!(!bounded.contains(Version::new(3)));
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionRange {
    /// Exclusive lower bound.
    pub after: Version,
    /// Inclusive upper bound.
    pub to: UpperBound,
}

impl VersionRange {
    /// Build a range `(after, to]`.
    #[must_use]
    pub const fn new(after: Version, to: UpperBound) -> Self {
        Self { after, to }
    }

    /// Every event of the stream: `(0, End]`.
    #[must_use]
    pub const fn all() -> Self {
        Self::new(Version::NOT_CREATED, UpperBound::End)
    }

    /// Every event strictly after `version`: `(version, End]`.
    #[must_use]
    pub const fn after(version: Version) -> Self {
        Self::new(version, UpperBound::End)
    }

    /// Whether `version` falls inside the range.
    #[must_use]
    pub fn contains(self, version: Version) -> bool {
        version > self.after && self.to.admits(version)
    }

    /// Whether the range can contain any version at all.
    #[must_use]
    pub fn is_empty(self) -> bool {
        match self.to {
            UpperBound::Version(to) => to <= self.after,
            UpperBound::End => false,
        }
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}]", self.after, self.to)
    }
}

/// Position of an event in the global, cross-stream log.
///
/// Global positions increase monotonically across every stream of a tenant
/// and are independent from stream versions. `BEGIN` sits before the first
/// event; the first committed event occupies position 1.
///
/// # Examples
///
/// ```
/// use eventloom_core::stream::GlobalPosition;
///
/// let start = GlobalPosition::BEGIN;
/// assert_eq!(start.next(), GlobalPosition::new(1));
/// assert_eq!(start + 500, GlobalPosition::new(500));
/// ```
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct GlobalPosition(u64);

impl GlobalPosition {
    /// Position before the first event of the log.
    pub const BEGIN: Self = Self(0);

    /// Create a position.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Raw position value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// The following position.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for GlobalPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Add<u64> for GlobalPosition {
    type Output = Self;

    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0.saturating_add(rhs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod stream_id_tests {
        use super::*;

        #[test]
        fn new_creates_stream_id() {
            let id = StreamId::new("cart-123");
            assert_eq!(id.as_str(), "cart-123");
        }

        #[test]
        fn for_aggregate_joins_type_and_instance() {
            let id = StreamId::for_aggregate("account", 7);
            assert_eq!(id.as_str(), "account-7");
            assert!(id.has_prefix("account-"));
            assert!(!id.has_prefix("cart-"));
        }

        #[test]
        #[allow(clippy::expect_used)] // Panics: Test will fail if parse fails
        fn parse_from_str() {
            let id: StreamId = "cart-123".parse().expect("parse should succeed");
            assert_eq!(id, StreamId::new("cart-123"));
        }

        #[test]
        fn parse_empty_string_fails() {
            assert!("".parse::<StreamId>().is_err());
        }

        #[test]
        fn display_and_into_inner() {
            let id = StreamId::new("cart-123");
            assert_eq!(format!("{id}"), "cart-123");
            assert_eq!(id.into_inner(), "cart-123");
        }
    }

    mod tenant_id_tests {
        use super::*;

        #[test]
        fn empty_tenant_is_default() {
            assert_eq!(TenantId::default(), TenantId::empty());
            assert!(TenantId::empty().is_empty());
            assert!(!TenantId::new("acme").is_empty());
        }

        #[test]
        fn display_marks_default_partition() {
            assert_eq!(TenantId::empty().to_string(), "<default>");
            assert_eq!(TenantId::new("acme").to_string(), "acme");
        }
    }

    mod version_tests {
        use super::*;

        #[test]
        fn not_created_is_zero() {
            assert_eq!(Version::NOT_CREATED, Version::new(0));
            assert!(Version::NOT_CREATED.is_not_created());
            assert!(!Version::new(1).is_not_created());
        }

        #[test]
        fn offset_arithmetic() {
            let v5 = Version::new(5);
            assert_eq!(v5 + 3, Version::new(8));
            assert_eq!(v5 - 2, Version::new(3));
            assert_eq!(v5 - 9, Version::NOT_CREATED);
            assert_eq!(v5.checked_sub(6), None);
            assert_eq!(v5.checked_sub(5), Some(Version::NOT_CREATED));
            assert_eq!(Version::new(8).distance_from(v5), 3);
            assert_eq!(v5.distance_from(Version::new(8)), 0);
        }

        #[test]
        fn ordering() {
            assert!(Version::new(1) < Version::new(2));
            assert!(Version::new(3) > Version::new(1));
        }

        #[test]
        fn explicit_conversions() {
            let version = Version::from(42_u64);
            let raw: u64 = version.into();
            assert_eq!(raw, 42);
        }
    }

    mod range_tests {
        use super::*;

        #[test]
        fn all_excludes_not_created() {
            let range = VersionRange::all();
            assert!(!range.contains(Version::NOT_CREATED));
            assert!(range.contains(Version::new(1)));
            assert!(range.contains(Version::new(u64::MAX)));
        }

        #[test]
        fn bounded_range_is_half_open() {
            let range = VersionRange::new(Version::new(2), UpperBound::Version(Version::new(4)));
            assert!(!range.contains(Version::new(2)));
            assert!(range.contains(Version::new(3)));
            assert!(range.contains(Version::new(4)));
            assert!(!range.contains(Version::new(5)));
            assert_eq!(range.to_string(), "(2, 4]");
        }

        #[test]
        fn inverted_range_is_empty() {
            let range = VersionRange::new(Version::new(4), UpperBound::Version(Version::new(4)));
            assert!(range.is_empty());
            assert!(!VersionRange::after(Version::new(4)).is_empty());
        }
    }

    mod global_position_tests {
        use super::*;

        #[test]
        fn begin_precedes_first_event() {
            assert_eq!(GlobalPosition::BEGIN.next(), GlobalPosition::new(1));
            assert!(GlobalPosition::BEGIN < GlobalPosition::new(1));
        }

        #[test]
        fn offset_saturates() {
            assert_eq!(
                GlobalPosition::new(u64::MAX) + 1,
                GlobalPosition::new(u64::MAX)
            );
        }
    }
}
