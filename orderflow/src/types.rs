//! Core types shared across the `orderflow` services.
//!
//! This module defines the fundamental identifier and value types used
//! throughout the library. All types use smart constructors to ensure
//! validity at construction time, following the "parse, don't validate"
//! principle: once a value exists, it is valid, and no call site needs to
//! re-check it.

use chrono::{DateTime, Utc};
use nutype::nutype;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of an order.
///
/// `OrderId` values are guaranteed to be non-empty (after trimming) and at
/// most 64 characters. Generated ids are UUIDv7 in simple (dashless) form,
/// so lexical order tracks creation order.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 64),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct OrderId(String);

impl OrderId {
    /// Generates a fresh order identifier from a UUIDv7.
    pub fn generate() -> Self {
        Self::try_new(Uuid::now_v7().simple().to_string())
            .expect("a simple-format UUIDv7 is always a valid OrderId")
    }
}

/// Identifier of a product in the catalog.
///
/// Same guarantees as [`OrderId`]: non-empty, trimmed, at most 64 characters.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 64),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct ProductId(String);

impl ProductId {
    /// Generates a fresh product identifier from a UUIDv7.
    pub fn generate() -> Self {
        Self::try_new(Uuid::now_v7().simple().to_string())
            .expect("a simple-format UUIDv7 is always a valid ProductId")
    }
}

/// Identifier of a registered user.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 64),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct UserId(String);

impl UserId {
    /// Generates a fresh user identifier from a UUIDv7.
    pub fn generate() -> Self {
        Self::try_new(Uuid::now_v7().simple().to_string())
            .expect("a simple-format UUIDv7 is always a valid UserId")
    }
}

/// Identifier the bus assigns to a published message.
///
/// `MessageId` values are guaranteed to be UUIDv7. The id is stable across
/// redeliveries of the same message, which is what lets consumers recognise
/// a duplicate when they care to.
#[nutype(
    validate(predicate = |id: &Uuid| id.get_version() == Some(uuid::Version::SortRand)),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Creates a new `MessageId` with the current timestamp.
    pub fn new() -> Self {
        Self::try_new(Uuid::now_v7()).expect("Uuid::now_v7() should always return a valid v7 UUID")
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

/// Name of a topic on the event bus.
///
/// Topics are non-empty (after trimming) and at most 128 characters. The
/// well-known topics are exposed as constants on the event types that use
/// them, e.g. [`crate::events::OrderCreated::TOPIC`].
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 128),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct Topic(String);

/// Number of units of a product in a line item or a decrement.
///
/// Quantities are strictly positive; a zero-quantity line item is rejected
/// at construction.
#[nutype(
    validate(greater = 0),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        Display,
        Into,
        Serialize,
        Deserialize
    )
)]
pub struct Quantity(u32);

/// Price of a single unit, in major currency units.
///
/// Guaranteed finite and non-negative. Stored as `f64` because the wire
/// format for order totals is a plain JSON number.
#[nutype(
    validate(finite, greater_or_equal = 0.0),
    derive(Debug, Clone, Copy, PartialEq, PartialOrd, Display, Into, Serialize, Deserialize)
)]
pub struct UnitPrice(f64);

/// An email address, held to a pragmatic shape check rather than full RFC
/// 5322: one `@`, a non-empty local part, and a dotted domain with an
/// alphabetic top-level label of at least two characters.
#[nutype(
    sanitize(trim, lowercase),
    validate(predicate = is_plausible_email),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct EmailAddress(String);

fn is_plausible_email(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    let Some((host, tld)) = domain.rsplit_once('.') else {
        return false;
    };
    !host.is_empty() && tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic())
}

/// A timestamp for when a document was created or an event occurred.
///
/// This wrapper ensures consistent timestamp handling throughout the system;
/// serde output is RFC 3339 via `chrono`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Creates a new timestamp from a UTC `DateTime`.
    pub const fn new(datetime: DateTime<Utc>) -> Self {
        Self(datetime)
    }

    /// Creates a timestamp representing the current moment.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Returns the underlying `DateTime`.
    pub const fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Converts the timestamp into the underlying `DateTime`.
    pub const fn into_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(datetime: DateTime<Utc>) -> Self {
        Self::new(datetime)
    }
}

impl From<Timestamp> for DateTime<Utc> {
    fn from(timestamp: Timestamp) -> Self {
        timestamp.into_datetime()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
