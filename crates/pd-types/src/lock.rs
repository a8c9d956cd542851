//! Lock records as written to, and read back from, the entity property.

use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entity::{Nonce, OwnerId};
use crate::error::TypeError;

/// The value an acquirer writes into the lock property.
///
/// Serialized as `{"owner", "nonce", "expiresAt"}` with an RFC 3339 UTC
/// timestamp. The exact JSON produced here is what later conditional writes
/// compare against, so a held record must be released with the same value it
/// was written with.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockRecord {
    pub owner: OwnerId,
    pub nonce: Nonce,
    pub expires_at: DateTime<Utc>,
}

impl LockRecord {
    /// Build a candidate lock with a fresh nonce expiring `ttl` after `now`.
    pub fn candidate(owner: OwnerId, now: DateTime<Utc>, ttl: Duration) -> Self {
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
            .trunc_subsecs(3);
        Self {
            owner,
            nonce: Nonce::generate(),
            expires_at,
        }
    }

    /// Returns `true` once `now` is strictly past the expiry.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// The JSON value stored in the property.
    pub fn to_value(&self) -> Result<Value, TypeError> {
        serde_json::to_value(self).map_err(|e| TypeError::Serialization(e.to_string()))
    }
}

/// A lock value read back from the store.
///
/// Other clients may have written anything into the property, so the raw
/// JSON is kept verbatim (takeover must compare against it byte for byte)
/// and the fields are parsed on demand.
#[derive(Clone, Debug, PartialEq)]
pub struct ObservedLock {
    raw: Value,
}

impl ObservedLock {
    pub fn new(raw: Value) -> Self {
        Self { raw }
    }

    pub fn nonce(&self) -> Option<&str> {
        self.raw.get("nonce").and_then(Value::as_str)
    }

    pub fn owner(&self) -> Option<&str> {
        self.raw.get("owner").and_then(Value::as_str)
    }

    /// Parsed expiry, or `None` if missing or not RFC 3339.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.raw
            .get("expiresAt")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc))
    }

    /// An unreadable expiry counts as expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at() {
            Some(expires_at) => now > expires_at,
            None => true,
        }
    }

    /// Whether this observation is the given lock instance.
    pub fn is_instance(&self, record: &LockRecord) -> bool {
        self.nonce() == Some(record.nonce.as_str())
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }
}
