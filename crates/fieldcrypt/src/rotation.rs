//! Age-based rotation policy.
//!
//! The policy only flags candidates. Re-encryption is done by
//! [`Migrator::refresh`](crate::migrate::Migrator::refresh) or the caller.

use chrono::{DateTime, Duration, Utc};

use crate::cipher::Envelope;

/// Default maximum envelope age before rotation is due.
pub const DEFAULT_MAX_AGE_DAYS: u32 = 90;

/// Flags envelopes older than a fixed threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    max_age: Duration,
}

impl RotationPolicy {
    /// Policy with an explicit threshold.
    pub fn new(max_age: Duration) -> Self {
        Self { max_age }
    }

    /// Policy with a threshold expressed in whole days.
    pub fn from_days(days: u32) -> Self {
        Self::new(Duration::days(i64::from(days)))
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// `true` if `envelope` is strictly older than the threshold right now.
    pub fn needs_rotation(&self, envelope: &Envelope) -> bool {
        self.needs_rotation_at(envelope, Utc::now())
    }

    /// Pure form of [`RotationPolicy::needs_rotation`]. An envelope exactly
    /// `max_age` old is not yet due.
    pub fn needs_rotation_at(&self, envelope: &Envelope, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(envelope.encrypted_at()) > self.max_age
    }
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self::from_days(DEFAULT_MAX_AGE_DAYS)
    }
}
