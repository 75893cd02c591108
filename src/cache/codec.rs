//! Serde helpers for numeric timestamp fields in cached metadata.

use chrono::{DateTime, SubsecRound, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serializer};

/// `DateTime<Utc>` as fractional seconds since the Unix epoch, kept to
/// microsecond precision.
pub mod epoch_seconds {
  use super::*;

  pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: Serializer,
  {
    serializer.serialize_f64(to_epoch(value))
  }

  pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
  where
    D: Deserializer<'de>,
  {
    let secs = f64::deserialize(deserializer)?;
    from_epoch(secs)
      .ok_or_else(|| serde::de::Error::custom(format!("timestamp out of range: {}", secs)))
  }
}

/// Drop sub-microsecond digits so a value survives a store/load cycle
/// unchanged. Truncates, so a time never moves later.
pub fn cache_precision(value: DateTime<Utc>) -> DateTime<Utc> {
  value.trunc_subsecs(6)
}

pub fn to_epoch(value: &DateTime<Utc>) -> f64 {
  value.timestamp() as f64 + f64::from(value.timestamp_subsec_micros()) / 1_000_000.0
}

/// Inverse of [`to_epoch`] for microsecond values. The nearest microsecond
/// is taken because the float itself may sit just below the stored value.
pub fn from_epoch(secs: f64) -> Option<DateTime<Utc>> {
  if !secs.is_finite() {
    return None;
  }
  let micros = (secs * 1_000_000.0).round() as i64;
  Utc.timestamp_micros(micros).single()
}
