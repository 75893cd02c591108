//! Byte quantities with decimal unit suffixes (`B`, `KB`, `MB`, `GB`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::str::FromStr;

const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
const UNIT_FACTOR: f64 = 1000.0;

/// A size in bytes.
///
/// Serializes as a plain integer so cached metadata stays numeric; the
/// suffixed form is only used for parsing what the source displays and for
/// human-readable logging.
#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct FileSize(u64);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid file size {0:?}")]
pub struct ParseFileSizeError(String);

impl FileSize {
  pub const fn new(bytes: u64) -> Self {
    Self(bytes)
  }

  pub const fn bytes(self) -> u64 {
    self.0
  }

  /// Multiplier for a unit suffix, `None` for unknown suffixes.
  fn unit_value(unit: &str) -> Option<f64> {
    UNITS
      .iter()
      .position(|u| u.eq_ignore_ascii_case(unit))
      .map(|index| UNIT_FACTOR.powi(index as i32))
  }

  /// Format with one decimal and the largest unit below 1000, e.g. `2.5MB`.
  pub fn humanized(self) -> String {
    let mut num = self.0 as f64;
    for unit in &UNITS[..UNITS.len() - 1] {
      if num.abs() < UNIT_FACTOR {
        return format!("{:.1}{}", num, unit);
      }
      num /= UNIT_FACTOR;
    }
    format!("{:.1}{}", num, UNITS[UNITS.len() - 1])
  }

  /// Fraction of `total` this size represents, `None` when `total` is zero.
  pub fn ratio_of(self, total: FileSize) -> Option<f64> {
    if total.0 == 0 {
      None
    } else {
      Some(self.0 as f64 / total.0 as f64)
    }
  }
}

impl FromStr for FileSize {
  type Err = ParseFileSizeError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let trimmed = s.trim();
    let split = trimmed
      .find(|c: char| !(c.is_ascii_digit() || c == '.'))
      .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);
    let unit = unit.trim();

    if unit.is_empty() {
      if let Ok(bytes) = number.parse::<u64>() {
        return Ok(Self(bytes));
      }
    }

    let value: f64 = number
      .parse()
      .map_err(|_| ParseFileSizeError(s.to_string()))?;
    let factor = if unit.is_empty() {
      1.0
    } else {
      Self::unit_value(unit).ok_or_else(|| ParseFileSizeError(s.to_string()))?
    };

    Ok(Self((value * factor).round() as u64))
  }
}

impl fmt::Display for FileSize {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.humanized())
  }
}

impl From<u64> for FileSize {
  fn from(bytes: u64) -> Self {
    Self(bytes)
  }
}

impl From<FileSize> for u64 {
  fn from(size: FileSize) -> Self {
    size.0
  }
}

impl Add for FileSize {
  type Output = FileSize;

  fn add(self, rhs: FileSize) -> FileSize {
    FileSize(self.0 + rhs.0)
  }
}

impl AddAssign for FileSize {
  fn add_assign(&mut self, rhs: FileSize) {
    self.0 += rhs.0;
  }
}

impl Sum for FileSize {
  fn sum<I: Iterator<Item = FileSize>>(iter: I) -> Self {
    iter.fold(FileSize::default(), Add::add)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_suffixed() {
    assert_eq!("2.5MB".parse::<FileSize>().unwrap().bytes(), 2_500_000);
    assert_eq!("1.2KB".parse::<FileSize>().unwrap().bytes(), 1_200);
    assert_eq!("3GB".parse::<FileSize>().unwrap().bytes(), 3_000_000_000);
    assert_eq!("12 B".parse::<FileSize>().unwrap().bytes(), 12);
  }

  #[test]
  fn test_parse_plain_integer() {
    assert_eq!("2500000".parse::<FileSize>().unwrap().bytes(), 2_500_000);
  }

  #[test]
  fn test_parse_rejects_garbage() {
    assert!("".parse::<FileSize>().is_err());
    assert!("12XB".parse::<FileSize>().is_err());
    assert!("MB".parse::<FileSize>().is_err());
  }

  #[test]
  fn test_humanized() {
    assert_eq!(FileSize::new(999).humanized(), "999.0B");
    assert_eq!(FileSize::new(2_500_000).humanized(), "2.5MB");
    assert_eq!(FileSize::new(4_200_000_000_000).humanized(), "4200.0GB");
  }

  #[test]
  fn test_sum_and_ratio() {
    let total: FileSize = [FileSize::new(500), FileSize::new(1_500)].into_iter().sum();
    assert_eq!(total, FileSize::new(2_000));
    assert_eq!(FileSize::new(500).ratio_of(total), Some(0.25));
    assert_eq!(total.ratio_of(FileSize::default()), None);
  }

  #[test]
  fn test_serializes_as_integer() {
    let json = serde_json::to_string(&FileSize::new(2_500_000)).unwrap();
    assert_eq!(json, "2500000");
    let back: FileSize = serde_json::from_str(&json).unwrap();
    assert_eq!(back, FileSize::new(2_500_000));
  }
}
