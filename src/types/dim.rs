//! Dim level for dimmable Deako devices.

use serde::{Deserialize, Serialize};

use crate::errors::Error;

/// Dim level from 0 to 100 percent.
///
/// The hub reports dim levels as JSON numbers which may carry a fractional
/// part; they are rounded to the nearest whole percent when decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "u8")]
pub struct Dim {
    pub(crate) value: u8,
}

impl Default for Dim {
    fn default() -> Self {
        Self::new()
    }
}

impl Dim {
    const MIN: u8 = 0;
    const MAX: u8 = 100;

    /// Full brightness.
    pub fn new() -> Self {
        Dim { value: Self::MAX }
    }

    pub fn value(&self) -> u8 {
        self.value
    }

    /// Returns None if value is outside valid range (0-100).
    pub fn create(value: u8) -> Option<Self> {
        if Self::is_valid(value) {
            Some(Dim { value })
        } else {
            None
        }
    }

    /// Returns default (100%) if value is invalid.
    pub fn create_or(value: u8) -> Self {
        Self::create(value).unwrap_or_default()
    }

    fn is_valid(value: u8) -> bool {
        (Self::MIN..=Self::MAX).contains(&value)
    }
}

impl TryFrom<f64> for Dim {
    type Error = Error;

    fn try_from(raw: f64) -> Result<Self, Self::Error> {
        let rounded = raw.round();
        if !(f64::from(Self::MIN)..=f64::from(Self::MAX)).contains(&rounded) {
            return Err(Error::InvalidDim(raw.to_string()));
        }
        Ok(Dim {
            value: rounded as u8,
        })
    }
}

impl From<Dim> for u8 {
    fn from(dim: Dim) -> Self {
        dim.value
    }
}
