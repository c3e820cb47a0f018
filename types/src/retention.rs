//! Retention budget types.
//!
//! A [`Retention`] is the fraction of tokens a compressor keeps. It always lies
//! in `(0, 1]`, where `1.0` means "keep everything" and disables compression.
//! Callers that still speak the legacy compression-ratio unit go through
//! [`RetentionSpec`] and are translated at the boundary.

use std::fmt;

use thiserror::Error;

/// A retention setting as supplied by a caller, in either unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetentionSpec {
    /// Fraction of tokens to keep.
    Keep(f64),
    /// Legacy compression ratio. Keeps `1 / ratio` of the tokens, so `2.0`
    /// keeps half.
    Ratio(f64),
}

impl RetentionSpec {
    /// The keep fraction this describes, before validation or clamping.
    #[must_use]
    pub fn fraction(self) -> f64 {
        match self {
            RetentionSpec::Keep(fraction) => fraction,
            RetentionSpec::Ratio(ratio) => 1.0 / ratio,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum RetentionError {
    #[error("tokens-to-keep fraction must be a positive finite number (got {0})")]
    InvalidFraction(f64),
    #[error("compression ratio must be a positive finite number (got {0})")]
    InvalidRatio(f64),
}

/// Validated keep fraction.
///
/// Invariant: `0 < fraction <= 1`. Values at or above `1.0` collapse to
/// [`Retention::FULL`], so "no compression" has exactly one representation.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Retention(f64);

impl Retention {
    /// Keep every token.
    pub const FULL: Retention = Retention(1.0);

    /// Strict constructor for a keep fraction.
    ///
    /// Fractions at or above `1.0` are accepted and mean "disabled"; NaN,
    /// infinities and non-positive values are rejected.
    pub fn from_fraction(fraction: f64) -> Result<Self, RetentionError> {
        if !fraction.is_finite() || fraction <= 0.0 {
            return Err(RetentionError::InvalidFraction(fraction));
        }
        Ok(Self::clamp(fraction))
    }

    /// Strict constructor for a legacy compression ratio.
    ///
    /// Ratios at or below `1.0` are accepted and mean "disabled".
    pub fn from_ratio(ratio: f64) -> Result<Self, RetentionError> {
        if !ratio.is_finite() || ratio <= 0.0 {
            return Err(RetentionError::InvalidRatio(ratio));
        }
        Ok(Self::clamp(1.0 / ratio))
    }

    fn clamp(fraction: f64) -> Self {
        if fraction >= 1.0 {
            Self::FULL
        } else {
            Self(fraction)
        }
    }

    #[must_use]
    pub const fn fraction(self) -> f64 {
        self.0
    }

    /// The equivalent legacy compression ratio.
    #[must_use]
    pub fn ratio(self) -> f64 {
        1.0 / self.0
    }

    /// True when nothing would ever be dropped.
    #[must_use]
    pub fn is_full(self) -> bool {
        self.0 >= 1.0
    }

    /// Percentage of tokens this setting removes, for display.
    #[must_use]
    pub fn removed_percent(self) -> f64 {
        100.0 * (1.0 - self.0)
    }

    /// Number of tokens to drop out of `token_count`.
    ///
    /// Rounds down, so short inputs at mild settings drop nothing. The result
    /// never exceeds `token_count`.
    #[must_use]
    pub fn tokens_to_drop(self, token_count: usize) -> usize {
        if self.is_full() || token_count == 0 {
            return 0;
        }
        let drop = (token_count as f64 * (1.0 - self.0)).floor();
        if drop <= 0.0 {
            0
        } else {
            (drop as usize).min(token_count)
        }
    }
}

impl Default for Retention {
    fn default() -> Self {
        Self::FULL
    }
}

impl TryFrom<RetentionSpec> for Retention {
    type Error = RetentionError;

    fn try_from(spec: RetentionSpec) -> Result<Self, Self::Error> {
        match spec {
            RetentionSpec::Keep(fraction) => Self::from_fraction(fraction),
            RetentionSpec::Ratio(ratio) => Self::from_ratio(ratio),
        }
    }
}

/// Lossy resolution: anything outside the attenuating range, including
/// invalid input, becomes [`Retention::FULL`].
impl From<RetentionSpec> for Retention {
    fn from(spec: RetentionSpec) -> Self {
        Self::try_from(spec).unwrap_or(Self::FULL)
    }
}

impl fmt::Display for Retention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "keep {:.2}", self.0)
    }
}
