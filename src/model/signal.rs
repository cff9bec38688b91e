use serde::{Deserialize, Serialize};

/// Minimum confidence before any direction becomes actionable.
pub const ACTIONABLE_CONFIDENCE: f64 = 0.5;
/// Minimum |strength| for a plain BUY/SELL.
pub const ACTION_STRENGTH: f64 = 0.5;
/// Minimum |strength| for STRONG_BUY/STRONG_SELL.
pub const STRONG_ACTION_STRENGTH: f64 = 0.7;

/// Discrete trade bias.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Short,
    Neutral,
    Long,
}

impl Direction {
    pub fn as_i8(self) -> i8 {
        match self {
            Self::Short => -1,
            Self::Neutral => 0,
            Self::Long => 1,
        }
    }

    pub fn as_f64(self) -> f64 {
        f64::from(self.as_i8())
    }

    /// Sign of `value`; exact zero and NaN map to `Neutral`.
    pub fn from_sign(value: f64) -> Self {
        if value > 0.0 {
            Self::Long
        } else if value < 0.0 {
            Self::Short
        } else {
            Self::Neutral
        }
    }

    pub fn from_i64(value: i64) -> Self {
        match value.signum() {
            1 => Self::Long,
            -1 => Self::Short,
            _ => Self::Neutral,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    StrongBuy,
    Buy,
    Hold,
    Sell,
    StrongSell,
}

impl Recommendation {
    /// Map a signed strength and a confidence onto the action ladder.
    ///
    /// Confidence gates everything: below [`ACTIONABLE_CONFIDENCE`] the answer
    /// is `Hold` whatever the strength says.
    pub fn classify(signed_strength: f64, confidence: f64) -> Self {
        Self::from_parts(Direction::from_sign(signed_strength), signed_strength.abs(), confidence)
    }

    pub fn from_parts(direction: Direction, strength: f64, confidence: f64) -> Self {
        if confidence.is_nan() || confidence < ACTIONABLE_CONFIDENCE {
            return Self::Hold;
        }
        let s = strength.abs();
        match direction {
            Direction::Neutral => Self::Hold,
            Direction::Long if s >= STRONG_ACTION_STRENGTH => Self::StrongBuy,
            Direction::Long if s >= ACTION_STRENGTH => Self::Buy,
            Direction::Short if s >= STRONG_ACTION_STRENGTH => Self::StrongSell,
            Direction::Short if s >= ACTION_STRENGTH => Self::Sell,
            _ => Self::Hold,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::StrongBuy => "STRONG_BUY",
            Self::Buy => "BUY",
            Self::Hold => "HOLD",
            Self::Sell => "SELL",
            Self::StrongSell => "STRONG_SELL",
        }
    }

    pub fn is_actionable(self) -> bool {
        self != Self::Hold
    }
}
