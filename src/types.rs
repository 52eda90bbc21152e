// =============================================================================
// Shared types used across the screener
// =============================================================================

use serde::{Deserialize, Serialize};

/// Directional bias produced by the signal scorer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Bias {
    Long,
    Short,
    Neutral,
}

impl Bias {
    pub fn is_directional(self) -> bool {
        !matches!(self, Self::Neutral)
    }
}

impl std::fmt::Display for Bias {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Long => write!(f, "LONG"),
            Self::Short => write!(f, "SHORT"),
            Self::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// Kline interval, serialised as the exchange's interval string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "3m")]
    ThreeMinutes,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "30m")]
    ThirtyMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "2h")]
    TwoHours,
    #[serde(rename = "4h")]
    FourHours,
    #[serde(rename = "6h")]
    SixHours,
    #[serde(rename = "8h")]
    EightHours,
    #[serde(rename = "12h")]
    TwelveHours,
    #[serde(rename = "1d")]
    OneDay,
    #[serde(rename = "3d")]
    ThreeDays,
    #[serde(rename = "1w")]
    OneWeek,
    #[serde(rename = "1M")]
    OneMonth,
}

impl Interval {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OneMinute => "1m",
            Self::ThreeMinutes => "3m",
            Self::FiveMinutes => "5m",
            Self::FifteenMinutes => "15m",
            Self::ThirtyMinutes => "30m",
            Self::OneHour => "1h",
            Self::TwoHours => "2h",
            Self::FourHours => "4h",
            Self::SixHours => "6h",
            Self::EightHours => "8h",
            Self::TwelveHours => "12h",
            Self::OneDay => "1d",
            Self::ThreeDays => "3d",
            Self::OneWeek => "1w",
            Self::OneMonth => "1M",
        }
    }
}

impl Default for Interval {
    fn default() -> Self {
        Self::FifteenMinutes
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // "1M" (month) and "1m" (minute) differ only by case, so no lowercasing.
        let iv = match s.trim() {
            "1m" => Self::OneMinute,
            "3m" => Self::ThreeMinutes,
            "5m" => Self::FiveMinutes,
            "15m" => Self::FifteenMinutes,
            "30m" => Self::ThirtyMinutes,
            "1h" => Self::OneHour,
            "2h" => Self::TwoHours,
            "4h" => Self::FourHours,
            "6h" => Self::SixHours,
            "8h" => Self::EightHours,
            "12h" => Self::TwelveHours,
            "1d" => Self::OneDay,
            "3d" => Self::ThreeDays,
            "1w" => Self::OneWeek,
            "1M" => Self::OneMonth,
            other => return Err(format!("unsupported kline interval '{other}'")),
        };
        Ok(iv)
    }
}

/// Ordering key used by the ranker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RankingKey {
    /// Directional strength alone.
    Confidence,
    /// Directional strength multiplied by the latest candle volume.
    ConfidenceVolume,
}

impl Default for RankingKey {
    fn default() -> Self {
        Self::Confidence
    }
}

impl std::fmt::Display for RankingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Confidence => write!(f, "Confidence"),
            Self::ConfidenceVolume => write!(f, "ConfidenceVolume"),
        }
    }
}

/// Which EMA relationship feeds the trend term of the scorer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendRule {
    /// Strict fast > slow > trend (or the reverse).
    Nested,
    /// Strict fast vs slow crossover; the trend EMA is ignored.
    Crossover,
}

impl Default for TrendRule {
    fn default() -> Self {
        Self::Nested
    }
}

impl std::fmt::Display for TrendRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Nested => write!(f, "Nested"),
            Self::Crossover => write!(f, "Crossover"),
        }
    }
}
