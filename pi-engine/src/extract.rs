//! Value extraction from displayed stat strings.
//!
//! Each stat carries an [`ExtractionRule`]. A raw string must pass
//! [`ExtractionRule::validate`] before [`extract`] is called; the walker uses
//! the validation gate to decide whether a snapshot is fully loaded.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::numbers::digits_to_f64;

/// Literal shown by the game for toggled stats.
pub const ENABLED_LITERAL: &str = "Enabled";

/// Description prefix of rolls that display no stats at all.
pub const NO_STATS_SENTINEL: &str = "UPGRADE_0";

static PERCENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[-+][0-9]{1,3}%$").expect("valid pattern"));
static PERCENT_THOUSANDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+[0-9]{1,2},[0-9]{3}%$").expect("valid pattern"));
static FLOAT_LITERAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+[0-9]{1,2}\.[0-9]$").expect("valid pattern"));
static LIGHTYEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]{2,3} ly$").expect("valid pattern"));
static BOOLEAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(Enabled|Disabled)$").expect("valid pattern"));
static DIGIT_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]+").expect("valid pattern"));
static RAW_BONUS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?[0-9]+(\.[0-9]+)?$").expect("valid pattern"));
static STAT_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<STELLAR>([A-Za-z ]+)<>").expect("valid pattern"));

/// Format rule turning a displayed string into a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionRule {
    /// `"+16%"` -> 16
    Percent,
    /// `"+6,775%"` -> 6775
    PercentThousands,
    /// `"+1.3"` -> 1.3
    FloatLiteral,
    /// `"221 ly"` -> 221
    LightyearDistance,
    /// `"Enabled"` -> true
    BooleanEnabled,
    /// First digit run of free text, e.g. a product age.
    LeadingInteger,
    /// Plain bonus number as reported by a process hook, before transform.
    RawBonus,
}

impl ExtractionRule {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Percent => "percent",
            Self::PercentThousands => "percent_thousands",
            Self::FloatLiteral => "float_literal",
            Self::LightyearDistance => "lightyear_distance",
            Self::BooleanEnabled => "boolean_enabled",
            Self::LeadingInteger => "leading_integer",
            Self::RawBonus => "raw_bonus",
        }
    }

    fn pattern(self) -> &'static Regex {
        match self {
            Self::Percent => Lazy::force(&PERCENT),
            Self::PercentThousands => Lazy::force(&PERCENT_THOUSANDS),
            Self::FloatLiteral => Lazy::force(&FLOAT_LITERAL),
            Self::LightyearDistance => Lazy::force(&LIGHTYEAR),
            Self::BooleanEnabled => Lazy::force(&BOOLEAN),
            Self::LeadingInteger => Lazy::force(&DIGIT_RUN),
            Self::RawBonus => Lazy::force(&RAW_BONUS),
        }
    }

    /// Whether `raw` is a complete, well-formed value for this rule.
    #[must_use]
    pub fn validate(self, raw: &str) -> bool {
        !raw.is_empty() && self.pattern().is_match(raw)
    }
}

impl fmt::Display for ExtractionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extracted stat value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExtractedValue {
    Number(f64),
    Flag(bool),
}

impl ExtractedValue {
    /// Numeric view used for scoring; flags map to 1.0 / 0.0.
    #[must_use]
    pub const fn as_f64(self) -> f64 {
        match self {
            Self::Number(value) => value,
            Self::Flag(true) => 1.0,
            Self::Flag(false) => 0.0,
        }
    }
}

/// Extract a value from a string that already passed `rule.validate`.
///
/// Never fails: input that slipped past validation degrades to `Number(0.0)`.
#[must_use]
pub fn extract(raw: &str, rule: ExtractionRule) -> ExtractedValue {
    match rule {
        ExtractionRule::Percent => ExtractedValue::Number(signed_percent(raw)),
        ExtractionRule::PercentThousands => {
            ExtractedValue::Number(signed_percent(&raw.replace(',', "")))
        }
        ExtractionRule::FloatLiteral => ExtractedValue::Number(
            raw.trim_start_matches(['+', '-'])
                .parse::<f64>()
                .unwrap_or(0.0),
        ),
        ExtractionRule::LightyearDistance => ExtractedValue::Number(
            raw.strip_suffix(" ly")
                .and_then(digits_to_f64)
                .unwrap_or(0.0),
        ),
        ExtractionRule::BooleanEnabled => ExtractedValue::Flag(raw == ENABLED_LITERAL),
        ExtractionRule::LeadingInteger => ExtractedValue::Number(
            DIGIT_RUN
                .find(raw)
                .and_then(|m| digits_to_f64(m.as_str()))
                .unwrap_or(0.0),
        ),
        ExtractionRule::RawBonus => ExtractedValue::Number(raw.parse::<f64>().unwrap_or(0.0)),
    }
}

fn signed_percent(raw: &str) -> f64 {
    let body = raw.strip_suffix('%').unwrap_or(raw);
    let (negative, digits) = match body.as_bytes().first() {
        Some(b'-') => (true, &body[1..]),
        Some(b'+') => (false, &body[1..]),
        _ => (false, body),
    };
    let magnitude = digits_to_f64(digits).unwrap_or(0.0);
    if negative { -magnitude } else { magnitude }
}

/// Display names tagged in a description, in order of appearance.
#[must_use]
pub fn tagged_stat_names(description: &str) -> Vec<&str> {
    STAT_TAG
        .captures_iter(description)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect()
}

/// Whether a description is the "no stats" placeholder.
#[must_use]
pub fn is_no_stats_sentinel(description: &str) -> bool {
    description.starts_with(NO_STATS_SENTINEL)
}

/// Arithmetic operator used by transform steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "+")]
    Add,
    #[serde(rename = "-")]
    Sub,
    #[serde(rename = "*")]
    Mul,
    #[serde(rename = "/")]
    Div,
}

impl Operator {
    fn apply(self, lhs: f64, rhs: f64) -> f64 {
        match self {
            Self::Add => lhs + rhs,
            Self::Sub => lhs - rhs,
            Self::Mul => lhs * rhs,
            Self::Div => lhs / rhs,
        }
    }
}

/// One instruction turning a raw bonus into its displayed value.
///
/// `reversed == false` computes `value op operand`, otherwise `operand op value`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransformStep {
    pub op: Operator,
    pub operand: f64,
    #[serde(default)]
    pub reversed: bool,
}

impl TransformStep {
    #[must_use]
    pub fn apply(self, value: f64) -> f64 {
        if self.reversed {
            self.op.apply(self.operand, value)
        } else {
            self.op.apply(value, self.operand)
        }
    }
}

/// Apply transform steps in order. An empty list leaves the value unchanged.
#[must_use]
pub fn apply_transform(steps: &[TransformStep], value: f64) -> f64 {
    steps.iter().fold(value, |acc, step| step.apply(acc))
}
