//! Localized name columns.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Languages in persisted column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Language {
    En,
    Fr,
    It,
    De,
    Es,
    Ru,
    Pl,
    Nl,
    Pt,
    #[serde(rename = "es-419")]
    Es419,
    #[serde(rename = "pt-BR")]
    PtBr,
    Ja,
    #[serde(rename = "zh-Hans")]
    ZhHans,
    #[serde(rename = "zh-Hant")]
    ZhHant,
    Ko,
}

impl Language {
    pub const ALL: [Self; 15] = [
        Self::En,
        Self::Fr,
        Self::It,
        Self::De,
        Self::Es,
        Self::Ru,
        Self::Pl,
        Self::Nl,
        Self::Pt,
        Self::Es419,
        Self::PtBr,
        Self::Ja,
        Self::ZhHans,
        Self::ZhHant,
        Self::Ko,
    ];

    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Fr => "fr",
            Self::It => "it",
            Self::De => "de",
            Self::Es => "es",
            Self::Ru => "ru",
            Self::Pl => "pl",
            Self::Nl => "nl",
            Self::Pt => "pt",
            Self::Es419 => "es-419",
            Self::PtBr => "pt-BR",
            Self::Ja => "ja",
            Self::ZhHans => "zh-Hans",
            Self::ZhHant => "zh-Hant",
            Self::Ko => "ko",
        }
    }

    /// Persisted column header, e.g. `Name (en)`.
    #[must_use]
    pub fn column(self) -> String {
        format!("Name ({})", self.code())
    }

    /// Resolve a column header, accepting the legacy Chinese headers.
    #[must_use]
    pub fn from_column(header: &str) -> Option<Self> {
        let code = header.strip_prefix("Name (")?.strip_suffix(')')?;
        match code {
            "zh-CN" => Some(Self::ZhHans),
            "zh-TW" => Some(Self::ZhHant),
            other => other.parse().ok(),
        }
    }

    /// Whether `header` is a legacy alias rather than the canonical column.
    #[must_use]
    pub fn is_legacy_column(header: &str) -> bool {
        matches!(header, "Name (zh-CN)" | "Name (zh-TW)")
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|language| language.code() == s)
            .ok_or(())
    }
}
