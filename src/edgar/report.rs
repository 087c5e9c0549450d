use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use strum::{EnumIter, IntoEnumIterator};

/// Ownership-disclosure form types, as the registry spells them in its feeds and indexes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter)]
#[serde(try_from = "String")]
pub enum ReportType {
    Form3,
    Form3A,
    Form4,
    Form4A,
    Form5,
    Form5A,
    Other(String),
}

impl TryFrom<String> for ReportType {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        ReportType::from_str(&s)
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportType::Form3 => write!(f, "3"),
            ReportType::Form3A => write!(f, "3/A"),
            ReportType::Form4 => write!(f, "4"),
            ReportType::Form4A => write!(f, "4/A"),
            ReportType::Form5 => write!(f, "5"),
            ReportType::Form5A => write!(f, "5/A"),
            ReportType::Other(s) => write!(f, "{}", s),
        }
    }
}

pub static REPORT_TYPES: Lazy<String> = Lazy::new(|| {
    ReportType::iter()
        .filter(|t| !matches!(t, ReportType::Other(_)))
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(", ")
});

impl ReportType {
    pub fn list_types() -> &'static str {
        &REPORT_TYPES
    }

    /// Exact comparison against a raw type marker; surrounding whitespace is ignored.
    pub fn matches(&self, raw: &str) -> bool {
        raw.trim() == self.to_string()
    }
}

impl FromStr for ReportType {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<ReportType, std::string::String> {
        match s.trim().to_uppercase().as_str() {
            "3" => Ok(ReportType::Form3),
            "3/A" => Ok(ReportType::Form3A),
            "4" => Ok(ReportType::Form4),
            "4/A" => Ok(ReportType::Form4A),
            "5" => Ok(ReportType::Form5),
            "5/A" => Ok(ReportType::Form5A),
            "" => Err("empty report type".to_string()),
            _ => Ok(ReportType::Other(s.trim().to_string())),
        }
    }
}
