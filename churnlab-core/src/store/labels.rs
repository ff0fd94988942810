//! Label alignment policy and the label sets it produces.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::frame::LabelRow;

/// How labels are matched to an as-of date.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelAlignment {
    /// Only labels whose `period_start` equals the as-of date.
    Period,
    /// Unaligned labels stamped with the as-of date.
    Global,
    /// `Period`, falling back to `Global` when the period has no labels.
    #[default]
    PeriodWithGlobalFallback,
}

impl LabelAlignment {
    pub fn as_str(&self) -> &'static str {
        match self {
            LabelAlignment::Period => "period",
            LabelAlignment::Global => "global",
            LabelAlignment::PeriodWithGlobalFallback => "period_with_global_fallback",
        }
    }
}

impl fmt::Display for LabelAlignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LabelAlignment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "period" => Ok(LabelAlignment::Period),
            "global" => Ok(LabelAlignment::Global),
            "period_with_global_fallback" | "fallback" => {
                Ok(LabelAlignment::PeriodWithGlobalFallback)
            }
            other => Err(format!("unknown label alignment '{other}'")),
        }
    }
}

/// Which label source actually produced a label set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppliedAlignment {
    Period,
    Global,
}

impl fmt::Display for AppliedAlignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppliedAlignment::Period => f.write_str("period"),
            AppliedAlignment::Global => f.write_str("global"),
        }
    }
}

/// Labels for one as-of date plus the alignment that produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelSet {
    pub rows: Vec<LabelRow>,
    pub alignment_used: AppliedAlignment,
}

impl LabelSet {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_config_spellings() {
        assert_eq!("period".parse::<LabelAlignment>().unwrap(), LabelAlignment::Period);
        assert_eq!("GLOBAL".parse::<LabelAlignment>().unwrap(), LabelAlignment::Global);
        assert_eq!(
            "period-with-global-fallback".parse::<LabelAlignment>().unwrap(),
            LabelAlignment::PeriodWithGlobalFallback
        );
        assert!("monthly".parse::<LabelAlignment>().is_err());
    }

    #[test]
    fn default_is_fallback() {
        assert_eq!(LabelAlignment::default(), LabelAlignment::PeriodWithGlobalFallback);
    }
}
