//! Combination policies for folding weight contributions

use serde::{Deserialize, Serialize};

/// Rule for folding every weight a token received into one final weight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CombinePolicy {
    /// Geometric mean of all contributions
    #[default]
    Geometric,
    /// Product of all contributions
    Multiplicative,
    /// Nested parenthesized wrapping; not supported for folding
    Wrap,
}

impl std::fmt::Display for CombinePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Geometric => write!(f, "geometric"),
            Self::Multiplicative => write!(f, "multiplicative"),
            Self::Wrap => write!(f, "wrap"),
        }
    }
}

impl std::str::FromStr for CombinePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "geometric" => Ok(Self::Geometric),
            "multiplicative" => Ok(Self::Multiplicative),
            "wrap" => Ok(Self::Wrap),
            _ => Err(format!("Unknown combine policy: {}", s)),
        }
    }
}
