//! Gender of an element

use serde::{Deserialize, Serialize};

/// Gender an element is written for. Unisex elements fit any character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    #[default]
    Unisex,
}

impl Gender {
    /// Whether an element of this gender may be attached to a character of `other`
    pub fn fits(&self, other: Gender) -> bool {
        *self == Gender::Unisex || *self == other
    }
}

impl std::fmt::Display for Gender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Male => write!(f, "male"),
            Self::Female => write!(f, "female"),
            Self::Unisex => write!(f, "unisex"),
        }
    }
}

impl std::str::FromStr for Gender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "male" => Ok(Self::Male),
            "female" => Ok(Self::Female),
            "unisex" => Ok(Self::Unisex),
            _ => Err(format!("Unknown gender: {}", s)),
        }
    }
}
