//! Semantic purpose of a tag

use serde::{Deserialize, Serialize};

/// What aspect of the image a tag describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Purpose {
    Appearance,
    Pose,
    Action,
    Style,
    Lighting,
    Clothing,
    Expression,
    Composition,
    Background,
    #[default]
    Other,
}

impl Purpose {
    pub const ALL: [Purpose; 10] = [
        Self::Appearance,
        Self::Pose,
        Self::Action,
        Self::Style,
        Self::Lighting,
        Self::Clothing,
        Self::Expression,
        Self::Composition,
        Self::Background,
        Self::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Appearance => "appearance",
            Self::Pose => "pose",
            Self::Action => "action",
            Self::Style => "style",
            Self::Lighting => "lighting",
            Self::Clothing => "clothing",
            Self::Expression => "expression",
            Self::Composition => "composition",
            Self::Background => "background",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for Purpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Purpose {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == lower)
            .ok_or_else(|| format!("Unknown purpose: {}", s))
    }
}
