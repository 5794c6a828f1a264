//! Error types for composition and the registry

use thiserror::Error;

use crate::domain::{CombinePolicy, Gender};

/// Errors raised while rendering or composing a prompt
#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("Invalid composition: {0}")]
    Structural(String),

    #[error("Tag '{tag}' ({tag_gender}) does not fit character '{character}' ({character_gender})")]
    GenderMismatch {
        tag: String,
        tag_gender: Gender,
        character: String,
        character_gender: Gender,
    },

    #[error("Tags '{first}' and '{second}' are incompatible")]
    Incompatibility { first: String, second: String },

    #[error("Combine policy '{0}' cannot fold weights")]
    UnsupportedCombinePolicy(CombinePolicy),

    #[error("Unknown element: {name}")]
    UnknownReference { name: String },

    #[error("Element '{name}' references itself through its parts")]
    ReferenceCycle { name: String },
}

/// Errors raised while mutating, saving or loading a registry
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Unknown element: {name}")]
    UnknownReference { name: String },

    #[error("Element '{name}' is not a tag")]
    NotATag { name: String },

    #[error("Tag '{name}' cannot be incompatible with itself")]
    SelfIncompatible { name: String },

    #[error("Element name must not be empty")]
    EmptyName,

    #[error("Element '{name}' has a non-finite weight and cannot be saved")]
    NonFiniteWeight { name: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
