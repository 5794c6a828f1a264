//! promptforge - composable weighted prompts
//!
//! Builds prompts for image-generation backends out of a library of reusable
//! elements: characters, tags and lora modifiers. Elements are made of weighted
//! parts which may nest other elements. Composing a list of elements renders
//! every part, folds repeated weights and emits backend syntax.
//!
//! # Library file
//!
//! ```text
//! library.json
//! ├── characters   # name, gender, parts, usage_count
//! ├── tags         # name, gender, purpose, parts, incompatibles
//! └── loras        # name, weight
//! ```
//!
//! # Example
//!
//! ```
//! use promptforge::{Character, ElementRef, Gender, PromptComposer, PromptPart, Purpose, Registry, Tag};
//!
//! let mut registry = Registry::new();
//! registry.register_character(Character::new("Alice", Gender::Female))?;
//! registry.register_tag(Tag::new("smile", Gender::Unisex, Purpose::Expression).with_part(PromptPart::text("smiling")))?;
//!
//! let elements = [Some(ElementRef::character("Alice")), Some(ElementRef::tag("smile"))];
//! let composition = PromptComposer::default().generate(&mut registry, &elements)?;
//! assert_eq!(composition.prompt, "smiling, ");
//! assert_eq!(composition.filename, "Alice_1");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod backend;
pub mod cli;
pub mod compose;
pub mod config;
pub mod domain;
mod error;
pub mod registry;
mod render;

pub use compose::{ComposeOptions, Composition, DEFAULT_BREAK_TOKEN, LORA_MARKER, PromptComposer};
pub use domain::{
    Character, CombinePolicy, ElementKind, ElementRef, ElementView, Gender, LoraModifier, PartValue, PromptPart,
    Purpose, Tag,
};
pub use error::{ComposeError, RegistryError};
pub use registry::Registry;
pub use render::TokenWeights;
