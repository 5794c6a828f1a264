//! Domain types for promptforge
//!
//! Elements (tags, characters, loras), the parts they are built from, and the
//! enums that classify them.

mod element;
mod gender;
mod policy;
mod purpose;

pub use element::{
    Character, DEFAULT_WEIGHT, ElementKind, ElementRef, ElementView, LoraModifier, PartValue, PromptPart, Tag,
};
pub use gender::Gender;
pub use policy::CombinePolicy;
pub use purpose::Purpose;
