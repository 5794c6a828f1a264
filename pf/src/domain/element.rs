//! Prompt elements and their parts
//!
//! Elements never own each other. A part that nests another element holds an
//! [`ElementRef`] which is resolved through the [`Registry`](crate::Registry)
//! whenever the element is rendered.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::gender::Gender;
use super::policy::CombinePolicy;
use super::purpose::Purpose;

/// Default weight of a part or lora
pub const DEFAULT_WEIGHT: f64 = 1.0;

/// Which namespace of the registry an element lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Tag,
    Character,
    Lora,
}

impl std::fmt::Display for ElementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tag => write!(f, "tag"),
            Self::Character => write!(f, "character"),
            Self::Lora => write!(f, "lora"),
        }
    }
}

/// Non-owning reference to a registered element
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementRef {
    pub kind: ElementKind,
    pub name: String,
}

impl ElementRef {
    pub fn new(kind: ElementKind, name: impl Into<String>) -> Self {
        Self { kind, name: name.into() }
    }

    pub fn tag(name: impl Into<String>) -> Self {
        Self::new(ElementKind::Tag, name)
    }

    pub fn character(name: impl Into<String>) -> Self {
        Self::new(ElementKind::Character, name)
    }

    pub fn lora(name: impl Into<String>) -> Self {
        Self::new(ElementKind::Lora, name)
    }
}

impl std::fmt::Display for ElementRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.name)
    }
}

/// Value carried by a part
#[derive(Debug, Clone, PartialEq)]
pub enum PartValue {
    /// Literal prompt token
    Text(String),
    /// Nested element, rendered with the part's weight as its override
    Element(ElementRef),
}

/// Atomic weighted piece of an element
#[derive(Debug, Clone, PartialEq)]
pub struct PromptPart {
    pub value: PartValue,
    pub weight: f64,
}

impl PromptPart {
    /// Literal token with weight 1.0
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            value: PartValue::Text(text.into()),
            weight: DEFAULT_WEIGHT,
        }
    }

    /// Nested element with weight 1.0
    pub fn element(reference: ElementRef) -> Self {
        Self {
            value: PartValue::Element(reference),
            weight: DEFAULT_WEIGHT,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// The referenced element, if this part nests one
    pub fn reference(&self) -> Option<&ElementRef> {
        match &self.value {
            PartValue::Element(r) => Some(r),
            PartValue::Text(_) => None,
        }
    }
}

/// A reusable descriptive tag
#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    pub name: String,
    pub gender: Gender,
    pub purpose: Purpose,
    pub parts: Vec<PromptPart>,
    pub combine_policy: CombinePolicy,
    incompatible: BTreeSet<String>,
}

impl Tag {
    pub fn new(name: impl Into<String>, gender: Gender, purpose: Purpose) -> Self {
        Self {
            name: name.into(),
            gender,
            purpose,
            parts: Vec::new(),
            combine_policy: CombinePolicy::default(),
            incompatible: BTreeSet::new(),
        }
    }

    pub fn with_part(mut self, part: PromptPart) -> Self {
        self.parts.push(part);
        self
    }

    pub fn with_policy(mut self, policy: CombinePolicy) -> Self {
        self.combine_policy = policy;
        self
    }

    /// Names of tags this tag must never share a group with
    pub fn incompatible_names(&self) -> &BTreeSet<String> {
        &self.incompatible
    }

    /// Make both tags mutually incompatible. Does nothing when `other` has
    /// the same name as `self`.
    pub fn add_incompatibility(&mut self, other: &mut Tag) {
        if self.name == other.name {
            return;
        }
        self.incompatible.insert(other.name.clone());
        other.incompatible.insert(self.name.clone());
    }

    pub fn is_compatible_with(&self, other: &Tag) -> bool {
        !self.incompatible.contains(&other.name)
    }

    /// One-sided insert; the registry pairs every call with its mirror
    pub(crate) fn mark_incompatible(&mut self, name: &str) {
        if name != self.name {
            self.incompatible.insert(name.to_string());
        }
    }
}

/// A character that opens a composition group
#[derive(Debug, Clone, PartialEq)]
pub struct Character {
    pub name: String,
    pub gender: Gender,
    pub parts: Vec<PromptPart>,
    pub combine_policy: CombinePolicy,
    usage_count: u64,
}

impl Character {
    pub fn new(name: impl Into<String>, gender: Gender) -> Self {
        Self {
            name: name.into(),
            gender,
            parts: Vec::new(),
            combine_policy: CombinePolicy::default(),
            usage_count: 0,
        }
    }

    pub fn with_part(mut self, part: PromptPart) -> Self {
        self.parts.push(part);
        self
    }

    pub fn with_policy(mut self, policy: CombinePolicy) -> Self {
        self.combine_policy = policy;
        self
    }

    /// Number of compositions this character has been part of
    pub fn usage_count(&self) -> u64 {
        self.usage_count
    }

    /// Bump the usage counter and return the new value
    pub(crate) fn increment_usage(&mut self) -> u64 {
        self.usage_count += 1;
        self.usage_count
    }

    pub(crate) fn restore_usage(&mut self, count: u64) {
        self.usage_count = count;
    }
}

/// Model-weight modifier rendered as `<lora:name:weight>`
#[derive(Debug, Clone, PartialEq)]
pub struct LoraModifier {
    pub name: String,
    pub weight: f64,
}

impl LoraModifier {
    pub fn new(name: impl Into<String>, weight: f64) -> Self {
        Self {
            name: name.into(),
            weight,
        }
    }

    /// Backend marker token carrying the effective weight
    pub fn marker(&self, weight_override: f64) -> String {
        format!("<lora:{}:{:?}>", self.name, self.weight * weight_override)
    }
}

/// Borrowed view over any registered element
#[derive(Debug, Clone, Copy)]
pub enum ElementView<'a> {
    Tag(&'a Tag),
    Character(&'a Character),
    Lora(&'a LoraModifier),
}

impl<'a> ElementView<'a> {
    pub fn kind(&self) -> ElementKind {
        match self {
            Self::Tag(_) => ElementKind::Tag,
            Self::Character(_) => ElementKind::Character,
            Self::Lora(_) => ElementKind::Lora,
        }
    }

    pub fn name(&self) -> &'a str {
        match self {
            Self::Tag(t) => &t.name,
            Self::Character(c) => &c.name,
            Self::Lora(l) => &l.name,
        }
    }

    pub fn gender(&self) -> Gender {
        match self {
            Self::Tag(t) => t.gender,
            Self::Character(c) => c.gender,
            Self::Lora(_) => Gender::Unisex,
        }
    }

    pub fn parts(&self) -> &'a [PromptPart] {
        match self {
            Self::Tag(t) => &t.parts,
            Self::Character(c) => &c.parts,
            Self::Lora(_) => &[],
        }
    }

    pub fn combine_policy(&self) -> CombinePolicy {
        match self {
            Self::Tag(t) => t.combine_policy,
            Self::Character(c) => c.combine_policy,
            Self::Lora(_) => CombinePolicy::Multiplicative,
        }
    }

    pub fn to_ref(&self) -> ElementRef {
        ElementRef::new(self.kind(), self.name())
    }
}
