//! Library file format and two-pass loading
//!
//! ```text
//! {
//!   "characters": [{ "name", "gender", "parts", "usage_count", "combine_policy" }],
//!   "tags":       [{ "name", "gender", "purpose", "parts", "incompatibles", "combine_policy" }],
//!   "loras":      [{ "name", "weight" }]
//! }
//! ```
//!
//! Parts may reference elements defined later in the same file, so loading
//! first registers an empty shell for every record and only then resolves
//! parts and incompatibilities by name.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use super::Registry;
use crate::domain::{
    Character, CombinePolicy, DEFAULT_WEIGHT, ElementKind, ElementRef, Gender, LoraModifier, PartValue, PromptPart,
    Purpose, Tag,
};
use crate::error::RegistryError;

fn default_weight() -> f64 {
    DEFAULT_WEIGHT
}

/// Whether a part holds literal text or a reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartType {
    String,
    Element,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartRecord {
    #[serde(rename = "type")]
    pub part_type: PartType,

    /// Literal text, or the referenced element's name
    pub value: String,

    #[serde(default = "default_weight")]
    pub weight: f64,

    /// Namespace of the referenced element; looked up by name when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ElementKind>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterRecord {
    pub name: String,
    pub gender: Gender,
    #[serde(default)]
    pub parts: Vec<PartRecord>,
    #[serde(default, alias = "images_generated")]
    pub usage_count: u64,
    #[serde(default)]
    pub combine_policy: CombinePolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagRecord {
    pub name: String,
    pub gender: Gender,
    pub purpose: Purpose,
    #[serde(default)]
    pub parts: Vec<PartRecord>,
    #[serde(default)]
    pub incompatibles: Vec<String>,
    #[serde(default)]
    pub combine_policy: CombinePolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoraRecord {
    pub name: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

/// Serialized form of a whole registry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LibraryDocument {
    #[serde(default)]
    pub characters: Vec<CharacterRecord>,
    #[serde(default)]
    pub tags: Vec<TagRecord>,
    #[serde(default)]
    pub loras: Vec<LoraRecord>,
}

impl LibraryDocument {
    /// Name the first element carrying a NaN or infinite weight
    fn check_finite(&self) -> Result<(), RegistryError> {
        let parts = self
            .characters
            .iter()
            .map(|c| (&c.name, &c.parts))
            .chain(self.tags.iter().map(|t| (&t.name, &t.parts)));
        for (name, records) in parts {
            if records.iter().any(|p| !p.weight.is_finite()) {
                return Err(RegistryError::NonFiniteWeight { name: name.clone() });
            }
        }
        if let Some(lora) = self.loras.iter().find(|l| !l.weight.is_finite()) {
            return Err(RegistryError::NonFiniteWeight {
                name: lora.name.clone(),
            });
        }
        Ok(())
    }
}

impl From<&PromptPart> for PartRecord {
    fn from(part: &PromptPart) -> Self {
        match &part.value {
            PartValue::Text(text) => Self {
                part_type: PartType::String,
                value: text.clone(),
                weight: part.weight,
                kind: None,
            },
            PartValue::Element(reference) => Self {
                part_type: PartType::Element,
                value: reference.name.clone(),
                weight: part.weight,
                kind: Some(reference.kind),
            },
        }
    }
}

impl Registry {
    /// Snapshot every registered element
    pub fn to_document(&self) -> LibraryDocument {
        debug!(elements = self.len(), "to_document: called");
        LibraryDocument {
            characters: self
                .characters()
                .map(|c| CharacterRecord {
                    name: c.name.clone(),
                    gender: c.gender,
                    parts: c.parts.iter().map(PartRecord::from).collect(),
                    usage_count: c.usage_count(),
                    combine_policy: c.combine_policy,
                })
                .collect(),
            tags: self
                .tags()
                .map(|t| TagRecord {
                    name: t.name.clone(),
                    gender: t.gender,
                    purpose: t.purpose,
                    parts: t.parts.iter().map(PartRecord::from).collect(),
                    // Links to tags that were never registered stay in memory only
                    incompatibles: t
                        .incompatible_names()
                        .iter()
                        .filter(|name| self.tag(name).is_some())
                        .cloned()
                        .collect(),
                    combine_policy: t.combine_policy,
                })
                .collect(),
            loras: self
                .loras()
                .map(|l| LoraRecord {
                    name: l.name.clone(),
                    weight: l.weight,
                })
                .collect(),
        }
    }

    /// Rebuild a registry from a document
    pub fn from_document(document: &LibraryDocument) -> Result<Self, RegistryError> {
        debug!(
            characters = document.characters.len(),
            tags = document.tags.len(),
            loras = document.loras.len(),
            "from_document: called"
        );
        let mut registry = Registry::new();

        // Pass 1: shells, so forward references resolve
        for record in &document.characters {
            registry.register_character(Character::new(&record.name, record.gender).with_policy(record.combine_policy))?;
        }
        for record in &document.tags {
            registry.register_tag(
                Tag::new(&record.name, record.gender, record.purpose).with_policy(record.combine_policy),
            )?;
        }
        for record in &document.loras {
            registry.register_lora(LoraModifier::new(&record.name, record.weight))?;
        }

        // Pass 2: parts, usage counts, incompatibilities
        for record in &document.characters {
            let parts = registry.resolve_parts(&record.parts)?;
            if let Some(character) = registry.character_mut(&record.name) {
                character.parts.extend(parts);
                character.restore_usage(record.usage_count);
            }
        }
        for record in &document.tags {
            let parts = registry.resolve_parts(&record.parts)?;
            if let Some(tag) = registry.tag_mut(&record.name) {
                tag.parts.extend(parts);
            }
            for other in &record.incompatibles {
                if other != &record.name {
                    registry.add_incompatibility(&record.name, other)?;
                }
            }
        }

        Ok(registry)
    }

    fn resolve_parts(&self, records: &[PartRecord]) -> Result<Vec<PromptPart>, RegistryError> {
        records
            .iter()
            .map(|record| {
                let part = match record.part_type {
                    PartType::String => PromptPart::text(&record.value),
                    PartType::Element => PromptPart::element(self.resolve_reference(&record.value, record.kind)?),
                };
                Ok(part.with_weight(record.weight))
            })
            .collect()
    }

    fn resolve_reference(&self, name: &str, kind: Option<ElementKind>) -> Result<ElementRef, RegistryError> {
        let resolved = match kind {
            Some(kind) => Some(ElementRef::new(kind, name)).filter(|r| self.contains(r)),
            None => self.find(name),
        };
        resolved.ok_or_else(|| RegistryError::UnknownReference { name: name.to_string() })
    }

    /// Serialize to pretty JSON. JSON has no NaN or infinity, so a
    /// non-finite weight is rejected instead of written as `null`.
    pub fn to_json(&self) -> Result<String, RegistryError> {
        let document = self.to_document();
        document.check_finite()?;
        Ok(serde_json::to_string_pretty(&document)?)
    }

    pub fn from_json(content: &str) -> Result<Self, RegistryError> {
        let document: LibraryDocument = serde_json::from_str(content)?;
        Self::from_document(&document)
    }

    /// Write the registry to a JSON file, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), RegistryError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_json()?)?;
        info!(path = %path.display(), elements = self.len(), "Saved library");
        Ok(())
    }

    /// Read a registry from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let registry = Self::from_json(&content)?;
        info!(path = %path.display(), elements = registry.len(), "Loaded library");
        Ok(registry)
    }
}
