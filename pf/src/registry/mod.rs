//! Element registry
//!
//! The registry is the arena that owns every named element. Tags, characters
//! and loras live in three independent namespaces; registering a name that
//! already exists in the same namespace replaces the old entry in place.

mod persist;

pub use persist::{CharacterRecord, LibraryDocument, LoraRecord, PartRecord, PartType, TagRecord};

use indexmap::IndexMap;
use tracing::debug;

use crate::domain::{Character, ElementKind, ElementRef, ElementView, LoraModifier, Tag};
use crate::error::RegistryError;

/// Catalog of tags, characters and loras addressed by name
#[derive(Debug, Clone, Default)]
pub struct Registry {
    tags: IndexMap<String, Tag>,
    characters: IndexMap<String, Character>,
    loras: IndexMap<String, LoraModifier>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tag, keeping incompatibility links symmetric with the tags
    /// already registered
    pub fn register_tag(&mut self, mut tag: Tag) -> Result<(), RegistryError> {
        debug!(name = %tag.name, "register_tag: called");
        if tag.name.is_empty() {
            return Err(RegistryError::EmptyName);
        }

        for other in self.tags.values_mut() {
            if other.name == tag.name {
                continue;
            }
            if other.incompatible_names().contains(&tag.name) {
                tag.mark_incompatible(&other.name);
            }
            if tag.incompatible_names().contains(&other.name) {
                other.mark_incompatible(&tag.name);
            }
        }

        self.tags.insert(tag.name.clone(), tag);
        Ok(())
    }

    pub fn register_character(&mut self, character: Character) -> Result<(), RegistryError> {
        debug!(name = %character.name, "register_character: called");
        if character.name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        self.characters.insert(character.name.clone(), character);
        Ok(())
    }

    pub fn register_lora(&mut self, lora: LoraModifier) -> Result<(), RegistryError> {
        debug!(name = %lora.name, "register_lora: called");
        if lora.name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        self.loras.insert(lora.name.clone(), lora);
        Ok(())
    }

    /// Resolve a bare name, looking at tags first, then characters, then loras
    pub fn find(&self, name: &str) -> Option<ElementRef> {
        if self.tags.contains_key(name) {
            Some(ElementRef::tag(name))
        } else if self.characters.contains_key(name) {
            Some(ElementRef::character(name))
        } else if self.loras.contains_key(name) {
            Some(ElementRef::lora(name))
        } else {
            None
        }
    }

    pub fn get(&self, reference: &ElementRef) -> Option<ElementView<'_>> {
        match reference.kind {
            ElementKind::Tag => self.tags.get(&reference.name).map(ElementView::Tag),
            ElementKind::Character => self.characters.get(&reference.name).map(ElementView::Character),
            ElementKind::Lora => self.loras.get(&reference.name).map(ElementView::Lora),
        }
    }

    pub fn contains(&self, reference: &ElementRef) -> bool {
        self.get(reference).is_some()
    }

    pub fn tag(&self, name: &str) -> Option<&Tag> {
        self.tags.get(name)
    }

    pub fn character(&self, name: &str) -> Option<&Character> {
        self.characters.get(name)
    }

    pub fn lora(&self, name: &str) -> Option<&LoraModifier> {
        self.loras.get(name)
    }

    pub(crate) fn tag_mut(&mut self, name: &str) -> Option<&mut Tag> {
        self.tags.get_mut(name)
    }

    pub(crate) fn character_mut(&mut self, name: &str) -> Option<&mut Character> {
        self.characters.get_mut(name)
    }

    pub fn tags(&self) -> impl Iterator<Item = &Tag> {
        self.tags.values()
    }

    pub fn characters(&self) -> impl Iterator<Item = &Character> {
        self.characters.values()
    }

    pub fn loras(&self) -> impl Iterator<Item = &LoraModifier> {
        self.loras.values()
    }

    pub fn len(&self) -> usize {
        self.tags.len() + self.characters.len() + self.loras.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make two registered tags mutually incompatible
    pub fn add_incompatibility(&mut self, first: &str, second: &str) -> Result<(), RegistryError> {
        debug!(%first, %second, "add_incompatibility: called");
        if first == second {
            return Err(RegistryError::SelfIncompatible {
                name: first.to_string(),
            });
        }
        self.require_tag(first)?;
        self.require_tag(second)?;

        if let Some(tag) = self.tags.get_mut(first) {
            tag.mark_incompatible(second);
        }
        if let Some(tag) = self.tags.get_mut(second) {
            tag.mark_incompatible(first);
        }
        Ok(())
    }

    fn require_tag(&self, name: &str) -> Result<(), RegistryError> {
        match self.find(name) {
            Some(r) if r.kind == ElementKind::Tag => Ok(()),
            Some(_) => Err(RegistryError::NotATag { name: name.to_string() }),
            None => Err(RegistryError::UnknownReference { name: name.to_string() }),
        }
    }
}
