//! Rendering elements into weighted tokens
//!
//! Rendering never folds weights. Every token keeps the full list of
//! contributions it received, in insertion order, so the composer can apply
//! the owning character's combine policy at the very end.

use indexmap::IndexMap;
use std::collections::BTreeSet;
use tracing::{debug, warn};

use crate::domain::{ElementRef, ElementView, PartValue};
use crate::error::ComposeError;
use crate::registry::Registry;

/// Ordered map of token text to the weight contributions it received
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenWeights {
    entries: IndexMap<String, Vec<f64>>,
}

impl TokenWeights {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one contribution for `token`
    pub fn push(&mut self, token: impl Into<String>, weight: f64) {
        self.entries.entry(token.into()).or_default().push(weight);
    }

    /// Make sure `token` is present without adding a contribution
    pub fn touch(&mut self, token: impl Into<String>) {
        self.entries.entry(token.into()).or_default();
    }

    /// Merge another map in, appending to the lists of repeated tokens
    pub fn merge(&mut self, other: TokenWeights) {
        for (token, weights) in other.entries {
            self.entries.entry(token).or_default().extend(weights);
        }
    }

    /// Append `weight` to every token's contribution list
    pub fn push_all(&mut self, weight: f64) {
        for weights in self.entries.values_mut() {
            weights.push(weight);
        }
    }

    pub fn get(&self, token: &str) -> Option<&[f64]> {
        self.entries.get(token).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ElementView<'_> {
    /// Render into weighted tokens, appending `weight_override` to every token
    pub fn render(&self, registry: &Registry, weight_override: f64) -> Result<TokenWeights, ComposeError> {
        debug!(name = %self.name(), %weight_override, "render: called");
        let mut visiting = Vec::new();
        render_element(registry, *self, weight_override, &mut visiting)
    }

    /// Own name plus every element name reachable through the parts
    pub fn collect_tags(&self, registry: &Registry) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        let mut seen = BTreeSet::new();
        collect_names(registry, *self, &mut names, &mut seen);
        names
    }
}

fn render_element(
    registry: &Registry,
    element: ElementView<'_>,
    weight_override: f64,
    visiting: &mut Vec<ElementRef>,
) -> Result<TokenWeights, ComposeError> {
    if let ElementView::Lora(lora) = element {
        let mut rendered = TokenWeights::new();
        rendered.touch(lora.marker(weight_override));
        return Ok(rendered);
    }

    let this = element.to_ref();
    if visiting.contains(&this) {
        return Err(ComposeError::ReferenceCycle { name: this.name });
    }
    visiting.push(this);

    let mut rendered = TokenWeights::new();
    for part in element.parts() {
        match &part.value {
            PartValue::Text(text) => rendered.push(text.as_str(), part.weight),
            PartValue::Element(reference) => {
                let nested = registry
                    .get(reference)
                    .ok_or_else(|| ComposeError::UnknownReference {
                        name: reference.name.clone(),
                    })?;
                rendered.merge(render_element(registry, nested, part.weight, visiting)?);
            }
        }
    }
    rendered.push_all(weight_override);

    visiting.pop();
    Ok(rendered)
}

fn collect_names(
    registry: &Registry,
    element: ElementView<'_>,
    names: &mut BTreeSet<String>,
    seen: &mut BTreeSet<ElementRef>,
) {
    if !seen.insert(element.to_ref()) {
        return;
    }
    names.insert(element.name().to_string());
    for reference in element.parts().iter().filter_map(|p| p.reference()) {
        match registry.get(reference) {
            Some(nested) => collect_names(registry, nested, names, seen),
            None => warn!(%reference, "collect_tags: dangling reference skipped"),
        }
    }
}
