//! Prompt composition
//!
//! Turns an ordered list of element references into the final prompt string
//! and output filename:
//!
//! 1. Split the list into groups, each opened by a character.
//! 2. Validate every group (gender, tag incompatibilities).
//! 3. Render each group and fold weights with the character's policy.
//! 4. Commit usage counts and build the filename.
//!
//! Usage counts are only touched in step 4, so a composition that fails
//! validation or rendering leaves the registry unchanged.

use tracing::{debug, info};

use crate::domain::{CombinePolicy, ElementKind, ElementRef, ElementView, Tag};
use crate::error::ComposeError;
use crate::registry::Registry;
use crate::render::TokenWeights;

/// Separator placed between character groups
pub const DEFAULT_BREAK_TOKEN: &str = "BREAK";

/// Prefix every lora marker token starts with
pub const LORA_MARKER: &str = "<lora:";

/// Knobs for a single composition
#[derive(Debug, Clone, PartialEq)]
pub struct ComposeOptions {
    /// Literal placed between groups
    pub break_token: String,
    /// Reject gendered tags that do not match their character
    pub enforce_gender: bool,
    /// Decimal places for printed weights; full precision when unset
    pub weight_precision: Option<usize>,
}

impl Default for ComposeOptions {
    fn default() -> Self {
        Self {
            break_token: DEFAULT_BREAK_TOKEN.to_string(),
            enforce_gender: false,
            weight_precision: None,
        }
    }
}

/// Result of a successful composition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Composition {
    pub prompt: String,
    pub filename: String,
}

/// One character and the tags/loras attached to it
#[derive(Debug)]
struct Group {
    character: String,
    members: Vec<ElementRef>,
}

/// Stateless prompt composer
#[derive(Debug, Clone, Default)]
pub struct PromptComposer {
    options: ComposeOptions,
}

impl PromptComposer {
    pub fn new(options: ComposeOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ComposeOptions {
        &self.options
    }

    /// Compose `elements` into a prompt. `None` entries are skipped.
    pub fn generate(&self, registry: &mut Registry, elements: &[Option<ElementRef>]) -> Result<Composition, ComposeError> {
        debug!(count = elements.len(), ?self.options, "generate: called");
        let groups = self.group(registry, elements)?;

        let mut rendered_groups = Vec::with_capacity(groups.len());
        for group in &groups {
            self.check_incompatibilities(registry, group)?;
            rendered_groups.push(self.render_group(registry, group)?);
        }

        for group in &groups {
            registry
                .character_mut(&group.character)
                .ok_or_else(|| ComposeError::UnknownReference {
                    name: group.character.clone(),
                })?
                .increment_usage();
        }

        // Every component carries the character's final count
        let name_parts: Vec<String> = groups
            .iter()
            .filter_map(|g| registry.character(&g.character))
            .map(|c| format!("{}_{}", c.name, c.usage_count()))
            .collect();

        let composition = Composition {
            prompt: rendered_groups.join(&format!(" {}, ", self.options.break_token)),
            filename: name_parts.join("_"),
        };
        info!(filename = %composition.filename, groups = groups.len(), "Composed prompt");
        Ok(composition)
    }

    fn group(&self, registry: &Registry, elements: &[Option<ElementRef>]) -> Result<Vec<Group>, ComposeError> {
        let mut groups: Vec<Group> = Vec::new();

        for reference in elements.iter().flatten() {
            let element = registry.get(reference).ok_or_else(|| ComposeError::UnknownReference {
                name: reference.name.clone(),
            })?;

            match element {
                ElementView::Character(character) => groups.push(Group {
                    character: character.name.clone(),
                    members: Vec::new(),
                }),
                ElementView::Tag(_) | ElementView::Lora(_) => {
                    let Some(group) = groups.last_mut() else {
                        return Err(ComposeError::Structural(format!(
                            "{} '{}' appears before any character",
                            reference.kind, reference.name
                        )));
                    };
                    if let ElementView::Tag(tag) = element
                        && self.options.enforce_gender
                    {
                        check_gender(registry, tag, &group.character)?;
                    }
                    group.members.push(reference.clone());
                }
            }
        }

        if groups.is_empty() {
            return Err(ComposeError::Structural("at least one character is required".to_string()));
        }
        Ok(groups)
    }

    fn check_incompatibilities(&self, registry: &Registry, group: &Group) -> Result<(), ComposeError> {
        let tags: Vec<&Tag> = group
            .members
            .iter()
            .filter(|r| r.kind == ElementKind::Tag)
            .filter_map(|r| registry.tag(&r.name))
            .collect();

        for (i, first) in tags.iter().enumerate() {
            for second in &tags[i + 1..] {
                if first.name != second.name && !first.is_compatible_with(second) {
                    return Err(ComposeError::Incompatibility {
                        first: first.name.clone(),
                        second: second.name.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn render_group(&self, registry: &Registry, group: &Group) -> Result<String, ComposeError> {
        let character = registry
            .character(&group.character)
            .ok_or_else(|| ComposeError::UnknownReference {
                name: group.character.clone(),
            })?;
        if character.combine_policy == CombinePolicy::Wrap {
            return Err(ComposeError::UnsupportedCombinePolicy(character.combine_policy));
        }

        let mut tokens = ElementView::Character(character).render(registry, 1.0)?;
        for member in &group.members {
            let element = registry.get(member).ok_or_else(|| ComposeError::UnknownReference {
                name: member.name.clone(),
            })?;
            tokens.merge(element.render(registry, 1.0)?);
        }

        let mut text = String::new();
        for (token, weight) in fold(&tokens, character.combine_policy)? {
            if token.contains(LORA_MARKER) || weight == 1.0 {
                text.push_str(token);
            } else {
                text.push_str(&format!("({}:{})", token, self.format_weight(weight)));
            }
            text.push_str(", ");
        }
        Ok(text)
    }

    fn format_weight(&self, weight: f64) -> String {
        match self.options.weight_precision {
            Some(precision) => format!("{:.*}", precision, weight),
            None => format!("{:?}", weight),
        }
    }
}

/// Fold every token's contributions into one weight. Tokens without any
/// contribution (bare lora markers) fold to 1.0.
pub fn fold(tokens: &TokenWeights, policy: CombinePolicy) -> Result<Vec<(&str, f64)>, ComposeError> {
    tokens
        .iter()
        .map(|(token, weights)| fold_weights(weights, policy).map(|weight| (token, weight)))
        .collect()
}

/// Fold a single contribution list according to `policy`
pub fn fold_weights(weights: &[f64], policy: CombinePolicy) -> Result<f64, ComposeError> {
    let product: f64 = weights.iter().product();
    match policy {
        CombinePolicy::Wrap => Err(ComposeError::UnsupportedCombinePolicy(policy)),
        _ if weights.is_empty() => Ok(1.0),
        CombinePolicy::Geometric => Ok(product.powf(1.0 / weights.len() as f64)),
        CombinePolicy::Multiplicative => Ok(product),
    }
}

fn check_gender(registry: &Registry, tag: &Tag, character_name: &str) -> Result<(), ComposeError> {
    let Some(character) = registry.character(character_name) else {
        return Ok(());
    };
    if !tag.gender.fits(character.gender) {
        return Err(ComposeError::GenderMismatch {
            tag: tag.name.clone(),
            tag_gender: tag.gender,
            character: character.name.clone(),
            character_gender: character.gender,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Character, Gender, LoraModifier, PromptPart, Purpose};

    fn library() -> Registry {
        let mut registry = Registry::new();
        registry.register_character(Character::new("Alice", Gender::Female)).unwrap();
        registry
            .register_character(Character::new("Bob", Gender::Male).with_part(PromptPart::text("1boy")))
            .unwrap();
        registry
            .register_tag(
                Tag::new("smile", Gender::Unisex, Purpose::Expression).with_part(PromptPart::text("smiling")),
            )
            .unwrap();
        registry
            .register_tag(Tag::new("sad", Gender::Unisex, Purpose::Expression).with_part(PromptPart::text("tears")))
            .unwrap();
        registry
            .register_tag(Tag::new("armor", Gender::Male, Purpose::Clothing).with_part(PromptPart::text("plate armor")))
            .unwrap();
        registry
            .register_tag(
                Tag::new("glow", Gender::Unisex, Purpose::Lighting).with_part(PromptPart::text("glow").with_weight(4.0)),
            )
            .unwrap();
        registry.register_lora(LoraModifier::new("styleX", 0.8)).unwrap();
        registry.add_incompatibility("smile", "sad").unwrap();
        registry
    }

    fn refs(items: &[ElementRef]) -> Vec<Option<ElementRef>> {
        items.iter().cloned().map(Some).collect()
    }

    #[test]
    fn test_single_character_with_tag() {
        let mut registry = library();
        let composer = PromptComposer::default();

        let result = composer
            .generate(&mut registry, &refs(&[ElementRef::character("Alice"), ElementRef::tag("smile")]))
            .unwrap();

        assert_eq!(result.prompt, "smiling, ");
        assert_eq!(result.filename, "Alice_1");
    }

    #[test]
    fn test_non_unit_weight_is_parenthesized() {
        let mut registry = library();
        let composer = PromptComposer::default();

        // glow: [4.0, 1.0] -> sqrt(4.0) = 2.0
        let result = composer
            .generate(&mut registry, &refs(&[ElementRef::character("Alice"), ElementRef::tag("glow")]))
            .unwrap();
        assert_eq!(result.prompt, "(glow:2.0), ");
    }

    #[test]
    fn test_weight_precision() {
        let mut registry = library();
        registry
            .register_tag(
                Tag::new("soft", Gender::Unisex, Purpose::Lighting)
                    .with_part(PromptPart::text("soft light").with_weight(1.2)),
            )
            .unwrap();
        let composer = PromptComposer::new(ComposeOptions {
            weight_precision: Some(2),
            ..Default::default()
        });

        let result = composer
            .generate(&mut registry, &refs(&[ElementRef::character("Alice"), ElementRef::tag("soft")]))
            .unwrap();
        assert_eq!(result.prompt, "(soft light:1.10), ");
    }

    #[test]
    fn test_lora_marker_emitted_verbatim() {
        let mut registry = library();
        let composer = PromptComposer::default();

        let result = composer
            .generate(
                &mut registry,
                &refs(&[ElementRef::character("Alice"), ElementRef::lora("styleX"), ElementRef::tag("smile")]),
            )
            .unwrap();
        assert_eq!(result.prompt, "<lora:styleX:0.8>, smiling, ");
    }

    #[test]
    fn test_groups_joined_with_break_token() {
        let mut registry = library();
        let composer = PromptComposer::new(ComposeOptions {
            break_token: "AND".to_string(),
            ..Default::default()
        });

        let result = composer
            .generate(
                &mut registry,
                &refs(&[
                    ElementRef::character("Alice"),
                    ElementRef::tag("smile"),
                    ElementRef::character("Bob"),
                    ElementRef::tag("armor"),
                ]),
            )
            .unwrap();

        assert_eq!(result.prompt, "smiling,  AND, 1boy, plate armor, ");
        assert_eq!(result.filename, "Alice_1_Bob_1");
    }

    #[test]
    fn test_placeholders_are_skipped() {
        let mut registry = library();
        let elements = vec![None, Some(ElementRef::character("Alice")), None, Some(ElementRef::tag("smile"))];

        let result = PromptComposer::default().generate(&mut registry, &elements).unwrap();
        assert_eq!(result.prompt, "smiling, ");
    }

    #[test]
    fn test_tag_before_character_is_structural() {
        let mut registry = library();
        let err = PromptComposer::default()
            .generate(&mut registry, &refs(&[ElementRef::tag("smile"), ElementRef::character("Alice")]))
            .unwrap_err();
        assert!(matches!(err, ComposeError::Structural(_)));
    }

    #[test]
    fn test_empty_input_is_structural() {
        let mut registry = library();
        let composer = PromptComposer::default();

        assert!(matches!(
            composer.generate(&mut registry, &[]),
            Err(ComposeError::Structural(_))
        ));
        assert!(matches!(
            composer.generate(&mut registry, &[None, None]),
            Err(ComposeError::Structural(_))
        ));
    }

    #[test]
    fn test_unknown_element() {
        let mut registry = library();
        let err = PromptComposer::default()
            .generate(&mut registry, &refs(&[ElementRef::character("Zed")]))
            .unwrap_err();
        assert!(matches!(err, ComposeError::UnknownReference { name } if name == "Zed"));
    }

    #[test]
    fn test_incompatible_tags_fail_and_leave_counts() {
        let mut registry = library();
        let err = PromptComposer::default()
            .generate(
                &mut registry,
                &refs(&[ElementRef::character("Alice"), ElementRef::tag("smile"), ElementRef::tag("sad")]),
            )
            .unwrap_err();

        assert!(matches!(err, ComposeError::Incompatibility { .. }));
        assert_eq!(registry.character("Alice").unwrap().usage_count(), 0);
    }

    #[test]
    fn test_incompatible_tags_in_different_groups_are_fine() {
        let mut registry = library();
        let result = PromptComposer::default().generate(
            &mut registry,
            &refs(&[
                ElementRef::character("Alice"),
                ElementRef::tag("smile"),
                ElementRef::character("Bob"),
                ElementRef::tag("sad"),
            ]),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_gender_enforcement() {
        let elements = refs(&[ElementRef::character("Alice"), ElementRef::tag("armor")]);

        let mut registry = library();
        let strict = PromptComposer::new(ComposeOptions {
            enforce_gender: true,
            ..Default::default()
        });
        let err = strict.generate(&mut registry, &elements).unwrap_err();
        assert!(matches!(err, ComposeError::GenderMismatch { ref tag, .. } if tag == "armor"));

        let lenient = PromptComposer::default();
        let result = lenient.generate(&mut registry, &elements).unwrap();
        assert_eq!(result.prompt, "plate armor, ");
        assert_eq!(result.filename, "Alice_1");
    }

    #[test]
    fn test_repeat_calls_increment_filename() {
        let mut registry = library();
        let composer = PromptComposer::default();
        let elements = refs(&[ElementRef::character("Alice"), ElementRef::tag("smile")]);

        let first = composer.generate(&mut registry, &elements).unwrap();
        let second = composer.generate(&mut registry, &elements).unwrap();

        assert_eq!(first.prompt, second.prompt);
        assert_eq!(first.filename, "Alice_1");
        assert_eq!(second.filename, "Alice_2");
    }

    #[test]
    fn test_character_in_two_groups_counts_twice() {
        let mut registry = library();
        let result = PromptComposer::default()
            .generate(
                &mut registry,
                &refs(&[ElementRef::character("Alice"), ElementRef::character("Alice")]),
            )
            .unwrap();

        assert_eq!(result.filename, "Alice_2_Alice_2");
        assert_eq!(registry.character("Alice").unwrap().usage_count(), 2);
    }

    #[test]
    fn test_multiplicative_policy() {
        let mut registry = library();
        registry
            .register_character(
                Character::new("Cara", Gender::Female)
                    .with_policy(CombinePolicy::Multiplicative)
                    .with_part(PromptPart::text("glow").with_weight(0.5)),
            )
            .unwrap();

        // glow: [0.5, 1.0] from Cara, [4.0, 1.0] from the tag -> 2
        let result = PromptComposer::default()
            .generate(&mut registry, &refs(&[ElementRef::character("Cara"), ElementRef::tag("glow")]))
            .unwrap();
        assert_eq!(result.prompt, "(glow:2.0), ");
    }

    #[test]
    fn test_wrap_policy_rejected_without_counting() {
        let mut registry = library();
        registry
            .register_character(
                Character::new("Dana", Gender::Female)
                    .with_policy(CombinePolicy::Wrap)
                    .with_part(PromptPart::text("freckles")),
            )
            .unwrap();

        let err = PromptComposer::default()
            .generate(&mut registry, &refs(&[ElementRef::character("Dana")]))
            .unwrap_err();
        assert!(matches!(err, ComposeError::UnsupportedCombinePolicy(CombinePolicy::Wrap)));
        assert_eq!(registry.character("Dana").unwrap().usage_count(), 0);

        // No weighted tokens at all: a lora-only group and a bare group
        registry
            .register_character(Character::new("Erin", Gender::Female).with_policy(CombinePolicy::Wrap))
            .unwrap();
        for elements in [
            refs(&[ElementRef::character("Erin"), ElementRef::lora("styleX")]),
            refs(&[ElementRef::character("Erin")]),
            refs(&[ElementRef::character("Alice"), ElementRef::character("Erin")]),
        ] {
            let err = PromptComposer::default().generate(&mut registry, &elements).unwrap_err();
            assert!(matches!(err, ComposeError::UnsupportedCombinePolicy(CombinePolicy::Wrap)));
        }
        assert_eq!(registry.character("Erin").unwrap().usage_count(), 0);
        assert_eq!(registry.character("Alice").unwrap().usage_count(), 0);
    }

    #[test]
    fn test_integer_weight_keeps_decimal() {
        let mut registry = library();
        registry.register_lora(LoraModifier::new("styleY", 1.0)).unwrap();

        let result = PromptComposer::default()
            .generate(&mut registry, &refs(&[ElementRef::character("Alice"), ElementRef::lora("styleY")]))
            .unwrap();
        assert_eq!(result.prompt, "<lora:styleY:1.0>, ");
    }

    #[test]
    fn test_fold_weights() {
        let geometric = fold_weights(&[2.0, 8.0], CombinePolicy::Geometric).unwrap();
        assert!((geometric - 4.0).abs() < 1e-12);
        assert_eq!(fold_weights(&[2.0, 8.0], CombinePolicy::Multiplicative).unwrap(), 16.0);
        assert_eq!(fold_weights(&[], CombinePolicy::Geometric).unwrap(), 1.0);
        assert!(fold_weights(&[1.0], CombinePolicy::Wrap).is_err());
        assert!(fold_weights(&[], CombinePolicy::Wrap).is_err());
    }
}
