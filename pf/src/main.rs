use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use promptforge::backend::{GenerationBackend, GenerationRequest, WebUiClient};
use promptforge::cli::{Cli, Command, PLACEHOLDER, Section};
use promptforge::config::Config;
use promptforge::{
    Character, ComposeOptions, Composition, ElementRef, ElementView, LoraModifier, PartValue, PromptComposer,
    PromptPart, Registry, Tag,
};

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    Ok(())
}

/// What `pf generate` writes next to the composed filename
#[derive(Debug, Serialize)]
struct GenerationRecord<'a> {
    prompt: &'a str,
    negative_prompt: &'a str,
    width: u32,
    height: u32,
    steps: u32,
    created_at: String,
    images: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    let library_path = cli.library.clone().unwrap_or_else(|| config.library.clone());

    info!("promptforge starting, library: {}", library_path.display());
    let mut registry = open_library(&library_path)?;

    match cli.command {
        Command::List { section } => cmd_list(&registry, section),
        Command::Show { name } => cmd_show(&registry, &name)?,
        Command::AddCharacter {
            name,
            gender,
            parts,
            refs,
            policy,
        } => {
            let mut character = Character::new(&name, gender).with_policy(policy);
            character.parts = build_parts(&registry, parts, refs)?;
            registry.register_character(character)?;
            save_library(&registry, &library_path)?;
            println!("{} Registered character: {}", "✓".green(), name.cyan());
        }
        Command::AddTag {
            name,
            gender,
            purpose,
            parts,
            refs,
            incompatible,
        } => {
            let mut tag = Tag::new(&name, gender, purpose);
            tag.parts = build_parts(&registry, parts, refs)?;
            registry.register_tag(tag)?;
            for other in &incompatible {
                registry
                    .add_incompatibility(&name, other)
                    .context(format!("Failed to mark '{}' incompatible with '{}'", name, other))?;
            }
            save_library(&registry, &library_path)?;
            println!("{} Registered tag: {}", "✓".green(), name.cyan());
        }
        Command::AddLora { name, weight } => {
            registry.register_lora(LoraModifier::new(&name, weight))?;
            save_library(&registry, &library_path)?;
            println!("{} Registered lora: {}", "✓".green(), name.cyan());
        }
        Command::Incompatible { first, second } => {
            registry.add_incompatibility(&first, &second)?;
            save_library(&registry, &library_path)?;
            println!("{} {} and {} are now incompatible", "✓".green(), first.cyan(), second.cyan());
        }
        Command::Compose {
            elements,
            break_token,
            enforce_gender,
        } => {
            let mut options = config.compose.options();
            if let Some(token) = break_token {
                options.break_token = token;
            }
            options.enforce_gender |= enforce_gender;

            let composition = compose(&mut registry, &elements, options)?;
            save_library(&registry, &library_path)?;
            println!("{}", composition.prompt);
            println!("{} {}", "file:".dimmed(), composition.filename.yellow());
        }
        Command::Generate {
            elements,
            negative,
            enforce_gender,
        } => {
            let mut options = config.compose.options();
            options.enforce_gender |= enforce_gender;

            let composition = compose(&mut registry, &elements, options)?;
            save_library(&registry, &library_path)?;
            println!("{}", composition.prompt);

            let client = WebUiClient::from_config(&config.backend).context("Failed to create backend client")?;
            let request = GenerationRequest {
                prompt: composition.prompt.clone(),
                negative_prompt: negative,
                width: config.backend.width,
                height: config.backend.height,
                steps: config.backend.steps,
            };
            let images = client.generate(request.clone()).await.context("Image generation failed")?;

            let path = write_generation(&config.output_dir, &composition, &request, images)?;
            println!("{} Wrote {}", "✓".green(), path.display().to_string().cyan());
        }
    }

    Ok(())
}

fn open_library(path: &Path) -> Result<Registry> {
    if !path.exists() {
        info!("No library at {}, starting empty", path.display());
        return Ok(Registry::new());
    }
    Registry::load(path).context(format!("Failed to load library from {}", path.display()))
}

fn save_library(registry: &Registry, path: &Path) -> Result<()> {
    registry
        .save(path)
        .context(format!("Failed to save library to {}", path.display()))
}

fn resolve(registry: &Registry, name: &str) -> Result<ElementRef> {
    registry
        .find(name)
        .ok_or_else(|| eyre::eyre!("Unknown element: {}", name))
}

fn build_parts(registry: &Registry, texts: Vec<(String, f64)>, refs: Vec<(String, f64)>) -> Result<Vec<PromptPart>> {
    let mut parts: Vec<PromptPart> = texts
        .into_iter()
        .map(|(text, weight)| PromptPart::text(text).with_weight(weight))
        .collect();
    for (name, weight) in refs {
        parts.push(PromptPart::element(resolve(registry, &name)?).with_weight(weight));
    }
    Ok(parts)
}

fn compose(registry: &mut Registry, names: &[String], options: ComposeOptions) -> Result<Composition> {
    let elements = names
        .iter()
        .map(|name| {
            if name == PLACEHOLDER {
                Ok(None)
            } else {
                resolve(registry, name).map(Some)
            }
        })
        .collect::<Result<Vec<_>>>()?;

    PromptComposer::new(options)
        .generate(registry, &elements)
        .context("Failed to compose prompt")
}

fn write_generation(
    output_dir: &Path,
    composition: &Composition,
    request: &GenerationRequest,
    images: Vec<String>,
) -> Result<PathBuf> {
    fs::create_dir_all(output_dir).context("Failed to create output directory")?;
    let path = output_dir.join(format!("{}.json", composition.filename));

    let record = GenerationRecord {
        prompt: &composition.prompt,
        negative_prompt: &request.negative_prompt,
        width: request.width,
        height: request.height,
        steps: request.steps,
        created_at: chrono::Utc::now().to_rfc3339(),
        images,
    };
    fs::write(&path, serde_json::to_string_pretty(&record)?).context(format!("Failed to write {}", path.display()))?;
    Ok(path)
}

fn cmd_list(registry: &Registry, section: Option<Section>) {
    if registry.is_empty() {
        println!("No elements found");
        return;
    }

    if section.is_none() || section == Some(Section::Characters) {
        for character in registry.characters() {
            println!(
                "{} {} ({}, used {})",
                "character".magenta(),
                character.name.cyan(),
                character.gender,
                character.usage_count()
            );
        }
    }
    if section.is_none() || section == Some(Section::Tags) {
        for tag in registry.tags() {
            println!("{} {} ({}, {})", "tag".blue(), tag.name.cyan(), tag.gender, tag.purpose);
        }
    }
    if section.is_none() || section == Some(Section::Loras) {
        for lora in registry.loras() {
            println!("{} {} ({})", "lora".yellow(), lora.name.cyan(), lora.weight);
        }
    }
}

fn cmd_show(registry: &Registry, name: &str) -> Result<()> {
    let reference = resolve(registry, name)?;
    let element = registry
        .get(&reference)
        .ok_or_else(|| eyre::eyre!("Unknown element: {}", name))?;

    println!("{}: {}", element.kind(), element.name().cyan());
    println!("  Gender: {}", element.gender());
    println!("  Policy: {}", element.combine_policy());
    match element {
        ElementView::Tag(tag) => {
            println!("  Purpose: {}", tag.purpose);
            if !tag.incompatible_names().is_empty() {
                let names: Vec<&str> = tag.incompatible_names().iter().map(String::as_str).collect();
                println!("  Incompatible: {}", names.join(", "));
            }
        }
        ElementView::Character(character) => println!("  Used: {}", character.usage_count()),
        ElementView::Lora(lora) => println!("  Weight: {}", lora.weight),
    }

    for part in element.parts() {
        match &part.value {
            PartValue::Text(text) => println!("  - \"{}\" x{}", text, part.weight),
            PartValue::Element(r) => println!("  - {} x{}", r.to_string().yellow(), part.weight),
        }
    }

    let reachable: Vec<String> = element.collect_tags(registry).into_iter().collect();
    println!("  Reaches: {}", reachable.join(", ").dimmed());
    Ok(())
}
