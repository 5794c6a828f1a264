//! CLI argument parsing for promptforge

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::domain::{CombinePolicy, Gender, Purpose};

/// Name used in element lists for an empty slot
pub const PLACEHOLDER: &str = "-";

#[derive(Parser, Debug)]
#[command(name = "pf")]
#[command(author, version, about = "Compose weighted image prompts from a library of reusable elements", long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Path to the library file (overrides config)
    #[arg(short, long)]
    pub library: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Element namespaces that can be listed
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Section {
    Characters,
    Tags,
    Loras,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List registered elements
    List {
        /// Only list one section
        section: Option<Section>,
    },

    /// Show an element, its parts and every name it reaches
    Show {
        #[arg(required = true)]
        name: String,
    },

    /// Register a character
    AddCharacter {
        #[arg(required = true)]
        name: String,

        #[arg(short, long, value_parser = parse_gender)]
        gender: Gender,

        /// Literal part as TEXT or TEXT:WEIGHT (repeatable)
        #[arg(short, long = "part", value_parser = parse_weighted)]
        parts: Vec<(String, f64)>,

        /// Element reference part as NAME or NAME:WEIGHT (repeatable)
        #[arg(short, long = "ref", value_parser = parse_weighted)]
        refs: Vec<(String, f64)>,

        #[arg(long, value_parser = parse_policy, default_value = "geometric")]
        policy: CombinePolicy,
    },

    /// Register a tag
    AddTag {
        #[arg(required = true)]
        name: String,

        #[arg(short, long, value_parser = parse_gender, default_value = "unisex")]
        gender: Gender,

        #[arg(short = 'u', long, value_parser = parse_purpose, default_value = "other")]
        purpose: Purpose,

        /// Literal part as TEXT or TEXT:WEIGHT (repeatable)
        #[arg(short, long = "part", value_parser = parse_weighted)]
        parts: Vec<(String, f64)>,

        /// Element reference part as NAME or NAME:WEIGHT (repeatable)
        #[arg(short, long = "ref", value_parser = parse_weighted)]
        refs: Vec<(String, f64)>,

        /// Tags this tag can never be combined with (repeatable)
        #[arg(short, long = "incompatible")]
        incompatible: Vec<String>,
    },

    /// Register a lora modifier
    AddLora {
        #[arg(required = true)]
        name: String,

        #[arg(short, long, default_value = "1.0")]
        weight: f64,
    },

    /// Mark two tags as mutually incompatible
    Incompatible {
        #[arg(required = true)]
        first: String,

        #[arg(required = true)]
        second: String,
    },

    /// Compose a prompt from element names ("-" is an empty slot)
    Compose {
        #[arg(required = true)]
        elements: Vec<String>,

        /// Separator between character groups
        #[arg(short, long)]
        break_token: Option<String>,

        /// Reject gendered tags that do not match their character
        #[arg(short, long)]
        enforce_gender: bool,
    },

    /// Compose a prompt and send it to the generation backend
    Generate {
        #[arg(required = true)]
        elements: Vec<String>,

        /// Extra negative prompt text
        #[arg(short, long, default_value = "")]
        negative: String,

        /// Reject gendered tags that do not match their character
        #[arg(short, long)]
        enforce_gender: bool,
    },
}

fn parse_gender(s: &str) -> Result<Gender, String> {
    s.parse()
}

fn parse_purpose(s: &str) -> Result<Purpose, String> {
    s.parse()
}

fn parse_policy(s: &str) -> Result<CombinePolicy, String> {
    s.parse()
}

/// Parse `TEXT` or `TEXT:WEIGHT`. A suffix that is not a number stays part
/// of the text, so `score:9` is weight 9 but `style: noir` is plain text.
pub fn parse_weighted(s: &str) -> Result<(String, f64), String> {
    if s.is_empty() {
        return Err("value must not be empty".to_string());
    }
    if let Some((text, weight)) = s.rsplit_once(':')
        && !text.is_empty()
        && let Ok(weight) = weight.trim().parse::<f64>()
    {
        return Ok((text.to_string(), weight));
    }
    Ok((s.to_string(), 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_weighted() {
        assert_eq!(parse_weighted("smiling").unwrap(), ("smiling".to_string(), 1.0));
        assert_eq!(parse_weighted("smiling:1.2").unwrap(), ("smiling".to_string(), 1.2));
        assert_eq!(parse_weighted("style: noir").unwrap(), ("style: noir".to_string(), 1.0));
        assert_eq!(parse_weighted("a:b:0.5").unwrap(), ("a:b".to_string(), 0.5));
        assert_eq!(parse_weighted(":0.5").unwrap(), (":0.5".to_string(), 1.0));
        assert!(parse_weighted("").is_err());
    }

    #[test]
    fn test_cli_parses_add_tag() {
        let cli = Cli::try_parse_from([
            "pf", "add-tag", "smile", "--purpose", "expression", "--part", "smiling:1.1", "--incompatible", "sad",
        ])
        .unwrap();

        match cli.command {
            Command::AddTag {
                name,
                gender,
                purpose,
                parts,
                incompatible,
                ..
            } => {
                assert_eq!(name, "smile");
                assert_eq!(gender, Gender::Unisex);
                assert_eq!(purpose, Purpose::Expression);
                assert_eq!(parts, vec![("smiling".to_string(), 1.1)]);
                assert_eq!(incompatible, vec!["sad".to_string()]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_rejects_bad_gender() {
        assert!(Cli::try_parse_from(["pf", "add-character", "Alice", "--gender", "robot"]).is_err());
    }
}
