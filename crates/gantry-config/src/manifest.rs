//! Build manifest loading.
//!
//! A manifest is a YAML document in one of two shapes:
//!
//! ```yaml
//! # flat: applies to every branch
//! - step: build
//!   shell: [make]
//! ```
//!
//! ```yaml
//! # keyed: glob pattern -> block or list of blocks
//! master:
//!   step: deploy
//!   shell: make deploy
//! "release-*":
//!   - step: package
//!     cwd: dist
//!     debug: 1
//!     shell:
//!       - make package
//!       - no-skip make clean
//! ```

use std::path::Path;

use gantry_core::{BuildFailure, StepBlock};
use serde_yaml::Value;
use thiserror::Error;

use crate::pattern::BranchPattern;

/// Manifest file looked up at the root of a checkout.
pub const DEFAULT_MANIFEST: &str = "integration.yml";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("{manifest} not found")]
    Missing { manifest: String },

    #[error("unable to read {manifest}: {source}")]
    Io {
        manifest: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid {manifest}: {reason}")]
    Invalid { manifest: String, reason: String },
}

pub type ManifestResult<T> = std::result::Result<T, ManifestError>;

impl ManifestError {
    /// The build failure recorded in a result's log.
    pub fn failure(&self) -> BuildFailure {
        match self {
            ManifestError::Missing { manifest } | ManifestError::Io { manifest, .. } => {
                BuildFailure::ManifestMissing {
                    manifest: manifest.clone(),
                }
            }
            ManifestError::Invalid { manifest, .. } => BuildFailure::ManifestInvalid {
                manifest: manifest.clone(),
            },
        }
    }
}

/// A parsed manifest, before branch selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Manifest {
    Flat(Vec<StepBlock>),
    Keyed(Vec<(String, Vec<StepBlock>)>),
}

impl Manifest {
    /// Parse manifest text. Every block is validated, selected or not.
    pub fn parse(text: &str) -> Result<Self, String> {
        let doc: Value = serde_yaml::from_str(text).map_err(|e| e.to_string())?;

        match doc {
            Value::Sequence(items) => Ok(Manifest::Flat(parse_blocks(&items, "root")?)),
            Value::Mapping(map) => {
                let mut keyed = Vec::with_capacity(map.len());
                for (key, value) in &map {
                    let Value::String(pattern) = key else {
                        return Err(format!("branch pattern {:?} is not a string", key));
                    };
                    let blocks = match value {
                        Value::Sequence(items) => parse_blocks(items, pattern)?,
                        Value::Mapping(_) => vec![parse_block(value, pattern)?],
                        _ => {
                            return Err(format!(
                                "\"{}\" must map to a step block or a list of step blocks",
                                pattern
                            ));
                        }
                    };
                    keyed.push((pattern.clone(), blocks));
                }
                Ok(Manifest::Keyed(keyed))
            }
            Value::Null => Err("manifest is empty".to_string()),
            _ => Err("manifest root must be a list or a mapping".to_string()),
        }
    }

    /// Blocks that apply to `branch`, in declared order.
    pub fn select(&self, branch: &str) -> Vec<StepBlock> {
        match self {
            Manifest::Flat(blocks) => blocks.clone(),
            Manifest::Keyed(entries) => entries
                .iter()
                .filter(|(pattern, _)| BranchPattern::new(pattern).matches(branch))
                .flat_map(|(_, blocks)| blocks.iter().cloned())
                .collect(),
        }
    }
}

/// Read `file_name` from the checkout root and select the blocks for `branch`.
pub fn load(checkout: &Path, file_name: &str, branch: &str) -> ManifestResult<Vec<StepBlock>> {
    let path = checkout.join(file_name);
    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ManifestError::Missing {
                manifest: file_name.to_string(),
            });
        }
        Err(source) => {
            return Err(ManifestError::Io {
                manifest: file_name.to_string(),
                source,
            });
        }
    };

    let manifest = Manifest::parse(&text).map_err(|reason| ManifestError::Invalid {
        manifest: file_name.to_string(),
        reason,
    })?;
    Ok(manifest.select(branch))
}

fn parse_blocks(items: &[Value], context: &str) -> Result<Vec<StepBlock>, String> {
    items.iter().map(|item| parse_block(item, context)).collect()
}

fn parse_block(value: &Value, context: &str) -> Result<StepBlock, String> {
    let Value::Mapping(map) = value else {
        return Err(format!("{}: step block must be a mapping", context));
    };

    let label = match map.get("step") {
        Some(Value::String(label)) => label.clone(),
        Some(_) => return Err(format!("{}: \"step\" must be a string", context)),
        None => return Err(format!("{}: step block is missing \"step\"", context)),
    };

    let shell = match map.get("shell") {
        Some(Value::String(line)) => vec![line.clone()],
        Some(Value::Sequence(lines)) => lines
            .iter()
            .map(|line| match line {
                Value::String(line) => Ok(line.clone()),
                _ => Err(format!("{}/{}: shell lines must be strings", context, label)),
            })
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => {
            return Err(format!(
                "{}/{}: \"shell\" must be a string or a list of strings",
                context, label
            ));
        }
        None => return Err(format!("{}/{}: step block is missing \"shell\"", context, label)),
    };

    let cwd = match map.get("cwd") {
        None | Some(Value::Null) => None,
        Some(Value::String(cwd)) => Some(cwd.clone()),
        Some(_) => return Err(format!("{}/{}: \"cwd\" must be a string", context, label)),
    };

    let debug = match map.get("debug") {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => *flag,
        Some(Value::Number(n)) if n.as_u64() == Some(0) => false,
        Some(Value::Number(n)) if n.as_u64() == Some(1) => true,
        Some(_) => {
            return Err(format!(
                "{}/{}: \"debug\" must be a boolean, 0 or 1",
                context, label
            ));
        }
    };

    Ok(StepBlock {
        label,
        cwd,
        debug,
        shell,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEYED: &str = r#"
"release-*":
  - step: package
    shell:
      - make package
"master":
  step: deploy
  shell: make deploy
"*":
  step: lint
  cwd: src
  debug: 1
  shell: [make lint, no-skip make clean]
"#;

    #[test]
    fn test_flat_manifest_always_applies() {
        let text = r#"
- step: build
  shell: [make]
- step: test
  shell: make test
"#;
        let manifest = Manifest::parse(text).unwrap();
        let blocks = manifest.select("whatever");
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].label, "build");
        assert_eq!(blocks[1].shell, vec!["make test".to_string()]);
        assert!(!blocks[0].debug);
    }

    #[test]
    fn test_keyed_manifest_selects_in_declared_order() {
        let manifest = Manifest::parse(KEYED).unwrap();

        let labels: Vec<_> = manifest
            .select("release-42")
            .into_iter()
            .map(|b| b.label)
            .collect();
        assert_eq!(labels, vec!["package", "lint"]);

        let labels: Vec<_> = manifest
            .select("master")
            .into_iter()
            .map(|b| b.label)
            .collect();
        assert_eq!(labels, vec!["deploy", "lint"]);
    }

    #[test]
    fn test_block_fields() {
        let manifest = Manifest::parse(KEYED).unwrap();
        let lint = manifest
            .select("dev")
            .into_iter()
            .find(|b| b.label == "lint")
            .unwrap();
        assert_eq!(lint.cwd.as_deref(), Some("src"));
        assert!(lint.debug);
        assert_eq!(lint.shell, vec!["make lint", "no-skip make clean"]);
    }

    #[test]
    fn test_invalid_blocks_are_rejected_even_when_unselected() {
        let text = r#"
master:
  step: deploy
  shell: make deploy
"never-*":
  step: broken
"#;
        let err = Manifest::parse(text).unwrap_err();
        assert!(err.contains("missing \"shell\""), "{}", err);
    }

    #[test]
    fn test_invalid_shapes() {
        assert!(Manifest::parse("- shell: [make]").is_err());
        assert!(Manifest::parse("- step: x\n  shell: [1]").is_err());
        assert!(Manifest::parse("- step: x\n  shell: make\n  debug: 2").is_err());
        assert!(Manifest::parse("1: {step: x, shell: make}").is_err());
        assert!(Manifest::parse("just a string").is_err());
        assert!(Manifest::parse("").is_err());
        assert!(Manifest::parse("- step: [unclosed").is_err());
    }

    #[test]
    fn test_load_from_checkout() {
        let dir = tempfile::tempdir().unwrap();

        let err = load(dir.path(), DEFAULT_MANIFEST, "main").unwrap_err();
        assert!(matches!(err, ManifestError::Missing { .. }));
        assert_eq!(
            err.failure().log_line(),
            "* unable to load integration.yml (missing from the repo ?)"
        );

        std::fs::write(dir.path().join(DEFAULT_MANIFEST), "- step: [").unwrap();
        let err = load(dir.path(), DEFAULT_MANIFEST, "main").unwrap_err();
        assert_eq!(
            err.failure().log_line(),
            "* invalid YAML syntax in integration.yml"
        );

        std::fs::write(
            dir.path().join(DEFAULT_MANIFEST),
            "- step: build\n  shell: make\n",
        )
        .unwrap();
        let blocks = load(dir.path(), DEFAULT_MANIFEST, "main").unwrap();
        assert_eq!(blocks, vec![StepBlock::new("build", vec!["make".to_string()])]);
    }
}
