//! CLI command implementations.

pub mod run;
pub mod worker;

use anyhow::{Context, Result, anyhow};
use gantry_config::Manifest;
use gantry_core::StepBlock;
use gantry_core::pipeline::split_no_skip;
use gantry_scheduler::shard_for;
use std::path::Path;

/// Parse a manifest and print the blocks it declares.
///
/// With a branch only the selected blocks are shown, in run order.
pub fn validate(path: &Path, branch: Option<&str>, json: bool) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
    let manifest = Manifest::parse(&text)
        .map_err(|reason| anyhow!("Invalid manifest {}: {}", path.display(), reason))?;

    let sections = sections(manifest, branch);

    if json {
        let value: Vec<_> = sections
            .iter()
            .map(|(pattern, blocks)| serde_json::json!({ "branch": pattern, "blocks": blocks }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("Manifest is valid");
    for (pattern, blocks) in &sections {
        if let Some(pattern) = pattern {
            println!("\n{}:", pattern);
        }
        for line in describe(blocks) {
            println!("{}", line);
        }
    }
    Ok(())
}

fn sections(manifest: Manifest, branch: Option<&str>) -> Vec<(Option<String>, Vec<StepBlock>)> {
    match (branch, manifest) {
        (Some(branch), manifest) => vec![(Some(branch.to_string()), manifest.select(branch))],
        (None, Manifest::Flat(blocks)) => vec![(None, blocks)],
        (None, Manifest::Keyed(entries)) => entries
            .into_iter()
            .map(|(pattern, blocks)| (Some(pattern), blocks))
            .collect(),
    }
}

fn describe(blocks: &[StepBlock]) -> Vec<String> {
    if blocks.is_empty() {
        return vec!["  (no blocks)".to_string()];
    }

    let mut lines = Vec::new();
    for block in blocks {
        let mut header = format!("  - {}", block.label);
        if let Some(cwd) = &block.cwd {
            header.push_str(&format!(" (cwd: {})", cwd));
        }
        if block.debug {
            header.push_str(" [debug]");
        }
        lines.push(header);
        for line in &block.shell {
            let (always_run, snippet) = split_no_skip(line);
            let marker = if always_run { "!" } else { "$" };
            lines.push(format!("      {} {}", marker, snippet));
        }
    }
    lines
}

/// Print the shard index `repository` is routed to.
pub fn shard(repository: &str, shards: u32) -> Result<()> {
    let shard = shard_for(repository, shards)
        .ok_or_else(|| anyhow!("No shards configured (use --shards)"))?;
    println!("queue-{}", shard);
    Ok(())
}
