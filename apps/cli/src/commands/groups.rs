//! Class group map command implementation.

use crate::commands::types::GroupsCommand;
use anyhow::{Context, Result};
use colored::Colorize;
use runway_losses::{ClassGroupMap, GroupLabel};
use serde_json::json;
use std::path::Path;

pub fn execute(command: GroupsCommand) -> Result<()> {
    match command {
        GroupsCommand::Validate { path, num_classes, json } => validate(&path, num_classes, json),
        GroupsCommand::Show { json } => show(&ClassGroupMap::binary_digits(), json),
    }
}

fn validate(path: &Path, num_classes: Option<usize>, json_output: bool) -> Result<()> {
    let map = ClassGroupMap::load(path, num_classes)
        .with_context(|| format!("Invalid class group map: {}", path.display()))?;

    if json_output {
        return show(&map, true);
    }

    println!("{} {} ({} classes)", "✓".green(), path.display(), map.num_classes());
    Ok(())
}

fn show(map: &ClassGroupMap, json_output: bool) -> Result<()> {
    if json_output {
        let groups: serde_json::Map<String, serde_json::Value> =
            map.iter().map(|(class, group)| (class.to_string(), json!(u8::from(group)))).collect();
        let out = json!({ "num_classes": map.num_classes(), "groups": groups });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("{:<8} {}", "Class".bold(), "Group".bold());
    for (class, group) in map.iter() {
        let label = match group {
            GroupLabel::Zero => group.to_string().normal(),
            GroupLabel::One => group.to_string().cyan(),
        };
        println!("{class:<8} {label}");
    }
    Ok(())
}
