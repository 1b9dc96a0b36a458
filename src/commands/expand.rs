//! `converge expand` - print the resolved declaration

use anyhow::Result;
use declarative::{Resource, ResourceBundle};
use serde_json::{Value, json};
use std::path::Path;

use crate::Context;
use crate::config::Declaration;
use crate::resource;

pub fn run(_ctx: &Context, file: &Path) -> Result<()> {
    let declaration = Declaration::load(file)?;
    let expanded = expand(&declaration)?;
    println!("{}", serde_json::to_string_pretty(&expanded)?);
    Ok(())
}

/// Every resource with its id, policy, triggers and resolved arguments.
pub fn expand(declaration: &Declaration) -> Result<Value> {
    let registry = resource::registry()?;
    let mut bundle = ResourceBundle::from_node(&registry, &declaration.resources())?;
    bundle.bind()?;
    let resources = bundle
        .iter()
        .map(describe)
        .collect::<Result<Vec<_>>>()?;
    Ok(Value::Array(resources))
}

fn describe(resource: &Resource) -> Result<Value> {
    let triggers: Vec<Value> = resource
        .triggers()
        .iter()
        .map(|t| json!({"policy": t.policy, "when": t.when, "on": t.on}))
        .collect();
    Ok(json!({
        "id": resource.id(),
        "policy": resource.literal_policy()?.name,
        "triggers": triggers,
        "arguments": resource.arguments(),
    }))
}
