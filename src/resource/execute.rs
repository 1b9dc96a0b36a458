//! Running commands as resources

use declarative::{
    ArgumentKind, Assertion, Context, DefaultValue, Error, Field, Policy, Provider, Resource,
    ResourceType, Result,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::changes::ShellCommand;

const FIELDS: &[Field] = &[
    Field::new("name", ArgumentKind::String).required(),
    Field::new("command", ArgumentKind::String),
    Field::new("commands", ArgumentKind::List),
    Field::new("cwd", ArgumentKind::FullPath).with_default(DefaultValue::Str("/")),
    Field::new("environment", ArgumentKind::Dict).with_default(DefaultValue::EmptyDict),
    Field::new("returncode", ArgumentKind::Integer).with_default(DefaultValue::Int(0)),
    Field::new("user", ArgumentKind::String),
    Field::new("group", ArgumentKind::String),
    Field::new("umask", ArgumentKind::Octal),
    Field::new("unless", ArgumentKind::String),
    Field::new("creates", ArgumentKind::FullPath),
    Field::new("touch", ArgumentKind::FullPath),
];

const EXECUTE: &[Assertion] = &[
    Assertion::Xor(&[Assertion::Present("command"), Assertion::Present("commands")]),
    Assertion::Nand(&[Assertion::Present("creates"), Assertion::Present("touch")]),
];

pub fn resource_type() -> ResourceType {
    ResourceType::new("Execute", FIELDS)
        .with_policy(Policy::new("execute").as_default().signature(EXECUTE))
        .with_provider(ExecuteProvider)
}

struct ExecuteProvider;

impl ExecuteProvider {
    /// A command line run with the resource's cwd, environment and identity.
    fn command(resource: &Resource, line: &str) -> Result<ShellCommand> {
        let mut command = ShellCommand::parse(line)?;
        command.cwd = resource.get_path("cwd").map(PathBuf::from);
        command.env = environment(resource);
        command.user = resource.get_str("user").map(str::to_string);
        command.group = resource.get_str("group").map(str::to_string);
        command.umask = resource.get_mode("umask");
        Ok(command)
    }

    fn command_lines(resource: &Resource) -> Vec<String> {
        if let Some(command) = resource.get_str("command") {
            return vec![command.to_string()];
        }
        resource
            .get_list("commands")
            .unwrap_or_default()
            .iter()
            .map(scalar)
            .collect()
    }

    /// Whether the `creates`, `touch` and `unless` guards allow running.
    fn should_run(resource: &Resource, ctx: &mut Context<'_>) -> Result<bool> {
        for guard in ["creates", "touch"] {
            if let Some(path) = resource.get_path(guard)
                && ctx.transport.exists(path)
            {
                log::debug!("{} skipped: {} exists", resource.id(), path.display());
                return Ok(false);
            }
        }

        if let Some(unless) = resource.get_str("unless") {
            let mut check = Self::command(resource, unless)?.unchecked();
            match check.query(ctx) {
                Ok(0) => {
                    log::debug!("{} skipped: '{unless}' succeeded", resource.id());
                    return Ok(false);
                }
                Ok(_) => {}
                Err(e @ Error::InvalidUser(_)) if ctx.simulate => {
                    ctx.changelog
                        .info(format!("{e}, assuming it will be created and '{unless}' fails"));
                }
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }
}

impl Provider for ExecuteProvider {
    fn name(&self) -> &'static str {
        "execute"
    }

    fn policies(&self) -> &'static [&'static str] {
        &["execute"]
    }

    fn test(&self, resource: &Resource, _ctx: &mut Context<'_>) -> Result<()> {
        expected_returncode(resource).map(|_| ())
    }

    fn apply(&self, resource: &Resource, ctx: &mut Context<'_>) -> Result<bool> {
        if !Self::should_run(resource, ctx)? {
            return Ok(false);
        }

        let expected = expected_returncode(resource)?;
        for line in Self::command_lines(resource) {
            let mut command = Self::command(resource, &line)?;
            command.expected = Some(expected);
            ctx.change(&mut command)?;
        }

        if let Some(touch) = resource.get_path("touch") {
            let target = touch.display().to_string();
            ctx.change(&mut ShellCommand::new(["touch", target.as_str()]))?;
        }
        Ok(true)
    }
}

fn expected_returncode(resource: &Resource) -> Result<i32> {
    let returncode = resource.get_int("returncode").unwrap_or(0);
    i32::try_from(returncode).map_err(|_| {
        Error::parse(format!(
            "{}: returncode {returncode} is out of range",
            resource.id()
        ))
    })
}

fn environment(resource: &Resource) -> BTreeMap<String, String> {
    resource
        .get_dict("environment")
        .map(|env| env.iter().map(|(k, v)| (k.clone(), scalar(v))).collect())
        .unwrap_or_default()
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
