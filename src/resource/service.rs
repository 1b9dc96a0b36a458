//! Service resource - start, stop, restart and reconfigure services
//!
//! A service either declares a command per action (`simple`) or is managed
//! by its init script at `/etc/init.d/<name>` (`sysv`). For each action
//! exactly one of the two applies.

use declarative::{
    ArgumentKind, Context, DefaultValue, Error, Field, Policy, Provider, Resource, ResourceType,
    Result,
};
use std::path::Path;

use crate::changes::ShellCommand;

const FIELDS: &[Field] = &[
    Field::new("name", ArgumentKind::String).required(),
    Field::new("priority", ArgumentKind::Integer).with_default(DefaultValue::Int(99)),
    Field::new("start", ArgumentKind::String),
    Field::new("stop", ArgumentKind::String),
    Field::new("restart", ArgumentKind::String),
    Field::new("reconfig", ArgumentKind::String),
    Field::new("running", ArgumentKind::String),
    Field::new("pidfile", ArgumentKind::FullPath),
];

const INIT_DIR: &str = "/etc/init.d";

pub fn resource_type() -> ResourceType {
    let mut resource_type = ResourceType::new("Service", FIELDS)
        .with_policy(Policy::new("start").as_default())
        .with_policy(Policy::new("stop"))
        .with_policy(Policy::new("restart"))
        .with_policy(Policy::new("reconfig"));
    for action in Action::ALL {
        resource_type = resource_type
            .with_provider(ServiceProvider {
                action,
                style: Style::Simple,
            })
            .with_provider(ServiceProvider {
                action,
                style: Style::Sysv,
            });
    }
    resource_type
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Start,
    Stop,
    Restart,
    Reconfig,
}

impl Action {
    const ALL: [Self; 4] = [Self::Start, Self::Stop, Self::Restart, Self::Reconfig];

    fn name(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
            Self::Reconfig => "reconfig",
        }
    }

    fn policies(self) -> &'static [&'static str] {
        match self {
            Self::Start => &["start"],
            Self::Stop => &["stop"],
            Self::Restart => &["restart"],
            Self::Reconfig => &["reconfig"],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Style {
    /// Commands declared on the resource
    Simple,
    /// `/etc/init.d/<name> <action>`
    Sysv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Running,
    NotRunning,
    Unknown,
}

struct ServiceProvider {
    action: Action,
    style: Style,
}

impl ServiceProvider {
    fn status(resource: &Resource, ctx: &Context<'_>) -> Result<Status> {
        if let Some(running) = resource.get_str("running") {
            let mut check = ShellCommand::parse(running)?.unchecked();
            return Ok(if check.query(ctx)? == 0 {
                Status::Running
            } else {
                Status::NotRunning
            });
        }

        if let Some(pidfile) = resource.get_path("pidfile") {
            if !ctx.transport.exists(pidfile) {
                return Ok(Status::NotRunning);
            }
            let contents = ctx.transport.get(pidfile)?;
            let pid = String::from_utf8_lossy(&contents).trim().to_string();
            if pid.parse::<u32>().is_err() {
                log::debug!("{}: no pid in {}", resource.id(), pidfile.display());
                return Ok(Status::NotRunning);
            }
            let mut check = ShellCommand::new(["kill", "-0", pid.as_str()]).unchecked();
            return Ok(if check.query(ctx)? == 0 {
                Status::Running
            } else {
                Status::NotRunning
            });
        }

        Ok(Status::Unknown)
    }

    /// Run the command for this provider's action.
    fn run(&self, resource: &Resource, ctx: &mut Context<'_>) -> Result<()> {
        let action = self.action;
        let mut command = match (self.style, resource.get_str(action.name())) {
            (Style::Simple, Some(line)) => ShellCommand::parse(line)?,
            _ => {
                let script = Path::new(INIT_DIR).join(resource.name());
                ShellCommand::new([script.display().to_string(), action.name().to_string()])
            }
        }
        .unchecked();

        ctx.change(&mut command)?;
        let returncode = command.returncode();
        if returncode != 0 {
            let stderr = command
                .output
                .as_ref()
                .map(|o| o.stderr_str())
                .unwrap_or_default();
            return Err(Error::Command {
                message: format!("{} failed with return code {returncode}", action.name()),
                stderr,
            });
        }
        Ok(())
    }

    /// Start a stopped service while handling a restart.
    ///
    /// The start command is used if declared, otherwise the init script.
    fn run_start(resource: &Resource, ctx: &mut Context<'_>) -> Result<()> {
        let style = if resource.get_str("start").is_some() {
            Style::Simple
        } else {
            Style::Sysv
        };
        Self {
            action: Action::Start,
            style,
        }
        .run(resource, ctx)
    }
}

impl Provider for ServiceProvider {
    fn name(&self) -> &'static str {
        match self.style {
            Style::Simple => "simple",
            Style::Sysv => "sysv",
        }
    }

    fn policies(&self) -> &'static [&'static str] {
        self.action.policies()
    }

    fn is_valid(&self, _policy: &Policy, resource: &Resource, _ctx: &Context<'_>) -> bool {
        if resource
            .provider_override()
            .is_some_and(|name| name != self.name())
        {
            return false;
        }
        let declared = resource.get_str(self.action.name()).is_some();
        match self.style {
            Style::Simple => declared,
            Style::Sysv => !declared,
        }
    }

    fn apply(&self, resource: &Resource, ctx: &mut Context<'_>) -> Result<bool> {
        let status = Self::status(resource, ctx)?;
        log::debug!("{} is {status:?}", resource.id());

        match self.action {
            Action::Start => {
                if status == Status::Running {
                    return Ok(false);
                }
                self.run(resource, ctx)?;
            }
            Action::Stop => {
                if status == Status::NotRunning {
                    return Ok(false);
                }
                self.run(resource, ctx)?;
            }
            Action::Restart => {
                if status == Status::NotRunning {
                    Self::run_start(resource, ctx)?;
                } else {
                    self.run(resource, ctx)?;
                }
            }
            Action::Reconfig => {
                if status == Status::NotRunning {
                    return Ok(false);
                }
                self.run(resource, ctx)?;
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{apply, check_apply};
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    /// A fake service tracked by a state file
    fn service(dir: &TempDir, policy: &str) -> serde_json::Value {
        let state = dir.path().join("running");
        let state = state.display();
        json!([{"Service": {
            "name": "fake",
            "policy": policy,
            "start": format!("touch {state}"),
            "stop": format!("rm {state}"),
            "restart": format!("sh -c 'echo restarted >> {}'", dir.path().join("log").display()),
            "reconfig": format!("sh -c 'echo reconfigured >> {}'", dir.path().join("log").display()),
            "running": format!("test -e {state}"),
        }}])
    }

    #[test]
    fn test_start_and_stop() {
        let dir = TempDir::new().unwrap();
        assert!(check_apply(&service(&dir, "start")));
        assert!(dir.path().join("running").exists());
        assert!(check_apply(&service(&dir, "stop")));
        assert!(!dir.path().join("running").exists());
    }

    #[test]
    fn test_restart_starts_stopped_service() {
        let dir = TempDir::new().unwrap();
        assert!(apply(&service(&dir, "restart"), false).unwrap());
        assert!(dir.path().join("running").exists());
        assert!(!dir.path().join("log").exists());

        assert!(apply(&service(&dir, "restart"), false).unwrap());
        assert_eq!(
            fs::read_to_string(dir.path().join("log")).unwrap(),
            "restarted\n"
        );
    }

    #[test]
    fn test_reconfig_only_when_running() {
        let dir = TempDir::new().unwrap();
        assert!(!apply(&service(&dir, "reconfig"), false).unwrap());
        fs::write(dir.path().join("running"), "").unwrap();
        assert!(apply(&service(&dir, "reconfig"), false).unwrap());
        assert_eq!(
            fs::read_to_string(dir.path().join("log")).unwrap(),
            "reconfigured\n"
        );
    }

    #[test]
    fn test_pidfile_status() {
        let dir = TempDir::new().unwrap();
        let pidfile = dir.path().join("pid");
        let declaration = json!([{"Service": {
            "name": "fake",
            "policy": "start",
            "start": "true",
            "pidfile": pidfile,
        }}]);
        assert!(apply(&declaration, false).unwrap());

        fs::write(&pidfile, std::process::id().to_string()).unwrap();
        assert!(!apply(&declaration, false).unwrap());
    }

    #[test]
    fn test_failed_action() {
        let declaration = json!([{"Service": {"name": "fake", "start": "false"}}]);
        let err = apply(&declaration, false).unwrap_err();
        assert_eq!(err.returncode(), 133);
        assert!(err.to_string().contains("start failed with return code 1"));
    }

    #[test]
    fn test_provider_selection() {
        let declaration = json!([{"Service": {"name": "fake", "start": "true", "provider": "sysv"}}]);
        assert_eq!(apply(&declaration, true).unwrap_err().returncode(), 137);

        // no start command: the init script is used
        let declaration = json!([{"Service": {"name": "no-such-service-for-converge"}}]);
        assert!(apply(&declaration, true).unwrap());
        assert_eq!(apply(&declaration, false).unwrap_err().returncode(), 143);
    }
}
