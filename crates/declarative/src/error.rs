//! Error types for the resource engine.
//!
//! Every error maps to a stable process return code so the command line
//! layer can report the failure category without inspecting messages.
//! Parse-time errors (declarations, schemas, policies, bindings) are raised
//! before anything on the target is touched.

use std::path::PathBuf;
use thiserror::Error;

use crate::node::{Anchor, NodeError};

/// Return code reported when a run completed without any resource changing.
///
/// Not an error: used by the command line and idempotence checks.
pub const NOTHING_CHANGED: i32 = 254;

/// Errors raised while building, binding, validating or applying resources.
#[derive(Debug, Error)]
pub enum Error {
    /// The declaration could not be turned into resources
    #[error("{message}{}", at(.anchor))]
    Parse {
        /// What was wrong with the declaration
        message: String,
        /// Where in the declaration document the problem is
        anchor: Option<Anchor>,
    },

    /// A declaration node was missing or had the wrong shape
    #[error(transparent)]
    Node(#[from] NodeError),

    /// A trigger could not be bound to its upstream resource
    #[error("binding error: {0}")]
    Binding(String),

    /// A policy named in the declaration does not exist for the resource type
    #[error("{resource} has no policy named '{policy}'")]
    NoValidPolicy {
        /// Resource id
        resource: String,
        /// The unknown policy name
        policy: String,
    },

    /// The resource arguments do not satisfy the policy signature
    #[error("{resource} does not conform to policy '{policy}'")]
    NonConformingPolicy {
        /// Resource id
        resource: String,
        /// Policy whose signature failed
        policy: String,
    },

    /// No provider is valid for the resource and policy
    #[error("no suitable provider for policy '{policy}' of {resource}")]
    NoSuitableProviders {
        /// Resource id
        resource: String,
        /// Selected policy
        policy: String,
    },

    /// More than one provider claims the resource and policy
    #[error("too many providers for policy '{policy}' of {resource}: {providers}")]
    TooManyProviders {
        /// Resource id
        resource: String,
        /// Selected policy
        policy: String,
        /// Names of every valid provider
        providers: String,
    },

    /// A policy signature referenced an argument the resource type lacks
    #[error("'{argument}' is not an argument of resource type {resource_type}")]
    UnknownArgument {
        /// Resource type name
        resource_type: String,
        /// Argument name used by the signature
        argument: String,
    },

    /// A provider found the target in a state it cannot work with
    #[error("invalid provider: {0}")]
    InvalidProvider(String),

    /// A command returned an unexpected return code
    #[error("command failed: {message}{}", output(.stderr))]
    Command {
        /// Summary including the return code
        message: String,
        /// Captured standard error of the command
        stderr: String,
    },

    /// A command could not be executed at all
    #[error("execution error: {0}")]
    Execution(String),

    /// The named user does not exist on the target
    #[error("user '{0}' does not exist")]
    InvalidUser(String),

    /// The named group does not exist on the target
    #[error("group '{0}' does not exist")]
    InvalidGroup(String),

    /// An operation appeared to work but did not have the expected effect
    #[error("operation failed: {0}")]
    OperationFailed(String),

    /// The program a command needs is not installed on the target
    #[error("binary missing: {0}")]
    BinaryMissing(String),

    /// A link points at something that does not exist
    #[error("dangling symlink: {0}")]
    DanglingSymlink(String),

    /// A directory on the way to a path does not exist
    #[error("path component missing: {}", .0.display())]
    PathComponentMissing(PathBuf),

    /// A component on the way to a path is not a directory
    #[error("path component is not a directory: {}", .0.display())]
    PathComponentNotDirectory(PathBuf),

    /// Saved events exist and the caller did not say whether to resume
    #[error(
        "there is a saved events file at {} - specify --resume or --no-resume",
        .0.display()
    )]
    SavedEventsAndNoInstruction(PathBuf),

    /// An asset referenced by a resource could not be located
    #[error("missing asset: {0}")]
    MissingAsset(String),

    /// The saved events file could not be read or written
    #[error("saved events file {}: {source}", .path.display())]
    EventState {
        /// Path of the save file
        path: PathBuf,
        /// Underlying serialization error
        #[source]
        source: serde_json::Error,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn at(anchor: &Option<Anchor>) -> String {
    match anchor {
        Some(anchor) => format!(" (at {anchor})"),
        None => String::new(),
    }
}

fn output(stderr: &str) -> String {
    let stderr = stderr.trim_end();
    if stderr.is_empty() {
        String::new()
    } else {
        format!("\n{stderr}")
    }
}

impl Error {
    /// Create a parse error without a source location.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
            anchor: None,
        }
    }

    /// Create a parse error pointing at a declaration location.
    pub fn parse_at(message: impl Into<String>, anchor: &Anchor) -> Self {
        Self::Parse {
            message: message.into(),
            anchor: Some(anchor.clone()),
        }
    }

    /// The return code reported to the invoking environment.
    pub fn returncode(&self) -> i32 {
        match self {
            Self::Parse { .. } | Self::Node(_) => 128,
            Self::Binding(_) => 129,
            Self::Execution(_) | Self::Io(_) => 130,
            Self::Command { .. } => 133,
            Self::NoValidPolicy { .. } => 135,
            Self::NonConformingPolicy { .. } => 136,
            Self::NoSuitableProviders { .. } => 137,
            Self::TooManyProviders { .. } => 138,
            Self::InvalidProvider(_) => 139,
            Self::InvalidGroup(_) => 140,
            Self::InvalidUser(_) => 141,
            Self::OperationFailed(_) => 142,
            Self::BinaryMissing(_) => 143,
            Self::DanglingSymlink(_) => 144,
            Self::PathComponentMissing(_) => 146,
            Self::PathComponentNotDirectory(_) => 147,
            Self::SavedEventsAndNoInstruction(_) => 148,
            Self::MissingAsset(_) => 149,
            Self::UnknownArgument { .. } | Self::EventState { .. } => 253,
        }
    }

    /// Whether the error was detected before any change to the target.
    pub fn is_parse_time(&self) -> bool {
        matches!(
            self,
            Self::Parse { .. }
                | Self::Node(_)
                | Self::Binding(_)
                | Self::NoValidPolicy { .. }
                | Self::NonConformingPolicy { .. }
                | Self::NoSuitableProviders { .. }
                | Self::TooManyProviders { .. }
                | Self::UnknownArgument { .. }
        )
    }
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;
