//! # Declarative
//!
//! A resource engine for converging a machine to a declared state.
//!
//! ## Core Concepts
//!
//! - **Resource**: a typed, named unit of desired state (`File[/etc/motd]`)
//! - **Policy**: a named mode of managing a resource (`apply`, `remove`),
//!   gated by a signature over which arguments are declared
//! - **Provider**: the implementation of a policy; exactly one must be valid
//!   for a resource and policy
//! - **ResourceBundle**: resources in declaration order, with triggers bound
//!   so a change in one resource switches the policy of a later one
//! - **EventState**: pending policy overrides, optionally persisted so an
//!   aborted run can be resumed
//! - **ChangeLog**: what each resource changed
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{Context, Node, Registry, ResourceBundle};
//!
//! let mut registry = Registry::new();
//! registry.register(file_type())?;
//!
//! let declaration = serde_json::json!([{"File": {"name": "/tmp/wibble"}}]);
//! let mut bundle = ResourceBundle::from_node(&registry, &Node::root(declaration, None))?;
//!
//! let mut ctx = Context::new(&transport, false);
//! let changed = bundle.apply(&mut ctx)?;
//! ```
//!
//! ## Traits
//!
//! - [`Provider`]: implements policies for a resource type
//! - [`Change`]: a unit of work recorded in the changelog
//! - [`Transport`]: access to the target machine
//! - [`ProgressCallback`]: receives progress updates
//!
//! The engine itself never touches the target; only providers do, through
//! the transport.

pub mod argument;
pub mod bundle;
pub mod changelog;
pub mod context;
pub mod error;
pub mod event;
pub mod node;
pub mod policy;
pub mod provider;
pub mod registry;
pub mod resource;

#[cfg(test)]
mod testing;

// Re-export main types at crate root
pub use argument::{Argument, ArgumentKind, DefaultValue, Field};
pub use bundle::ResourceBundle;
pub use changelog::{ApplySummary, Change, ChangeLog, Outcome, ResourceRecord};
pub use context::{
    CommandOutput, Context, Group, Invocation, NoProgress, Passwd, ProgressCallback, Stat,
    Transport,
};
pub use error::{Error, NOTHING_CHANGED, Result};
pub use event::{EventState, SAVE_FILE};
pub use node::{Anchor, Node, NodeError};
pub use policy::{Assertion, Policy, PolicyCollection, PolicyTrigger};
pub use provider::{NullProvider, Provider};
pub use registry::{Registry, ResourceType};
pub use resource::{Lifecycle, Observer, Resource};
