//! Exec action for device-event dispatch
//!
//! When a device event matches a rule, this action spawns a command built
//! from a config template and the event's properties:
//! - Shell-style command templates with `${PROPERTY}` placeholders
//! - Environment pass-through and overrides
//! - Privilege dropping (group before user)
//! - Dry-run and debug modes passed explicitly at runtime

pub mod action;
pub mod child;
pub mod compiler;
pub mod config;
pub mod credentials;
pub mod event;
pub mod executor;
pub mod logging;
pub mod spawn;
pub mod template;

pub use action::{Action, ActionKind, ActionSet, ExecAction, NamedAction};
pub use child::{ChildError, ChildOps, SystemChildOps};
pub use compiler::{ActionTemplate, EnvEntry};
pub use config::{ConfigError, ExecSettings, IdSpec};
pub use credentials::{CredentialResolver, Credentials, LookupError, Membership, SystemResolver};
pub use event::{DeviceEvent, EventError, Uevent};
pub use executor::{execute, ExecError, ExecOutcome, RuntimeMode};
pub use template::{Template, TemplateError};

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
