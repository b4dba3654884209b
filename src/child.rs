//! Child-side half of an exec action
//!
//! Everything here runs after fork (or in-process for dry runs): render the
//! arguments, export the environment, drop privileges and exec. Side effects
//! go through [`ChildOps`] so the order of operations can be observed.

use crate::compiler::ActionTemplate;
use crate::credentials::Credentials;
use crate::event::DeviceEvent;
use crate::executor::RuntimeMode;
use crate::template::TemplateError;
use nix::unistd::{Gid, Uid};
use std::convert::Infallible;
use std::ffi::CString;
use std::io;
use thiserror::Error;
use crate::spawn::child_diagnostic;
use tracing::info;

/// Exit status after a placeholder failed to resolve
pub const EXIT_SUBSTITUTION: i32 = 65;

/// Exit status after the environment could not be set
pub const EXIT_ENVIRONMENT: i32 = 71;

/// Exit status after a credential switch failed
pub const EXIT_PRIVILEGE: i32 = 77;

/// Exit status after exec failed
pub const EXIT_EXEC: i32 = 127;

/// Errors that end the child before (or instead of) exec
#[derive(Error, Debug)]
pub enum ChildError {
    #[error("substitution failed: {0}")]
    Substitution(#[from] TemplateError),

    #[error("failed to set environment {name}: {source}")]
    Environment {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to switch {kind} to {id}: {source}")]
    Privilege {
        kind: &'static str,
        id: u32,
        #[source]
        source: nix::Error,
    },

    #[error("failed to execute {program}: {source}")]
    Exec {
        program: String,
        #[source]
        source: io::Error,
    },
}

impl ChildError {
    /// Status the child terminates with
    pub fn exit_code(&self) -> i32 {
        match self {
            ChildError::Substitution(_) => EXIT_SUBSTITUTION,
            ChildError::Environment { .. } => EXIT_ENVIRONMENT,
            ChildError::Privilege { .. } => EXIT_PRIVILEGE,
            ChildError::Exec { .. } => EXIT_EXEC,
        }
    }
}

/// Process-level operations performed by the child
pub trait ChildOps {
    /// Set one environment variable, overwriting any existing value
    fn set_env(&mut self, name: &str, value: &str) -> io::Result<()>;

    /// Join every group `user` is a member of, plus `group`
    fn init_groups(&mut self, user: &str, group: Gid) -> nix::Result<()>;

    /// Replace the supplementary group list
    fn set_groups(&mut self, groups: &[Gid]) -> nix::Result<()>;

    /// Switch the group id
    fn set_gid(&mut self, gid: Gid) -> nix::Result<()>;

    /// Switch the user id
    fn set_uid(&mut self, uid: Uid) -> nix::Result<()>;

    /// Replace the process image; only returns on failure
    fn exec(&mut self, argv: &[String]) -> Result<Infallible, io::Error>;
}

/// Operations on the real process
#[derive(Debug, Default)]
pub struct SystemChildOps;

fn c_string(s: &str) -> io::Result<CString> {
    CString::new(s).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
}

impl ChildOps for SystemChildOps {
    fn set_env(&mut self, name: &str, value: &str) -> io::Result<()> {
        let name = c_string(name)?;
        let value = c_string(value)?;

        // Rejects empty names and names containing '='
        if unsafe { libc::setenv(name.as_ptr(), value.as_ptr(), 1) } != 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(())
    }

    fn init_groups(&mut self, user: &str, group: Gid) -> nix::Result<()> {
        let user = CString::new(user).map_err(|_| nix::Error::EINVAL)?;
        nix::unistd::initgroups(&user, group)
    }

    fn set_groups(&mut self, groups: &[Gid]) -> nix::Result<()> {
        nix::unistd::setgroups(groups)
    }

    fn set_gid(&mut self, gid: Gid) -> nix::Result<()> {
        nix::unistd::setgid(gid)
    }

    fn set_uid(&mut self, uid: Uid) -> nix::Result<()> {
        nix::unistd::setuid(uid)
    }

    fn exec(&mut self, argv: &[String]) -> Result<Infallible, io::Error> {
        let args = argv
            .iter()
            .map(|a| c_string(a))
            .collect::<io::Result<Vec<_>>>()?;
        let program = args
            .first()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty argv"))?;

        nix::unistd::execvp(program, args.as_slice()).map_err(io::Error::from)
    }
}

/// Render every argument template
pub fn render_argv(
    template: &ActionTemplate,
    event: &dyn DeviceEvent,
) -> Result<Vec<String>, ChildError> {
    template
        .argv()
        .iter()
        .map(|arg| arg.render(event).map_err(ChildError::from))
        .collect()
}

fn set_env(
    name: &str,
    value: &str,
    mode: RuntimeMode,
    ops: &mut dyn ChildOps,
) -> Result<(), ChildError> {
    if mode.dry_run {
        if mode.debug {
            info!("Would set env {}={}", name, value);
        }
        return Ok(());
    }

    ops.set_env(name, value)
        .map_err(|source| ChildError::Environment {
            name: name.to_string(),
            source,
        })
}

/// Export event properties, then apply the configured env entries in order
pub fn export_environment(
    template: &ActionTemplate,
    event: &dyn DeviceEvent,
    mode: RuntimeMode,
    ops: &mut dyn ChildOps,
) -> Result<(), ChildError> {
    for (name, value) in event.properties() {
        set_env(name, value, mode, ops)?;
    }

    for entry in template.env() {
        let value = match &entry.value {
            Some(value) => Some(value.render(event)?),
            None => event.property(&entry.name).map(str::to_string),
        };

        // Pass-through of a missing property sets nothing
        if let Some(value) = value {
            set_env(&entry.name, &value, mode, ops)?;
        }
    }

    Ok(())
}

/// Replace supplementary groups, switch group, then user. Must run while
/// still privileged.
///
/// A user looked up by name brings its group memberships along; otherwise the
/// target gid becomes the only supplementary group.
pub fn drop_privileges(
    credentials: &Credentials,
    mode: RuntimeMode,
    ops: &mut dyn ChildOps,
) -> Result<(), ChildError> {
    if credentials.is_inherit() {
        return Ok(());
    }

    if mode.dry_run {
        if mode.debug {
            info!(
                "Would switch to gid {:?}, uid {:?}",
                credentials.gid, credentials.uid
            );
        }
        return Ok(());
    }

    if let Some(gid) = credentials.gid {
        let groups = match &credentials.membership {
            Some(member) => ops.init_groups(&member.name, member.primary_gid),
            None => ops.set_groups(&[gid]),
        };
        groups.map_err(|source| ChildError::Privilege {
            kind: "groups",
            id: gid.as_raw(),
            source,
        })?;

        ops.set_gid(gid).map_err(|source| ChildError::Privilege {
            kind: "gid",
            id: gid.as_raw(),
            source,
        })?;
    }

    if let Some(uid) = credentials.uid {
        ops.set_uid(uid).map_err(|source| ChildError::Privilege {
            kind: "uid",
            id: uid.as_raw(),
            source,
        })?;
    }

    Ok(())
}

/// Run the child path of an exec action.
///
/// In dry-run mode no operation on `ops` is invoked and `Ok(())` is returned
/// once the command line has been logged. Otherwise this only returns if
/// something failed before or during exec.
pub fn run_child(
    template: &ActionTemplate,
    event: &dyn DeviceEvent,
    mode: RuntimeMode,
    ops: &mut dyn ChildOps,
) -> Result<(), ChildError> {
    let argv = render_argv(template, event)?;

    export_environment(template, event, mode, ops)?;
    drop_privileges(template.credentials(), mode, ops)?;

    if mode.debug || mode.dry_run {
        let cmdline = argv.join(" ");
        if mode.dry_run {
            info!("Would start child for \"{}\"", cmdline);
            return Ok(());
        }
        child_diagnostic(&format!("starting {}", cmdline));
    }

    match ops.exec(&argv) {
        Ok(never) => match never {},
        Err(source) => Err(ChildError::Exec {
            program: argv[0].clone(),
            source,
        }),
    }
}
