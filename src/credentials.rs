//! Credential resolution for privilege dropping
//!
//! User and group identifiers from the config are resolved once at setup
//! time. The result is applied in the child just before exec, group first.

use crate::config::IdSpec;
use nix::unistd::{Gid, Group, Uid, User};
use thiserror::Error;
use tracing::debug;

/// Lookup errors
#[derive(Error, Debug)]
pub enum LookupError {
    #[error("Failed to look up user `{0}': No such user")]
    NoSuchUser(String),

    #[error("Failed to look up uid {0}: No such user")]
    NoSuchUid(u32),

    #[error("Failed to look up group `{0}': No such group")]
    NoSuchGroup(String),

    #[error("Failed to look up `{identifier}': {source}")]
    Os {
        identifier: String,
        #[source]
        source: nix::Error,
    },
}

impl LookupError {
    /// Identifier that failed to resolve
    pub fn identifier(&self) -> String {
        match self {
            LookupError::NoSuchUser(name) | LookupError::NoSuchGroup(name) => name.clone(),
            LookupError::NoSuchUid(uid) => uid.to_string(),
            LookupError::Os { identifier, .. } => identifier.clone(),
        }
    }
}

/// Source of user and group database lookups
pub trait CredentialResolver {
    /// Resolve a user name to its uid and primary gid
    fn user_by_name(&self, name: &str) -> Result<(Uid, Gid), LookupError>;

    /// Resolve a numeric uid to itself and its primary gid
    fn user_by_id(&self, uid: Uid) -> Result<(Uid, Gid), LookupError>;

    /// Resolve a group name to its gid
    fn group_by_name(&self, name: &str) -> Result<Gid, LookupError>;
}

/// Resolver backed by the system user/group database
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl CredentialResolver for SystemResolver {
    fn user_by_name(&self, name: &str) -> Result<(Uid, Gid), LookupError> {
        let user = User::from_name(name)
            .map_err(|source| LookupError::Os {
                identifier: name.to_string(),
                source,
            })?
            .ok_or_else(|| LookupError::NoSuchUser(name.to_string()))?;

        Ok((user.uid, user.gid))
    }

    fn user_by_id(&self, uid: Uid) -> Result<(Uid, Gid), LookupError> {
        let user = User::from_uid(uid)
            .map_err(|source| LookupError::Os {
                identifier: uid.to_string(),
                source,
            })?
            .ok_or_else(|| LookupError::NoSuchUid(uid.as_raw()))?;

        Ok((user.uid, user.gid))
    }

    fn group_by_name(&self, name: &str) -> Result<Gid, LookupError> {
        let group = Group::from_name(name)
            .map_err(|source| LookupError::Os {
                identifier: name.to_string(),
                source,
            })?
            .ok_or_else(|| LookupError::NoSuchGroup(name.to_string()))?;

        Ok(group.gid)
    }
}

/// A user looked up by name, whose group memberships the child joins
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    pub name: String,
    pub primary_gid: Gid,
}

/// Resolved credentials; `None` means inherit from the parent
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub uid: Option<Uid>,
    pub gid: Option<Gid>,

    /// Source of the supplementary groups; without it only `gid` is kept
    pub membership: Option<Membership>,
}

impl Credentials {
    /// Credentials that leave the process identity untouched
    pub fn inherit() -> Self {
        Self::default()
    }

    /// Check if no switch is needed at all
    pub fn is_inherit(&self) -> bool {
        self.uid.is_none() && self.gid.is_none()
    }
}

/// Resolve configured `uid`/`gid` values into numeric credentials.
///
/// A user (by name or id) supplies its primary group unless `gid` is
/// configured, in which case `gid` wins.
pub fn resolve_credentials(
    uid: Option<&IdSpec>,
    gid: Option<&IdSpec>,
    resolver: &dyn CredentialResolver,
) -> Result<Credentials, LookupError> {
    let mut creds = Credentials::inherit();

    match uid {
        Some(IdSpec::Name(name)) => {
            let (u, g) = resolver.user_by_name(name)?;
            creds.uid = Some(u);
            creds.gid = Some(g);
            creds.membership = Some(Membership {
                name: name.clone(),
                primary_gid: g,
            });
        }
        Some(IdSpec::Id(raw)) => {
            let u = Uid::from_raw(*raw);
            creds.uid = Some(u);
            if gid.is_none() {
                let (_, g) = resolver.user_by_id(u)?;
                creds.gid = Some(g);
            }
        }
        None => {}
    }

    match gid {
        Some(IdSpec::Name(name)) => creds.gid = Some(resolver.group_by_name(name)?),
        Some(IdSpec::Id(raw)) => creds.gid = Some(Gid::from_raw(*raw)),
        None => {}
    }

    debug!(uid = ?creds.uid, gid = ?creds.gid, "resolved credentials");

    Ok(creds)
}
