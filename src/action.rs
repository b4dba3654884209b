//! Action lifecycle: setup once, execute many times, release once

use crate::compiler::ActionTemplate;
use crate::config::{read_actions_file, ActionEntry, ConfigError, ExecSettings};
use crate::credentials::{resolve_credentials, CredentialResolver};
use crate::event::DeviceEvent;
use crate::executor::{self, ExecError, ExecOutcome, RuntimeMode};
use serde_yaml::Value;
use std::path::Path;
use tracing::{debug, info};

/// Known action types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Exec,
}

impl ActionKind {
    /// Look up an action type by its config name
    pub fn from_name(name: &str) -> Result<Self, ConfigError> {
        match name {
            "exec" => Ok(ActionKind::Exec),
            other => Err(ConfigError::UnknownActionType(other.to_string())),
        }
    }

    /// Config name of this action type
    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::Exec => "exec",
        }
    }
}

/// Exec action: runs a templated command for each event
#[derive(Debug, Clone)]
pub struct ExecAction {
    template: ActionTemplate,
}

impl ExecAction {
    /// Resolve credentials and compile templates
    pub fn setup(
        settings: &ExecSettings,
        resolver: &dyn CredentialResolver,
    ) -> Result<Self, ConfigError> {
        let credentials =
            resolve_credentials(settings.uid.as_ref(), settings.gid.as_ref(), resolver)?;
        let template = ActionTemplate::compile(&settings.command, &settings.env, credentials)?;

        Ok(Self { template })
    }

    /// Compiled template
    pub fn template(&self) -> &ActionTemplate {
        &self.template
    }

    /// Run the command for one event
    pub fn execute(
        &self,
        event: &dyn DeviceEvent,
        mode: RuntimeMode,
    ) -> Result<ExecOutcome, ExecError> {
        executor::execute(&self.template, event, mode)
    }
}

/// A configured action of any type
#[derive(Debug, Clone)]
pub enum Action {
    Exec(ExecAction),
}

impl Action {
    /// Build an action from its raw settings
    pub fn setup(
        kind: ActionKind,
        settings: &Value,
        resolver: &dyn CredentialResolver,
    ) -> Result<Self, ConfigError> {
        match kind {
            ActionKind::Exec => {
                let settings = ExecSettings::from_value(settings)?;
                Ok(Action::Exec(ExecAction::setup(&settings, resolver)?))
            }
        }
    }

    /// Type of this action
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Exec(_) => ActionKind::Exec,
        }
    }

    /// Handle one event
    pub fn execute(
        &self,
        event: &dyn DeviceEvent,
        mode: RuntimeMode,
    ) -> Result<ExecOutcome, ExecError> {
        match self {
            Action::Exec(action) => action.execute(event, mode),
        }
    }

    /// Tear the action down, dropping everything it owns
    pub fn release(self) {
        debug!("releasing {} action", self.kind().name());
    }
}

/// A named, configured action
#[derive(Debug, Clone)]
pub struct NamedAction {
    pub name: String,
    pub action: Action,
}

/// All actions loaded from one config
#[derive(Debug, Clone, Default)]
pub struct ActionSet {
    actions: Vec<NamedAction>,
}

impl ActionSet {
    /// Set up every entry; the first invalid one aborts the whole load
    pub fn from_entries(
        entries: &[ActionEntry],
        resolver: &dyn CredentialResolver,
    ) -> Result<Self, ConfigError> {
        let actions = entries
            .iter()
            .map(|entry| {
                ActionKind::from_name(&entry.kind)
                    .and_then(|kind| Action::setup(kind, &entry.settings, resolver))
                    .map(|action| NamedAction {
                        name: entry.name.clone(),
                        action,
                    })
                    .map_err(|e| ConfigError::InvalidAction {
                        name: entry.name.clone(),
                        source: Box::new(e),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        info!("loaded {} action(s)", actions.len());

        Ok(Self { actions })
    }

    /// Load an actions file
    pub fn load(path: &Path, resolver: &dyn CredentialResolver) -> Result<Self, ConfigError> {
        let entries = read_actions_file(path)?;
        Self::from_entries(&entries, resolver)
    }

    /// Look up an action by name
    pub fn get(&self, name: &str) -> Option<&NamedAction> {
        self.actions.iter().find(|a| a.name == name)
    }

    /// Iterate over all actions in config order
    pub fn iter(&self) -> impl Iterator<Item = &NamedAction> {
        self.actions.iter()
    }

    /// Number of actions
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Check if no actions are loaded
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Release every action
    pub fn release(self) {
        for named in self.actions {
            named.action.release();
        }
    }
}
