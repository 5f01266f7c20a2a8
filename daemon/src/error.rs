use thiserror::Error;

use crate::trigger_table::{ModeId, Scope, Trigger};

/// A mapping set that cannot become the active trigger table.
///
/// Returned from table construction; the caller keeps whatever table it
/// had before.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("empty trigger in {scope} scope")]
    EmptyTrigger { scope: Scope },

    #[error("trigger {trigger} is defined more than once in {scope} scope")]
    DuplicateTrigger { trigger: Trigger, scope: Scope },

    #[error("trigger {trigger} refers to undeclared mode '{mode}'")]
    UnknownMode { trigger: Trigger, mode: ModeId },
}

/// Failures from the output collaborators. Logged by the dispatcher and
/// otherwise ignored; neither affects buffer or mode state.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("could not inject {stroke}: {reason}")]
    InjectionFailure { stroke: String, reason: String },

    #[error("command '{command}' failed to start: {source}")]
    CommandFailure {
        command: String,
        #[source]
        source: std::io::Error,
    },
}
