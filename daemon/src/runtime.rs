/// The daemon's single mutable engine instance.
///
/// `RuntimeState` owns the active trigger table, the debounce buffer and the
/// mode stack. It is driven by one sequential event loop, so nothing in here
/// locks: button presses, timer ticks and reloads all arrive as separate calls
/// and each one runs to completion before the next.
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::button::ButtonEvent;
use crate::debounce::{BufferState, DebounceBuffer};
use crate::dispatcher::{DispatchResult, Dispatcher, ModeChange};
use crate::error::ValidationError;
use crate::mode_stack::ModeStack;
use crate::trigger_table::{MappingSet, TriggerTable};

/// What a reload changed, for logging by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadSummary {
    pub entries: usize,
    /// An in-flight sequence was discarded.
    pub discarded_pending: bool,
    pub dropped_modes: usize,
}

pub struct RuntimeState {
    table: TriggerTable,
    buffer: DebounceBuffer,
    modes: ModeStack,
}

impl RuntimeState {
    pub fn new(table: TriggerTable, timeout: Duration) -> Self {
        Self {
            table,
            buffer: DebounceBuffer::new(timeout),
            modes: ModeStack::new(),
        }
    }

    /// Feeds one press through the buffer and dispatches the action it
    /// completes, if any.
    pub fn handle_button(
        &mut self,
        event: ButtonEvent,
        dispatcher: &mut Dispatcher,
    ) -> Option<DispatchResult> {
        match self.buffer.append(event, &self.table, &self.modes) {
            BufferState::Matched { sequence, action } => {
                info!(
                    trigger = %crate::trigger_table::Trigger::new(sequence),
                    action = ?action,
                    "trigger matched"
                );
                Some(dispatcher.dispatch(&action, &mut self.modes))
            }
            BufferState::Ambiguous(sequence) => {
                debug!(pending = ?sequence, "waiting for more buttons");
                None
            }
            BufferState::Reset => {
                debug!(button = %event.button, "no mapping; sequence reset");
                None
            }
        }
    }

    /// Timer tick: drops a stale pending sequence without firing it.
    pub fn expire(&mut self, now: Instant) -> bool {
        self.buffer.expire(now)
    }

    /// When the pending sequence (if any) goes stale.
    pub fn deadline(&self) -> Option<Instant> {
        self.buffer.deadline()
    }

    #[cfg(test)]
    pub fn is_pending(&self) -> bool {
        !self.buffer.is_empty()
    }

    pub fn modes(&self) -> &ModeStack {
        &self.modes
    }

    #[cfg(test)]
    pub fn timeout(&self) -> Duration {
        self.buffer.timeout()
    }

    /// Replaces the trigger table and debounce window in one step.
    ///
    /// Validation happens before anything is touched; on error the current
    /// table, buffer and modes are kept. On success a pending sequence is
    /// discarded rather than resolved against the new table, and modes the
    /// new table no longer declares are deactivated.
    pub fn reload(
        &mut self,
        set: MappingSet,
        timeout: Duration,
        dispatcher: &mut Dispatcher,
    ) -> Result<ReloadSummary, ValidationError> {
        let table = TriggerTable::build(set)?;

        let discarded_pending = !self.buffer.is_empty();
        self.table = table;
        self.buffer.set_timeout(timeout);

        let table = &self.table;
        let dropped = self.modes.retain(|m| table.declares_mode(m));
        for mode in &dropped {
            info!(mode = %mode, "mode removed by reload");
            dispatcher.notify(&ModeChange::Deactivated(mode.clone()), &self.modes);
        }

        Ok(ReloadSummary {
            entries: self.table.len(),
            discarded_pending,
            dropped_modes: dropped.len(),
        })
    }
}
