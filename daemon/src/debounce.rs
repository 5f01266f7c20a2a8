/// Accumulates button presses into a candidate trigger.
///
/// The buffer is live for `timeout` after its first press. A press that
/// arrives later starts a fresh sequence instead of extending the stale one,
/// and [`DebounceBuffer::expire`] lets a timer drop an abandoned prefix
/// without firing anything.
use std::time::{Duration, Instant};

use tracing::debug;

use crate::button::{ButtonEvent, HeadphoneButton};
use crate::mode_stack::ModeStack;
use crate::resolver::{self, Resolution};
use crate::trigger_table::{ActionKind, TriggerTable};

/// Outcome of appending one press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferState {
    /// The buffered sequence completed a trigger; the buffer is now empty.
    Matched {
        sequence: Vec<HeadphoneButton>,
        action: ActionKind,
    },
    /// The sequence is a strict prefix of a longer trigger and is retained.
    Ambiguous(Vec<HeadphoneButton>),
    /// The sequence matched nothing and was dropped.
    Reset,
}

#[derive(Debug)]
pub struct DebounceBuffer {
    events: Vec<ButtonEvent>,
    timeout: Duration,
}

impl DebounceBuffer {
    pub fn new(timeout: Duration) -> Self {
        Self {
            events: Vec::new(),
            timeout,
        }
    }

    #[cfg(test)]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Changes the window for subsequent sequences and drops the current one.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
        self.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn sequence(&self) -> Vec<HeadphoneButton> {
        self.events.iter().map(|e| e.button).collect()
    }

    /// Timestamp of the first buffered press.
    pub fn started_at(&self) -> Option<Instant> {
        self.events.first().map(|e| e.timestamp)
    }

    /// True once more than `timeout` has passed since the first press.
    pub fn is_stale(&self, now: Instant) -> bool {
        self.started_at()
            .is_some_and(|first| now.saturating_duration_since(first) > self.timeout)
    }

    /// Earliest instant at which the buffered sequence becomes stale.
    pub fn deadline(&self) -> Option<Instant> {
        self.started_at()
            .map(|first| first + self.timeout + Duration::from_nanos(1))
    }

    /// Adds `event` and matches the resulting sequence.
    ///
    /// A stale buffer is cleared first so the press is evaluated on its own.
    pub fn append(
        &mut self,
        event: ButtonEvent,
        table: &TriggerTable,
        modes: &ModeStack,
    ) -> BufferState {
        if self.is_stale(event.timestamp) {
            debug!(stale = ?self.sequence(), "debounce window elapsed; starting a new sequence");
            self.clear();
        }
        self.events.push(event);

        let sequence = self.sequence();
        match resolver::resolve(&sequence, table, modes) {
            Resolution::Fire(action) => {
                self.clear();
                BufferState::Matched { sequence, action }
            }
            Resolution::Wait => BufferState::Ambiguous(sequence),
            Resolution::Discard => {
                self.clear();
                BufferState::Reset
            }
        }
    }

    /// Clears the buffer if it is stale at `now`. Returns whether it did.
    pub fn expire(&mut self, now: Instant) -> bool {
        if !self.is_stale(now) {
            return false;
        }
        debug!(expired = ?self.sequence(), "incomplete sequence timed out");
        self.clear();
        true
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
