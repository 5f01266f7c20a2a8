/// The immutable mapping from button sequences to actions.
///
/// A [`TriggerTable`] is built from a [`MappingSet`] in one step and never
/// mutated afterwards; a reload builds a fresh table and swaps it in whole.
/// Entries are partitioned by [`Scope`]. Lookups consult the global scope
/// and every active mode, with the innermost mode taking precedence.
use std::collections::{HashMap, HashSet};
use std::fmt;

use tracing::warn;

use crate::button::HeadphoneButton;
use crate::error::ValidationError;
use crate::keys::{Key, KeyStroke, MediaKey};

/// Identifier of a declared mode.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModeId(String);

impl ModeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Visibility partition of a table entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    Global,
    Mode(ModeId),
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Global => f.write_str("global"),
            Scope::Mode(id) => write!(f, "mode '{id}'"),
        }
    }
}

/// An ordered button sequence. Equality is exact: order matters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Trigger(Vec<HeadphoneButton>);

impl Trigger {
    pub fn new(buttons: Vec<HeadphoneButton>) -> Self {
        Self(buttons)
    }

    pub fn buttons(&self) -> &[HeadphoneButton] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&[HeadphoneButton]> for Trigger {
    fn from(buttons: &[HeadphoneButton]) -> Self {
        Self(buttons.to_vec())
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for button in &self.0 {
            write!(f, "{button}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeAction {
    Activate,
    Deactivate,
}

/// What happens when a trigger resolves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    /// Tap each stroke in order.
    Map(Vec<KeyStroke>),
    /// Run a shell command without waiting for it.
    Command(String),
    Mode(ModeId, ModeAction),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerTableEntry {
    pub trigger: Trigger,
    pub scope: Scope,
    pub action: ActionKind,
}

impl TriggerTableEntry {
    pub fn global(trigger: Trigger, action: ActionKind) -> Self {
        Self { trigger, scope: Scope::Global, action }
    }

    pub fn scoped(mode: ModeId, trigger: Trigger, action: ActionKind) -> Self {
        Self { trigger, scope: Scope::Mode(mode), action }
    }
}

/// Unvalidated table contents as supplied by the mapping source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingSet {
    /// Modes that entries may be scoped to or switch.
    pub modes: Vec<ModeId>,
    pub entries: Vec<TriggerTableEntry>,
}

impl MappingSet {
    /// Headset defaults used when no mapping file exists:
    /// up and down change the volume, play toggles playback.
    pub fn builtin() -> Self {
        let media = |button, key| {
            TriggerTableEntry::global(
                Trigger::new(vec![button]),
                ActionKind::Map(vec![KeyStroke::plain(Key::Media(key))]),
            )
        };
        Self {
            modes: Vec::new(),
            entries: vec![
                media(HeadphoneButton::Up, MediaKey::VolumeUp),
                media(HeadphoneButton::Play, MediaKey::Play),
                media(HeadphoneButton::Down, MediaKey::VolumeDown),
            ],
        }
    }
}

/// Result of looking a buffered sequence up in the visible scopes.
#[derive(Debug, PartialEq, Eq)]
pub enum Lookup<'a> {
    NoMatch,
    /// The sequence starts at least one longer trigger but is not a trigger
    /// itself.
    Prefix,
    Exact(&'a ActionKind),
}

#[derive(Debug, Default)]
struct ScopeTable {
    actions: HashMap<Trigger, ActionKind>,
    /// Every strict, non-empty prefix of every trigger in this scope.
    prefixes: HashSet<Vec<HeadphoneButton>>,
}

impl ScopeTable {
    fn insert(&mut self, trigger: Trigger, action: ActionKind) {
        for end in 1..trigger.len() {
            self.prefixes.insert(trigger.buttons()[..end].to_vec());
        }
        self.actions.insert(trigger, action);
    }

    fn exact(&self, sequence: &[HeadphoneButton]) -> Option<&ActionKind> {
        self.actions.get(&Trigger::from(sequence))
    }

    fn is_prefix(&self, sequence: &[HeadphoneButton]) -> bool {
        self.prefixes.contains(sequence)
    }
}

#[derive(Debug, Default)]
pub struct TriggerTable {
    global: ScopeTable,
    modes: HashMap<ModeId, ScopeTable>,
}

impl TriggerTable {
    /// Validates `set` and builds a table from it.
    ///
    /// Rejects empty triggers, a trigger defined twice within one scope, and
    /// any entry that is scoped to or switches an undeclared mode.
    pub fn build(set: MappingSet) -> Result<Self, ValidationError> {
        let mut table = TriggerTable {
            global: ScopeTable::default(),
            modes: set
                .modes
                .into_iter()
                .map(|id| (id, ScopeTable::default()))
                .collect(),
        };

        for entry in set.entries {
            if entry.trigger.is_empty() {
                return Err(ValidationError::EmptyTrigger { scope: entry.scope });
            }
            if let ActionKind::Mode(target, _) = &entry.action {
                if !table.modes.contains_key(target) {
                    return Err(ValidationError::UnknownMode {
                        trigger: entry.trigger,
                        mode: target.clone(),
                    });
                }
            }

            let scope_table = match &entry.scope {
                Scope::Global => &mut table.global,
                Scope::Mode(id) => match table.modes.get_mut(id) {
                    Some(t) => t,
                    None => {
                        return Err(ValidationError::UnknownMode {
                            trigger: entry.trigger,
                            mode: id.clone(),
                        })
                    }
                },
            };
            if scope_table.actions.contains_key(&entry.trigger) {
                return Err(ValidationError::DuplicateTrigger {
                    trigger: entry.trigger,
                    scope: entry.scope,
                });
            }
            scope_table.insert(entry.trigger, entry.action);
        }

        table.warn_unreachable();
        Ok(table)
    }

    /// Resolves `sequence` against the global scope plus `active_scopes`
    /// (innermost last).
    ///
    /// An exact match anywhere beats a prefix match anywhere. Among exact
    /// matches the innermost mode wins, and the global scope loses to every
    /// mode.
    pub fn lookup(&self, sequence: &[HeadphoneButton], active_scopes: &[ModeId]) -> Lookup<'_> {
        if sequence.is_empty() {
            return Lookup::NoMatch;
        }

        let visible = || {
            active_scopes
                .iter()
                .rev()
                .filter_map(|id| self.modes.get(id))
                .chain(std::iter::once(&self.global))
        };

        if let Some(action) = visible().find_map(|scope| scope.exact(sequence)) {
            return Lookup::Exact(action);
        }
        if visible().any(|scope| scope.is_prefix(sequence)) {
            return Lookup::Prefix;
        }
        Lookup::NoMatch
    }

    pub fn declares_mode(&self, mode: &ModeId) -> bool {
        self.modes.contains_key(mode)
    }

    /// Total number of entries across all scopes.
    pub fn len(&self) -> usize {
        self.global.actions.len() + self.modes.values().map(|t| t.actions.len()).sum::<usize>()
    }

    /// Triggers that can never fire because a shorter trigger in the same
    /// scope resolves first.
    pub fn unreachable(&self) -> Vec<Unreachable> {
        let scopes = std::iter::once((Scope::Global, &self.global)).chain(
            self.modes
                .iter()
                .map(|(id, table)| (Scope::Mode(id.clone()), table)),
        );
        let mut found = Vec::new();
        for (scope, table) in scopes {
            for trigger in table.actions.keys() {
                let shadowed_by = (1..trigger.len())
                    .map(|end| &trigger.buttons()[..end])
                    .find(|prefix| table.exact(prefix).is_some());
                if let Some(prefix) = shadowed_by {
                    found.push(Unreachable {
                        scope: scope.clone(),
                        trigger: trigger.clone(),
                        shadowed_by: Trigger::from(prefix),
                    });
                }
            }
        }
        found
    }

    fn warn_unreachable(&self) {
        for u in self.unreachable() {
            warn!(
                "{} in {} scope is unreachable: {} fires first",
                u.trigger, u.scope, u.shadowed_by
            );
        }
    }
}

/// An entry hidden behind a shorter trigger in its own scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unreachable {
    pub scope: Scope,
    pub trigger: Trigger,
    pub shadowed_by: Trigger,
}
