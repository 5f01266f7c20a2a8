use crate::button::HeadphoneButton;
use crate::mode_stack::ModeStack;
use crate::trigger_table::{ActionKind, Lookup, TriggerTable};

/// What the buffer should do with the sequence it just extended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The sequence is a complete trigger: fire and reset.
    Fire(ActionKind),
    /// The sequence is only the start of longer triggers: keep buffering.
    Wait,
    /// Nothing starts with the sequence: reset without firing.
    Discard,
}

/// Matches `sequence` against the scopes visible under `modes`.
///
/// First completed trigger wins: an exact match fires even when longer
/// triggers share it as a prefix.
pub fn resolve(sequence: &[HeadphoneButton], table: &TriggerTable, modes: &ModeStack) -> Resolution {
    match table.lookup(sequence, modes.active_scopes()) {
        Lookup::Exact(action) => Resolution::Fire(action.clone()),
        Lookup::Prefix => Resolution::Wait,
        Lookup::NoMatch => Resolution::Discard,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigger_table::{MappingSet, ModeId, Trigger, TriggerTableEntry};
    use HeadphoneButton::{Down, Play, Up};

    fn cmd(s: &str) -> ActionKind {
        ActionKind::Command(s.to_string())
    }

    #[test]
    fn exact_match_fires_even_with_longer_trigger_sharing_prefix() {
        let table = TriggerTable::build(MappingSet {
            modes: vec![],
            entries: vec![
                TriggerTableEntry::global(Trigger::new(vec![Play]), cmd("short")),
                TriggerTableEntry::global(Trigger::new(vec![Play, Up]), cmd("long")),
            ],
        })
        .unwrap();

        assert_eq!(
            resolve(&[Play], &table, &ModeStack::new()),
            Resolution::Fire(cmd("short"))
        );
    }

    #[test]
    fn prefix_waits_and_miss_discards() {
        let table = TriggerTable::build(MappingSet {
            modes: vec![],
            entries: vec![TriggerTableEntry::global(
                Trigger::new(vec![Play, Up]),
                cmd("long"),
            )],
        })
        .unwrap();
        let modes = ModeStack::new();

        assert_eq!(resolve(&[Play], &table, &modes), Resolution::Wait);
        assert_eq!(resolve(&[Play, Down], &table, &modes), Resolution::Discard);
    }

    #[test]
    fn resolution_follows_mode_stack() {
        let nav = ModeId::new("nav");
        let table = TriggerTable::build(MappingSet {
            modes: vec![nav.clone()],
            entries: vec![
                TriggerTableEntry::global(Trigger::new(vec![Up]), cmd("A")),
                TriggerTableEntry::scoped(nav.clone(), Trigger::new(vec![Up]), cmd("B")),
            ],
        })
        .unwrap();
        let mut modes = ModeStack::new();

        assert_eq!(resolve(&[Up], &table, &modes), Resolution::Fire(cmd("A")));
        modes.push(nav);
        assert_eq!(resolve(&[Up], &table, &modes), Resolution::Fire(cmd("B")));
    }
}
