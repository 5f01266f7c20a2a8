use crate::trigger_table::ModeId;

/// Active modes, outermost first. An empty stack means only global
/// mappings are visible.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ModeStack {
    modes: Vec<ModeId>,
}

impl ModeStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `mode` the innermost active mode. Returns `false` without
    /// changing anything if it is already active.
    pub fn push(&mut self, mode: ModeId) -> bool {
        if self.contains(&mode) {
            return false;
        }
        self.modes.push(mode);
        true
    }

    /// Removes `mode` wherever it sits in the stack. Returns `false` if it
    /// was not active.
    pub fn pop(&mut self, mode: &ModeId) -> bool {
        let before = self.modes.len();
        self.modes.retain(|m| m != mode);
        self.modes.len() != before
    }

    /// Active modes in stacking order, innermost last.
    pub fn active_scopes(&self) -> &[ModeId] {
        &self.modes
    }

    pub fn contains(&self, mode: &ModeId) -> bool {
        self.modes.iter().any(|m| m == mode)
    }

    #[cfg(test)]
    pub fn innermost(&self) -> Option<&ModeId> {
        self.modes.last()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.modes.is_empty()
    }

    /// Drops every mode for which `keep` returns false and hands back the
    /// removed ones, innermost first.
    pub fn retain(&mut self, mut keep: impl FnMut(&ModeId) -> bool) -> Vec<ModeId> {
        let mut removed = Vec::new();
        self.modes.retain(|m| {
            let k = keep(m);
            if !k {
                removed.push(m.clone());
            }
            k
        });
        removed.reverse();
        removed
    }
}
