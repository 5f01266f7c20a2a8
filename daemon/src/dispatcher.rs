/// Executes resolved actions against the output collaborators.
///
/// Key injection and command execution are best-effort: failures are logged
/// here and never reach the matching pipeline. Mode actions mutate the
/// [`ModeStack`] first and only then notify the observer, so an observer
/// that inspects the stack sees the post-transition state.
use tracing::{info, warn};

use crate::error::DispatchError;
use crate::keys::KeyStroke;
use crate::mode_stack::ModeStack;
use crate::trigger_table::{ActionKind, ModeAction, ModeId};

/// Synthesizes key strokes at the OS level.
pub trait KeyInjector {
    fn inject(&mut self, stroke: &KeyStroke) -> Result<(), DispatchError>;
}

/// Starts external commands. Implementations must return as soon as the
/// command has been launched.
pub trait CommandRunner {
    fn run(&mut self, command: &str) -> Result<(), DispatchError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModeChange {
    Activated(ModeId),
    Deactivated(ModeId),
}

/// Receives mode transitions synchronously, after the stack has changed.
pub trait ModeObserver {
    fn on_mode_change(&mut self, change: &ModeChange, modes: &ModeStack);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchResult {
    /// Key strokes were handed to the injector (`failed` of them errored).
    Injected { strokes: usize, failed: usize },
    CommandStarted,
    CommandFailed,
    ModeChanged(ModeChange),
    /// Activate of an active mode, or deactivate of an inactive one.
    ModeUnchanged,
}

pub struct Dispatcher {
    injector: Box<dyn KeyInjector>,
    runner: Box<dyn CommandRunner>,
    observers: Vec<Box<dyn ModeObserver>>,
}

impl Dispatcher {
    pub fn new(injector: Box<dyn KeyInjector>, runner: Box<dyn CommandRunner>) -> Self {
        Self {
            injector,
            runner,
            observers: Vec::new(),
        }
    }

    /// Adds an observer. Observers are notified in the order they were added.
    pub fn with_observer(mut self, observer: Box<dyn ModeObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn dispatch(&mut self, action: &ActionKind, modes: &mut ModeStack) -> DispatchResult {
        match action {
            ActionKind::Map(strokes) => {
                let mut failed = 0;
                for stroke in strokes {
                    if let Err(e) = self.injector.inject(stroke) {
                        warn!("{e}");
                        failed += 1;
                    }
                }
                DispatchResult::Injected {
                    strokes: strokes.len(),
                    failed,
                }
            }
            ActionKind::Command(command) => match self.runner.run(command) {
                Ok(()) => DispatchResult::CommandStarted,
                Err(e) => {
                    warn!("{e}");
                    DispatchResult::CommandFailed
                }
            },
            ActionKind::Mode(mode, ModeAction::Activate) => {
                if !modes.push(mode.clone()) {
                    return DispatchResult::ModeUnchanged;
                }
                info!(mode = %mode, "mode activated");
                let change = ModeChange::Activated(mode.clone());
                self.notify(&change, modes);
                DispatchResult::ModeChanged(change)
            }
            ActionKind::Mode(mode, ModeAction::Deactivate) => {
                if !modes.pop(mode) {
                    return DispatchResult::ModeUnchanged;
                }
                info!(mode = %mode, "mode deactivated");
                let change = ModeChange::Deactivated(mode.clone());
                self.notify(&change, modes);
                DispatchResult::ModeChanged(change)
            }
        }
    }

    /// Forwards a transition that happened outside [`Dispatcher::dispatch`],
    /// such as a mode dropped by a reload.
    pub fn notify(&mut self, change: &ModeChange, modes: &ModeStack) {
        for observer in &mut self.observers {
            observer.on_mode_change(change, modes);
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Recording collaborators shared by the engine tests.
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Call {
        Inject(KeyStroke),
        Run(String),
        /// The change plus the active scopes seen during the callback.
        Mode(ModeChange, Vec<ModeId>),
    }

    pub type Log = Rc<RefCell<Vec<Call>>>;

    pub struct Recorder {
        pub log: Log,
        pub fail: bool,
    }

    impl KeyInjector for Recorder {
        fn inject(&mut self, stroke: &KeyStroke) -> Result<(), DispatchError> {
            self.log.borrow_mut().push(Call::Inject(*stroke));
            if self.fail {
                return Err(DispatchError::InjectionFailure {
                    stroke: stroke.to_string(),
                    reason: "test".into(),
                });
            }
            Ok(())
        }
    }

    impl CommandRunner for Recorder {
        fn run(&mut self, command: &str) -> Result<(), DispatchError> {
            self.log.borrow_mut().push(Call::Run(command.to_string()));
            if self.fail {
                return Err(DispatchError::CommandFailure {
                    command: command.to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "test"),
                });
            }
            Ok(())
        }
    }

    impl ModeObserver for Recorder {
        fn on_mode_change(&mut self, change: &ModeChange, modes: &ModeStack) {
            self.log
                .borrow_mut()
                .push(Call::Mode(change.clone(), modes.active_scopes().to_vec()));
        }
    }

    /// A dispatcher whose three collaborators all append to one log.
    pub fn recording(fail: bool) -> (Dispatcher, Log) {
        let log: Log = Rc::default();
        let rec = |fail| Box::new(Recorder { log: Rc::clone(&log), fail });
        let dispatcher = Dispatcher::new(rec(fail), rec(fail)).with_observer(rec(false));
        (dispatcher, log)
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{recording, Call};
    use super::*;
    use crate::keys::{Key, MediaKey};

    fn nav() -> ModeId {
        ModeId::new("nav")
    }

    // ── Map ───────────────────────────────────────────────────────────────────

    #[test]
    fn map_injects_every_stroke_in_order() {
        let (mut d, log) = recording(false);
        let strokes = vec![
            KeyStroke::plain(Key::Char('k')),
            KeyStroke::plain(Key::Media(MediaKey::Mute)),
        ];

        let result = d.dispatch(&ActionKind::Map(strokes.clone()), &mut ModeStack::new());

        assert_eq!(result, DispatchResult::Injected { strokes: 2, failed: 0 });
        assert_eq!(
            *log.borrow(),
            vec![Call::Inject(strokes[0]), Call::Inject(strokes[1])]
        );
    }

    #[test]
    fn injection_failure_is_counted_not_retried() {
        let (mut d, log) = recording(true);
        let strokes = vec![KeyStroke::plain(Key::Char('a')), KeyStroke::plain(Key::Char('b'))];

        let result = d.dispatch(&ActionKind::Map(strokes), &mut ModeStack::new());

        assert_eq!(result, DispatchResult::Injected { strokes: 2, failed: 2 });
        assert_eq!(log.borrow().len(), 2);
    }

    // ── Command ───────────────────────────────────────────────────────────────

    #[test]
    fn command_is_handed_to_runner() {
        let (mut d, log) = recording(false);
        let result = d.dispatch(&ActionKind::Command("say hi".into()), &mut ModeStack::new());
        assert_eq!(result, DispatchResult::CommandStarted);
        assert_eq!(*log.borrow(), vec![Call::Run("say hi".into())]);
    }

    #[test]
    fn command_failure_leaves_modes_untouched() {
        let (mut d, _log) = recording(true);
        let mut modes = ModeStack::new();
        modes.push(nav());
        let result = d.dispatch(&ActionKind::Command("false".into()), &mut modes);
        assert_eq!(result, DispatchResult::CommandFailed);
        assert_eq!(modes.active_scopes(), &[nav()]);
    }

    // ── Mode ──────────────────────────────────────────────────────────────────

    #[test]
    fn observer_sees_stack_after_activation() {
        let (mut d, log) = recording(false);
        let mut modes = ModeStack::new();

        let result = d.dispatch(&ActionKind::Mode(nav(), ModeAction::Activate), &mut modes);

        assert_eq!(result, DispatchResult::ModeChanged(ModeChange::Activated(nav())));
        assert_eq!(
            *log.borrow(),
            vec![Call::Mode(ModeChange::Activated(nav()), vec![nav()])]
        );
    }

    #[test]
    fn observer_sees_stack_after_deactivation() {
        let (mut d, log) = recording(false);
        let mut modes = ModeStack::new();
        modes.push(nav());

        d.dispatch(&ActionKind::Mode(nav(), ModeAction::Deactivate), &mut modes);

        assert!(modes.is_empty());
        assert_eq!(
            *log.borrow(),
            vec![Call::Mode(ModeChange::Deactivated(nav()), vec![])]
        );
    }

    #[test]
    fn every_observer_sees_each_transition_in_order() {
        use std::rc::Rc;
        use super::testing::{Log, Recorder};

        let log: Log = Rc::default();
        let rec = || Box::new(Recorder { log: Rc::clone(&log), fail: false });
        let mut d = Dispatcher::new(rec(), rec())
            .with_observer(rec())
            .with_observer(rec());
        let mut modes = ModeStack::new();

        d.dispatch(&ActionKind::Mode(nav(), ModeAction::Activate), &mut modes);

        let seen = Call::Mode(ModeChange::Activated(nav()), vec![nav()]);
        assert_eq!(*log.borrow(), vec![seen.clone(), seen]);
    }

    #[test]
    fn redundant_transitions_do_not_notify() {
        let (mut d, log) = recording(false);
        let mut modes = ModeStack::new();

        let off = d.dispatch(&ActionKind::Mode(nav(), ModeAction::Deactivate), &mut modes);
        assert_eq!(off, DispatchResult::ModeUnchanged);

        d.dispatch(&ActionKind::Mode(nav(), ModeAction::Activate), &mut modes);
        let again = d.dispatch(&ActionKind::Mode(nav(), ModeAction::Activate), &mut modes);
        assert_eq!(again, DispatchResult::ModeUnchanged);

        assert_eq!(log.borrow().len(), 1);
    }
}
