use crate::button::ButtonEvent;

pub enum DaemonEvent {
    /// A headphone button was pressed.
    Button(ButtonEvent),
    /// The config or mapping file changed on disk, or SIGHUP was received.
    /// Parsing and validation happen on the event loop.
    ReloadRequested,
    /// Ctrl+C received; the daemon should write its final status and exit.
    Shutdown,
}
