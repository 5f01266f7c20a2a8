/// Audible mode-change cues.
///
/// A headset has no display, so a short tone is the only way to tell that a
/// mode switched. Activation plays a high tone, deactivation a low one. Tones
/// are synthesized with `rodio` on a short-lived thread so the event loop
/// never waits for playback. Without the `audio` cargo feature the observer
/// still runs but playback is a no-op.
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use tracing::debug;

use crate::dispatcher::{ModeChange, ModeObserver};
use crate::mode_stack::ModeStack;

const CUE_LENGTH: Duration = Duration::from_millis(120);

/// One tone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cue {
    pub frequency: f32,
    pub duration: Duration,
}

pub fn cue_for(change: &ModeChange) -> Cue {
    let frequency = match change {
        ModeChange::Activated(_) => 880.0,
        ModeChange::Deactivated(_) => 440.0,
    };
    Cue {
        frequency,
        duration: CUE_LENGTH,
    }
}

/// Shared on/off switch, flipped by the event loop when `audio` changes in
/// config.toml.
pub type AudioSwitch = Rc<Cell<bool>>;

pub struct AudioObserver {
    enabled: AudioSwitch,
    player: Box<dyn FnMut(Cue)>,
}

impl AudioObserver {
    pub fn new(enabled: AudioSwitch) -> Self {
        Self {
            enabled,
            player: Box::new(play),
        }
    }

    #[cfg(test)]
    fn with_player(enabled: AudioSwitch, player: impl FnMut(Cue) + 'static) -> Self {
        Self {
            enabled,
            player: Box::new(player),
        }
    }
}

impl ModeObserver for AudioObserver {
    fn on_mode_change(&mut self, change: &ModeChange, _modes: &ModeStack) {
        if !self.enabled.get() {
            return;
        }
        let (ModeChange::Activated(mode) | ModeChange::Deactivated(mode)) = change;
        debug!(mode = %mode, "playing mode cue");
        (self.player)(cue_for(change));
    }
}

/// True when this build can actually play sound.
pub const fn supported() -> bool {
    cfg!(feature = "audio")
}

#[cfg(feature = "audio")]
fn play(cue: Cue) {
    use tracing::warn;

    let spawned = std::thread::Builder::new()
        .name("mode-cue".into())
        .spawn(move || {
            if let Err(e) = imp::play_blocking(cue) {
                warn!("Failed to play mode cue: {e:#}");
            }
        });
    if let Err(e) = spawned {
        warn!("Failed to spawn audio thread: {e}");
    }
}

#[cfg(not(feature = "audio"))]
fn play(cue: Cue) {
    debug!(?cue, "built without audio support; cue skipped");
}

#[cfg(feature = "audio")]
mod imp {
    use anyhow::{Context, Result};
    use rodio::source::{SineWave, Source};
    use rodio::{OutputStream, Sink};

    use super::Cue;

    /// Plays `cue` on the default output device and waits for it to finish.
    pub fn play_blocking(cue: Cue) -> Result<()> {
        // The stream must outlive the sink or playback stops immediately.
        let (_stream, handle) =
            OutputStream::try_default().context("could not find an audio output device")?;
        let sink = Sink::try_new(&handle).context("could not open an audio sink")?;
        sink.append(
            SineWave::new(cue.frequency)
                .take_duration(cue.duration)
                .amplify(0.2),
        );
        sink.sleep_until_end();
        Ok(())
    }
}
