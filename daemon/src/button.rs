use std::fmt;
use std::str::FromStr;
use std::time::Instant;

/// A physical button on a headset's inline remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeadphoneButton {
    Play,
    Up,
    Down,
}

impl HeadphoneButton {
    /// Name used in mapping files, without the angle brackets.
    pub fn name(self) -> &'static str {
        match self {
            HeadphoneButton::Play => "Play",
            HeadphoneButton::Up => "Up",
            HeadphoneButton::Down => "Down",
        }
    }
}

impl fmt::Display for HeadphoneButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.name())
    }
}

impl FromStr for HeadphoneButton {
    type Err = String;

    /// Accepts `play`, `up` or `down` in any case, with or without brackets.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let bare = trimmed
            .strip_prefix('<')
            .and_then(|rest| rest.strip_suffix('>'))
            .unwrap_or(trimmed);
        match bare.to_ascii_lowercase().as_str() {
            "play" => Ok(HeadphoneButton::Play),
            "up" => Ok(HeadphoneButton::Up),
            "down" => Ok(HeadphoneButton::Down),
            _ => Err(format!("unknown headphone button '{trimmed}'")),
        }
    }
}

/// One button press as delivered by the event source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEvent {
    pub button: HeadphoneButton,
    /// Monotonic time at which the press was observed.
    pub timestamp: Instant,
}

impl ButtonEvent {
    pub fn new(button: HeadphoneButton, timestamp: Instant) -> Self {
        Self { button, timestamp }
    }
}
