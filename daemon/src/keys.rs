/// Output key descriptors: what a `map` action types when it fires.
///
/// Names follow the mapping-file syntax (`<C-a>`, `<VolumeUp>`, `<F5>`).
/// [`KeyStroke::virtual_key`] translates a stroke into the Windows
/// virtual-key code handed to `SendInput`; strokes with no Windows
/// equivalent return `None` and are reported as injection failures.
use std::fmt;

use bitflags::bitflags;

bitflags! {
    /// Modifier keys held while a stroke is tapped.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Modifiers: u8 {
        const CONTROL = 0b0001;
        const ALT     = 0b0010;
        const SHIFT   = 0b0100;
        /// Command on macOS, the Windows key elsewhere.
        const META    = 0b1000;
    }
}

impl Modifiers {
    /// Parses a single modifier prefix letter (`C`, `A`, `S`, `D`).
    pub fn from_prefix(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'C' => Some(Modifiers::CONTROL),
            'A' => Some(Modifiers::ALT),
            'S' => Some(Modifiers::SHIFT),
            'D' => Some(Modifiers::META),
            _ => None,
        }
    }
}

/// Non-character keys available on a regular keyboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamedKey {
    F(u8),
    Left,
    Right,
    Up,
    Down,
    Home,
    End,
    PageUp,
    PageDown,
    Return,
    Delete,
    Backspace,
    Escape,
    CapsLock,
    Tab,
    Space,
}

/// System and media keys (volume, playback, display).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKey {
    VolumeUp,
    VolumeDown,
    Mute,
    BrightnessUp,
    BrightnessDown,
    Help,
    Power,
    NumLock,
    ContrastUp,
    ContrastDown,
    Eject,
    VidMirror,
    Play,
    Next,
    Previous,
    Fast,
    Rewind,
    IlluminationUp,
    IlluminationDown,
    IlluminationToggle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Char(char),
    Named(NamedKey),
    Media(MediaKey),
    /// Swallows the button press without typing anything.
    Nop,
}

impl Key {
    /// Looks up a special key by the name used between angle brackets.
    /// Keyboard keys win over media keys, so `Up` is the arrow key.
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        if let Some(n) = lower.strip_prefix('f') {
            if let Ok(n @ 1..=12) = n.parse::<u8>() {
                return Some(Key::Named(NamedKey::F(n)));
            }
        }

        let named = match lower.as_str() {
            "left" => Some(NamedKey::Left),
            "right" => Some(NamedKey::Right),
            "up" => Some(NamedKey::Up),
            "down" => Some(NamedKey::Down),
            "home" => Some(NamedKey::Home),
            "end" => Some(NamedKey::End),
            "pageup" => Some(NamedKey::PageUp),
            "pagedown" => Some(NamedKey::PageDown),
            "return" | "enter" | "cr" => Some(NamedKey::Return),
            "del" => Some(NamedKey::Delete),
            "bs" => Some(NamedKey::Backspace),
            "esc" => Some(NamedKey::Escape),
            "capslock" => Some(NamedKey::CapsLock),
            "tab" => Some(NamedKey::Tab),
            "space" => Some(NamedKey::Space),
            _ => None,
        };
        if let Some(named) = named {
            return Some(Key::Named(named));
        }

        let media = match lower.as_str() {
            "volumeup" => MediaKey::VolumeUp,
            "volumedown" => MediaKey::VolumeDown,
            "mute" => MediaKey::Mute,
            "brightnessup" => MediaKey::BrightnessUp,
            "brightnessdown" => MediaKey::BrightnessDown,
            "help" => MediaKey::Help,
            "power" => MediaKey::Power,
            "numlock" => MediaKey::NumLock,
            "contrastup" => MediaKey::ContrastUp,
            "contrastdown" => MediaKey::ContrastDown,
            "eject" => MediaKey::Eject,
            "vidmirror" => MediaKey::VidMirror,
            "play" => MediaKey::Play,
            "next" => MediaKey::Next,
            "previous" => MediaKey::Previous,
            "fast" => MediaKey::Fast,
            "rewind" => MediaKey::Rewind,
            "illuminationup" => MediaKey::IlluminationUp,
            "illuminationdown" => MediaKey::IlluminationDown,
            "illuminationtoggle" => MediaKey::IlluminationToggle,
            "nop" => return Some(Key::Nop),
            _ => return None,
        };
        Some(Key::Media(media))
    }
}

/// A single key tap with its modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyStroke {
    pub key: Key,
    pub modifiers: Modifiers,
}

impl KeyStroke {
    pub fn new(key: Key, modifiers: Modifiers) -> Self {
        Self { key, modifiers }
    }

    pub fn plain(key: Key) -> Self {
        Self::new(key, Modifiers::empty())
    }

    /// Windows virtual-key code for the stroke's key, if it has one.
    ///
    /// Characters are resolved at injection time through the active keyboard
    /// layout, so only ASCII letters and digits are mapped here.
    pub fn virtual_key(&self) -> Option<u16> {
        match self.key {
            Key::Char(c) if c.is_ascii_alphanumeric() => Some(c.to_ascii_uppercase() as u16),
            Key::Char(' ') => Some(0x20),
            Key::Char(_) | Key::Nop => None,
            Key::Named(named) => Some(match named {
                NamedKey::F(n) => 0x6F + n as u16, // F1 = 0x70
                NamedKey::Left => 0x25,
                NamedKey::Up => 0x26,
                NamedKey::Right => 0x27,
                NamedKey::Down => 0x28,
                NamedKey::Home => 0x24,
                NamedKey::End => 0x23,
                NamedKey::PageUp => 0x21,
                NamedKey::PageDown => 0x22,
                NamedKey::Return => 0x0D,
                NamedKey::Delete => 0x2E,
                NamedKey::Backspace => 0x08,
                NamedKey::Escape => 0x1B,
                NamedKey::CapsLock => 0x14,
                NamedKey::Tab => 0x09,
                NamedKey::Space => 0x20,
            }),
            Key::Media(media) => match media {
                MediaKey::VolumeUp => Some(0xAF),
                MediaKey::VolumeDown => Some(0xAE),
                MediaKey::Mute => Some(0xAD),
                MediaKey::Play => Some(0xB3),
                MediaKey::Next => Some(0xB0),
                MediaKey::Previous => Some(0xB1),
                MediaKey::Help => Some(0x2F),
                MediaKey::NumLock => Some(0x90),
                MediaKey::Power => Some(0x5F), // VK_SLEEP
                _ => None,
            },
        }
    }
}

impl fmt::Display for KeyStroke {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut prefix = String::new();
        for (flag, letter) in [
            (Modifiers::META, 'D'),
            (Modifiers::ALT, 'A'),
            (Modifiers::CONTROL, 'C'),
            (Modifiers::SHIFT, 'S'),
        ] {
            if self.modifiers.contains(flag) {
                prefix.push(letter);
                prefix.push('-');
            }
        }
        match self.key {
            Key::Char(c) if prefix.is_empty() => write!(f, "{c}"),
            Key::Char(c) => write!(f, "<{prefix}{c}>"),
            Key::Named(NamedKey::F(n)) => write!(f, "<{prefix}F{n}>"),
            Key::Named(named) => write!(f, "<{prefix}{named:?}>"),
            Key::Media(media) => write!(f, "<{prefix}{media:?}>"),
            Key::Nop => write!(f, "<Nop>"),
        }
    }
}
