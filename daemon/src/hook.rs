/// Headphone button source and key injector.
///
/// On Windows, the three headset buttons arrive as media-key presses. A
/// low-level keyboard hook (`WH_KEYBOARD_LL`) on a dedicated OS thread with its
/// own message pump picks them out, swallows them so the system volume and
/// media player never see them, and forwards a [`ButtonEvent`] to the event
/// loop. Events injected by [`SendInputInjector`] carry `LLKHF_INJECTED` and
/// pass through untouched, so a `<Up>` mapped to `<VolumeUp>` still works.
///
/// Everywhere else the source reads `play`, `up` or `down` lines from stdin
/// and the injector only logs what it would have typed.
use std::sync::OnceLock;
use std::time::Instant;

use anyhow::Result;
use tokio::sync::mpsc;
#[cfg(any(not(windows), test))]
use tracing::info;

use crate::button::{ButtonEvent, HeadphoneButton};
use crate::dispatcher::KeyInjector;
use crate::error::DispatchError;
use crate::event::DaemonEvent;
use crate::keys::{Key, KeyStroke, Modifiers};

/// Tokio channel used to forward [`DaemonEvent::Button`] from the hook
/// callback to the main event loop. Set once by [`start`].
static HOOK_TX: OnceLock<mpsc::Sender<DaemonEvent>> = OnceLock::new();

#[cfg(any(windows, test))]
const VK_VOLUME_DOWN: u32 = 0xAE;
#[cfg(any(windows, test))]
const VK_VOLUME_UP: u32 = 0xAF;
#[cfg(any(windows, test))]
const VK_MEDIA_PLAY_PAUSE: u32 = 0xB3;

const VK_SHIFT: u16 = 0x10;
const VK_CONTROL: u16 = 0x11;
const VK_MENU: u16 = 0x12;
const VK_LWIN: u16 = 0x5B;

/// Maps the virtual-key code a headset sends to the button it came from.
#[cfg(any(windows, test))]
pub fn button_for_vk(vk: u32) -> Option<HeadphoneButton> {
    match vk {
        VK_MEDIA_PLAY_PAUSE => Some(HeadphoneButton::Play),
        VK_VOLUME_UP => Some(HeadphoneButton::Up),
        VK_VOLUME_DOWN => Some(HeadphoneButton::Down),
        _ => None,
    }
}

/// Parses one console line. Blank lines and unknown words yield `None`.
#[cfg(any(not(windows), test))]
pub fn button_for_line(line: &str) -> Option<HeadphoneButton> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    line.parse().ok()
}

fn forward(button: HeadphoneButton) {
    if let Some(tx) = HOOK_TX.get() {
        // try_send is non-blocking; a full channel silently drops this press.
        let _ = tx.try_send(DaemonEvent::Button(ButtonEvent::new(button, Instant::now())));
    }
}

// ── Public handle ─────────────────────────────────────────────────────────────

/// A handle to the running button source.
pub struct ButtonHookHandle {
    #[cfg(windows)]
    thread: std::thread::JoinHandle<()>,
    /// Thread ID of the message-pump thread, used to post `WM_QUIT`.
    #[cfg(windows)]
    thread_id: u32,
    #[cfg(not(windows))]
    task: tokio::task::JoinHandle<()>,
}

impl ButtonHookHandle {
    /// Stops the source. On Windows this blocks until the hook thread exits.
    pub fn stop(self) {
        #[cfg(windows)]
        {
            imp::post_quit(self.thread_id);
            let _ = self.thread.join();
        }
        #[cfg(not(windows))]
        self.task.abort();
    }
}

// ── Startup ───────────────────────────────────────────────────────────────────

/// Starts the platform button source, forwarding presses to `tx` via a
/// non-blocking [`try_send`](mpsc::Sender::try_send).
///
/// On Windows this fails if the hook thread cannot be spawned or
/// `SetWindowsHookExW` is refused.
pub fn start(tx: mpsc::Sender<DaemonEvent>) -> Result<ButtonHookHandle> {
    // Silently ignore if called more than once (e.g. in test binaries).
    let _ = HOOK_TX.set(tx);

    #[cfg(windows)]
    {
        use anyhow::Context;

        let (id_tx, id_rx) = std::sync::mpsc::sync_channel::<Result<u32, String>>(1);
        let thread = std::thread::Builder::new()
            .name("button-hook".into())
            .spawn(move || imp::run_message_pump(id_tx))
            .context("Failed to spawn hook thread")?;
        let thread_id = id_rx
            .recv()
            .context("hook thread exited before reporting its ID")?
            .map_err(|e| anyhow::anyhow!("SetWindowsHookExW failed: {e}"))?;
        Ok(ButtonHookHandle { thread, thread_id })
    }

    #[cfg(not(windows))]
    {
        info!("reading headphone buttons from stdin (play, up, down)");
        Ok(ButtonHookHandle {
            task: tokio::spawn(console::run()),
        })
    }
}

#[cfg(not(windows))]
mod console {
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tracing::{debug, warn};

    use super::{button_for_line, forward};

    pub async fn run() {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => match button_for_line(&line) {
                    Some(button) => forward(button),
                    None if line.trim().is_empty() => {}
                    None => warn!("not a headphone button: '{}'", line.trim()),
                },
                Ok(None) => {
                    debug!("stdin closed; console source stopped");
                    break;
                }
                Err(e) => {
                    warn!("Failed to read stdin: {e}");
                    break;
                }
            }
        }
    }
}

// ── Key injection ─────────────────────────────────────────────────────────────

/// One synthesized key transition: virtual-key code and whether it is a release.
pub type KeyTransition = (u16, bool);

/// Expands a stroke into the press/release sequence sent to the OS:
/// modifiers down, key down, key up, modifiers up in reverse order.
///
/// An uppercase ASCII letter implies Shift. `Nop` expands to nothing.
/// Returns `None` for a stroke with no virtual-key code.
pub fn transitions(stroke: &KeyStroke) -> Option<Vec<KeyTransition>> {
    if stroke.key == Key::Nop {
        return Some(Vec::new());
    }
    let vk = stroke.virtual_key()?;

    let mut modifiers = stroke.modifiers;
    if let Key::Char(c) = stroke.key {
        if c.is_ascii_uppercase() {
            modifiers |= Modifiers::SHIFT;
        }
    }
    let held: Vec<u16> = [
        (Modifiers::CONTROL, VK_CONTROL),
        (Modifiers::ALT, VK_MENU),
        (Modifiers::SHIFT, VK_SHIFT),
        (Modifiers::META, VK_LWIN),
    ]
    .into_iter()
    .filter(|(flag, _)| modifiers.contains(*flag))
    .map(|(_, vk)| vk)
    .collect();

    let mut out: Vec<KeyTransition> = held.iter().map(|&m| (m, false)).collect();
    out.push((vk, false));
    out.push((vk, true));
    out.extend(held.iter().rev().map(|&m| (m, true)));
    Some(out)
}

fn no_virtual_key(stroke: &KeyStroke) -> DispatchError {
    DispatchError::InjectionFailure {
        stroke: stroke.to_string(),
        reason: "no virtual-key code for this key".into(),
    }
}

/// Types strokes with `SendInput`.
#[cfg(windows)]
pub struct SendInputInjector;

#[cfg(windows)]
impl KeyInjector for SendInputInjector {
    fn inject(&mut self, stroke: &KeyStroke) -> Result<(), DispatchError> {
        let seq = transitions(stroke).ok_or_else(|| no_virtual_key(stroke))?;
        if seq.is_empty() {
            return Ok(());
        }
        let sent = imp::send_input(&seq);
        if sent != seq.len() {
            return Err(DispatchError::InjectionFailure {
                stroke: stroke.to_string(),
                reason: format!("SendInput accepted {sent} of {} events", seq.len()),
            });
        }
        Ok(())
    }
}

/// Logs each stroke instead of typing it.
#[cfg(any(not(windows), test))]
pub struct LoggingInjector;

#[cfg(any(not(windows), test))]
impl KeyInjector for LoggingInjector {
    fn inject(&mut self, stroke: &KeyStroke) -> Result<(), DispatchError> {
        let seq = transitions(stroke).ok_or_else(|| no_virtual_key(stroke))?;
        info!(stroke = %stroke, events = seq.len(), "key stroke (not injected on this platform)");
        Ok(())
    }
}

/// The injector for the current platform.
pub fn injector() -> Box<dyn KeyInjector> {
    #[cfg(windows)]
    {
        Box::new(SendInputInjector)
    }
    #[cfg(not(windows))]
    {
        Box::new(LoggingInjector)
    }
}

// ── Windows implementation ────────────────────────────────────────────────────

#[cfg(windows)]
mod imp {
    use std::sync::mpsc as std_mpsc;

    use tracing::debug;
    use windows::Win32::Foundation::{HINSTANCE, LPARAM, LRESULT, WPARAM};
    use windows::Win32::System::Threading::GetCurrentThreadId;
    use windows::Win32::UI::Input::KeyboardAndMouse::{
        SendInput, INPUT, INPUT_0, INPUT_KEYBOARD, KEYBDINPUT, KEYBD_EVENT_FLAGS,
        KEYEVENTF_KEYUP, VIRTUAL_KEY,
    };
    use windows::Win32::UI::WindowsAndMessaging::{
        CallNextHookEx, DispatchMessageW, GetMessageW, PostThreadMessageW,
        SetWindowsHookExW, UnhookWindowsHookEx, KBDLLHOOKSTRUCT, LLKHF_INJECTED, MSG,
        WH_KEYBOARD_LL, WM_KEYDOWN, WM_QUIT, WM_SYSKEYDOWN,
    };

    use super::{button_for_vk, forward, KeyTransition};

    /// Low-level keyboard hook procedure.
    ///
    /// Headset buttons are swallowed on both press and release; only the
    /// press is forwarded.
    unsafe extern "system" fn keyboard_proc(
        n_code: i32,
        w_param: WPARAM,
        l_param: LPARAM,
    ) -> LRESULT {
        if n_code >= 0 {
            let kb = &*(l_param.0 as *const KBDLLHOOKSTRUCT);
            let injected = kb.flags.0 & LLKHF_INJECTED.0 != 0;
            if !injected {
                if let Some(button) = button_for_vk(kb.vkCode) {
                    let msg = w_param.0 as u32;
                    if msg == WM_KEYDOWN || msg == WM_SYSKEYDOWN {
                        forward(button);
                    }
                    return LRESULT(1);
                }
            }
        }
        CallNextHookEx(None, n_code, w_param, l_param)
    }

    /// Installs `WH_KEYBOARD_LL`, runs a Windows message pump until `WM_QUIT`,
    /// then uninstalls the hook.
    ///
    /// Reports the current thread ID (or the install error) to `id_tx`
    /// before entering the pump.
    pub fn run_message_pump(id_tx: std_mpsc::SyncSender<Result<u32, String>>) {
        unsafe {
            let hook = match SetWindowsHookExW(
                WH_KEYBOARD_LL,
                Some(keyboard_proc),
                HINSTANCE::default(),
                0,
            ) {
                Ok(hook) => hook,
                Err(e) => {
                    let _ = id_tx.send(Err(e.to_string()));
                    return;
                }
            };
            let _ = id_tx.send(Ok(GetCurrentThreadId()));
            drop(id_tx);

            let mut msg = MSG::default();
            // GetMessageW: >0 = message, 0 = WM_QUIT, <0 = error.
            while GetMessageW(&mut msg, None, 0, 0).0 > 0 {
                DispatchMessageW(&msg);
            }

            let _ = UnhookWindowsHookEx(hook);
            debug!("hook thread exited");
        }
    }

    /// Posts `WM_QUIT` to `thread_id`, causing its `GetMessageW` loop to exit.
    pub fn post_quit(thread_id: u32) {
        unsafe {
            let _ = PostThreadMessageW(thread_id, WM_QUIT, WPARAM(0), LPARAM(0));
        }
    }

    /// Sends `seq` in one `SendInput` call. Returns how many events were accepted.
    pub fn send_input(seq: &[KeyTransition]) -> usize {
        let inputs: Vec<INPUT> = seq
            .iter()
            .map(|&(vk, up)| INPUT {
                r#type: INPUT_KEYBOARD,
                Anonymous: INPUT_0 {
                    ki: KEYBDINPUT {
                        wVk: VIRTUAL_KEY(vk),
                        wScan: 0,
                        dwFlags: if up { KEYEVENTF_KEYUP } else { KEYBD_EVENT_FLAGS(0) },
                        time: 0,
                        dwExtraInfo: 0,
                    },
                },
            })
            .collect();
        unsafe { SendInput(&inputs, std::mem::size_of::<INPUT>() as i32) as usize }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{MediaKey, NamedKey};

    // ── button_for_vk ─────────────────────────────────────────────────────────

    #[test]
    fn media_keys_map_to_buttons() {
        assert_eq!(button_for_vk(0xB3), Some(HeadphoneButton::Play));
        assert_eq!(button_for_vk(0xAF), Some(HeadphoneButton::Up));
        assert_eq!(button_for_vk(0xAE), Some(HeadphoneButton::Down));
    }

    #[test]
    fn other_keys_are_ignored() {
        assert_eq!(button_for_vk(0xAD), None); // mute
        assert_eq!(button_for_vk(0xB0), None); // next track
        assert_eq!(button_for_vk(0x41), None);
        assert_eq!(button_for_vk(0), None);
    }

    // ── button_for_line ───────────────────────────────────────────────────────

    #[test]
    fn console_lines_parse_case_insensitively() {
        assert_eq!(button_for_line("play\n"), Some(HeadphoneButton::Play));
        assert_eq!(button_for_line("  UP "), Some(HeadphoneButton::Up));
        assert_eq!(button_for_line("<Down>"), Some(HeadphoneButton::Down));
    }

    #[test]
    fn console_blank_or_unknown_lines_yield_none() {
        assert_eq!(button_for_line(""), None);
        assert_eq!(button_for_line("   "), None);
        assert_eq!(button_for_line("mute"), None);
    }

    // ── transitions ───────────────────────────────────────────────────────────

    #[test]
    fn plain_key_is_press_then_release() {
        let stroke = KeyStroke::plain(Key::Media(MediaKey::VolumeUp));
        assert_eq!(transitions(&stroke), Some(vec![(0xAF, false), (0xAF, true)]));
    }

    #[test]
    fn modifiers_wrap_the_key_in_reverse_order() {
        let stroke = KeyStroke::new(
            Key::Named(NamedKey::Tab),
            Modifiers::CONTROL | Modifiers::SHIFT,
        );
        assert_eq!(
            transitions(&stroke),
            Some(vec![
                (VK_CONTROL, false),
                (VK_SHIFT, false),
                (0x09, false),
                (0x09, true),
                (VK_SHIFT, true),
                (VK_CONTROL, true),
            ])
        );
    }

    #[test]
    fn uppercase_letter_implies_shift() {
        let seq = transitions(&KeyStroke::plain(Key::Char('K'))).unwrap();
        assert_eq!(seq.first(), Some(&(VK_SHIFT, false)));
        assert_eq!(seq.last(), Some(&(VK_SHIFT, true)));
        assert!(seq.contains(&(u16::from(b'K'), false)));
    }

    #[test]
    fn nop_expands_to_nothing() {
        assert_eq!(transitions(&KeyStroke::plain(Key::Nop)), Some(vec![]));
    }

    #[test]
    fn untranslatable_stroke_is_an_injection_failure() {
        let stroke = KeyStroke::plain(Key::Char('é'));
        assert_eq!(transitions(&stroke), None);
        assert!(matches!(
            LoggingInjector.inject(&stroke),
            Err(DispatchError::InjectionFailure { .. })
        ));
    }

    #[test]
    fn logging_injector_accepts_translatable_strokes() {
        assert!(LoggingInjector.inject(&KeyStroke::plain(Key::Char('a'))).is_ok());
    }
}
