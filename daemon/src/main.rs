mod audio;
mod button;
mod config;
mod debounce;
mod dispatcher;
mod error;
mod event;
mod hook;
mod keys;
mod mappings;
mod mode_stack;
mod paths;
mod resolver;
mod runtime;
mod shell;
mod sources;
mod status;
mod trigger_table;

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::audio::AudioSwitch;
use crate::dispatcher::{DispatchResult, Dispatcher};
use crate::event::DaemonEvent;
use crate::runtime::{ReloadSummary, RuntimeState};
use crate::sources::Sources;

/// Re-reads both files and swaps the table in. The audio switch only
/// follows the config once the new table has been accepted.
fn reload(
    sources: &Sources,
    runtime: &mut RuntimeState,
    dispatcher: &mut Dispatcher,
    audio: &AudioSwitch,
) -> Result<ReloadSummary> {
    let (config, set) = sources.load()?;
    let summary = runtime.reload(set, config.effective_timeout(), dispatcher)?;
    audio.set(config.audio);
    Ok(summary)
}

fn warn_if_audio_unsupported(requested: bool) {
    if requested && !audio::supported() {
        warn!("audio = true but this build has no audio support (enable the `audio` feature)");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    // ── Config directory ──────────────────────────────────────────────────────
    let sources = Sources::locate()?;
    std::fs::create_dir_all(sources.config_dir()).with_context(|| {
        format!("Failed to create config directory {}", sources.config_dir().display())
    })?;

    // ── Trigger table ─────────────────────────────────────────────────────────
    let startup = sources.load_startup()?;
    let timeout = startup.config.effective_timeout();
    info!(
        entries = startup.table.len(),
        timeout_ms = timeout.as_millis() as u64,
        "trigger table loaded"
    );
    let startup_error = startup.error_summary();
    let mut runtime = RuntimeState::new(startup.table, timeout);

    // ── Status and dispatcher ─────────────────────────────────────────────────
    let status_path = paths::status_file_path()?;
    let status: status::SharedStatus = Rc::new(RefCell::new(status::DaemonStatus::new()));
    status.borrow_mut().error = startup_error;
    status::write_status(&status_path, &status.borrow());

    warn_if_audio_unsupported(startup.config.audio);
    let audio_switch: AudioSwitch = Rc::new(Cell::new(startup.config.audio));

    let mut dispatcher = Dispatcher::new(
        hook::injector(),
        Box::new(shell::ShellCommandRunner::from_env()),
    )
    .with_observer(Box::new(status::StatusObserver::new(
        status_path.clone(),
        Rc::clone(&status),
    )))
    .with_observer(Box::new(audio::AudioObserver::new(Rc::clone(&audio_switch))));

    let (event_tx, mut event_rx) = mpsc::channel::<DaemonEvent>(32);

    // ── Background tasks ──────────────────────────────────────────────────────
    let watched = vec![
        sources.config_path().to_path_buf(),
        sources.mappings_path(&startup.config),
    ];
    tokio::spawn(config::watch_config(watched, event_tx.clone()));

    let hook_handle = hook::start(event_tx.clone()).context("Failed to start button source")?;

    // Graceful shutdown on Ctrl+C.
    {
        let tx = event_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = tx.send(DaemonEvent::Shutdown).await;
            }
        });
    }

    // Reload on SIGHUP.
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::hangup()) {
            Ok(mut hangup) => {
                let tx = event_tx.clone();
                tokio::spawn(async move {
                    while hangup.recv().await.is_some() {
                        if tx.send(DaemonEvent::ReloadRequested).await.is_err() {
                            break;
                        }
                    }
                });
            }
            Err(e) => warn!("Failed to install SIGHUP handler: {e}"),
        }
    }

    info!("earkey-daemon v{} started", env!("CARGO_PKG_VERSION"));

    // ── Event loop ────────────────────────────────────────────────────────────
    loop {
        let deadline = runtime.deadline();
        let expiry = tokio::time::sleep_until(tokio::time::Instant::from_std(
            deadline.unwrap_or_else(Instant::now),
        ));

        tokio::select! {
            evt = event_rx.recv() => {
                let Some(evt) = evt else { break };
                match evt {
                    DaemonEvent::Button(press) => {
                        match runtime.handle_button(press, &mut dispatcher) {
                            Some(DispatchResult::Injected { strokes, failed }) if failed > 0 => {
                                warn!("{failed} of {strokes} key strokes were not injected");
                            }
                            Some(DispatchResult::ModeChanged(change)) => {
                                debug!(?change, "mode stack changed");
                            }
                            _ => {}
                        }
                    }

                    DaemonEvent::ReloadRequested => {
                        match reload(&sources, &mut runtime, &mut dispatcher, &audio_switch) {
                            Ok(summary) => {
                                info!(
                                    entries = summary.entries,
                                    discarded_pending = summary.discarded_pending,
                                    dropped_modes = summary.dropped_modes,
                                    "mappings reloaded"
                                );
                                status.borrow_mut().error = None;
                                warn_if_audio_unsupported(audio_switch.get());
                            }
                            Err(e) => {
                                error!("Reload failed, keeping previous mappings: {e:#}");
                                status.borrow_mut().error = Some(format!("Reload failed: {e:#}"));
                            }
                        }
                        status::write_status(&status_path, &status.borrow());
                    }

                    DaemonEvent::Shutdown => {
                        info!(active_modes = ?runtime.modes().active_scopes(), "Shutting down");
                        break;
                    }
                }
            }

            _ = expiry, if deadline.is_some() => {
                runtime.expire(Instant::now());
            }
        }
    }

    {
        let mut final_status = status.borrow_mut();
        final_status.set_modes(&mode_stack::ModeStack::new());
        final_status.error = None;
        status::write_status(&status_path, &final_status);
    }

    hook_handle.stop();
    Ok(())
}
