//! ADBee - QR code pairing for Android wireless debugging.
//!
//! Set `RUST_LOG=adbee=debug` to also print the QR code to the terminal.

use std::thread;

use anyhow::{Context as _, Result};
use gpui::*;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use adbee::app::AppState;
use adbee::config::{self, Config};
use adbee::net::{
    AdbClient, AdbTimeouts, Discovery, PairingCredentials, PairingSession, ServiceEvent,
    ServiceKind, SessionEvent, SessionSettings,
};
use adbee::qr::QrMatrix;
use adbee::ui::{RootView, Theme};

// Define actions for keyboard shortcuts
actions!(adbee, [Quit, NewCode, CloseWindow]);

const WINDOW_WIDTH: f32 = 360.0;
const WINDOW_HEIGHT: f32 = 540.0;

fn main() -> Result<()> {
    init_logging();

    let (config, config_errors) = Config::from_env_lenient();
    for e in &config_errors {
        warn!(error = %e, "Ignoring invalid environment variable");
    }

    // Create app state that will be shared between UI and networking
    let app_state = AppState::with_toast_duration(config.toast_duration);
    let app_state_for_net = app_state.clone();
    let config_for_net = config.clone();

    // Spawn networking in a separate thread with its own tokio runtime
    thread::Builder::new()
        .name("adbee-net".into())
        .spawn(move || {
            let rt = match tokio::runtime::Runtime::new() {
                Ok(rt) => rt,
                Err(e) => {
                    error!(error = %e, "Failed to create tokio runtime");
                    app_state_for_net.set_error("Internal error: could not start networking");
                    return;
                }
            };
            rt.block_on(async move {
                if let Err(e) = run_networking(app_state_for_net.clone(), config_for_net).await {
                    error!(error = %e, "Networking error");
                    app_state_for_net.set_error(format!("Error: {e}"));
                }
            });
        })
        .context("failed to spawn networking thread")?;

    let qr_size_px = config.qr_size_px;

    Application::new()
        .with_assets(gpui_component_assets::Assets)
        .run(move |cx: &mut App| {
            gpui_component::init(cx);

            cx.set_global(Theme::light());
            cx.set_global(app_state.clone());

            // Bind keyboard shortcuts (platform-aware)
            #[cfg(target_os = "macos")]
            cx.bind_keys([
                KeyBinding::new("cmd-q", Quit, None),
                KeyBinding::new("cmd-w", CloseWindow, None),
                KeyBinding::new("cmd-n", NewCode, None),
            ]);

            #[cfg(not(target_os = "macos"))]
            cx.bind_keys([
                KeyBinding::new("ctrl-q", Quit, None),
                KeyBinding::new("ctrl-w", CloseWindow, None),
                KeyBinding::new("ctrl-n", NewCode, None),
            ]);

            cx.on_action(|_: &Quit, cx| {
                // Signal shutdown to networking thread
                if let Some(app_state) = cx.try_global::<AppState>() {
                    app_state.shutdown();
                }
                cx.quit();
            });
            cx.on_action(|_: &NewCode, cx| {
                if let Some(app_state) = cx.try_global::<AppState>() {
                    app_state.request_new_pairing();
                }
            });
            cx.on_action(|_: &CloseWindow, cx| {
                if let Some(window) = cx.active_window() {
                    window.update(cx, |_, window, _| window.remove_window()).ok();
                }
            });

            // Closing the last window ends the pairing session.
            cx.on_window_closed(|cx| {
                if cx.windows().is_empty() {
                    if let Some(app_state) = cx.try_global::<AppState>() {
                        app_state.shutdown();
                    }
                    cx.quit();
                }
            })
            .detach();

            let options = WindowOptions {
                window_bounds: Some(WindowBounds::Windowed(Bounds {
                    origin: Point::default(),
                    size: Size {
                        width: px(WINDOW_WIDTH),
                        height: px(WINDOW_HEIGHT),
                    },
                })),
                titlebar: Some(TitlebarOptions {
                    title: Some("ADBee".into()),
                    ..Default::default()
                }),
                is_resizable: false,
                ..Default::default()
            };

            let opened = cx.open_window(options, |window, cx| {
                let root_view = cx.new(|cx| RootView::new(qr_size_px, cx));
                cx.new(|cx| gpui_component::Root::new(root_view, window, cx))
            });
            if let Err(e) = opened {
                error!(error = %e, "Failed to open window");
                if let Some(app_state) = cx.try_global::<AppState>() {
                    app_state.shutdown();
                }
                cx.quit();
            }
        });

    Ok(())
}

/// Run the networking side: one pairing session at a time until shutdown.
async fn run_networking(app_state: AppState, config: Config) -> Result<()> {
    info!("Initializing networking...");
    let shutdown = app_state.shutdown_token();

    let adb = match config::find_adb(&config) {
        Ok(program) => {
            info!(program = %program.display(), "Using adb");
            Some(AdbClient::new(
                program,
                AdbTimeouts {
                    pair: config.pair_timeout,
                    connect: config.connect_timeout,
                },
            ))
        }
        Err(e) => {
            warn!(error = %e, "adb unavailable, pairing disabled");
            None
        }
    };

    let discovery = match Discovery::new() {
        Ok(discovery) => Some(discovery),
        Err(e) => {
            warn!(error = %e, "mDNS unavailable, pairing disabled");
            None
        }
    };

    let settings = SessionSettings::from(&config);

    loop {
        let credentials = PairingCredentials::generate(&config.service_prefix);
        let qr = match QrMatrix::encode(&credentials.qr_payload()) {
            Ok(qr) => {
                debug!("Scan this code:\n{}", qr.to_terminal_string());
                Some(qr)
            }
            Err(e) => {
                error!(error = %e, "Failed to generate QR code");
                None
            }
        };

        info!(service = %credentials, "New pairing code generated");
        app_state.begin_pairing(credentials.clone(), qr);

        let mut running = start_session(
            &app_state,
            credentials,
            adb.as_ref(),
            discovery.as_ref().map(|d| move || browse_both(d)),
            settings,
        );

        let regenerate = loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => break false,

                _ = app_state.new_pairing_requested() => break true,

                Some(event) = next_session_event(&mut running) => {
                    log_session_event(&event);
                    app_state.apply_event(&event);
                }
            }
        };

        // Dropping the session cancels its watchers and in-flight adb calls.
        drop(running);
        if let Some(discovery) = &discovery {
            discovery.stop_browse(ServiceKind::Pairing);
            discovery.stop_browse(ServiceKind::Connect);
        }

        if !regenerate {
            break;
        }
        info!("Regenerating pairing code");
    }

    if let Some(discovery) = &discovery {
        discovery.shutdown();
    }
    info!("Networking shutdown complete");
    Ok(())
}

type SessionEvents = (PairingSession, mpsc::Receiver<SessionEvent>);
type BrowseStreams = (mpsc::Receiver<ServiceEvent>, mpsc::Receiver<ServiceEvent>);

/// Starts a session for `credentials`, or records why none can run.
///
/// A missing prerequisite leaves the code on screen with an error status;
/// the caller keeps waiting for "New code" or shutdown either way.
fn start_session<B>(
    app_state: &AppState,
    credentials: PairingCredentials,
    adb: Option<&AdbClient>,
    browse: Option<B>,
    settings: SessionSettings,
) -> Option<SessionEvents>
where
    B: FnOnce() -> Result<BrowseStreams>,
{
    let Some(adb) = adb else {
        app_state.set_error("'adb' command not found in PATH");
        return None;
    };
    let Some(browse) = browse else {
        app_state.set_error("Network discovery unavailable");
        return None;
    };

    match browse() {
        Ok((pairing_rx, connect_rx)) => Some(PairingSession::start(
            credentials,
            adb.clone(),
            settings,
            pairing_rx,
            connect_rx,
        )),
        Err(e) => {
            error!(error = %e, "Could not start service browsing");
            app_state.set_error("Network discovery unavailable");
            None
        }
    }
}

/// Browses for both ADB service types.
fn browse_both(discovery: &Discovery) -> Result<BrowseStreams> {
    let pairing_rx = discovery
        .browse(ServiceKind::Pairing)
        .context("failed to browse for pairing services")?;
    let connect_rx = match discovery.browse(ServiceKind::Connect) {
        Ok(rx) => rx,
        Err(e) => {
            discovery.stop_browse(ServiceKind::Pairing);
            return Err(e).context("failed to browse for connect services");
        }
    };
    Ok((pairing_rx, connect_rx))
}

/// Waits for the next event of the running session, or forever if none is running.
async fn next_session_event(running: &mut Option<SessionEvents>) -> Option<SessionEvent> {
    match running {
        Some((_, events)) => events.recv().await,
        None => std::future::pending().await,
    }
}

fn log_session_event(event: &SessionEvent) {
    match event {
        SessionEvent::Paired { address } => info!(%address, "Device paired"),
        SessionEvent::Connected { endpoint } => info!(%endpoint, "Device connected"),
        SessionEvent::PairingFailed { reason } => warn!(%reason, "Pairing failed"),
        SessionEvent::ConnectFailed { endpoint, reason } => {
            warn!(%endpoint, %reason, "Connection failed")
        }
    }
}

/// Initialize logging with tracing.
fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("adbee=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
