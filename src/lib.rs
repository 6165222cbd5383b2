//! Screen Sharing - capture the screen, record it, download the result.
//!
//! This is the main library crate for the screen sharing widget. The core
//! (state machine, controller, webview bridge, export) is platform neutral;
//! the Tauri application shell is enabled with the `desktop` feature.

pub mod capture;
#[cfg(feature = "desktop")]
pub mod commands;
pub mod config;
pub mod export;
pub mod recorder;
pub mod utils;

pub use config::ScreenSharingConfig;
pub use recorder::{ScreenSharing, ScreenSharingEvent, Snapshot};
pub use utils::error::{AppError, AppResult, ScreenSharingError};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the default filter. Calling this more
/// than once is harmless.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "screen_sharing_lib=debug,tauri=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// Initialize the application
#[cfg(feature = "desktop")]
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    init_tracing();

    tracing::info!("Starting Screen Sharing v{}", env!("CARGO_PKG_VERSION"));

    tauri::Builder::default()
        .invoke_handler(tauri::generate_handler![
            // Button commands
            commands::screen_sharing::start_capturing,
            commands::screen_sharing::stop_capturing,
            commands::screen_sharing::download_recording,
            commands::screen_sharing::get_screen_sharing_state,
            // Webview bridge commands
            commands::screen_sharing::capture_resolved,
            commands::screen_sharing::recorder_started,
            commands::screen_sharing::recorder_data,
            commands::screen_sharing::recorder_stopped,
            commands::screen_sharing::capture_inactive,
        ])
        .setup(|app| {
            use tauri::Manager;

            let state = desktop::build_state(app.handle())?;
            app.manage(state);
            Ok(())
        })
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}

#[cfg(feature = "desktop")]
mod desktop {
    use crate::capture::{BridgeEmitter, BridgeRequest, WebviewBridge, BRIDGE_EVENT};
    use crate::commands::screen_sharing::ScreenSharingState;
    use crate::config::{ScreenSharingConfig, CONFIG_FILE_NAME};
    use crate::export::{DirectoryDownloader, FileArtifactStore};
    use crate::recorder::{Platform, ScreenSharing, STATE_EVENT};
    use anyhow::Context;
    use std::sync::Arc;
    use tauri::{AppHandle, Emitter, Manager};

    /// Load the config, writing the defaults on first run so they can be edited
    fn load_config(app: &AppHandle) -> anyhow::Result<ScreenSharingConfig> {
        let path = app
            .path()
            .app_config_dir()
            .context("no app config directory")?
            .join(CONFIG_FILE_NAME);
        let first_run = !path.exists();
        let config = ScreenSharingConfig::load(&path)
            .context("failed to load screen sharing config")?;

        if first_run {
            match config.save(&path) {
                Ok(()) => tracing::info!("Wrote default config to {:?}", path),
                Err(e) => tracing::warn!("Could not write default config to {:?}: {}", path, e),
            }
        }
        Ok(config)
    }

    pub fn build_state(app: &AppHandle) -> anyhow::Result<ScreenSharingState> {
        let config = load_config(app).unwrap_or_else(|e| {
            tracing::error!("{:#}, using defaults", e);
            ScreenSharingConfig::default()
        });

        let handle = app.clone();
        let emitter: BridgeEmitter = Arc::new(move |request: BridgeRequest| {
            handle
                .emit(BRIDGE_EVENT, &request)
                .map_err(|e| e.to_string())
        });
        let bridge = WebviewBridge::new(emitter, config.stop_timeout());

        let store = Arc::new(FileArtifactStore::new().context("failed to create artifact store")?);
        let download_dir = config.resolve_download_dir();
        tracing::info!("Recordings will be saved to {:?}", download_dir);

        let platform = Platform {
            display_media: Arc::new(bridge.clone()),
            recorders: Arc::new(bridge.clone()),
            artifacts: store.clone(),
            downloads: Arc::new(DirectoryDownloader::new(store, download_dir)),
        };

        let sharing = tauri::async_runtime::block_on(async move {
            let sharing = ScreenSharing::spawn(platform, config);
            forward_events(app.clone(), &sharing);
            sharing
        });

        Ok(ScreenSharingState { sharing, bridge })
    }

    /// Relay controller events to the frontend
    fn forward_events(app: AppHandle, sharing: &ScreenSharing) {
        let mut events = sharing.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if let Err(e) = app.emit(STATE_EVENT, &event) {
                            tracing::warn!("Failed to emit screen sharing event: {}", e);
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("Dropped {} screen sharing events", skipped);
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }
}
