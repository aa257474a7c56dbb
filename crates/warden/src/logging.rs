//! Logging setup and the startup banner.
//!
//! Output is either human-readable or one JSON object per line. `RUST_LOG`
//! takes precedence over the configured level.

use crate::config::LoggingSettings;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the global subscriber. `force_json` selects JSON output even
/// when the configuration does not.
///
/// # Errors
///
/// Fails when a global subscriber is already installed.
pub fn setup_logging(
    settings: &LoggingSettings,
    force_json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.level));
    let json = force_json || settings.json_format;

    // Exactly one of the two layers is present.
    let json_layer = json.then(|| {
        fmt::layer()
            .json()
            .with_current_span(false)
            .with_thread_names(true)
    });
    let text_layer = (!json).then(|| {
        fmt::layer()
            .with_target(true)
            .with_thread_names(true)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()?;

    info!(
        "🔧 Logging initialized at {} ({})",
        settings.level,
        if json { "json" } else { "text" }
    );
    Ok(())
}

pub fn display_banner() {
    let version = env!("CARGO_PKG_VERSION");
    info!("╔══════════════════════════════════════════╗");
    info!("║              🛡️  WARDEN 🛡️                ║");
    info!("║       WebRCON supervisor v{:<14} ║", version);
    info!("║                                          ║");
    info!("║  🎁 Emote reward claims                  ║");
    info!("║  🏕️  Presence-driven zone lifecycles      ║");
    info!("║  🔌 Many servers, many tenants           ║");
    info!("╚══════════════════════════════════════════╝");
}
