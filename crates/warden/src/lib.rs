//! # Warden - Main Entry Point
//!
//! Supervises many game servers over WebRCON on behalf of many tenants. Chat
//! emotes become cooldown-gated reward claims, and team presence drives the
//! color and eventual deletion of each team's zone. This entry point handles
//! CLI parsing, configuration loading and the application lifecycle.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run with default configuration
//! warden
//!
//! # Specify custom configuration
//! warden --config production.toml
//!
//! # Keep state in a specific file, debug logging
//! warden --state /var/lib/warden/state.json --log-level debug
//!
//! # JSON logging for production
//! warden --json-logs
//! ```
//!
//! ## Configuration
//!
//! The configuration is loaded from a TOML file (default: `warden.toml`).
//! If the file doesn't exist, a default configuration will be created.
//!
//! ## Signal Handling
//!
//! Warden shuts down gracefully on SIGINT (Ctrl+C) and SIGTERM: event
//! processing stops, zone timers are cancelled, links close and state is
//! flushed. A second signal exits immediately.

use tracing::error;

mod app;
mod cli;
mod config;
mod logging;
mod roster;
mod signals;
mod state;

use app::Application;
use cli::CliArgs;
use config::AppConfig;

/// Runs Warden until shutdown.
///
/// # Exit Codes
///
/// * **0**: Successful execution and shutdown
/// * **1**: Error during startup, configuration, or runtime
///
/// Called from `main` inside the Tokio runtime.
pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Logging settings come from the file plus CLI overrides.
    let mut config = AppConfig::load_from_file(&args.config_path)
        .await
        .unwrap_or_default();
    app::apply_overrides(&mut config, &args);

    if let Err(e) = logging::setup_logging(&config.logging, args.json_logs) {
        eprintln!("❌ Failed to setup logging: {e}");
        std::process::exit(1);
    }

    match Application::new(args).await {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("❌ Application error: {:?}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("❌ Failed to start application: {e:?}");
            std::process::exit(1);
        }
    }

    Ok(())
}

// Re-export main types for potential library usage
pub use config::{
    LinkSettings, LoggingSettings, NotificationSettings, ServerSettings, StorageBackend,
    StorageSettings, ZoneSettings,
};
pub use roster::parse_player_list;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_runnable() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());

        let server = &config.servers[0];
        let remote = server.to_remote();
        assert_eq!(remote.url(), "ws://127.0.0.1:28016/change-me");
        assert_eq!(server.zones.to_zone_config(), plugin_zones::ZoneConfig::default());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();

        config.servers.push(config.servers[0].clone());
        assert!(config.validate().is_err(), "duplicate server");

        config.servers.truncate(1);
        config.servers[0].rewards[0].key = "bad:key".to_string();
        assert!(config.validate().is_err(), "emote key with a colon");

        config.servers[0].rewards[0].key = "FREEkit1".to_string();
        config.logging.level = "invalid".to_string();
        assert!(config.validate().is_err(), "log level");
    }
}
