//! Main application logic and lifecycle management.
//!
//! This module contains the `Application` struct that wires the links, the
//! state store and both subsystems together, monitors link health and tears
//! everything down in order on shutdown.

use crate::{
    cli::CliArgs,
    config::{AppConfig, StorageBackend},
    logging::display_banner,
    roster::spawn_roster_sync,
    signals::watch_signals,
    state::StateStore,
};
use futures::future::join_all;
use plugin_kits::KitsPlugin;
use plugin_zones::ZoneLifecycle;
use rcon_link::{ConnectionManager, RconNotifier};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use warden_event_system::{
    Clock, CommandSender, Dispatcher, EventHandler, FeedPublisher, NotificationSink,
    ShutdownState, SystemClock,
};

/// Capacity of the feed broadcast channel.
const FEED_CAPACITY: usize = 256;

/// Main application struct.
///
/// Owns the validated configuration; everything else is built in [`run`].
///
/// [`run`]: Application::run
pub struct Application {
    /// Loaded application configuration
    config: AppConfig,
}

impl Application {
    /// Loads configuration, applies CLI overrides and validates the result.
    ///
    /// # Process
    ///
    /// 1. Load configuration from file (a default one is written if missing)
    /// 2. Apply CLI overrides
    /// 3. Validate configuration
    /// 4. Display the startup banner
    ///
    /// # Errors
    ///
    /// Returns an error when the configuration file cannot be read, written
    /// or parsed, or when the merged configuration fails validation.
    pub async fn new(args: CliArgs) -> Result<Self, Box<dyn std::error::Error>> {
        let mut config = AppConfig::load_from_file(&args.config_path).await?;
        apply_overrides(&mut config, &args);

        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {e}").into());
        }
        info!("✅ Configuration loaded and validated successfully");

        display_banner();
        info!("📂 Config: {}", args.config_path.display());

        Ok(Self { config })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Runs until a termination signal arrives, then shuts down gracefully.
    ///
    /// # Errors
    ///
    /// Fails before any link is opened when the state store cannot be opened
    /// or seeded. Failures during shutdown are logged instead.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        info!("🌟 Starting Warden");
        self.log_configuration_summary();

        let config = self.config;

        // State first: rewards and allow-lists must exist before any claim.
        let store = StateStore::open(&config.storage).await?;
        store.seed(&config.servers).await?;
        let storage = store.storage();

        let manager = Arc::new(ConnectionManager::new(config.link.to_link_config()));
        for server in &config.servers {
            manager.add_server(server.to_remote()).await;
        }
        let commands: Arc<dyn CommandSender> = manager.clone();

        let feed = FeedPublisher::new(FEED_CAPACITY);
        let notifier: Arc<dyn NotificationSink> = Arc::new(
            RconNotifier::new(commands.clone(), feed)
                .with_player_template(config.notifications.player_template.clone()),
        );
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let kits = Arc::new(KitsPlugin::new(
            storage.clone(),
            commands.clone(),
            notifier.clone(),
            clock.clone(),
        ));
        let zones = ZoneLifecycle::new(
            storage,
            commands.clone(),
            notifier,
            clock,
            plugin_zones::ZoneConfig::default(),
        );
        for server in &config.servers {
            zones.configure_server(server.server_id(), server.zones.to_zone_config());
        }

        for server in &config.servers {
            let id = server.server_id();
            match zones.rehydrate(&id).await {
                Ok(live) => info!("🏕️ Restored {} zone(s) on {}", live, id),
                Err(e) => error!("❌ Failed to restore zones of {}: {}", id, e),
            }
        }

        let handlers: Vec<Arc<dyn EventHandler>> = vec![
            kits as Arc<dyn EventHandler>,
            Arc::new(zones.clone()) as Arc<dyn EventHandler>,
        ];
        let mut dispatchers = Vec::new();
        let mut roster_tasks = Vec::new();
        for server in &config.servers {
            let id = server.server_id();
            match manager.events(&id).await {
                Some(stream) => dispatchers.push(Dispatcher::spawn(stream, handlers.clone())),
                None => warn!("⚠️ No event stream for {}", id),
            }
            if let Some(state) = manager.watch_state(&id).await {
                roster_tasks.push(spawn_roster_sync(
                    commands.clone(),
                    zones.clone(),
                    id,
                    state,
                ));
            }
        }

        let shutdown_state = ShutdownState::new();
        let _signals = watch_signals(shutdown_state.clone());
        let monitor = spawn_health_monitor(
            manager.clone(),
            Duration::from_secs(config.link.health_interval_secs),
            shutdown_state.clone(),
        );

        info!("✅ Warden is now running with {} server(s)", config.servers.len());
        info!("🛑 Press Ctrl+C to gracefully shutdown");

        shutdown_state.wait().await;
        info!("🛑 Shutdown signal received, beginning graceful shutdown...");

        info!("📡 Phase 1: Stopping event processing...");
        for task in &roster_tasks {
            task.abort();
        }
        for dispatcher in &dispatchers {
            dispatcher.abort();
        }
        if let Err(e) = monitor.await {
            error!("❌ Health monitor failed: {}", e);
        }
        // Aborted tasks resolve with a cancellation error; only a panic is news.
        for result in join_all(roster_tasks).await {
            if let Err(e) = result {
                if e.is_panic() {
                    error!("❌ Roster sync task panicked: {}", e);
                }
            }
        }

        info!("🏕️ Phase 2: Cancelling zone timers...");
        zones.shutdown().await;

        info!("🔌 Phase 3: Closing links...");
        manager.shutdown().await;

        info!("💾 Phase 4: Flushing state...");
        if let Err(e) = store.flush().await {
            error!("❌ Final state flush failed: {}", e);
        }

        shutdown_state.complete_shutdown();
        info!("✅ Warden shutdown complete");
        Ok(())
    }

    /// Logs the configuration summary at startup.
    fn log_configuration_summary(&self) {
        info!("📋 Configuration Summary:");
        match self.config.storage.backend {
            StorageBackend::Memory => info!("  💾 State: in memory"),
            StorageBackend::File => info!("  💾 State: {}", self.config.storage.path),
        }
        info!(
            "  ⏱️ Command timeout: {}s | Reconnect backoff: {}ms..{}s",
            self.config.link.command_timeout_secs,
            self.config.link.backoff_initial_ms,
            self.config.link.backoff_max_secs
        );
        for server in &self.config.servers {
            info!(
                "  🖥️ {} at {}:{} - {} reward(s), zones red after {}s",
                server.server_id(),
                server.host,
                server.port,
                server.rewards.len(),
                server.zones.offline_delay_secs
            );
        }
    }
}

/// Applies command-line overrides on top of the file configuration.
pub fn apply_overrides(config: &mut AppConfig, args: &CliArgs) {
    if let Some(log_level) = &args.log_level {
        config.logging.level = log_level.clone();
    }
    if args.json_logs {
        config.logging.json_format = true;
    }
    if let Some(state_path) = &args.state_path {
        config.storage.backend = StorageBackend::File;
        config.storage.path = state_path.to_string_lossy().to_string();
    }
}

/// Logs a link health summary every `every`, naming links that are down.
/// Stops once shutdown is initiated.
fn spawn_health_monitor(
    manager: Arc<ConnectionManager>,
    every: Duration,
    shutdown: ShutdownState,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // The first tick completes immediately.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                _ = interval.tick() => {}
            }
            let health = manager.health().await;
            info!("📊 Link Health - {}", health.summary());
            for link in health.down() {
                warn!("🔌 {} ({}) is {}", link.server, link.address, link.state);
            }
        }
        debug!("📊 Health monitor stopped");
    })
}
