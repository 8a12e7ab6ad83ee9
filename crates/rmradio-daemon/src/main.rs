mod core;
mod http;
mod mpv;
mod socket;

use rmradio_core::config::Config;
use rmradio_core::protocol::StationEvent;
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// A tracing layer that forwards WARN/ERROR lines to connected clients.
struct BroadcastLayer {
    sender: broadcast::Sender<String>,
}

impl BroadcastLayer {
    fn new(sender: broadcast::Sender<String>) -> Self {
        Self { sender }
    }
}

impl<S> tracing_subscriber::Layer<S> for BroadcastLayer
where
    S: tracing::Subscriber,
{
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        // Only WARN and ERROR, to keep client traffic down
        let level = event.metadata().level();
        if !matches!(*level, tracing::Level::WARN | tracing::Level::ERROR) {
            return;
        }

        let mut message = format!("{} [{}] ", chrono::Local::now().format("%H:%M:%S"), level);
        let mut visitor = MessageVisitor(&mut message);
        event.record(&mut visitor);

        // No receivers is OK
        let _ = self.sender.send(message);
    }
}

struct MessageVisitor<'a>(&'a mut String);

impl<'a> tracing::field::Visit for MessageVisitor<'a> {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0.push_str(&format!("{:?}", value));
        } else {
            self.0.push_str(&format!(" {}={:?}", field.name(), value));
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Channels first so the log layer can forward into one of them
    let (log_tx, _) = broadcast::channel::<String>(100);
    let (station_tx, _) = broadcast::channel::<StationEvent>(256);

    let data_dir = rmradio_core::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("daemon.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(BroadcastLayer::new(log_tx.clone()))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,rmradio_daemon=debug,rmradio_core=debug")
            }),
        )
        .init();

    info!("Log file: {:?}", log_path);

    let config = Config::load()?;
    info!("Config loaded from: {:?}", Config::config_path());

    if let Some(parent) = config.daemon.pid_file.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&config.daemon.pid_file, std::process::id().to_string())?;

    // Event channel: all external inputs funnel into StationCore
    let (core_tx, core_rx) = tokio::sync::mpsc::channel::<core::CoreEvent>(256);

    let station = core::StationCore::new(&config, station_tx.clone(), core_tx.clone()).await?;
    let _signal_handle = core::spawn_signal_watcher(core_tx.clone());
    let snapshot = station.snapshot();

    let _socket_handle = socket::start_server(
        config.http.bind_address.clone(),
        rmradio_core::platform::DAEMON_TCP_PORT,
        socket::SocketContext {
            snapshot: snapshot.clone(),
            core_tx: core_tx.clone(),
            station_tx: station_tx.clone(),
            log_tx: log_tx.clone(),
        },
    );

    if config.http.enabled {
        let _http_handle = http::start_server(
            config.http.bind_address.clone(),
            config.http.port,
            snapshot.clone(),
            core_tx.clone(),
        );
    }

    info!("Daemon initialised, running event loop");
    let result = station.run(core_rx).await;

    let _ = std::fs::remove_file(&config.daemon.pid_file);
    info!("Daemon stopped");
    result
}
