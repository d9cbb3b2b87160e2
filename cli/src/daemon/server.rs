use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use voltlink_platform::{
    BackendFactory, Battery, HardwarePort, PortArbiter, PortClaim, ProviderKind, ReadingFeed,
    SettingsSource, TaskScheduler,
};
use voltlink_protocol::{
    DaemonRequest, DaemonResponse, DaemonStatus, PortOwner, ReconfigureResult, StatsSnapshot,
    MAX_SUBSCRIBERS,
};

use crate::config::{config_path, runtime_dir, SharedConfig, UserConfig};
use crate::daemon::publisher::{reading_from_payload, stats_snapshot, BroadcastPublisher};
use crate::daemon::socket_path;

/// Owner recorded for UARTs listed in `reserved_uarts`.
const RESERVED_OWNER: &str = "reserved";

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Already running")]
    AlreadyRunning,

    #[error("Failed to daemonize: {0}")]
    Daemonize(String),
}

pub type Result<T> = std::result::Result<T, DaemonError>;

type ClientId = u64;

enum ClientMessage {
    Request { request: DaemonRequest },
    Disconnect,
}

struct ClientHandle {
    response_tx: mpsc::Sender<DaemonResponse>,
    is_subscriber: bool,
}

struct DaemonState {
    config: SharedConfig,
    config_file: PathBuf,
    battery: Arc<Battery>,
    feed: ReadingFeed,
    scheduler: TaskScheduler,
    _reserved: Vec<PortClaim>,
    start_time: Instant,
}

impl DaemonState {
    /// Build the battery stack and start polling. Must run inside the runtime.
    fn new(config_file: PathBuf, publisher: Arc<BroadcastPublisher>) -> Self {
        let user_config = UserConfig::load_from(&config_file);
        let config = SharedConfig::new(user_config.clone());

        let arbiter = PortArbiter::new();
        let reserved = reserve_ports(&arbiter, &user_config.reserved_uarts);

        let feed = ReadingFeed::new();
        let battery = Battery::new(
            Arc::new(config.clone()),
            Box::new(BackendFactory::new(feed.clone())),
            arbiter,
            publisher,
        );

        let scheduler = TaskScheduler::current();
        if let Err(e) = battery.initialize(&scheduler, user_config.poll_interval()) {
            warn!(error = %e, "Battery not started, waiting for reconfigure");
        }

        Self {
            config,
            config_file,
            battery,
            feed,
            scheduler,
            _reserved: reserved,
            start_time: Instant::now(),
        }
    }

    fn get_status(&self, subscriber_count: usize) -> DaemonStatus {
        let status = self.battery.status();
        let arbiter = self.battery.arbiter();
        let claimed_ports = arbiter
            .claimed_ports()
            .into_iter()
            .filter_map(|port| {
                arbiter.owner(port).map(|owner| PortOwner {
                    port: port.index(),
                    owner: owner.to_string(),
                })
            })
            .collect();

        DaemonStatus {
            running: true,
            uptime_secs: self.start_time.elapsed().as_secs(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            subscriber_count,
            battery_enabled: self.config.battery_settings().enabled,
            provider: status.provider.map(|kind| kind.label().to_string()),
            hardware_port: status.port.map(|port| port.index()),
            claimed_ports,
            last_error: status.last_error,
            ..DaemonStatus::default()
        }
    }

    fn create_snapshot(&self) -> StatsSnapshot {
        stats_snapshot(&self.battery.stats())
    }

    fn reconfigure(&self) -> ReconfigureResult {
        self.config.reload_from(&self.config_file);
        match self.battery.reconfigure() {
            Ok(kind) => {
                info!(provider = ?kind, "Reconfigured battery");
                ReconfigureResult {
                    provider: kind.map(|kind| kind.label().to_string()),
                    error: None,
                }
            }
            Err(e) => ReconfigureResult {
                provider: None,
                error: Some(e.to_string()),
            },
        }
    }

    fn handle_request(&self, request: DaemonRequest, subscriber_count: usize) -> DaemonResponse {
        match request {
            DaemonRequest::GetStatus => DaemonResponse::Status(self.get_status(subscriber_count)),
            DaemonRequest::GetStats => DaemonResponse::Stats(self.create_snapshot()),
            DaemonRequest::Reconfigure => DaemonResponse::Reconfigured(self.reconfigure()),
            DaemonRequest::PushReading(payload) => {
                // Only the networked backend takes readings from socket clients.
                match self.battery.status().provider {
                    Some(ProviderKind::Networked) => {
                        self.feed.push(reading_from_payload(payload));
                        DaemonResponse::Ok
                    }
                    Some(kind) => DaemonResponse::Error(format!(
                        "{} does not accept pushed readings",
                        kind
                    )),
                    None => DaemonResponse::Error("No battery provider is active".to_string()),
                }
            }
            DaemonRequest::Shutdown => DaemonResponse::Ok,
            DaemonRequest::Subscribe | DaemonRequest::Unsubscribe => {
                DaemonResponse::Error("Handled separately".to_string())
            }
        }
    }

    fn shutdown(&self) {
        self.scheduler.shutdown();
        self.battery.shutdown();
    }
}

fn reserve_ports(arbiter: &Arc<PortArbiter>, ports: &[u8]) -> Vec<PortClaim> {
    ports
        .iter()
        .filter_map(|&port| {
            let claim = arbiter.claim(HardwarePort(port), RESERVED_OWNER);
            match &claim {
                Some(_) => debug!(port, "Reserved hardware port"),
                None => warn!(port, "Hardware port listed twice in reserved_uarts"),
            }
            claim
        })
        .collect()
}

async fn client_reader_task(
    mut reader: BufReader<tokio::net::unix::OwnedReadHalf>,
    msg_tx: mpsc::Sender<(ClientId, ClientMessage)>,
    client_id: ClientId,
) {
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                let _ = msg_tx.send((client_id, ClientMessage::Disconnect)).await;
                break;
            }
            Ok(_) => match DaemonRequest::from_json(line.trim()) {
                Ok(request) => {
                    if msg_tx
                        .send((client_id, ClientMessage::Request { request }))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Err(e) => {
                    warn!(client_id, error = %e, "Invalid request from client");
                }
            },
            Err(e) => {
                debug!(client_id, error = %e, "Client read error");
                let _ = msg_tx.send((client_id, ClientMessage::Disconnect)).await;
                break;
            }
        }
    }
}

async fn client_writer_task(
    mut writer: tokio::net::unix::OwnedWriteHalf,
    mut response_rx: mpsc::Receiver<DaemonResponse>,
) {
    while let Some(response) = response_rx.recv().await {
        let json = match response.to_json() {
            Ok(j) => j,
            Err(_) => continue,
        };
        if writer
            .write_all(format!("{}\n", json).as_bytes())
            .await
            .is_err()
        {
            break;
        }
    }
}

pub fn run_daemon(
    foreground: bool,
    log_level: crate::config::LogLevel,
    log_level_override: Option<crate::config::LogLevel>,
) -> Result<()> {
    let socket = socket_path();

    if socket.exists() {
        if crate::daemon::is_daemon_running() {
            return Err(DaemonError::AlreadyRunning);
        }
        fs::remove_file(&socket)?;
    }

    fs::create_dir_all(runtime_dir())?;

    if !foreground {
        match daemonize::Daemonize::new()
            .working_directory(runtime_dir())
            .start()
        {
            Ok(_) => {}
            Err(e) => return Err(DaemonError::Daemonize(e.to_string())),
        }
        let _guard =
            crate::logging::init(log_level, crate::logging::LogMode::File, log_level_override);
        std::mem::forget(_guard);
    }

    info!(version = env!("CARGO_PKG_VERSION"), "Daemon starting");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let local = tokio::task::LocalSet::new();
    local.block_on(&runtime, run_daemon_async(socket, config_path()))
}

async fn run_daemon_async(socket: PathBuf, config_file: PathBuf) -> Result<()> {
    let listener = UnixListener::bind(&socket)?;
    info!(socket = ?socket, "Listening for connections");

    let publish_interval = UserConfig::load_from(&config_file).publish_interval();
    let publisher = Arc::new(BroadcastPublisher::new(publish_interval));
    let mut stats_rx = publisher.subscribe();
    let state = DaemonState::new(config_file, publisher);

    let (msg_tx, mut msg_rx) = mpsc::channel::<(ClientId, ClientMessage)>(256);
    let mut clients: HashMap<ClientId, ClientHandle> = HashMap::new();
    let mut next_client_id: ClientId = 1;
    let mut shutdown_requested = false;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Interrupted");
                break;
            }
            update = stats_rx.recv() => {
                match update {
                    Ok(snapshot) => {
                        let update = DaemonResponse::StatsUpdate(snapshot);

                        let mut disconnected = Vec::new();
                        for (id, client) in &clients {
                            if client.is_subscriber
                                && client.response_tx.send(update.clone()).await.is_err()
                            {
                                disconnected.push(*id);
                            }
                        }
                        for id in disconnected {
                            clients.remove(&id);
                            debug!(client_id = id, "Removed disconnected subscriber");
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Stats updates lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        error!("Stats publisher closed");
                        break;
                    }
                }
            }
            result = listener.accept() => {
                match result {
                    Ok((stream, _)) => {
                        let client_id = next_client_id;
                        next_client_id += 1;
                        debug!(client_id, "Client connected");

                        let (reader, writer) = stream.into_split();
                        let (response_tx, response_rx) = mpsc::channel::<DaemonResponse>(64);

                        clients.insert(client_id, ClientHandle {
                            response_tx,
                            is_subscriber: false,
                        });

                        tokio::task::spawn_local(client_reader_task(
                            BufReader::new(reader),
                            msg_tx.clone(),
                            client_id,
                        ));
                        tokio::task::spawn_local(client_writer_task(writer, response_rx));
                    }
                    Err(e) => {
                        error!(error = %e, "Socket accept error");
                    }
                }
            }
            Some((client_id, msg)) = msg_rx.recv() => {
                match msg {
                    ClientMessage::Disconnect => {
                        if clients.remove(&client_id).is_some() {
                            debug!(client_id, count = clients.len(), "Client disconnected");
                        }
                    }
                    ClientMessage::Request { request } => {
                        debug!(client_id, request = ?request, "Handling request");

                        let subscriber_count = clients.values().filter(|c| c.is_subscriber).count();
                        let response = match request {
                            DaemonRequest::Subscribe => {
                                if subscriber_count >= MAX_SUBSCRIBERS {
                                    DaemonResponse::SubscriptionRejected {
                                        reason: format!("Maximum subscribers ({}) reached", MAX_SUBSCRIBERS),
                                    }
                                } else if let Some(client) = clients.get_mut(&client_id) {
                                    client.is_subscriber = true;
                                    info!(client_id, count = subscriber_count + 1, "Subscriber added");
                                    DaemonResponse::Subscribed
                                } else {
                                    DaemonResponse::Error("Client not found".to_string())
                                }
                            }
                            DaemonRequest::Unsubscribe => {
                                if let Some(client) = clients.get_mut(&client_id) {
                                    if client.is_subscriber {
                                        client.is_subscriber = false;
                                        info!(client_id, count = subscriber_count - 1, "Subscriber removed");
                                    }
                                }
                                DaemonResponse::Unsubscribed
                            }
                            DaemonRequest::Shutdown => {
                                info!("Shutdown requested by client");
                                shutdown_requested = true;
                                DaemonResponse::Ok
                            }
                            request => state.handle_request(request, subscriber_count),
                        };

                        if let Some(client) = clients.get(&client_id) {
                            let _ = client.response_tx.send(response).await;
                        }

                        if shutdown_requested {
                            break;
                        }
                    }
                }
            }
        }
    }

    info!("Daemon shutting down");
    state.shutdown();
    fs::remove_file(&socket).ok();

    Ok(())
}
