//! The client engine: one shared UDP endpoint plus the send, receive, log
//! and counter tasks that move packets between the operator and the wire.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::modifier::Modifier;
use crate::options::{DhcpOption, MessageType, OptionCode};
use crate::optspec;
use crate::packet::{BOOTREPLY, DhcpPacket};
use crate::response::{Event, PacketResponse};
use crate::table::TransactionTable;

const DHCP_SERVER_PORT: u16 = 67;
const DHCP_CLIENT_PORT: u16 = 68;
const RECV_BUFFER_SIZE: usize = 8192;
const COUNTER_REPORT_INTERVAL: Duration = Duration::from_secs(5);

/// An entry on the message queue: either a decoded packet or an error the
/// log task should surface.
#[derive(Debug)]
pub enum LogEntry {
    Packet(DhcpPacket),
    Error(Error),
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Packet(packet) => write!(f, "{}", packet),
            Self::Error(error) => write!(f, "{}", error),
        }
    }
}

/// State shared by the worker tasks.
struct EngineShared {
    socket: Arc<UdpSocket>,
    destination: SocketAddrV4,
    table: TransactionTable,
    send_tx: mpsc::Sender<DhcpPacket>,
    message_tx: mpsc::Sender<LogEntry>,
    request_tx: Option<mpsc::Sender<u64>>,
    response_tx: Option<mpsc::Sender<u64>>,
    /// Options appended to auto-generated REQUESTs.
    request_options: Vec<DhcpOption>,
    auto_request: bool,
    log_verbose: bool,
    phase_timeout: Duration,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl EngineShared {
    fn enqueue_log(&self, entry: LogEntry) {
        if self.message_tx.try_send(entry).is_err() {
            debug!("message queue full, dropping log entry");
        }
    }

    fn report(&self, error: Error) {
        self.enqueue_log(LogEntry::Error(error));
    }

    async fn signal(&self, counter: &Option<mpsc::Sender<u64>>) {
        if let Some(tx) = counter {
            let _ = tx.send(1).await;
        }
    }

    /// The send half of the pipeline: correlate, dispatch the dequeue
    /// event, encode and write.
    async fn transmit(&self, packet: DhcpPacket) {
        let Some(response) = self.table.get(packet.xid) else {
            self.report(Error::UnknownXid(packet.xid));
            return;
        };

        match packet.message_type() {
            MessageType::Discover => response.dispatch(Event::DiscoverDequeue(packet.clone())),
            MessageType::Request => response.dispatch(Event::RequestDequeue(packet.clone())),
            _ => {}
        }

        if self.log_verbose {
            self.enqueue_log(LogEntry::Packet(packet.clone()));
        }

        let encoded = match packet.encode() {
            Ok(bytes) => bytes,
            Err(error) => {
                self.report(error);
                return;
            }
        };

        let destination = SocketAddr::V4(self.destination);
        match timeout(self.write_timeout, self.socket.send_to(&encoded, destination)).await {
            Ok(Ok(_)) => self.signal(&self.request_tx).await,
            Ok(Err(error)) => self.report(Error::Io(error)),
            Err(_) => self.report(Error::Socket("write deadline exceeded".to_string())),
        }
    }

    /// The receive half: decode, correlate, dispatch the reply event and
    /// optionally loop an auto-generated REQUEST back into the send queue.
    async fn handle_datagram(&self, data: &[u8]) {
        // Undecodable datagrams are dropped without logging the raw bytes.
        let Ok(packet) = DhcpPacket::parse(data) else {
            return;
        };
        if packet.op != BOOTREPLY {
            return;
        }
        let Some(response) = self.table.get(packet.xid) else {
            return;
        };

        self.signal(&self.response_tx).await;

        if self.log_verbose {
            self.enqueue_log(LogEntry::Packet(packet.clone()));
        }

        match packet.message_type() {
            MessageType::Offer => {
                response.dispatch(Event::ReceivedOffer(packet.clone()));
                if self.auto_request {
                    let request = DhcpPacket::request_from_offer(&packet, &self.request_options);
                    if self.send_tx.send(request).await.is_err() {
                        debug!("send queue closed, dropping auto-generated request");
                    }
                }
            }
            MessageType::Ack => response.dispatch(Event::ReceivedAck(packet)),
            MessageType::Nak => response.dispatch(Event::ReceivedNak(packet)),
            _ => {}
        }
    }
}

struct EngineRuntime {
    shared: Arc<EngineShared>,
    stop_tx: broadcast::Sender<()>,
    /// Socket-facing tasks, stopped by signal.
    io_handles: Vec<JoinHandle<()>>,
    /// Queue-draining tasks, stopped by closing their channels.
    drain_handles: Vec<JoinHandle<()>>,
}

/// An interactive DHCPv4 client and load generator over one shared UDP
/// endpoint.
pub struct DhcpClient {
    config: Arc<Config>,
    socket: Mutex<Option<Arc<UdpSocket>>>,
    runtime: Mutex<Option<EngineRuntime>>,
    counters_rx: Mutex<Option<watch::Receiver<(u64, u64)>>>,
}

impl DhcpClient {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            socket: Mutex::new(None),
            runtime: Mutex::new(None),
            counters_rx: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Binds the shared UDP endpoint to `(bind_ip, 68)`.
    pub fn open(&self) -> Result<()> {
        let mut slot = self.socket.lock().unwrap();
        if slot.is_some() {
            return Err(Error::Socket("socket is already open".to_string()));
        }
        let socket = create_socket(self.config.bind_ip)?;
        info!("dhcp client listening on {}:{}", self.config.bind_ip, DHCP_CLIENT_PORT);
        *slot = Some(Arc::new(socket));
        Ok(())
    }

    /// Releases the UDP endpoint. The engine must be stopped first.
    pub fn close(&self) {
        *self.socket.lock().unwrap() = None;
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        let slot = self.socket.lock().unwrap();
        let socket = slot
            .as_ref()
            .ok_or_else(|| Error::Socket("socket is not open".to_string()))?;
        Ok(socket.local_addr()?)
    }

    /// Launches the worker tasks. `buffer_size` bounds every engine queue;
    /// `auto_request` turns received OFFERs into REQUESTs; `log_verbose`
    /// logs each packet instead of running the counter task.
    pub fn start(&self, buffer_size: usize, auto_request: bool, log_verbose: bool) -> Result<()> {
        let socket = self
            .socket
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| Error::Socket("socket is not open".to_string()))?;
        let destination = SocketAddrV4::new(Ipv4Addr::BROADCAST, DHCP_SERVER_PORT);
        self.start_with(socket, destination, buffer_size, auto_request, log_verbose)
    }

    fn start_with(
        &self,
        socket: Arc<UdpSocket>,
        destination: SocketAddrV4,
        buffer_size: usize,
        auto_request: bool,
        log_verbose: bool,
    ) -> Result<()> {
        let mut runtime = self.runtime.lock().unwrap();
        if runtime.is_some() {
            return Err(Error::Socket("engine is already started".to_string()));
        }

        let mut request_options = optspec::parse_specs(&self.config.option_specs)?;
        if !self.config.params_request.is_empty() {
            request_options.push(DhcpOption::new(
                OptionCode::ParameterRequestList as u8,
                self.config.params_request.clone(),
            ));
        }

        let (send_tx, send_rx) = mpsc::channel(buffer_size);
        let (message_tx, message_rx) = mpsc::channel(buffer_size);
        let (counters_tx, counters_rx) = watch::channel((0u64, 0u64));

        let mut counter_channels = None;
        let (request_tx, response_tx) = if log_verbose {
            (None, None)
        } else {
            let (request_tx, request_rx) = mpsc::channel(buffer_size);
            let (response_tx, response_rx) = mpsc::channel(buffer_size);
            counter_channels = Some((request_rx, response_rx));
            (Some(request_tx), Some(response_tx))
        };

        let shared = Arc::new(EngineShared {
            socket,
            destination,
            table: TransactionTable::new(),
            send_tx,
            message_tx,
            request_tx,
            response_tx,
            request_options,
            auto_request,
            log_verbose,
            phase_timeout: self.config.phase_timeout(),
            read_timeout: self.config.read_timeout(),
            write_timeout: self.config.write_timeout(),
        });

        let (stop_tx, _) = broadcast::channel(1);

        let io_handles = vec![
            tokio::spawn(send_loop(
                Arc::clone(&shared),
                send_rx,
                stop_tx.subscribe(),
            )),
            tokio::spawn(receive_loop(Arc::clone(&shared), stop_tx.subscribe())),
        ];

        let mut drain_handles = vec![tokio::spawn(log_loop(message_rx))];
        if let Some((request_rx, response_rx)) = counter_channels {
            drain_handles.push(tokio::spawn(counter_loop(
                request_rx,
                response_rx,
                counters_tx,
            )));
        }

        *self.counters_rx.lock().unwrap() = Some(counters_rx);
        *runtime = Some(EngineRuntime {
            shared,
            stop_tx,
            io_handles,
            drain_handles,
        });

        Ok(())
    }

    /// Registers an observer for the packet's transaction and enqueues the
    /// packet for the send task. Modifiers run before registration, so a
    /// `with_transaction_id` modifier decides the table key.
    pub async fn send(
        &self,
        mut packet: DhcpPacket,
        modifiers: Vec<Modifier>,
    ) -> Result<Arc<PacketResponse>> {
        for modifier in &modifiers {
            modifier(&mut packet);
        }

        let (shared, send_tx) = {
            let runtime = self.runtime.lock().unwrap();
            let runtime = runtime
                .as_ref()
                .ok_or_else(|| Error::Socket("engine is not started".to_string()))?;
            (Arc::clone(&runtime.shared), runtime.shared.send_tx.clone())
        };

        let response = Arc::new(PacketResponse::new(shared.phase_timeout));
        shared.table.insert(packet.xid, Arc::clone(&response));

        send_tx
            .send(packet)
            .await
            .map_err(|_| Error::Socket("send queue is closed".to_string()))?;

        Ok(response)
    }

    /// The latest (requests, responses) totals published by the counter
    /// task. Returns zeros while verbose logging has the counter task
    /// disabled.
    pub fn counters(&self) -> (u64, u64) {
        self.counters_rx
            .lock()
            .unwrap()
            .as_ref()
            .map(|rx| *rx.borrow())
            .unwrap_or_default()
    }

    /// Stops the worker tasks: the socket-facing tasks get the stop signal
    /// and are joined first, then the queues close and the draining tasks
    /// run dry. Nothing sends on a closed queue after this returns.
    pub async fn stop(&self) {
        let Some(runtime) = self.runtime.lock().unwrap().take() else {
            return;
        };
        let EngineRuntime {
            shared,
            stop_tx,
            io_handles,
            drain_handles,
        } = runtime;

        let _ = stop_tx.send(());
        for handle in io_handles {
            let _ = handle.await;
        }

        drop(shared);
        for handle in drain_handles {
            let _ = handle.await;
        }
        debug!("dhcp client engine stopped");
    }
}

fn create_socket(bind_ip: Ipv4Addr) -> Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(|error| Error::Socket(format!("failed to create socket: {}", error)))?;

    socket
        .set_reuse_address(true)
        .map_err(|error| Error::Socket(format!("failed to set SO_REUSEADDR: {}", error)))?;

    #[cfg(unix)]
    socket
        .set_reuse_port(true)
        .map_err(|error| Error::Socket(format!("failed to set SO_REUSEPORT: {}", error)))?;

    socket
        .set_broadcast(true)
        .map_err(|error| Error::Socket(format!("failed to set SO_BROADCAST: {}", error)))?;

    socket
        .set_nonblocking(true)
        .map_err(|error| Error::Socket(format!("failed to set non-blocking: {}", error)))?;

    let bind_addr = SocketAddrV4::new(bind_ip, DHCP_CLIENT_PORT);
    socket
        .bind(&bind_addr.into())
        .map_err(|error| Error::Socket(format!("failed to bind to {}: {}", bind_addr, error)))?;

    let std_socket: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_socket)
        .map_err(|error| Error::Socket(format!("failed to convert to tokio socket: {}", error)))
}

async fn send_loop(
    shared: Arc<EngineShared>,
    mut send_rx: mpsc::Receiver<DhcpPacket>,
    mut stop_rx: broadcast::Receiver<()>,
) {
    debug!("send task started");
    loop {
        tokio::select! {
            _ = stop_rx.recv() => break,
            packet = send_rx.recv() => {
                let Some(packet) = packet else { break };
                shared.transmit(packet).await;
            }
        }
    }
    debug!("send task stopped");
}

async fn receive_loop(shared: Arc<EngineShared>, mut stop_rx: broadcast::Receiver<()>) {
    debug!("receive task started");
    let mut buffer = vec![0u8; RECV_BUFFER_SIZE];
    loop {
        tokio::select! {
            _ = stop_rx.recv() => break,
            result = timeout(shared.read_timeout, shared.socket.recv_from(&mut buffer)) => {
                match result {
                    // Read deadline expired; loop back to check the stop signal.
                    Err(_) => {}
                    Ok(Err(error)) => shared.report(Error::Io(error)),
                    Ok(Ok((length, _source))) => shared.handle_datagram(&buffer[..length]).await,
                }
            }
        }
    }
    debug!("receive task stopped");
}

async fn log_loop(mut message_rx: mpsc::Receiver<LogEntry>) {
    debug!("log task started");
    while let Some(entry) = message_rx.recv().await {
        match entry {
            LogEntry::Packet(packet) => info!("\n{}", packet),
            LogEntry::Error(error) => warn!("{}", error),
        }
    }
    debug!("log task stopped");
}

async fn counter_loop(
    mut request_rx: mpsc::Receiver<u64>,
    mut response_rx: mpsc::Receiver<u64>,
    counters_tx: watch::Sender<(u64, u64)>,
) {
    debug!("counter task started");
    let mut requests = 0u64;
    let mut responses = 0u64;
    let mut report = interval(COUNTER_REPORT_INTERVAL);
    let mut requests_open = true;
    let mut responses_open = true;

    while requests_open || responses_open {
        tokio::select! {
            amount = request_rx.recv(), if requests_open => match amount {
                Some(amount) => requests += amount,
                None => requests_open = false,
            },
            amount = response_rx.recv(), if responses_open => match amount {
                Some(amount) => responses += amount,
                None => responses_open = false,
            },
            _ = report.tick() => {
                let _ = counters_tx.send((requests, responses));
            }
        }
    }

    let _ = counters_tx.send((requests, responses));
    debug!("counter task stopped");
}
