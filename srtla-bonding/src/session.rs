//! Bonding session orchestration
//!
//! A [`BondingSession`] owns the set of physical links, walks the SRTLA
//! connection state machine, fans acknowledgements out to every link, and
//! bridges the local SRT client onto the best-scoring link per packet.
//!
//! All mutable state lives on a single worker thread. The public handle
//! sends commands over a channel; the two read accessors block on a reply
//! channel so callers get a consistent snapshot. Commands that arrive after
//! teardown hit the idle-state guards and are dropped.

use crate::error::SessionError;
use crate::link::{LinkEvent, LinkKind, PhysicalLink};
use crate::listener::{ListenerEvent, LocalListener};
use crate::monitor::{InterfaceKind, NetworkInterface};
use crate::stats::{format_connection_statistics, BondingLinkStats};
use bytes::Bytes;
use crossbeam::channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use srtla_io::Deadline;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Worker poll tick
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Receives session lifecycle notifications
pub trait BondingSessionDelegate: Send + Sync {
    /// The local bridge is listening; point the SRT client at this port
    fn srtla_ready(&self, port: u16);
    /// The session failed and is back in the idle state
    fn srtla_error(&self, error: SessionError);
}

/// Connection state of the bonding session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    WaitForRemoteConnected,
    WaitForGroupId,
    WaitForRegistered,
    WaitForLocalListening,
    Running,
}

/// Priority of one named link; 0 or disabled takes the link out of rotation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionPriority {
    pub name: String,
    pub priority: i32,
    pub enabled: bool,
}

/// Per-link-name priority table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionPriorities {
    pub enabled: bool,
    pub priorities: Vec<ConnectionPriority>,
}

enum Command {
    Start { uri: String, timeout: Duration },
    Stop,
    NetworkPathUpdate(Vec<NetworkInterface>),
    SetConnectionPriorities(ConnectionPriorities),
    HandleLocalPacket(Bytes),
    ConnectionStatistics(Sender<Vec<BondingLinkStats>>),
    TotalByteCount(Sender<u64>),
    GetState(Sender<SessionState>),
    LogStatistics,
    Shutdown,
}

/// Handle to a bonding session running on its own worker thread
///
/// Dropping the handle shuts the worker down.
pub struct BondingSession {
    tx: Sender<Command>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl BondingSession {
    pub fn new(
        delegate: Arc<dyn BondingSessionDelegate>,
        passthrough: bool,
        priorities: ConnectionPriorities,
    ) -> Self {
        let (tx, rx) = unbounded();
        let core = SessionCore::new(delegate, passthrough, priorities);
        let worker = std::thread::spawn(move || run(core, rx));
        BondingSession {
            tx,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Start connecting to `srtla://host:port` (or `srt://host:port`)
    pub fn start(&self, uri: &str, timeout: Duration) {
        let _ = self.tx.send(Command::Start {
            uri: uri.to_string(),
            timeout,
        });
    }

    /// Tear down all links and return to the idle state
    pub fn stop(&self) {
        let _ = self.tx.send(Command::Stop);
    }

    /// Forward one outgoing datagram from the local SRT client
    pub fn handle_local_packet(&self, packet: Bytes) {
        let _ = self.tx.send(Command::HandleLocalPacket(packet));
    }

    /// Push the current set of available network interfaces
    pub fn update_network_path(&self, interfaces: Vec<NetworkInterface>) {
        let _ = self.tx.send(Command::NetworkPathUpdate(interfaces));
    }

    pub fn set_connection_priorities(&self, priorities: ConnectionPriorities) {
        let _ = self.tx.send(Command::SetConnectionPriorities(priorities));
    }

    /// Per-link byte-share breakdown since the previous call
    ///
    /// Blocks on a round-trip into the worker. Returns `None` while no link
    /// has reported traffic.
    pub fn connection_statistics(&self) -> Option<String> {
        let (reply_tx, reply_rx) = bounded(1);
        self.tx
            .send(Command::ConnectionStatistics(reply_tx))
            .ok()?;
        let stats = reply_rx.recv().ok()?;
        format_connection_statistics(&stats)
    }

    /// Total bytes moved through the session, both directions
    pub fn total_byte_count(&self) -> u64 {
        let (reply_tx, reply_rx) = bounded(1);
        if self.tx.send(Command::TotalByteCount(reply_tx)).is_err() {
            return 0;
        }
        reply_rx.recv().unwrap_or(0)
    }

    /// Current state of the connection state machine
    pub fn state(&self) -> SessionState {
        let (reply_tx, reply_rx) = bounded(1);
        if self.tx.send(Command::GetState(reply_tx)).is_err() {
            return SessionState::Idle;
        }
        reply_rx.recv().unwrap_or_default()
    }

    /// Log score/window/in-flight details for every link
    pub fn log_statistics(&self) {
        let _ = self.tx.send(Command::LogStatistics);
    }
}

impl Drop for BondingSession {
    fn drop(&mut self) {
        let _ = self.tx.send(Command::Shutdown);
        if let Some(worker) = self.worker.lock().take() {
            let _ = worker.join();
        }
    }
}

fn run(mut core: SessionCore, rx: Receiver<Command>) {
    loop {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(Command::Shutdown) => {
                core.stop_internal();
                return;
            }
            Ok(command) => core.handle_command(command),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                core.stop_internal();
                return;
            }
        }
        core.poll();
    }
}

struct SessionCore {
    delegate: Arc<dyn BondingSessionDelegate>,
    passthrough: bool,
    state: SessionState,
    links: Vec<PhysicalLink>,
    next_link_id: u64,
    listener: Option<LocalListener>,
    group_id: Option<Bytes>,
    remote: Option<SocketAddr>,
    total_byte_count: u64,
    connect_deadline: Deadline,
    priorities: Vec<ConnectionPriority>,
}

impl SessionCore {
    fn new(
        delegate: Arc<dyn BondingSessionDelegate>,
        passthrough: bool,
        priorities: ConnectionPriorities,
    ) -> Self {
        tracing::debug!("SRT instead of SRTLA: {}", passthrough);
        SessionCore {
            delegate,
            passthrough,
            state: SessionState::Idle,
            links: Vec::new(),
            next_link_id: 0,
            listener: None,
            group_id: None,
            remote: None,
            total_byte_count: 0,
            connect_deadline: Deadline::new(),
            priorities: normalize_priorities(&priorities),
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start { uri, timeout } => self.start(&uri, timeout),
            Command::Stop => self.stop_internal(),
            Command::NetworkPathUpdate(interfaces) => self.handle_network_path_update(interfaces),
            Command::SetConnectionPriorities(priorities) => {
                self.set_connection_priorities(priorities)
            }
            Command::HandleLocalPacket(packet) => self.handle_local_packet(&packet),
            Command::ConnectionStatistics(reply) => {
                let _ = reply.send(self.connection_statistics());
            }
            Command::TotalByteCount(reply) => {
                let _ = reply.send(self.total_byte_count);
            }
            Command::GetState(reply) => {
                let _ = reply.send(self.state);
            }
            Command::LogStatistics => {
                for link in &self.links {
                    link.log_statistics();
                }
            }
            Command::Shutdown => {}
        }
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            tracing::debug!("State {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    fn start(&mut self, uri: &str, timeout: Duration) {
        if self.state != SessionState::Idle {
            tracing::warn!("Ignoring start while not idle");
            return;
        }
        let Some(remote) = resolve_uri(uri) else {
            tracing::error!("Malformed URI {}", uri);
            return;
        };
        tracing::info!("Using destination address {}", remote);
        self.remote = Some(remote);
        self.total_byte_count = 0;

        let mut events = Vec::new();
        if self.passthrough {
            let link = self.make_link(LinkKind::PassThrough, None, remote);
            self.links.push(link);
        } else {
            let cellular = self.make_link(LinkKind::Cellular, None, remote);
            self.links.push(cellular);
            let wifi = self.make_link(LinkKind::WiFi, None, remote);
            self.links.push(wifi);
        }
        for link in &mut self.links {
            let mut link_events = Vec::new();
            link.start(&mut link_events);
            let id = link.id();
            events.extend(link_events.into_iter().map(|e| (id, e)));
        }
        tracing::debug!("Setting connect timer to {:?}", timeout);
        self.connect_deadline.arm(timeout);
        self.set_state(SessionState::WaitForRemoteConnected);
        self.process_link_events(events);
    }

    fn stop_internal(&mut self) {
        for link in &mut self.links {
            link.stop("Stopping stream");
        }
        self.links.clear();
        self.listener = None;
        self.connect_deadline.cancel();
        self.group_id = None;
        self.remote = None;
        self.total_byte_count = 0;
        self.set_state(SessionState::Idle);
    }

    fn on_disconnected(&mut self, error: SessionError) {
        if self.state == SessionState::Idle {
            return;
        }
        self.stop_internal();
        self.delegate.srtla_error(error);
    }

    fn make_link(
        &mut self,
        kind: LinkKind,
        interface: Option<NetworkInterface>,
        remote: SocketAddr,
    ) -> PhysicalLink {
        let id = self.next_link_id;
        self.next_link_id += 1;
        let priority = match kind {
            LinkKind::PassThrough => 1.0,
            _ => {
                let name = match (&kind, &interface) {
                    (LinkKind::Ethernet, Some(interface)) => interface.id.clone(),
                    (LinkKind::Ethernet, None) => "Ethernet".to_string(),
                    (LinkKind::Cellular, _) => "Cellular".to_string(),
                    _ => "WiFi".to_string(),
                };
                self.connection_priority(&name)
            }
        };
        PhysicalLink::new(id, kind, interface, remote, priority)
    }

    fn poll(&mut self) {
        if self.state == SessionState::Idle {
            return;
        }
        let now = Instant::now();

        let mut events = Vec::new();
        for link in &mut self.links {
            let mut link_events = Vec::new();
            link.poll(now, &mut link_events);
            let id = link.id();
            events.extend(link_events.into_iter().map(|e| (id, e)));
        }
        self.process_link_events(events);

        let mut listener_events = Vec::new();
        if let Some(listener) = &mut self.listener {
            listener.poll(&mut listener_events);
        }
        for event in listener_events {
            if self.state == SessionState::Idle {
                break;
            }
            self.handle_listener_event(event);
        }

        if self.connect_deadline.try_fire(now) {
            tracing::debug!("Connect timer expired");
            self.on_disconnected(SessionError::HandshakeTimeout);
        }
    }

    fn process_link_events(&mut self, events: Vec<(u64, LinkEvent)>) {
        for (link_id, event) in events {
            if self.state == SessionState::Idle {
                break;
            }
            self.handle_link_event(link_id, event);
        }
    }

    fn handle_link_event(&mut self, link_id: u64, event: LinkEvent) {
        match event {
            LinkEvent::SocketConnected => {
                if self.state != SessionState::WaitForRemoteConnected {
                    return;
                }
                if self.passthrough {
                    self.start_listener();
                } else {
                    if let Some(link) = self.link_mut(link_id) {
                        link.send_reg1();
                    }
                    self.set_state(SessionState::WaitForGroupId);
                }
            }
            LinkEvent::GroupIdReceived(group_id) => {
                if self.state != SessionState::WaitForGroupId {
                    return;
                }
                self.group_id = Some(group_id.clone());
                for link in &mut self.links {
                    link.register(group_id.clone());
                }
                self.set_state(SessionState::WaitForRegistered);
            }
            LinkEvent::Registered => {
                if self.state != SessionState::WaitForRegistered {
                    return;
                }
                self.start_listener();
            }
            LinkEvent::SrtPacket(packet) => {
                if let Some(listener) = &self.listener {
                    listener.send_packet(&packet);
                    self.total_byte_count += packet.len() as u64;
                }
            }
            LinkEvent::SrtAck(sn) => {
                for link in &mut self.links {
                    link.handle_srt_ack_sn(sn);
                }
            }
            LinkEvent::SrtNak(sn) => {
                for link in &mut self.links {
                    link.handle_srt_nak_sn(sn);
                }
            }
            LinkEvent::SrtlaAck(sn) => {
                for link in &mut self.links {
                    link.handle_srtla_ack_sn(sn);
                }
            }
            LinkEvent::RegistrationDenied => {
                self.remove_link(link_id, "Registration rejected", SessionError::RegistrationRejected);
            }
            LinkEvent::Failed(reason) => {
                self.remove_link(link_id, &reason, SessionError::NoViableLink);
            }
        }
    }

    fn handle_listener_event(&mut self, event: ListenerEvent) {
        match event {
            ListenerEvent::Ready(port) => {
                if self.state != SessionState::WaitForLocalListening {
                    return;
                }
                self.set_state(SessionState::Running);
                self.delegate.srtla_ready(port);
                self.connect_deadline.cancel();
            }
            ListenerEvent::Packet(packet) => self.handle_local_packet(&packet),
            ListenerEvent::Error(message) => {
                self.on_disconnected(SessionError::ListenerBindFailure(message));
            }
        }
    }

    fn start_listener(&mut self) {
        if self.listener.is_some() {
            return;
        }
        match LocalListener::start() {
            Ok(listener) => {
                self.listener = Some(listener);
                self.set_state(SessionState::WaitForLocalListening);
            }
            Err(e) => {
                self.on_disconnected(SessionError::ListenerBindFailure(e.to_string()));
            }
        }
    }

    fn handle_local_packet(&mut self, packet: &[u8]) {
        if self.state == SessionState::Idle {
            return;
        }
        let Some(link) = self.select_link() else {
            self.on_disconnected(SessionError::NoViableLink);
            return;
        };
        link.send_srt_packet(packet);
        self.total_byte_count += packet.len() as u64;
    }

    /// Highest score wins; the first link wins ties by iteration order
    fn select_link(&mut self) -> Option<&mut PhysicalLink> {
        let mut selected = None;
        let mut selected_score = -1;
        for (index, link) in self.links.iter().enumerate() {
            let score = link.score();
            if score > selected_score {
                selected = Some(index);
                selected_score = score;
            }
        }
        match selected {
            Some(index) => Some(&mut self.links[index]),
            None => None,
        }
    }

    fn link_mut(&mut self, link_id: u64) -> Option<&mut PhysicalLink> {
        self.links.iter_mut().find(|link| link.id() == link_id)
    }

    fn remove_link(&mut self, link_id: u64, reason: &str, error_if_empty: SessionError) {
        if let Some(index) = self.links.iter().position(|link| link.id() == link_id) {
            let mut link = self.links.remove(index);
            link.stop(reason);
        }
        if self.links.is_empty() {
            self.on_disconnected(error_if_empty);
        }
    }

    /// Reconcile links with the currently available interfaces
    ///
    /// Cellular and Wi-Fi links ride the default route and are always kept;
    /// only Ethernet links follow their specific interface.
    fn handle_network_path_update(&mut self, interfaces: Vec<NetworkInterface>) {
        if self.passthrough || self.state == SessionState::Idle {
            return;
        }
        let Some(remote) = self.remote else {
            return;
        };

        self.links.retain_mut(|link| match link.interface() {
            Some(interface) => {
                if interfaces.contains(interface) {
                    true
                } else {
                    link.stop("Interface removed");
                    false
                }
            }
            None => true,
        });

        let mut events = Vec::new();
        for interface in interfaces {
            if interface.kind != InterfaceKind::Ethernet {
                continue;
            }
            if self
                .links
                .iter()
                .any(|link| link.interface() == Some(&interface))
            {
                continue;
            }
            let mut link = self.make_link(LinkKind::Ethernet, Some(interface), remote);
            let mut link_events = Vec::new();
            link.start(&mut link_events);
            let id = link.id();
            events.extend(link_events.into_iter().map(|e| (id, e)));
            if let Some(group_id) = &self.group_id {
                link.register(group_id.clone());
            }
            self.links.push(link);
        }

        self.links.sort_by_key(|link| match link.kind() {
            LinkKind::Cellular => 0,
            LinkKind::WiFi => 1,
            _ => 2,
        });
        self.process_link_events(events);
    }

    fn set_connection_priorities(&mut self, priorities: ConnectionPriorities) {
        self.priorities = normalize_priorities(&priorities);
        for index in 0..self.links.len() {
            let name = self.links[index].name();
            let priority = match self.links[index].kind() {
                LinkKind::PassThrough => 1.0,
                _ => self.connection_priority(&name),
            };
            self.links[index].set_priority(priority);
        }
    }

    fn connection_priority(&self, name: &str) -> f32 {
        let Some(priority) = self.priorities.iter().find(|p| p.name == name) else {
            return 1.0;
        };
        if priority.enabled {
            priority.priority as f32
        } else {
            0.0
        }
    }

    fn connection_statistics(&mut self) -> Vec<BondingLinkStats> {
        let mut stats = Vec::new();
        for link in &mut self.links {
            if !link.is_enabled() {
                continue;
            }
            let Some(usage) = link.get_data_sent_delta() else {
                continue;
            };
            stats.push(BondingLinkStats {
                name: link.name(),
                usage,
            });
        }
        stats
    }
}

/// Normalize so the lowest enabled priority maps to 1
fn normalize_priorities(priorities: &ConnectionPriorities) -> Vec<ConnectionPriority> {
    if !priorities.enabled {
        return Vec::new();
    }
    let Some(lowest) = priorities
        .priorities
        .iter()
        .filter(|p| p.enabled)
        .map(|p| p.priority)
        .min()
    else {
        return Vec::new();
    };
    priorities
        .priorities
        .iter()
        .map(|p| ConnectionPriority {
            name: p.name.clone(),
            priority: p.priority - lowest + 1,
            enabled: p.enabled,
        })
        .collect()
}

/// Parse `scheme://host:port` (or bare `host:port`) and resolve the host
fn resolve_uri(uri: &str) -> Option<SocketAddr> {
    let rest = match uri.split_once("://") {
        Some((scheme, rest)) => {
            if scheme != "srtla" && scheme != "srt" {
                return None;
            }
            rest
        }
        None => uri,
    };
    let rest = rest.split(&['/', '?'][..]).next().unwrap_or(rest);
    let (host, port) = rest.rsplit_once(':')?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let port: u16 = port.parse().ok()?;
    (host, port).to_socket_addrs().ok()?.next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingDelegate {
        ready_ports: StdMutex<Vec<u16>>,
        errors: StdMutex<Vec<SessionError>>,
    }

    impl BondingSessionDelegate for RecordingDelegate {
        fn srtla_ready(&self, port: u16) {
            self.ready_ports.lock().unwrap().push(port);
        }

        fn srtla_error(&self, error: SessionError) {
            self.errors.lock().unwrap().push(error);
        }
    }

    fn core_with_delegate(passthrough: bool) -> (SessionCore, Arc<RecordingDelegate>) {
        let delegate = Arc::new(RecordingDelegate::default());
        let core = SessionCore::new(
            delegate.clone(),
            passthrough,
            ConnectionPriorities::default(),
        );
        (core, delegate)
    }

    #[test]
    fn test_resolve_uri() {
        assert_eq!(
            resolve_uri("srtla://127.0.0.1:5000"),
            Some("127.0.0.1:5000".parse().unwrap())
        );
        assert_eq!(
            resolve_uri("srt://127.0.0.1:5000"),
            Some("127.0.0.1:5000".parse().unwrap())
        );
        assert_eq!(
            resolve_uri("127.0.0.1:5000"),
            Some("127.0.0.1:5000".parse().unwrap())
        );
        assert_eq!(
            resolve_uri("srtla://[::1]:5000"),
            Some("[::1]:5000".parse().unwrap())
        );
        assert_eq!(resolve_uri("rtmp://127.0.0.1:5000"), None);
        assert_eq!(resolve_uri("srtla://127.0.0.1"), None);
        assert_eq!(resolve_uri("srtla://127.0.0.1:notaport"), None);
    }

    #[test]
    fn test_no_viable_link_errors_exactly_once() {
        let (mut core, delegate) = core_with_delegate(false);
        core.state = SessionState::Running;

        core.handle_local_packet(b"datagram");
        assert_eq!(
            delegate.errors.lock().unwrap().as_slice(),
            &[SessionError::NoViableLink]
        );
        assert_eq!(core.state, SessionState::Idle);

        // a second packet after teardown is dropped silently
        core.handle_local_packet(b"datagram");
        assert_eq!(delegate.errors.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_select_link_empty_returns_none() {
        let (mut core, _delegate) = core_with_delegate(false);
        assert!(core.select_link().is_none());
    }

    #[test]
    fn test_connect_timeout_reports_handshake_timeout() {
        let (mut core, delegate) = core_with_delegate(false);
        core.state = SessionState::WaitForRemoteConnected;
        core.connect_deadline.arm(Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(5));

        core.poll();
        assert_eq!(
            delegate.errors.lock().unwrap().as_slice(),
            &[SessionError::HandshakeTimeout]
        );
        assert_eq!(core.state, SessionState::Idle);
    }

    #[test]
    fn test_priority_normalization() {
        let priorities = ConnectionPriorities {
            enabled: true,
            priorities: vec![
                ConnectionPriority {
                    name: "Cellular".into(),
                    priority: 5,
                    enabled: true,
                },
                ConnectionPriority {
                    name: "WiFi".into(),
                    priority: 3,
                    enabled: true,
                },
                ConnectionPriority {
                    name: "eth0".into(),
                    priority: 7,
                    enabled: false,
                },
            ],
        };
        let normalized = normalize_priorities(&priorities);
        assert_eq!(
            normalized
                .iter()
                .map(|p| (p.name.as_str(), p.priority))
                .collect::<Vec<_>>(),
            vec![("Cellular", 3), ("WiFi", 1), ("eth0", 5)]
        );
    }

    #[test]
    fn test_priority_lookup() {
        let (mut core, _delegate) = core_with_delegate(false);
        core.priorities = normalize_priorities(&ConnectionPriorities {
            enabled: true,
            priorities: vec![
                ConnectionPriority {
                    name: "Cellular".into(),
                    priority: 2,
                    enabled: true,
                },
                ConnectionPriority {
                    name: "WiFi".into(),
                    priority: 1,
                    enabled: false,
                },
            ],
        });
        assert_eq!(core.connection_priority("Cellular"), 2.0);
        assert_eq!(core.connection_priority("WiFi"), 0.0);
        assert_eq!(core.connection_priority("eth0"), 1.0);
    }

    #[test]
    fn test_disabled_priorities_default_to_one() {
        let priorities = ConnectionPriorities {
            enabled: false,
            priorities: vec![ConnectionPriority {
                name: "Cellular".into(),
                priority: 9,
                enabled: true,
            }],
        };
        assert!(normalize_priorities(&priorities).is_empty());
    }

    #[test]
    fn test_bonded_state_machine_walk() {
        let (mut core, delegate) = core_with_delegate(false);
        core.start("srtla://127.0.0.1:1", Duration::from_secs(5));

        // both link sockets connect during start; the first one sent reg1
        assert_eq!(core.state, SessionState::WaitForGroupId);
        assert_eq!(core.links.len(), 2);
        assert!(core.connect_deadline.is_armed());

        let link_id = core.links[0].id();
        let group_id = Bytes::from(vec![0x11; 256]);
        core.handle_link_event(link_id, LinkEvent::GroupIdReceived(group_id.clone()));
        assert_eq!(core.state, SessionState::WaitForRegistered);
        assert_eq!(core.group_id.as_ref(), Some(&group_id));

        core.handle_link_event(link_id, LinkEvent::Registered);
        assert_eq!(core.state, SessionState::WaitForLocalListening);

        // the next poll surfaces the listener's ready announcement
        core.poll();
        assert_eq!(core.state, SessionState::Running);
        assert!(!core.connect_deadline.is_armed());
        assert_eq!(delegate.ready_ports.lock().unwrap().len(), 1);
        assert!(delegate.errors.lock().unwrap().is_empty());
    }

    #[test]
    fn test_passthrough_skips_group_states() {
        let (mut core, delegate) = core_with_delegate(true);
        core.start("srt://127.0.0.1:1", Duration::from_secs(5));

        assert_eq!(core.state, SessionState::WaitForLocalListening);
        assert_eq!(core.links.len(), 1);
        assert!(core.group_id.is_none());

        core.poll();
        assert_eq!(core.state, SessionState::Running);
        assert!(!core.connect_deadline.is_armed());
        assert_eq!(delegate.ready_ports.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_stop_resets_counters_and_group() {
        let (mut core, _delegate) = core_with_delegate(false);
        core.state = SessionState::Running;
        core.total_byte_count = 999;
        core.group_id = Some(Bytes::from_static(b"group"));

        core.stop_internal();
        assert_eq!(core.state, SessionState::Idle);
        assert!(core.group_id.is_none());
        assert!(core.links.is_empty());

        // counters reset on the next start
        core.start("srtla://127.0.0.1:1", Duration::from_secs(5));
        assert_eq!(core.total_byte_count, 0);
    }

    #[test]
    fn test_path_update_keeps_default_route_links() {
        let (mut core, delegate) = core_with_delegate(false);
        core.start("srtla://127.0.0.1:1", Duration::from_secs(5));
        assert_eq!(core.links.len(), 2);

        // a vanished Ethernet interface is dropped, default-route links stay
        let stale = NetworkInterface::new(InterfaceKind::Ethernet, "srtla-test-gone0");
        let remote = core.remote.unwrap();
        let link = PhysicalLink::new(99, LinkKind::Ethernet, Some(stale), remote, 1.0);
        core.links.push(link);
        core.handle_network_path_update(vec![]);
        assert_eq!(core.links.len(), 2);

        // a bogus new interface fails to bind and is absorbed silently
        core.handle_network_path_update(vec![NetworkInterface::new(
            InterfaceKind::Ethernet,
            "srtla-test-none0",
        )]);
        assert_eq!(core.links.len(), 2);
        assert!(delegate.errors.lock().unwrap().is_empty());

        // iteration order stays cellular, wifi
        assert_eq!(core.links[0].kind(), LinkKind::Cellular);
        assert_eq!(core.links[1].kind(), LinkKind::WiFi);
    }

    #[test]
    fn test_path_update_ignored_in_passthrough() {
        let (mut core, _delegate) = core_with_delegate(true);
        core.state = SessionState::Running;
        core.remote = Some("127.0.0.1:1".parse().unwrap());
        core.handle_network_path_update(vec![NetworkInterface::new(
            InterfaceKind::Ethernet,
            "eth0",
        )]);
        assert!(core.links.is_empty());
    }
}
