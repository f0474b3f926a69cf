//! Per-path connection management
//!
//! One [`PhysicalLink`] owns one UDP socket toward the bonding server,
//! optionally pinned to a specific network interface, and walks the SRTLA
//! registration handshake. Each link keeps a scaled congestion window fed by
//! SRTLA acknowledgements and negative SRT acknowledgements; the window and
//! the in-flight backlog produce the relative health score the session ranks
//! links by.

use crate::monitor::NetworkInterface;
use bytes::Bytes;
use rand::RngCore;
use srtla_io::{Deadline, LinkSocket, Timer};
use srtla_protocol::packet::{
    control_type, data_sequence_number, is_data_packet, SrtControlType, SrtlaPacketType,
    CONTROL_TYPE_SIZE,
};
use srtla_protocol::registration::{create_keepalive, create_reg1, create_reg2, parse_reg2};
use srtla_protocol::sequence::is_sn_acked;
use srtla_protocol::{parse_srt_ack, parse_srt_nak, parse_srtla_ack, GROUP_ID_SIZE};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

const WINDOW_DEFAULT: i64 = 20;
const WINDOW_MINIMUM: i64 = 1;
const WINDOW_MAXIMUM: i64 = 60;
const WINDOW_STABLE_MINIMUM: i64 = 10;
const WINDOW_STABLE_MAXIMUM: i64 = 20;
const WINDOW_MULTIPLY: i64 = 1000;
const WINDOW_DECREMENT: i64 = 100;
const WINDOW_INCREMENT: i64 = 30;

/// Registration must complete this long after the socket connects
const REGISTER_TIMEOUT: Duration = Duration::from_secs(5);

/// Cadence of the keepalive/liveness check
const KEEPALIVE_CHECK_INTERVAL: Duration = Duration::from_millis(1000);

/// Send a keepalive when the link was idle this long
const KEEPALIVE_IDLE: Duration = Duration::from_millis(500);

/// Reconnect when nothing was received for this long
const RECEIVE_TIMEOUT: Duration = Duration::from_secs(5);

/// Which physical path a link rides on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Cellular,
    WiFi,
    Ethernet,
    /// Direct SRT without bonding; skips the registration handshake
    PassThrough,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkState {
    Idle,
    Connecting,
    /// Connected, waiting for the session to hand over a group id
    ShouldSendReg2,
    WaitForReg3,
    Registered,
}

/// Events a link reports to the owning session
#[derive(Debug)]
pub enum LinkEvent {
    /// The socket is connected (bonding links still need to register)
    SocketConnected,
    /// A reg2 response arrived carrying the definitive group id
    GroupIdReceived(Bytes),
    /// The server confirmed this link with reg3
    Registered,
    /// Payload from the server, to be handed to the local SRT client
    SrtPacket(Bytes),
    /// SRT acknowledgement sequence number seen on this link
    SrtAck(u32),
    /// SRT loss report sequence number seen on this link
    SrtNak(u32),
    /// SRTLA acknowledgement sequence number seen on this link
    SrtlaAck(u32),
    /// The server refused to register this link
    RegistrationDenied,
    /// Terminal local failure; the session should drop this link
    Failed(String),
}

pub struct PhysicalLink {
    id: u64,
    kind: LinkKind,
    interface: Option<NetworkInterface>,
    remote: SocketAddr,
    priority: f32,
    socket: Option<LinkSocket>,
    state: LinkState,
    group_id: Option<Bytes>,
    has_group_id: bool,
    packets_in_flight: HashSet<u32>,
    window: i64,
    last_ack_sn: Option<u32>,
    last_nak_sn: Option<u32>,
    total_data_sent: u64,
    latest_received: Instant,
    latest_sent: Instant,
    register_deadline: Deadline,
    keepalive_timer: Timer,
    connected_reported: bool,
    recv_failed: bool,
}

impl PhysicalLink {
    pub fn new(
        id: u64,
        kind: LinkKind,
        interface: Option<NetworkInterface>,
        remote: SocketAddr,
        priority: f32,
    ) -> Self {
        let now = Instant::now();
        PhysicalLink {
            id,
            kind,
            interface,
            remote,
            priority,
            socket: None,
            state: LinkState::Idle,
            group_id: None,
            has_group_id: false,
            packets_in_flight: HashSet::new(),
            window: 0,
            last_ack_sn: None,
            last_nak_sn: None,
            total_data_sent: 0,
            latest_received: now,
            latest_sent: now,
            register_deadline: Deadline::new(),
            keepalive_timer: Timer::new(KEEPALIVE_CHECK_INTERVAL),
            connected_reported: false,
            recv_failed: false,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> LinkKind {
        self.kind
    }

    pub fn interface(&self) -> Option<&NetworkInterface> {
        self.interface.as_ref()
    }

    /// Link display name used in logs and statistics
    pub fn name(&self) -> String {
        match self.kind {
            LinkKind::Cellular => "Cellular".to_string(),
            LinkKind::WiFi => "WiFi".to_string(),
            LinkKind::Ethernet => self
                .interface
                .as_ref()
                .map(|i| i.id.clone())
                .unwrap_or_else(|| "Ethernet".to_string()),
            LinkKind::PassThrough => "Direct".to_string(),
        }
    }

    pub fn set_priority(&mut self, priority: f32) {
        self.priority = priority;
    }

    pub fn is_enabled(&self) -> bool {
        self.priority > 0.0
    }

    pub fn is_registered(&self) -> bool {
        self.state == LinkState::Registered
    }

    /// Open the socket and begin connecting/registering
    pub fn start(&mut self, events: &mut Vec<LinkEvent>) {
        if self.state != LinkState::Idle {
            return;
        }
        tracing::info!("{}: Start with destination {}", self.name(), self.remote);
        let interface_name = self.interface.as_ref().map(|i| i.id.as_str());
        match LinkSocket::connect(self.remote, interface_name) {
            Ok(socket) => {
                self.socket = Some(socket);
                self.state = LinkState::Connecting;
                self.handle_socket_ready(events);
            }
            Err(e) => {
                events.push(LinkEvent::Failed(format!("Socket setup failed: {}", e)));
            }
        }
    }

    pub fn stop(&mut self, reason: &str) {
        tracing::debug!(
            "{}: Stop with reason: {} ({} bytes sent)",
            self.name(),
            reason,
            self.total_data_sent
        );
        self.socket = None;
        self.register_deadline.cancel();
        self.recv_failed = false;
        self.state = LinkState::Idle;
    }

    fn reconnect(&mut self, reason: &str, events: &mut Vec<LinkEvent>) {
        self.stop(reason);
        self.start(events);
    }

    fn handle_socket_ready(&mut self, events: &mut Vec<LinkEvent>) {
        let now = Instant::now();
        self.register_deadline.arm(REGISTER_TIMEOUT);
        self.latest_received = now;
        self.latest_sent = now;
        self.packets_in_flight.clear();
        self.total_data_sent = 0;
        self.window = WINDOW_DEFAULT * WINDOW_MULTIPLY;
        if self.kind == LinkKind::PassThrough {
            self.state = LinkState::Registered;
            self.register_deadline.cancel();
        } else if self.state == LinkState::ShouldSendReg2 || self.has_group_id {
            self.send_reg2();
        } else {
            self.state = LinkState::ShouldSendReg2;
        }
        if !self.connected_reported {
            self.connected_reported = true;
            events.push(LinkEvent::SocketConnected);
        }
    }

    /// Relative health for link selection; higher is better, -1 is unusable
    pub fn score(&self) -> i64 {
        if self.state != LinkState::Registered {
            return -1;
        }
        if self.kind == LinkKind::PassThrough {
            return 1;
        }
        if self.priority == 0.0 {
            return -1;
        }
        let score = self.window / (self.packets_in_flight.len() as i64 + 1);
        if self.window > WINDOW_STABLE_MAXIMUM * WINDOW_MULTIPLY {
            (score as f32 * self.priority) as i64
        } else if self.window > WINDOW_STABLE_MINIMUM * WINDOW_MULTIPLY {
            let mut factor = (self.window - WINDOW_STABLE_MINIMUM * WINDOW_MULTIPLY) as f32;
            factor /= ((WINDOW_STABLE_MAXIMUM - WINDOW_STABLE_MINIMUM) * WINDOW_MULTIPLY) as f32;
            let scaled_priority = 1.0 + (self.priority - 1.0) * factor;
            (score as f32 * scaled_priority) as i64
        } else {
            score
        }
    }

    /// Send one SRT datagram from the local client over this link
    pub fn send_srt_packet(&mut self, packet: &[u8]) {
        if is_data_packet(packet) {
            if let Some(sn) = data_sequence_number(packet) {
                self.packets_in_flight.insert(sn);
            }
            self.total_data_sent += packet.len() as u64;
        }
        self.send_packet(packet);
    }

    /// Adopt the definitive group id and register once connected
    pub fn register(&mut self, group_id: Bytes) {
        self.group_id = Some(group_id);
        self.has_group_id = true;
        if self.state == LinkState::ShouldSendReg2 {
            self.send_reg2();
        }
    }

    /// Open a new group by proposing a random group id
    pub fn send_reg1(&mut self) {
        tracing::debug!("{}: Sending reg 1 (create group)", self.name());
        let mut id = vec![0u8; GROUP_ID_SIZE];
        rand::thread_rng().fill_bytes(&mut id);
        let group_id = Bytes::from(id);
        let packet = create_reg1(&group_id);
        self.group_id = Some(group_id);
        self.send_packet(&packet);
    }

    fn send_reg2(&mut self) {
        let Some(group_id) = self.group_id.clone() else {
            return;
        };
        tracing::debug!("{}: Sending reg 2 (register connection)", self.name());
        let packet = create_reg2(&group_id);
        self.send_packet(&packet);
        self.state = LinkState::WaitForReg3;
    }

    fn send_keepalive(&mut self) {
        let packet = create_keepalive();
        self.send_packet(&packet);
    }

    fn send_packet(&mut self, packet: &[u8]) {
        self.latest_sent = Instant::now();
        if let Some(socket) = &self.socket {
            if let Err(e) = socket.send(packet) {
                if !e.is_would_block() {
                    tracing::trace!("{}: Send failed: {}", self.name(), e);
                }
            }
        }
    }

    /// Drain the socket and run liveness timers
    pub fn poll(&mut self, now: Instant, events: &mut Vec<LinkEvent>) {
        if self.state != LinkState::Idle && !self.recv_failed {
            let mut buf = [0u8; 2048];
            loop {
                let n = {
                    let Some(socket) = self.socket.as_ref() else {
                        break;
                    };
                    match socket.recv(&mut buf) {
                        Ok(n) => n,
                        Err(e) if e.is_would_block() => break,
                        Err(e) => {
                            tracing::warn!("{}: Receive failed: {}", self.name(), e);
                            self.recv_failed = true;
                            break;
                        }
                    }
                };
                if n > 0 {
                    self.handle_packet(&buf[..n], now, events);
                }
            }
        }
        self.check_timers(now, events);
    }

    fn check_timers(&mut self, now: Instant, events: &mut Vec<LinkEvent>) {
        if self.register_deadline.try_fire(now) {
            self.reconnect("Connection timeout", events);
            return;
        }
        if self.state == LinkState::Registered && self.keepalive_timer.try_fire() {
            if now.duration_since(self.latest_sent) > KEEPALIVE_IDLE {
                self.send_keepalive();
            }
            if now.duration_since(self.latest_received) > RECEIVE_TIMEOUT {
                self.reconnect("No packet received in 5 seconds", events);
            }
        }
    }

    fn handle_packet(&mut self, packet: &[u8], now: Instant, events: &mut Vec<LinkEvent>) {
        if packet.len() < CONTROL_TYPE_SIZE {
            tracing::error!("{}: Packet too short ({} bytes)", self.name(), packet.len());
            return;
        }
        self.latest_received = now;
        if is_data_packet(packet) {
            events.push(LinkEvent::SrtPacket(Bytes::copy_from_slice(packet)));
        } else {
            self.handle_control_packet(packet, events);
        }
    }

    fn handle_control_packet(&mut self, packet: &[u8], events: &mut Vec<LinkEvent>) {
        let Some(control) = control_type(packet) else {
            return;
        };
        if let Some(packet_type) = SrtlaPacketType::from_u16(control) {
            self.handle_srtla_control_packet(packet_type, packet, events);
        } else {
            if let Some(packet_type) = SrtControlType::from_u16(control) {
                match packet_type {
                    SrtControlType::Ack => {
                        if let Some(sn) = parse_srt_ack(packet) {
                            events.push(LinkEvent::SrtAck(sn));
                        }
                    }
                    SrtControlType::Nak => {
                        for sn in parse_srt_nak(packet) {
                            events.push(LinkEvent::SrtNak(sn));
                        }
                    }
                }
            }
            // SRT control traffic belongs to the local client
            events.push(LinkEvent::SrtPacket(Bytes::copy_from_slice(packet)));
        }
    }

    fn handle_srtla_control_packet(
        &mut self,
        packet_type: SrtlaPacketType,
        packet: &[u8],
        events: &mut Vec<LinkEvent>,
    ) {
        match packet_type {
            SrtlaPacketType::Keepalive => {}
            SrtlaPacketType::Ack => {
                for sn in parse_srtla_ack(packet) {
                    events.push(LinkEvent::SrtlaAck(sn));
                }
            }
            SrtlaPacketType::Reg1 => {
                tracing::error!("{}: Received register 1 packet", self.name());
            }
            SrtlaPacketType::Reg2 => self.handle_reg2(packet, events),
            SrtlaPacketType::Reg3 => self.handle_reg3(events),
            SrtlaPacketType::RegErr | SrtlaPacketType::RegNak => {
                tracing::debug!("{}: Register error", self.name());
                events.push(LinkEvent::RegistrationDenied);
            }
            SrtlaPacketType::RegNgp => {
                tracing::debug!("{}: Register no group", self.name());
            }
        }
    }

    fn handle_reg2(&mut self, packet: &[u8], events: &mut Vec<LinkEvent>) {
        tracing::debug!("{}: Got reg 2 (group created)", self.name());
        let Some(group_id) = self.group_id.clone() else {
            return;
        };
        match parse_reg2(packet, &group_id) {
            Ok(definitive) => events.push(LinkEvent::GroupIdReceived(definitive)),
            Err(e) => tracing::warn!("{}: Bad reg 2 packet: {}", self.name(), e),
        }
    }

    fn handle_reg3(&mut self, events: &mut Vec<LinkEvent>) {
        tracing::debug!("{}: Got reg 3 (connection registered)", self.name());
        if self.state != LinkState::WaitForReg3 {
            return;
        }
        self.state = LinkState::Registered;
        self.register_deadline.cancel();
        self.keepalive_timer.reset();
        events.push(LinkEvent::Registered);
    }

    /// Drop every in-flight packet the SRT ACK covers
    pub fn handle_srt_ack_sn(&mut self, ack_sn: u32) {
        self.last_ack_sn = Some(ack_sn);
        self.packets_in_flight
            .retain(|&sn| !is_sn_acked(sn, ack_sn));
    }

    /// A loss report shrinks the window if the packet was ours
    pub fn handle_srt_nak_sn(&mut self, sn: u32) {
        self.last_nak_sn = Some(sn);
        if !self.packets_in_flight.remove(&sn) {
            return;
        }
        self.window = (self.window - WINDOW_DECREMENT).max(WINDOW_MINIMUM * WINDOW_MULTIPLY);
    }

    /// An SRTLA ACK grows the window, faster while the backlog is deep
    pub fn handle_srtla_ack_sn(&mut self, sn: u32) {
        if self.packets_in_flight.remove(&sn)
            && self.packets_in_flight.len() as i64 * WINDOW_MULTIPLY > self.window
        {
            self.window += WINDOW_INCREMENT - 1;
        }
        self.window = (self.window + 1).min(WINDOW_MAXIMUM * WINDOW_MULTIPLY);
    }

    /// Bytes sent since the previous call; `None` while not registered
    pub fn get_data_sent_delta(&mut self) -> Option<u64> {
        let delta = std::mem::take(&mut self.total_data_sent);
        if self.state != LinkState::Registered {
            return None;
        }
        Some(delta)
    }

    pub fn log_statistics(&self) {
        if self.state != LinkState::Registered {
            return;
        }
        tracing::debug!(
            "{}: Score: {}, In flight: {}, Window size: {}, Priority: {}, Last ack: {:?}, Last nak: {:?}",
            self.name(),
            self.score(),
            self.packets_in_flight.len(),
            self.window,
            self.priority,
            self.last_ack_sn,
            self.last_nak_sn
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use srtla_protocol::registration::REG_PACKET_SIZE;
    use std::time::Duration;

    fn server() -> (LinkSocket, SocketAddr) {
        let socket = LinkSocket::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = socket.local_addr().unwrap();
        (socket, addr)
    }

    fn recv_with_retry(socket: &LinkSocket) -> (Vec<u8>, SocketAddr) {
        let mut buf = [0u8; 2048];
        for _ in 0..200 {
            match socket.recv_from(&mut buf) {
                Ok((n, addr)) => return (buf[..n].to_vec(), addr),
                Err(_) => std::thread::sleep(Duration::from_millis(5)),
            }
        }
        panic!("Nothing received");
    }

    fn poll_until<F: Fn(&[LinkEvent]) -> bool>(
        link: &mut PhysicalLink,
        events: &mut Vec<LinkEvent>,
        predicate: F,
    ) {
        for _ in 0..200 {
            link.poll(Instant::now(), events);
            if predicate(events) {
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("Expected event never arrived");
    }

    #[test]
    fn test_passthrough_registers_on_connect() {
        let (_server, addr) = server();
        let mut link = PhysicalLink::new(1, LinkKind::PassThrough, None, addr, 1.0);
        let mut events = Vec::new();
        link.start(&mut events);
        assert!(matches!(events[0], LinkEvent::SocketConnected));
        assert!(link.is_registered());
        assert_eq!(link.score(), 1);
    }

    #[test]
    fn test_bonded_registration_walk() {
        let (server, addr) = server();
        let mut link = PhysicalLink::new(1, LinkKind::Cellular, None, addr, 1.0);
        let mut events = Vec::new();

        link.start(&mut events);
        assert!(matches!(events[0], LinkEvent::SocketConnected));
        assert!(!link.is_registered());
        assert_eq!(link.score(), -1);

        link.send_reg1();
        let (reg1, link_addr) = recv_with_retry(&server);
        assert_eq!(reg1.len(), REG_PACKET_SIZE);
        assert_eq!(control_type(&reg1), Some(SrtlaPacketType::Reg1.as_u16()));

        // answer with the definitive group id: client half + server half
        let mut group_id = reg1[CONTROL_TYPE_SIZE..].to_vec();
        for byte in group_id.iter_mut().skip(GROUP_ID_SIZE / 2) {
            *byte = 0xBB;
        }
        server
            .send_to(&create_reg2(&group_id), link_addr)
            .unwrap();

        let mut events = Vec::new();
        poll_until(&mut link, &mut events, |events| {
            events
                .iter()
                .any(|e| matches!(e, LinkEvent::GroupIdReceived(_)))
        });
        let definitive = events
            .iter()
            .find_map(|e| match e {
                LinkEvent::GroupIdReceived(id) => Some(id.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(definitive.as_ref(), group_id.as_slice());

        link.register(definitive);
        let (reg2, _) = recv_with_retry(&server);
        assert_eq!(control_type(&reg2), Some(SrtlaPacketType::Reg2.as_u16()));

        let mut reg3 = vec![0u8; CONTROL_TYPE_SIZE];
        reg3.copy_from_slice(&SrtlaPacketType::Reg3.as_u16().to_be_bytes());
        server.send_to(&reg3, link_addr).unwrap();

        let mut events = Vec::new();
        poll_until(&mut link, &mut events, |events| {
            events.iter().any(|e| matches!(e, LinkEvent::Registered))
        });
        assert!(link.is_registered());
        assert!(link.score() > 0);
    }

    #[test]
    fn test_window_bookkeeping() {
        let (_server, addr) = server();
        let mut link = PhysicalLink::new(1, LinkKind::Cellular, None, addr, 1.0);
        let mut events = Vec::new();
        link.start(&mut events);
        link.state = LinkState::Registered;

        let mut packet = vec![0u8; 100];
        packet[..4].copy_from_slice(&42u32.to_be_bytes());
        link.send_srt_packet(&packet);
        assert_eq!(link.packets_in_flight.len(), 1);

        let window_before = link.window;
        link.handle_srt_nak_sn(42);
        assert!(link.packets_in_flight.is_empty());
        assert_eq!(link.window, window_before - WINDOW_DECREMENT);

        // unknown sn does not shrink the window again
        link.handle_srt_nak_sn(42);
        assert_eq!(link.window, window_before - WINDOW_DECREMENT);
    }

    #[test]
    fn test_srt_ack_clears_older_packets() {
        let (_server, addr) = server();
        let mut link = PhysicalLink::new(1, LinkKind::WiFi, None, addr, 1.0);
        let mut events = Vec::new();
        link.start(&mut events);
        link.state = LinkState::Registered;

        for sn in [10u32, 11, 12, 20] {
            let mut packet = vec![0u8; 100];
            packet[..4].copy_from_slice(&sn.to_be_bytes());
            link.send_srt_packet(&packet);
        }
        link.handle_srt_ack_sn(12);
        assert_eq!(link.packets_in_flight.len(), 2);
        assert!(link.packets_in_flight.contains(&12));
        assert!(link.packets_in_flight.contains(&20));
    }

    #[test]
    fn test_srtla_ack_grows_window() {
        let (_server, addr) = server();
        let mut link = PhysicalLink::new(1, LinkKind::Cellular, None, addr, 1.0);
        let mut events = Vec::new();
        link.start(&mut events);
        link.state = LinkState::Registered;

        let window_before = link.window;
        link.handle_srtla_ack_sn(7);
        assert_eq!(link.window, window_before + 1);
    }

    #[test]
    fn test_score_scales_with_priority() {
        let (_server, addr) = server();
        let mut link = PhysicalLink::new(1, LinkKind::Cellular, None, addr, 2.0);
        let mut events = Vec::new();
        link.start(&mut events);
        link.state = LinkState::Registered;

        // above the stable band the full priority applies
        link.window = (WINDOW_STABLE_MAXIMUM + 10) * WINDOW_MULTIPLY;
        assert_eq!(link.score(), link.window * 2);

        link.set_priority(0.0);
        assert_eq!(link.score(), -1);
    }

    #[test]
    fn test_data_sent_delta_resets() {
        let (_server, addr) = server();
        let mut link = PhysicalLink::new(1, LinkKind::Cellular, None, addr, 1.0);
        let mut events = Vec::new();
        link.start(&mut events);
        link.state = LinkState::Registered;

        let mut packet = vec![0u8; 100];
        packet[..4].copy_from_slice(&1u32.to_be_bytes());
        link.send_srt_packet(&packet);

        assert_eq!(link.get_data_sent_delta(), Some(100));
        assert_eq!(link.get_data_sent_delta(), Some(0));
    }

    #[test]
    fn test_unregistered_delta_is_none() {
        let (_server, addr) = server();
        let mut link = PhysicalLink::new(1, LinkKind::Cellular, None, addr, 1.0);
        let mut events = Vec::new();
        link.start(&mut events);
        assert_eq!(link.get_data_sent_delta(), None);
    }
}
