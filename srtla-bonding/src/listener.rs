//! Local loopback bridge
//!
//! Binds an ephemeral UDP endpoint on 127.0.0.1 that the local SRT client
//! talks to as if it were the remote SRT server. The first datagram's source
//! address is latched as the client peer; datagrams from anyone else are
//! ignored. This is the only piece of the bonding layer the SRT library ever
//! sees, so the client needs no awareness that its transport is several
//! physical links.

use srtla_io::{LinkSocket, SocketError};
use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr};

/// Events the bridge reports to the owning session
#[derive(Debug)]
pub enum ListenerEvent {
    /// The bridge is bound and ready on the given local port
    Ready(u16),
    /// A datagram arrived from the local SRT client
    Packet(Vec<u8>),
    /// The bridge socket failed
    Error(String),
}

pub struct LocalListener {
    socket: LinkSocket,
    port: u16,
    peer: Option<SocketAddr>,
    announced_ready: bool,
}

impl LocalListener {
    /// Bind the bridge on an ephemeral loopback port
    pub fn start() -> Result<Self, SocketError> {
        let socket = LinkSocket::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)))?;
        let port = socket.local_addr()?.port();
        tracing::debug!("Local listener on port {}", port);
        Ok(LocalListener {
            socket,
            port,
            peer: None,
            announced_ready: false,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Drain pending datagrams from the local SRT client
    pub fn poll(&mut self, events: &mut Vec<ListenerEvent>) {
        if !self.announced_ready {
            self.announced_ready = true;
            events.push(ListenerEvent::Ready(self.port));
        }
        let mut buf = [0u8; 2048];
        loop {
            match self.socket.recv_from(&mut buf) {
                Ok((n, addr)) => {
                    if self.peer.is_none() {
                        tracing::debug!("Local SRT client connected from {}", addr);
                        self.peer = Some(addr);
                    }
                    if self.peer == Some(addr) && n > 0 {
                        events.push(ListenerEvent::Packet(buf[..n].to_vec()));
                    }
                }
                Err(e) if e.is_would_block() => break,
                Err(SocketError::Io(e)) if e.kind() == ErrorKind::ConnectionRefused => {
                    // the local client went away between datagrams
                    continue;
                }
                Err(e) => {
                    events.push(ListenerEvent::Error(e.to_string()));
                    break;
                }
            }
        }
    }

    /// Forward a datagram delivered by the bonding layer to the local client
    pub fn send_packet(&self, packet: &[u8]) {
        let Some(peer) = self.peer else {
            return;
        };
        if let Err(e) = self.socket.send_to(packet, peer) {
            if !e.is_would_block() {
                tracing::trace!("Local send failed: {}", e);
            }
        }
    }
}
