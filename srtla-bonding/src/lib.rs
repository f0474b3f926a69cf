//! SRTLA Connection Bonding
//!
//! This crate implements the client side of SRTLA link aggregation: a
//! bonding session that spreads one SRT stream across several physical
//! network paths, per-link registration and health scoring, and the local
//! loopback bridge that lets an off-the-shelf SRT client use the bonded
//! transport as if it were a plain UDP peer.
//!
//! SRTLA is a bonding protocol on top of SRT, designed by rationalsa for the
//! BELABOX project (<https://github.com/BELABOX/srtla>).

pub mod error;
pub mod link;
pub mod listener;
pub mod monitor;
pub mod session;
pub mod stats;

pub use error::SessionError;
pub use link::{LinkEvent, LinkKind, PhysicalLink};
pub use listener::{ListenerEvent, LocalListener};
pub use monitor::{InterfaceKind, NetworkInterface};
pub use session::{
    BondingSession, BondingSessionDelegate, ConnectionPriorities, ConnectionPriority, SessionState,
};
pub use stats::{byte_share_percentages, format_connection_statistics, BondingLinkStats};
