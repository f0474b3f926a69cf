//! SRTLA I/O and Platform Abstraction
//!
//! This crate provides the network I/O layer for the bonding transport:
//! nonblocking UDP sockets that can be pinned to a specific network
//! interface, and the timer primitives the bonding worker polls.

pub mod socket;
pub mod time;

pub use socket::{LinkSocket, SocketError};
pub use time::{Deadline, Timer};
