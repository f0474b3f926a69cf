//! Network path types
//!
//! The bonding session consumes a push stream of interface updates from the
//! embedder (the OS path monitor adapter lives outside this crate). Cellular
//! and Wi-Fi links ride the default route and survive interface churn; only
//! wired Ethernet interfaces create and destroy links dynamically.

use std::fmt;

/// Physical interface classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterfaceKind {
    Cellular,
    WiFi,
    Ethernet,
}

/// One available network interface, with a stable identity
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NetworkInterface {
    pub kind: InterfaceKind,
    /// Stable OS identity, e.g. `eth0`
    pub id: String,
}

impl NetworkInterface {
    pub fn new(kind: InterfaceKind, id: impl Into<String>) -> Self {
        NetworkInterface {
            kind,
            id: id.into(),
        }
    }
}

impl fmt::Display for NetworkInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}
