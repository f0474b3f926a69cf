//! SRT/SRTLA Packet Classification and Control Frames
//!
//! Both SRT and SRTLA datagrams start with a 16-bit field whose top bit
//! distinguishes control packets (set) from data packets (clear). Data packets
//! carry a 31-bit sequence number in the first four bytes; control packets
//! carry a type code in the first two bytes. SRTLA claims the 0x9xxx type
//! range, leaving SRT's 0x8xxx control packets to pass through untouched.

use crate::sequence::SeqNumber;
use thiserror::Error;

/// Size of the SRT packet header in bytes (4 fields × 4 bytes each)
pub const SRT_HEADER_SIZE: usize = 16;

/// Size of the leading control type field in bytes
pub const CONTROL_TYPE_SIZE: usize = 2;

/// Control packet flag (top bit of the first byte)
const CONTROL_FLAG: u8 = 0x80;

/// Mask for the 31-bit data sequence number
pub const SEQ_MASK: u32 = 0x7FFF_FFFF;

/// Packet decoding errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PacketError {
    #[error("Wrong packet length (expected {expected}, got {actual})")]
    WrongLength { expected: usize, actual: usize },

    #[error("Group id does not match the registration request")]
    GroupIdMismatch,
}

/// SRT control packet types (subset the bonding layer inspects)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum SrtControlType {
    /// Acknowledgement
    Ack = 0x8002,
    /// Negative acknowledgement (loss report)
    Nak = 0x8003,
}

impl SrtControlType {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x8002 => Some(SrtControlType::Ack),
            0x8003 => Some(SrtControlType::Nak),
            _ => None,
        }
    }

    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

/// SRTLA control packet types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum SrtlaPacketType {
    /// Link keepalive
    Keepalive = 0x9000,
    /// Acknowledgement list (one or more sequence numbers)
    Ack = 0x9100,
    /// Create group (client → server, carries the client half of the group id)
    Reg1 = 0x9200,
    /// Group created / register connection (carries the full group id)
    Reg2 = 0x9201,
    /// Connection registered
    Reg3 = 0x9202,
    /// Registration error
    RegErr = 0x9210,
    /// Unknown group
    RegNgp = 0x9211,
    /// Registration rejected
    RegNak = 0x9212,
}

impl SrtlaPacketType {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x9000 => Some(SrtlaPacketType::Keepalive),
            0x9100 => Some(SrtlaPacketType::Ack),
            0x9200 => Some(SrtlaPacketType::Reg1),
            0x9201 => Some(SrtlaPacketType::Reg2),
            0x9202 => Some(SrtlaPacketType::Reg3),
            0x9210 => Some(SrtlaPacketType::RegErr),
            0x9211 => Some(SrtlaPacketType::RegNgp),
            0x9212 => Some(SrtlaPacketType::RegNak),
            _ => None,
        }
    }

    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

/// Check whether a datagram is an SRT data packet
pub fn is_data_packet(packet: &[u8]) -> bool {
    !packet.is_empty() && packet[0] & CONTROL_FLAG == 0
}

/// Extract the 16-bit control type from a control packet
pub fn control_type(packet: &[u8]) -> Option<u16> {
    if packet.len() < CONTROL_TYPE_SIZE {
        return None;
    }
    Some(u16::from_be_bytes([packet[0], packet[1]]))
}

/// Extract the 31-bit sequence number from an SRT data packet
pub fn data_sequence_number(packet: &[u8]) -> Option<u32> {
    if packet.len() < 4 {
        return None;
    }
    Some(u32::from_be_bytes([packet[0], packet[1], packet[2], packet[3]]) & SEQ_MASK)
}

/// Extract the acknowledged sequence number from an SRT ACK packet
///
/// The ACK control information field starts right after the 16-byte header
/// and leads with the last-acknowledged sequence number.
pub fn parse_srt_ack(packet: &[u8]) -> Option<u32> {
    if packet.len() < SRT_HEADER_SIZE + 4 {
        return None;
    }
    let raw = u32::from_be_bytes([
        packet[SRT_HEADER_SIZE],
        packet[SRT_HEADER_SIZE + 1],
        packet[SRT_HEADER_SIZE + 2],
        packet[SRT_HEADER_SIZE + 3],
    ]);
    Some(raw & SEQ_MASK)
}

/// Upper bound on the number of sequence numbers expanded from one NAK
///
/// A loss report larger than this is malformed or hostile; the remainder is
/// dropped rather than expanded.
const MAX_NAK_EXPANSION: usize = 8192;

/// Decode the loss list of an SRT NAK packet
///
/// The control information field is a list of 32-bit entries: an entry with
/// the top bit set opens an inclusive range that the following entry closes;
/// an entry with the top bit clear is a single lost sequence number.
pub fn parse_srt_nak(packet: &[u8]) -> Vec<u32> {
    let mut lost = Vec::new();
    if packet.len() < SRT_HEADER_SIZE + 4 {
        return lost;
    }
    let mut entries = packet[SRT_HEADER_SIZE..]
        .chunks_exact(4)
        .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]));
    while let Some(entry) = entries.next() {
        if entry & 0x8000_0000 == 0 {
            lost.push(entry & SEQ_MASK);
            continue;
        }
        let start = entry & SEQ_MASK;
        let Some(end) = entries.next() else {
            tracing::trace!("Truncated NAK range starting at {}", start);
            break;
        };
        let end = end & SEQ_MASK;
        let mut sn = start;
        loop {
            lost.push(sn);
            if sn == end || lost.len() >= MAX_NAK_EXPANSION {
                break;
            }
            sn = SeqNumber::new_unchecked(sn).next().as_raw();
        }
        if lost.len() >= MAX_NAK_EXPANSION {
            tracing::trace!("NAK loss list truncated at {} entries", MAX_NAK_EXPANSION);
            break;
        }
    }
    lost
}

/// Decode the sequence numbers of an SRTLA ACK packet
///
/// The packet is a sequence of 32-bit words; the first holds the control
/// type, the rest are acknowledged sequence numbers. Packets whose length is
/// not a multiple of four are discarded.
pub fn parse_srtla_ack(packet: &[u8]) -> Vec<u32> {
    if packet.len() < 4 || packet.len() % 4 != 0 {
        return Vec::new();
    }
    packet[4..]
        .chunks_exact(4)
        .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}
