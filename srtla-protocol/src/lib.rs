//! SRTLA Wire Protocol
//!
//! This crate implements the client side of the SRTLA bonding wire protocol:
//! packet classification (SRT data vs SRT/SRTLA control), the reg1/reg2/reg3
//! registration handshake frames, SRTLA acknowledgement lists, SRT ACK/NAK
//! decoding, and 31-bit sequence number arithmetic.

pub mod packet;
pub mod registration;
pub mod sequence;

pub use packet::{
    control_type, data_sequence_number, is_data_packet, parse_srt_ack, parse_srt_nak,
    parse_srtla_ack, PacketError, SrtControlType, SrtlaPacketType, CONTROL_TYPE_SIZE,
    SRT_HEADER_SIZE,
};
pub use registration::{
    create_keepalive, create_reg1, create_reg2, parse_reg2, GROUP_ID_SIZE, REG_PACKET_SIZE,
};
pub use sequence::{is_sn_acked, SeqNumber, MAX_SEQ_NUMBER};
