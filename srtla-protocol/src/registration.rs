//! SRTLA Registration Handshake Frames
//!
//! A client opens a bonded group by sending `reg1` with a random 256-byte
//! group id on one link. The server answers `reg2` carrying the definitive
//! group id: the client's first 128 bytes followed by 128 server-chosen
//! bytes. Every link then registers itself with `reg2` and is confirmed with
//! `reg3`. Keepalives are bare control frames.

use crate::packet::{PacketError, SrtlaPacketType, CONTROL_TYPE_SIZE};
use bytes::Bytes;

/// Size of the group correlation identifier in bytes
pub const GROUP_ID_SIZE: usize = 256;

/// Size of a reg1/reg2 frame (control type + group id)
pub const REG_PACKET_SIZE: usize = CONTROL_TYPE_SIZE + GROUP_ID_SIZE;

fn create_control_frame(packet_type: SrtlaPacketType, payload: &[u8]) -> Bytes {
    let mut packet = Vec::with_capacity(CONTROL_TYPE_SIZE + payload.len());
    packet.extend_from_slice(&packet_type.as_u16().to_be_bytes());
    packet.extend_from_slice(payload);
    Bytes::from(packet)
}

/// Build a keepalive frame
pub fn create_keepalive() -> Bytes {
    create_control_frame(SrtlaPacketType::Keepalive, &[])
}

/// Build a reg1 (create group) frame
///
/// # Panics
/// Panics if `group_id` is not exactly [`GROUP_ID_SIZE`] bytes.
pub fn create_reg1(group_id: &[u8]) -> Bytes {
    assert_eq!(group_id.len(), GROUP_ID_SIZE);
    create_control_frame(SrtlaPacketType::Reg1, group_id)
}

/// Build a reg2 (register connection) frame
///
/// # Panics
/// Panics if `group_id` is not exactly [`GROUP_ID_SIZE`] bytes.
pub fn create_reg2(group_id: &[u8]) -> Bytes {
    assert_eq!(group_id.len(), GROUP_ID_SIZE);
    create_control_frame(SrtlaPacketType::Reg2, group_id)
}

/// Decode a server reg2 frame and return the definitive group id
///
/// The server must echo the first half of the group id the client proposed
/// in reg1; a mismatch means the frame answers someone else's request.
pub fn parse_reg2(packet: &[u8], requested_group_id: &[u8]) -> Result<Bytes, PacketError> {
    if packet.len() != REG_PACKET_SIZE {
        return Err(PacketError::WrongLength {
            expected: REG_PACKET_SIZE,
            actual: packet.len(),
        });
    }
    if requested_group_id.len() != GROUP_ID_SIZE {
        return Err(PacketError::GroupIdMismatch);
    }
    let echoed = &packet[CONTROL_TYPE_SIZE..CONTROL_TYPE_SIZE + GROUP_ID_SIZE / 2];
    if echoed != &requested_group_id[..GROUP_ID_SIZE / 2] {
        return Err(PacketError::GroupIdMismatch);
    }
    Ok(Bytes::copy_from_slice(&packet[CONTROL_TYPE_SIZE..]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{control_type, is_data_packet};

    fn test_group_id(fill: u8) -> Vec<u8> {
        vec![fill; GROUP_ID_SIZE]
    }

    #[test]
    fn test_create_reg1() {
        let group_id = test_group_id(0xAB);
        let packet = create_reg1(&group_id);
        assert_eq!(packet.len(), REG_PACKET_SIZE);
        assert_eq!(control_type(&packet), Some(SrtlaPacketType::Reg1.as_u16()));
        assert_eq!(&packet[CONTROL_TYPE_SIZE..], group_id.as_slice());
        assert!(!is_data_packet(&packet));
    }

    #[test]
    fn test_create_keepalive() {
        let packet = create_keepalive();
        assert_eq!(packet.len(), CONTROL_TYPE_SIZE);
        assert_eq!(
            control_type(&packet),
            Some(SrtlaPacketType::Keepalive.as_u16())
        );
    }

    #[test]
    fn test_parse_reg2_accepts_matching_half() {
        let requested = test_group_id(0x11);
        let mut definitive = requested.clone();
        for byte in definitive.iter_mut().skip(GROUP_ID_SIZE / 2) {
            *byte = 0x22;
        }
        let packet = create_reg2(&definitive);
        let group_id = parse_reg2(&packet, &requested).unwrap();
        assert_eq!(group_id.as_ref(), definitive.as_slice());
    }

    #[test]
    fn test_parse_reg2_rejects_wrong_length() {
        let requested = test_group_id(0x11);
        let result = parse_reg2(&[0x92, 0x01, 0x00], &requested);
        assert!(matches!(result, Err(PacketError::WrongLength { .. })));
    }

    #[test]
    fn test_parse_reg2_rejects_foreign_group() {
        let requested = test_group_id(0x11);
        let packet = create_reg2(&test_group_id(0x33));
        assert_eq!(
            parse_reg2(&packet, &requested),
            Err(PacketError::GroupIdMismatch)
        );
    }
}
