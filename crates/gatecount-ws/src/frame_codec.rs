//! Binary wire layout for frame-ingest messages:
//! `u16 id_len | device id (utf-8) | u32 width | u32 height | gray8 payload`,
//! all integers big-endian.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use gatecount_domain::{DomainError, DomainResult, Frame};

pub fn encode_frame(device_id: &str, frame: &Frame) -> DomainResult<Bytes> {
    if device_id.is_empty() || device_id.len() > u16::MAX as usize {
        return Err(DomainError::MalformedFrame(format!(
            "device id length {} out of range",
            device_id.len()
        )));
    }
    let mut buf = BytesMut::with_capacity(2 + device_id.len() + 8 + frame.data.len());
    buf.put_u16(device_id.len() as u16);
    buf.put_slice(device_id.as_bytes());
    buf.put_u32(frame.width);
    buf.put_u32(frame.height);
    buf.put_slice(&frame.data);
    Ok(buf.freeze())
}

pub fn decode_frame(mut buf: Bytes) -> DomainResult<(String, Frame)> {
    if buf.remaining() < 2 {
        return Err(DomainError::MalformedFrame("truncated header".to_string()));
    }
    let id_len = buf.get_u16() as usize;
    if id_len == 0 {
        return Err(DomainError::MalformedFrame("empty device id".to_string()));
    }
    if buf.remaining() < id_len + 8 {
        return Err(DomainError::MalformedFrame(format!(
            "message too short for id of {id_len} bytes"
        )));
    }
    let id_bytes = buf.split_to(id_len);
    let device_id = std::str::from_utf8(&id_bytes)
        .map_err(|_| DomainError::MalformedFrame("device id is not utf-8".to_string()))?
        .to_string();
    let width = buf.get_u32();
    let height = buf.get_u32();
    let frame = Frame::new(width, height, buf)?;
    Ok((device_id, frame))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_survive_the_wire() {
        let frame = Frame::new(3, 2, Bytes::from(vec![1, 2, 3, 4, 5, 6])).expect("frame");
        let encoded = encode_frame("gate-a", &frame).expect("encoded");
        let (device_id, decoded) = decode_frame(encoded).expect("decoded");
        assert_eq!(device_id, "gate-a");
        assert_eq!(decoded, frame);
    }

    #[test]
    fn truncated_messages_are_rejected() {
        assert!(matches!(
            decode_frame(Bytes::from_static(&[0x00])),
            Err(DomainError::MalformedFrame(_))
        ));
        // header claims a 10-byte id but the buffer ends early
        assert!(matches!(
            decode_frame(Bytes::from_static(&[0x00, 0x0a, b'a', b'b'])),
            Err(DomainError::MalformedFrame(_))
        ));
    }

    #[test]
    fn empty_device_id_is_rejected() {
        let frame = Frame::new(1, 1, Bytes::from(vec![0])).expect("frame");
        assert!(encode_frame("", &frame).is_err());
        assert!(matches!(
            decode_frame(Bytes::from_static(&[0x00, 0x00, 0, 0, 0, 1, 0, 0, 0, 1, 9])),
            Err(DomainError::MalformedFrame(_))
        ));
    }

    #[test]
    fn payload_length_must_match_dimensions() {
        let frame = Frame::new(2, 2, Bytes::from(vec![0; 4])).expect("frame");
        let encoded = encode_frame("gate-a", &frame).expect("encoded");
        // drop the last payload byte
        let clipped = encoded.slice(..encoded.len() - 1);
        assert!(matches!(
            decode_frame(clipped),
            Err(DomainError::MalformedFrame(_))
        ));
    }

    #[test]
    fn non_utf8_device_id_is_rejected() {
        assert!(matches!(
            decode_frame(Bytes::from_static(&[
                0x00, 0x02, 0xff, 0xfe, 0, 0, 0, 1, 0, 0, 0, 1, 9
            ])),
            Err(DomainError::MalformedFrame(_))
        ));
    }
}
