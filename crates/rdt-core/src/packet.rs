//! Wire format for every datagram exchanged between sender and receiver.
//!
//! ```text
//! +----------------+---------------------------+-------------------------+
//! | seq (i32, LE)  | control                   | payload                 |
//! | 4 bytes        | "FIRST" (5) / checksum (10)| rest of the datagram    |
//! |                | / "DONE" (4, no payload)  |                         |
//! +----------------+---------------------------+-------------------------+
//! ```
//!
//! There is no length prefix: the payload is whatever follows the control
//! field. The decoder recognises `FIRST` by its literal bytes at offset 4 and
//! otherwise takes the next ten bytes as the control field. `DONE` is not
//! special to the codec; it decodes as a short control field and callers
//! compare it against [`DONE`] themselves.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::checksum::{self, CHECKSUM_LEN};
use crate::error::PacketError;

/// Bytes used by the sequence number.
pub const SEQ_LEN: usize = 4;

/// Control literal opening a session; its payload is the bootstrap string.
pub const FIRST: &[u8] = b"FIRST";

/// Control literal closing a session; carries no payload.
pub const DONE: &[u8] = b"DONE";

/// Transport limit for a single datagram.
pub const MAX_DATAGRAM: usize = 1024;

/// Smallest well-formed datagram: a sequence number followed by `DONE`.
pub const MIN_DATAGRAM: usize = SEQ_LEN + DONE.len();

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub seq: i32,
    pub control: Bytes,
    pub payload: Bytes,
}

impl Packet {
    pub fn new(seq: i32, control: impl Into<Bytes>, payload: impl Into<Bytes>) -> Self {
        Self {
            seq,
            control: control.into(),
            payload: payload.into(),
        }
    }

    /// Session-opening packet. The checksum is bypassed.
    pub fn first(seq: i32, bootstrap: impl Into<Bytes>) -> Self {
        Self::new(seq, Bytes::from_static(FIRST), bootstrap)
    }

    pub fn done(seq: i32) -> Self {
        Self::new(seq, Bytes::from_static(DONE), Bytes::new())
    }

    /// Data packet with a freshly computed checksum.
    pub fn data(seq: i32, payload: impl Into<Bytes>) -> Result<Self, PacketError> {
        let payload = payload.into();
        let checksum = checksum::compute(&payload)?;
        Ok(Self::new(seq, Bytes::copy_from_slice(&checksum), payload))
    }

    /// Acknowledgement carrying `seq`, with a checksummed `"ACK - <seq>"` payload.
    pub fn ack(seq: i32) -> Result<Self, PacketError> {
        Self::data(seq, format!("ACK - {seq}"))
    }

    pub fn has_valid_checksum(&self) -> bool {
        checksum::verify(&self.control, &self.payload)
    }

    pub fn encode(&self) -> Result<Bytes, PacketError> {
        encode(self.seq, &self.control, &self.payload)
    }

    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        decode(buf)
    }
}

/// Concatenate `seq`, `control` and `payload` into one datagram.
///
/// `control` must be `FIRST`, `DONE` (with an empty payload) or a
/// checksum-shaped 10-byte field; anything else would not survive
/// [`decode`].
pub fn encode(seq: i32, control: &[u8], payload: &[u8]) -> Result<Bytes, PacketError> {
    let control_ok = control == FIRST
        || (control == DONE && payload.is_empty())
        || checksum::is_checksum_shaped(control);
    if !control_ok {
        return Err(PacketError::InvalidControl(
            String::from_utf8_lossy(control).into_owned(),
        ));
    }

    let len = SEQ_LEN + control.len() + payload.len();
    if len > MAX_DATAGRAM {
        return Err(PacketError::DatagramTooLarge { len });
    }

    let mut buf = BytesMut::with_capacity(len);
    buf.put_i32_le(seq);
    buf.put_slice(control);
    buf.put_slice(payload);
    Ok(buf.freeze())
}

pub fn decode(buf: &[u8]) -> Result<Packet, PacketError> {
    if buf.len() < MIN_DATAGRAM {
        return Err(PacketError::Truncated { len: buf.len() });
    }
    if buf.len() > MAX_DATAGRAM {
        return Err(PacketError::DatagramTooLarge { len: buf.len() });
    }

    let mut head = &buf[..SEQ_LEN];
    let seq = head.get_i32_le();

    let frame = Bytes::copy_from_slice(&buf[SEQ_LEN..]);
    let control_len = if frame.starts_with(FIRST) {
        FIRST.len()
    } else {
        CHECKSUM_LEN.min(frame.len())
    };

    Ok(Packet {
        seq,
        control: frame.slice(..control_len),
        payload: frame.slice(control_len..),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn first_layout() {
        let bytes = Packet::first(0, "txt:3").encode().unwrap();
        assert_eq!(&bytes[..4], &0i32.to_le_bytes());
        assert_eq!(&bytes[4..9], b"FIRST");
        assert_eq!(&bytes[9..], b"txt:3");

        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.control.as_ref(), FIRST);
        assert_eq!(decoded.payload.as_ref(), b"txt:3");
    }

    #[test]
    fn data_layout_is_little_endian() {
        let bytes = Packet::data(0x0102_0304, "hi").unwrap().encode().unwrap();
        assert_eq!(&bytes[..4], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&bytes[4..14], b"1111111101");
        assert_eq!(&bytes[14..], b"hi");
    }

    #[test]
    fn negative_sequence_survives() {
        let decoded = decode(&Packet::data(-7, "x").unwrap().encode().unwrap()).unwrap();
        assert_eq!(decoded.seq, -7);
    }

    #[test]
    fn done_decodes_as_short_control() {
        let bytes = Packet::done(1).encode().unwrap();
        assert_eq!(bytes.len(), MIN_DATAGRAM);
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.seq, 1);
        assert_eq!(decoded.control.as_ref(), DONE);
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn ack_payload_is_checksummed() {
        let ack = Packet::ack(3).unwrap();
        assert_eq!(ack.payload.as_ref(), b"ACK - 3");
        assert!(decode(&ack.encode().unwrap()).unwrap().has_valid_checksum());
    }

    #[test]
    fn undersized_datagrams_are_rejected() {
        assert_eq!(decode(&[]), Err(PacketError::Truncated { len: 0 }));
        assert_eq!(decode(&[0u8; 7]), Err(PacketError::Truncated { len: 7 }));
    }

    #[test]
    fn oversized_datagrams_are_rejected() {
        assert_eq!(
            decode(&[b'0'; MAX_DATAGRAM + 1]),
            Err(PacketError::DatagramTooLarge {
                len: MAX_DATAGRAM + 1
            })
        );
        let too_big = Packet::data(1, vec![0u8; 1011]).unwrap();
        assert_eq!(
            too_big.encode(),
            Err(PacketError::DatagramTooLarge { len: 1025 })
        );
    }

    #[test]
    fn bogus_control_is_refused() {
        assert!(matches!(
            encode(0, b"HELLO", b""),
            Err(PacketError::InvalidControl(_))
        ));
        assert!(matches!(
            encode(0, DONE, b"trailing"),
            Err(PacketError::InvalidControl(_))
        ));
    }

    #[test]
    fn full_chunk_fits() {
        let chunk = Packet::data(5, vec![7u8; 1000]).unwrap();
        let bytes = chunk.encode().unwrap();
        assert_eq!(bytes.len(), SEQ_LEN + CHECKSUM_LEN + 1000);
        assert_eq!(decode(&bytes).unwrap(), chunk);
    }

    proptest! {
        #[test]
        fn data_round_trip(seq in any::<i32>(), payload in proptest::collection::vec(any::<u8>(), 0..=1000)) {
            let packet = Packet::data(seq, payload).unwrap();
            let decoded = decode(&packet.encode().unwrap()).unwrap();
            prop_assert_eq!(decoded, packet);
        }

        #[test]
        fn first_round_trip(seq in any::<i32>(), ext in "[a-z0-9]{1,8}", total in 1u32..100_000) {
            let packet = Packet::first(seq, format!("{ext}:{total}"));
            let decoded = decode(&packet.encode().unwrap()).unwrap();
            prop_assert_eq!(decoded, packet);
        }
    }
}
