//! Length-prefixed framing for RPC messages (spec.md §6): each message is
//! a 4-byte big-endian length prefix followed by that many bytes of
//! `bincode`-serialized payload, the same wire shape the block model
//! already uses end to end (`Block::to_bytes`/`from_bytes`).

use std::convert::TryFrom;
use std::io::{self, Read, Write};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};

/// Bound on a single frame, guarding against a corrupt or hostile length
/// prefix forcing an unbounded allocation.
pub const MAX_FRAME_LEN: u32 = 64 << 20;

/// Serialize `message` and write it to `out` as one length-prefixed frame.
pub fn write_frame<T: Serialize, W: Write>(out: &mut W, message: &T) -> Result<()> {
    let payload = bincode::serialize(message)?;
    let len = u32::try_from(payload.len())
        .map_err(|_| Error::InvalidArgument("message too large to frame".into()))?;
    out.write_all(&len.to_be_bytes())?;
    out.write_all(&payload)?;
    Ok(())
}

/// Read one length-prefixed frame from `input` and deserialize it.
pub fn read_frame<T: DeserializeOwned, R: Read>(input: &mut R) -> Result<T> {
    let mut len_bytes = [0u8; 4];
    input.read_exact(&mut len_bytes)?;
    let len = u32::from_be_bytes(len_bytes);
    if len > MAX_FRAME_LEN {
        return Err(Error::InvalidArgument(format!(
            "frame of {} bytes exceeds the {} byte limit",
            len, MAX_FRAME_LEN
        )));
    }

    let mut payload = vec![0u8; len as usize];
    input.read_exact(&mut payload)?;
    Ok(bincode::deserialize(&payload)?)
}

/// Encode a single frame to a fresh buffer, for transports that hand off
/// whole datagrams rather than a streaming `Write`.
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    write_frame(&mut buf, message)?;
    Ok(buf)
}

/// Decode a single frame from a buffer that holds exactly one frame (plus
/// optionally trailing bytes, which are ignored).
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let mut cursor = io::Cursor::new(bytes);
    read_frame(&mut cursor)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::rpc::{Envelope, Request, StoreMode};

    #[test]
    fn round_trips_a_store_request_through_a_stream() {
        let kp = KeyPair::generate().unwrap();
        let chb = crate::block::Chb::seal(b"payload".to_vec(), &kp);
        let request = Envelope::new(
            7,
            Request::Store {
                block: crate::block::Block::Chb(chb),
                mode: StoreMode::InsertOnly,
            },
        );

        let mut buf = Vec::new();
        write_frame(&mut buf, &request).unwrap();

        let mut cursor = io::Cursor::new(buf);
        let decoded: Envelope<Request> = read_frame(&mut cursor).unwrap();
        assert_eq!(decoded.id, 7);
        match decoded.body {
            Request::Store { mode, .. } => assert_eq!(mode, StoreMode::InsertOnly),
            _ => panic!("expected Store"),
        }
    }

    #[test]
    fn oversized_length_prefix_is_rejected_before_allocating() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(MAX_FRAME_LEN + 1).to_be_bytes());
        let mut cursor = io::Cursor::new(buf);
        let result: Result<Request> = read_frame(&mut cursor);
        assert!(result.is_err());
    }

    #[test]
    fn two_frames_back_to_back_decode_independently() {
        let a = Envelope::new(1, Request::Fetch { address: crate::address::Address::new([0u8; 32], false, false), version: None });
        let b = Envelope::new(2, Request::Remove { address: crate::address::Address::new([1u8; 32], false, false), signature: vec![9, 9] });

        let mut buf = Vec::new();
        write_frame(&mut buf, &a).unwrap();
        write_frame(&mut buf, &b).unwrap();

        let mut cursor = io::Cursor::new(buf);
        let first: Envelope<Request> = read_frame(&mut cursor).unwrap();
        let second: Envelope<Request> = read_frame(&mut cursor).unwrap();
        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
    }
}
