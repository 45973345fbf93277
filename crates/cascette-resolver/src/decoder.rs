//! Payload decoding boundary
//!
//! Blocks in data shards are usually BLTE framed. Decoding that framing is
//! not done here; callers plug in a [`PayloadDecoder`].

use crate::Result;

/// Turns a framed block payload into file bytes.
pub trait PayloadDecoder: Send + Sync {
    /// Decode one framed payload.
    fn decode(&self, framed: &[u8]) -> Result<Vec<u8>>;
}

/// Decoder for payloads stored without framing.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawPayload;

impl PayloadDecoder for RawPayload {
    fn decode(&self, framed: &[u8]) -> Result<Vec<u8>> {
        Ok(framed.to_vec())
    }
}

impl<F> PayloadDecoder for F
where
    F: Fn(&[u8]) -> Result<Vec<u8>> + Send + Sync,
{
    fn decode(&self, framed: &[u8]) -> Result<Vec<u8>> {
        self(framed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::StorageError;

    #[test]
    fn raw_is_identity() {
        assert_eq!(RawPayload.decode(b"abc").unwrap(), b"abc".to_vec());
    }

    #[test]
    fn closures_decode() {
        let upper = |data: &[u8]| -> Result<Vec<u8>> { Ok(data.to_ascii_uppercase()) };
        assert_eq!(upper.decode(b"abc").unwrap(), b"ABC".to_vec());

        let failing = |_: &[u8]| -> Result<Vec<u8>> { Err(StorageError::Decode("bad magic".into())) };
        assert!(matches!(failing.decode(b""), Err(StorageError::Decode(_))));
    }
}
