//! Synthetic audio containers for hidden payloads.
//!
//! [`WavCarrier`] writes a 16-bit mono PCM file of random noise and stores the
//! payload in the least significant bit of each sample: 32 samples of
//! little-endian length prefix, then the payload bytes, low bit first. The
//! resource loader template reads the same layout back.

use rand::rngs::StdRng;
use rand::Rng;
use shroud_utils::errors::RewriteError;

const SAMPLE_RATE: u32 = 44_100;
const HEADER_LEN: usize = 44;
const LENGTH_BITS: usize = 32;

/// Hides a byte payload inside a container and recovers it.
pub trait Carrier {
    /// Container file extension, used when packaging resources.
    fn extension(&self) -> &'static str;
    fn encode(&self, payload: &[u8], rng: &mut StdRng) -> Result<Vec<u8>, RewriteError>;
    fn decode(&self, container: &[u8]) -> Result<Vec<u8>, RewriteError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WavCarrier;

impl Carrier for WavCarrier {
    fn extension(&self) -> &'static str {
        "wav"
    }

    fn encode(&self, payload: &[u8], rng: &mut StdRng) -> Result<Vec<u8>, RewriteError> {
        let length = u32::try_from(payload.len())
            .map_err(|_| RewriteError::Carrier(format!("payload of {} bytes is too large", payload.len())))?;
        let samples = LENGTH_BITS + payload.len() * 8;
        let data_len = u32::try_from(samples * 2)
            .map_err(|_| RewriteError::Carrier("container exceeds 4 GiB".to_string()))?;

        let mut out = Vec::with_capacity(HEADER_LEN + samples * 2);
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes()); // PCM
        out.extend_from_slice(&1u16.to_le_bytes()); // mono
        out.extend_from_slice(&SAMPLE_RATE.to_le_bytes());
        out.extend_from_slice(&(SAMPLE_RATE * 2).to_le_bytes());
        out.extend_from_slice(&2u16.to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());

        let length_bits = (0..LENGTH_BITS).map(|i| (length >> i) & 1 == 1);
        let payload_bits = payload
            .iter()
            .flat_map(|byte| (0..8).map(move |i| (byte >> i) & 1 == 1));
        for bit in length_bits.chain(payload_bits) {
            // Quiet noise keeps the file looking like a recording.
            let noise: i16 = rng.random_range(-2048..2048);
            let sample = (noise & !1) | i16::from(bit);
            out.extend_from_slice(&sample.to_le_bytes());
        }
        Ok(out)
    }

    fn decode(&self, container: &[u8]) -> Result<Vec<u8>, RewriteError> {
        let data = data_chunk(container)?;
        let bit = |index: usize| -> Result<u8, RewriteError> {
            data.get(index * 2)
                .map(|low| low & 1)
                .ok_or_else(|| RewriteError::Carrier("container is truncated".to_string()))
        };

        let mut length = 0usize;
        for i in 0..LENGTH_BITS {
            length |= usize::from(bit(i)?) << i;
        }
        let mut payload = Vec::with_capacity(length);
        for byte_index in 0..length {
            let mut byte = 0u8;
            for i in 0..8 {
                byte |= bit(LENGTH_BITS + byte_index * 8 + i)? << i;
            }
            payload.push(byte);
        }
        Ok(payload)
    }
}

/// Sample bytes of the `data` chunk.
fn data_chunk(container: &[u8]) -> Result<&[u8], RewriteError> {
    if container.len() < 12 || &container[0..4] != b"RIFF" || &container[8..12] != b"WAVE" {
        return Err(RewriteError::Carrier("not a RIFF/WAVE container".to_string()));
    }
    let mut offset = 12;
    while offset + 8 <= container.len() {
        let id = &container[offset..offset + 4];
        let mut size = [0u8; 4];
        size.copy_from_slice(&container[offset + 4..offset + 8]);
        let size = u32::from_le_bytes(size) as usize;
        let body = offset + 8;
        if id == b"data" {
            let end = body.saturating_add(size).min(container.len());
            return Ok(&container[body..end]);
        }
        offset = body.saturating_add(size + (size & 1));
    }
    Err(RewriteError::Carrier("no data chunk".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn decode_inverts_encode() {
        let mut rng = StdRng::seed_from_u64(3);
        let payload = "x".repeat(1500).into_bytes();
        let wav = WavCarrier.encode(&payload, &mut rng).unwrap();
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(wav.len(), HEADER_LEN + (32 + payload.len() * 8) * 2);
        assert_eq!(WavCarrier.decode(&wav).unwrap(), payload);
    }

    #[test]
    fn empty_payload_round_trips() {
        let mut rng = StdRng::seed_from_u64(0);
        let wav = WavCarrier.encode(&[], &mut rng).unwrap();
        assert!(WavCarrier.decode(&wav).unwrap().is_empty());
    }

    #[test]
    fn rejects_foreign_containers() {
        assert!(WavCarrier.decode(b"PK\x03\x04 not audio").is_err());
        let mut rng = StdRng::seed_from_u64(1);
        let mut wav = WavCarrier.encode(b"payload", &mut rng).unwrap();
        wav.truncate(HEADER_LEN + 40);
        assert!(WavCarrier.decode(&wav).is_err());
    }
}
