//! Decoding of synthesized speech payloads into playable samples.
//!
//! The synthesis service returns 16-bit little-endian PCM; playback
//! works in mono f32 end to end, so payloads are converted once here.

use base64::Engine;

use crate::error::{AssistError, Result};

/// Decode a base64 string into raw bytes.
///
/// # Errors
///
/// Returns an audio error on invalid base64.
pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|e| AssistError::Audio(format!("invalid base64 audio: {e}")))
}

/// Convert s16le PCM bytes to f32 samples in \[-1, 1\].
///
/// A trailing odd byte is an encoding fault and is rejected rather than
/// silently dropped.
///
/// # Errors
///
/// Returns an audio error if the payload length is odd.
pub fn pcm16_to_f32(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 2 != 0 {
        return Err(AssistError::Audio(format!(
            "PCM payload has odd length: {}",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32_768.0)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_round_trip() {
        let decoded = decode_base64("AAEC");
        match decoded {
            Ok(bytes) => assert_eq!(bytes, vec![0x00, 0x01, 0x02]),
            Err(_) => unreachable!("valid base64 decodes"),
        }
    }

    #[test]
    fn invalid_base64_is_an_audio_error() {
        let result = decode_base64("not base64!!!");
        assert!(matches!(result, Err(AssistError::Audio(_))));
    }

    #[test]
    fn pcm_conversion_scales_to_unit_range() {
        // 0, i16::MAX, i16::MIN as little-endian pairs.
        let bytes = [0x00, 0x00, 0xFF, 0x7F, 0x00, 0x80];
        let samples = match pcm16_to_f32(&bytes) {
            Ok(s) => s,
            Err(_) => unreachable!("even-length payload converts"),
        };
        assert_eq!(samples.len(), 3);
        assert!((samples[0] - 0.0).abs() < f32::EPSILON);
        assert!((samples[1] - (32_767.0 / 32_768.0)).abs() < 1e-6);
        assert!((samples[2] - (-1.0)).abs() < 1e-6);
    }

    #[test]
    fn odd_length_payload_rejected() {
        let result = pcm16_to_f32(&[0x00, 0x01, 0x02]);
        assert!(matches!(result, Err(AssistError::Audio(_))));
    }

    #[test]
    fn empty_payload_is_empty_samples() {
        match pcm16_to_f32(&[]) {
            Ok(s) => assert!(s.is_empty()),
            Err(_) => unreachable!("empty payload converts"),
        }
    }
}
