use base64::Engine;

/// The realtime API and both transports carry 24 kHz mono PCM16.
pub const PCM16_SAMPLE_RATE: u32 = 24_000;
pub const PCM16_CHANNELS: u32 = 1;

/// Interprets little-endian byte pairs as i16 samples. A trailing odd byte is dropped.
pub fn i16_from_le_bytes(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
        .collect()
}

pub fn i16_to_le_bytes(pcm16: &[i16]) -> Vec<u8> {
    pcm16
        .iter()
        .flat_map(|&sample| sample.to_le_bytes())
        .collect()
}

// Basic encoding/decoding for i16 (the realtime API's audio payload format)
pub fn encode_i16(pcm16: &[i16]) -> String {
    base64::engine::general_purpose::STANDARD.encode(i16_to_le_bytes(pcm16))
}

pub fn decode_i16(base64_fragment: &str) -> Vec<i16> {
    if let Ok(pcm16_bytes) = base64::engine::general_purpose::STANDARD.decode(base64_fragment) {
        i16_from_le_bytes(&pcm16_bytes)
    } else {
        tracing::error!("Failed to decode base64 fragment to i16");
        Vec::new()
    }
}
