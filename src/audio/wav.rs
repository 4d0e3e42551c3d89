use std::io::Cursor;

use crate::error::Result;

/// Expected stream format: 16 kHz mono signed 16-bit little-endian PCM.
pub const SAMPLE_RATE: u32 = 16_000;
pub const CHANNELS: u16 = 1;
pub const BITS_PER_SAMPLE: u16 = 16;

/// Wrap raw PCM bytes in a WAV container, in memory.
///
/// Cloud transcription endpoints want a file upload, not a bare sample
/// stream, so the drained session buffer gets a minimal RIFF header before
/// it goes out. A trailing odd byte (half a sample) is dropped.
pub fn encode_pcm16(pcm: &[u8]) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: CHANNELS,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: BITS_PER_SAMPLE,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for sample in samples_from_le_bytes(pcm) {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
    }

    Ok(cursor.into_inner())
}

/// Reinterpret little-endian PCM bytes as i16 samples.
pub fn samples_from_le_bytes(pcm: &[u8]) -> Vec<i16> {
    pcm.chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}
