pub mod buffer;
pub mod wav;

pub use buffer::AudioBuffer;
pub use wav::{encode_pcm16, samples_from_le_bytes, SAMPLE_RATE};
