/// Per-session accumulator for raw audio bytes.
///
/// Frames append here until the controller drains the buffer into one
/// transcription invocation. The buffer performs no format validation;
/// malformed audio is the transcription backend's concern. Not synchronized:
/// the session controller is the only caller by construction.
#[derive(Debug, Default)]
pub struct AudioBuffer {
    bytes: Vec<u8>,
}

impl AudioBuffer {
    pub fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    /// Append one frame's payload.
    pub fn append(&mut self, payload: &[u8]) {
        self.bytes.extend_from_slice(payload);
    }

    /// Take everything accumulated so far and reset the buffer.
    pub fn drain(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.bytes)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
