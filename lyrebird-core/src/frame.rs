//! Fixed-size audio frame assembly

/// A slice of encoded audio in the configured encoding.
///
/// The payload is delivered unmodified; duration is implied by its length
/// and the encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    pub data: Vec<u8>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFrame {
    pub fn empty(sample_rate: u32, channels: u16) -> Self {
        Self {
            data: Vec::new(),
            sample_rate,
            channels,
        }
    }
}

/// Accumulates raw encoded audio bytes and slices them into fixed-size
/// frames, in arrival order.
///
/// Pure buffering: bytes are never reordered or dropped, and concatenating
/// every emitted frame (including the [`flush`](Self::flush) remainder)
/// reconstructs the input exactly.
pub struct FrameAssembler {
    buffer: Vec<u8>,
    frame_size: usize,
    sample_rate: u32,
    channels: u16,
}

impl FrameAssembler {
    pub fn new(frame_size: usize, sample_rate: u32, channels: u16) -> Self {
        Self {
            buffer: Vec::new(),
            frame_size,
            sample_rate,
            channels,
        }
    }

    /// Append bytes and return every complete frame now available.
    pub fn write(&mut self, bytes: &[u8]) -> Vec<AudioFrame> {
        self.buffer.extend_from_slice(bytes);

        let mut frames = Vec::new();
        while self.buffer.len() >= self.frame_size {
            let rest = self.buffer.split_off(self.frame_size);
            let data = std::mem::replace(&mut self.buffer, rest);
            frames.push(AudioFrame {
                data,
                sample_rate: self.sample_rate,
                channels: self.channels,
            });
        }
        frames
    }

    /// Emit all remaining buffered bytes as one partial frame and reset the
    /// buffer. Returns None when nothing is buffered.
    pub fn flush(&mut self) -> Option<AudioFrame> {
        if self.buffer.is_empty() {
            return None;
        }
        Some(AudioFrame {
            data: std::mem::take(&mut self.buffer),
            sample_rate: self.sample_rate,
            channels: self.channels,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assembler(frame_size: usize) -> FrameAssembler {
        FrameAssembler::new(frame_size, 48000, 1)
    }

    fn concat(frames: &[AudioFrame]) -> Vec<u8> {
        frames.iter().flat_map(|f| f.data.clone()).collect()
    }

    #[test]
    fn short_write_emits_nothing() {
        let mut asm = assembler(10);
        assert!(asm.write(&[1, 2, 3]).is_empty());
    }

    #[test]
    fn exact_multiple_emits_full_frames() {
        let mut asm = assembler(4);
        let frames = asm.write(&[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].data, vec![1, 2, 3, 4]);
        assert_eq!(frames[1].data, vec![5, 6, 7, 8]);
        assert!(asm.flush().is_none());
    }

    #[test]
    fn remainder_stays_buffered_until_flush() {
        let mut asm = assembler(4);
        let frames = asm.write(&[1, 2, 3, 4, 5]);
        assert_eq!(frames.len(), 1);

        let rest = asm.flush().expect("remainder expected");
        assert_eq!(rest.data, vec![5]);
        // flush resets the buffer
        assert!(asm.flush().is_none());
    }

    #[test]
    fn round_trip_across_uneven_writes() {
        let input: Vec<u8> = (0..=255).collect();
        let mut asm = assembler(7);

        let mut out = Vec::new();
        for chunk in input.chunks(13) {
            out.extend(concat(&asm.write(chunk)));
        }
        if let Some(rest) = asm.flush() {
            out.extend(rest.data);
        }
        assert_eq!(out, input);
    }

    #[test]
    fn frames_carry_format_tags() {
        let mut asm = FrameAssembler::new(2, 16000, 1);
        let frames = asm.write(&[0, 0]);
        assert_eq!(frames[0].sample_rate, 16000);
        assert_eq!(frames[0].channels, 1);
    }
}
