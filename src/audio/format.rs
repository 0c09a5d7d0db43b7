//! Stream format description and wire byte-order correction

/// Byte order of 16-bit samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
}

impl ByteOrder {
    /// Byte order of the host (and therefore of cpal's `i16` buffers)
    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            ByteOrder::BigEndian
        } else {
            ByteOrder::LittleEndian
        }
    }
}

/// PCM stream format, established once during hardware configuration and
/// immutable from then on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    /// Byte order the samples arrive in on the wire
    pub wire_order: ByteOrder,
}

impl StreamFormat {
    /// Bytes per interleaved frame (channels x bytes-per-sample)
    pub fn frame_size(&self) -> usize {
        self.channels as usize * (self.bits_per_sample as usize / 8)
    }

    /// Bytes needed to hold `frames` interleaved frames
    pub fn bytes_for_frames(&self, frames: usize) -> usize {
        frames * self.frame_size()
    }

    /// Whether samples need byte swapping between wire and device
    pub fn needs_swap(&self) -> bool {
        self.wire_order != ByteOrder::native()
    }

    /// Rewrite wire-order samples to native order in place
    ///
    /// Runs on the ingestion thread so the render callback never touches
    /// sample bytes. Callers must pass an even-length slice; the ingestion
    /// loop carries torn-sample bytes across receives to guarantee that.
    pub fn correct_wire_order(&self, bytes: &mut [u8]) {
        if self.needs_swap() {
            swap_sample_bytes(bytes);
        }
    }
}

/// Swap the two bytes of every 16-bit sample in place
///
/// Self-inverse: applying it twice reproduces the input.
pub fn swap_sample_bytes(bytes: &mut [u8]) {
    for pair in bytes.chunks_exact_mut(2) {
        pair.swap(0, 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stereo_16(wire_order: ByteOrder) -> StreamFormat {
        StreamFormat {
            sample_rate: 44_100,
            channels: 2,
            bits_per_sample: 16,
            wire_order,
        }
    }

    #[test]
    fn frame_size_is_channels_times_sample_bytes() {
        let fmt = stereo_16(ByteOrder::LittleEndian);
        assert_eq!(fmt.frame_size(), 4);
        assert_eq!(fmt.bytes_for_frames(512), 2048);
    }

    #[test]
    fn swap_is_self_inverse() {
        let original: Vec<u8> = (0..32).collect();
        let mut bytes = original.clone();
        swap_sample_bytes(&mut bytes);
        assert_ne!(bytes, original);
        swap_sample_bytes(&mut bytes);
        assert_eq!(bytes, original);
    }

    #[test]
    fn swap_reorders_each_sample() {
        let mut bytes = [0x12, 0x34, 0xab, 0xcd];
        swap_sample_bytes(&mut bytes);
        assert_eq!(bytes, [0x34, 0x12, 0xcd, 0xab]);
    }

    #[test]
    fn correction_is_identity_when_orders_match() {
        let fmt = stereo_16(ByteOrder::native());
        let original: Vec<u8> = (0..16).collect();
        let mut bytes = original.clone();
        fmt.correct_wire_order(&mut bytes);
        assert_eq!(bytes, original);
    }

    #[test]
    fn correction_swaps_when_orders_differ() {
        let wire = match ByteOrder::native() {
            ByteOrder::LittleEndian => ByteOrder::BigEndian,
            ByteOrder::BigEndian => ByteOrder::LittleEndian,
        };
        let fmt = stereo_16(wire);
        let mut bytes = [0x01, 0x02];
        fmt.correct_wire_order(&mut bytes);
        assert_eq!(bytes, [0x02, 0x01]);
    }
}
