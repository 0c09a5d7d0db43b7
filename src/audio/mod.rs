//! Audio subsystem module

pub mod buffer;
pub mod device;
pub mod format;
pub mod playback;

pub use buffer::RingBuffer;
pub use format::{ByteOrder, StreamFormat};
pub use playback::{PcmPlayback, PlaybackState};
