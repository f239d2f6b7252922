//! Bidirectional real-time audio bridge: wire protocol, jitter buffer,
//! device backends, and the per-session state machine.

pub mod device;
pub mod protocol;
pub mod ring_buffer;
pub mod server;

pub use device::{CaptureLine, CpalCaptureLine, CpalPlaybackLine, NullCaptureLine, NullPlaybackLine, PlaybackLine};
pub use protocol::{AudioFrame, ControlMessage, FrameType, RejectReason};
pub use ring_buffer::AudioRingBuffer;
pub use server::{AudioServer, AudioServerConfig, AudioStreamStats};
