//! Audio wire protocol: `[type:1][length:2 BE][payload][crc32:4]`, CRC
//! computed over `type|length|payload` (spec.md §6.3).

use crate::error::AudioError;
use crc32fast::Hasher;

pub const SAMPLE_RATE: u32 = 48_000;
pub const BITS_PER_SAMPLE: u16 = 16;
pub const CHANNELS: u16 = 1;
pub const FRAME_MS: u32 = 20;
pub const FRAME_BYTES: usize = 1920; // 960 samples * 2 bytes

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Control = 1,
    AudioRx = 2,
    AudioTx = 3,
    Heartbeat = 4,
    HeartbeatAck = 5,
}

impl FrameType {
    fn from_byte(b: u8) -> Result<Self, AudioError> {
        match b {
            1 => Ok(FrameType::Control),
            2 => Ok(FrameType::AudioRx),
            3 => Ok(FrameType::AudioTx),
            4 => Ok(FrameType::Heartbeat),
            5 => Ok(FrameType::HeartbeatAck),
            _ => Err(AudioError::Rejected),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub frame_type: FrameType,
    pub payload: Vec<u8>,
}

impl AudioFrame {
    pub fn new(frame_type: FrameType, payload: Vec<u8>) -> Self {
        Self { frame_type, payload }
    }

    /// Encodes this frame to the wire format, appending the CRC32 trailer.
    pub fn encode(&self) -> Vec<u8> {
        let len = self.payload.len() as u16;
        let mut buf = Vec::with_capacity(3 + self.payload.len() + 4);
        buf.push(self.frame_type as u8);
        buf.extend_from_slice(&len.to_be_bytes());
        buf.extend_from_slice(&self.payload);

        let mut hasher = Hasher::new();
        hasher.update(&buf);
        buf.extend_from_slice(&hasher.finalize().to_be_bytes());
        buf
    }

    /// Decodes one frame from `buf`, returning the frame and bytes consumed.
    /// Returns `Ok(None)` if `buf` doesn't yet hold a complete frame.
    pub fn decode(buf: &[u8]) -> Result<Option<(Self, usize)>, AudioError> {
        if buf.len() < 3 {
            return Ok(None);
        }
        let len = u16::from_be_bytes([buf[1], buf[2]]) as usize;
        let total = 3 + len + 4;
        if buf.len() < total {
            return Ok(None);
        }

        let header_and_payload = &buf[..3 + len];
        let crc_bytes = &buf[3 + len..total];
        let expected = u32::from_be_bytes(crc_bytes.try_into().expect("slice is 4 bytes"));

        let mut hasher = Hasher::new();
        hasher.update(header_and_payload);
        if hasher.finalize() != expected {
            return Err(AudioError::CrcMismatch);
        }

        let frame_type = FrameType::from_byte(buf[0])?;
        let payload = header_and_payload[3..].to_vec();
        Ok(Some((AudioFrame::new(frame_type, payload), total)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Busy,
    Rejected,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    ConnectRequest,
    ConnectAccept,
    ConnectReject(RejectReason),
    AudioConfig { sample_rate: u32, bits: u16, channels: u16, frame_ms: u32 },
    Disconnect,
    LatencyProbe { timestamp_ms: u64 },
    LatencyResponse { timestamp_ms: u64 },
    Error(String),
}

impl ControlMessage {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            ControlMessage::ConnectRequest => vec![0],
            ControlMessage::ConnectAccept => vec![1],
            ControlMessage::ConnectReject(reason) => {
                vec![2, match reason { RejectReason::Busy => 0, RejectReason::Rejected => 1 }]
            }
            ControlMessage::AudioConfig { sample_rate, bits, channels, frame_ms } => {
                let mut buf = vec![3];
                buf.extend_from_slice(&sample_rate.to_be_bytes());
                buf.extend_from_slice(&bits.to_be_bytes());
                buf.extend_from_slice(&channels.to_be_bytes());
                buf.extend_from_slice(&frame_ms.to_be_bytes());
                buf
            }
            ControlMessage::Disconnect => vec![4],
            ControlMessage::LatencyProbe { timestamp_ms } => {
                let mut buf = vec![5];
                buf.extend_from_slice(&timestamp_ms.to_be_bytes());
                buf
            }
            ControlMessage::LatencyResponse { timestamp_ms } => {
                let mut buf = vec![6];
                buf.extend_from_slice(&timestamp_ms.to_be_bytes());
                buf
            }
            ControlMessage::Error(message) => {
                let mut buf = vec![7];
                buf.extend_from_slice(message.as_bytes());
                buf
            }
        }
    }

    pub fn decode(buf: &[u8]) -> Result<Self, AudioError> {
        let (tag, rest) = buf.split_first().ok_or(AudioError::Rejected)?;
        match tag {
            0 => Ok(ControlMessage::ConnectRequest),
            1 => Ok(ControlMessage::ConnectAccept),
            2 => {
                let reason = match rest.first() {
                    Some(0) => RejectReason::Busy,
                    Some(1) => RejectReason::Rejected,
                    _ => return Err(AudioError::Rejected),
                };
                Ok(ControlMessage::ConnectReject(reason))
            }
            3 => {
                if rest.len() < 12 {
                    return Err(AudioError::Rejected);
                }
                Ok(ControlMessage::AudioConfig {
                    sample_rate: u32::from_be_bytes(rest[0..4].try_into().unwrap()),
                    bits: u16::from_be_bytes(rest[4..6].try_into().unwrap()),
                    channels: u16::from_be_bytes(rest[6..8].try_into().unwrap()),
                    frame_ms: u32::from_be_bytes(rest[8..12].try_into().unwrap()),
                })
            }
            4 => Ok(ControlMessage::Disconnect),
            5 => {
                if rest.len() < 8 {
                    return Err(AudioError::Rejected);
                }
                Ok(ControlMessage::LatencyProbe {
                    timestamp_ms: u64::from_be_bytes(rest[0..8].try_into().unwrap()),
                })
            }
            6 => {
                if rest.len() < 8 {
                    return Err(AudioError::Rejected);
                }
                Ok(ControlMessage::LatencyResponse {
                    timestamp_ms: u64::from_be_bytes(rest[0..8].try_into().unwrap()),
                })
            }
            7 => Ok(ControlMessage::Error(String::from_utf8_lossy(rest).to_string())),
            _ => Err(AudioError::Rejected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_round_trips_through_encode_decode() {
        let frame = AudioFrame::new(FrameType::AudioTx, vec![0u8; FRAME_BYTES]);
        let wire = frame.encode();
        let (decoded, consumed) = AudioFrame::decode(&wire).unwrap().unwrap();
        assert_eq!(consumed, wire.len());
        assert_eq!(decoded.frame_type, FrameType::AudioTx);
        assert_eq!(decoded.payload.len(), FRAME_BYTES);
    }

    #[test]
    fn decode_returns_none_on_incomplete_buffer() {
        let frame = AudioFrame::new(FrameType::Heartbeat, vec![]);
        let wire = frame.encode();
        assert!(AudioFrame::decode(&wire[..wire.len() - 1]).unwrap().is_none());
    }

    #[test]
    fn decode_rejects_corrupted_crc() {
        let frame = AudioFrame::new(FrameType::AudioTx, vec![1, 2, 3]);
        let mut wire = frame.encode();
        let last = wire.len() - 1;
        wire[last] ^= 0xFF;
        assert!(matches!(AudioFrame::decode(&wire), Err(AudioError::CrcMismatch)));
    }

    #[test]
    fn control_message_round_trips() {
        let messages = [
            ControlMessage::ConnectRequest,
            ControlMessage::ConnectAccept,
            ControlMessage::ConnectReject(RejectReason::Busy),
            ControlMessage::AudioConfig { sample_rate: 48_000, bits: 16, channels: 1, frame_ms: 20 },
            ControlMessage::Disconnect,
            ControlMessage::LatencyProbe { timestamp_ms: 123_456 },
            ControlMessage::LatencyResponse { timestamp_ms: 654_321 },
        ];
        for msg in messages {
            let encoded = msg.encode();
            assert_eq!(ControlMessage::decode(&encoded).unwrap(), msg);
        }
    }
}
