//! Capture/playback device backends, behind a small trait seam so
//! `AudioServer` is decoupled from the concrete audio I/O library — the
//! same role the teacher's `RadioController` trait plays for CAT backends.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::io;
use std::sync::mpsc as std_mpsc;
use std::time::Duration;

pub trait CaptureLine: Send {
    fn read_frame(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

pub trait PlaybackLine: Send {
    fn write_frame(&mut self, buf: &[u8]) -> io::Result<()>;
}

/// No-op capture line used when devices are unconfigured; this is what
/// drives `CONNECT_REJECT(REJECTED)` in the session state machine.
pub struct NullCaptureLine;

impl CaptureLine for NullCaptureLine {
    fn read_frame(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Ok(0)
    }
}

pub struct NullPlaybackLine;

impl PlaybackLine for NullPlaybackLine {
    fn write_frame(&mut self, _buf: &[u8]) -> io::Result<()> {
        Ok(())
    }
}

/// Captures from the default input device at 48kHz mono i16, bridging
/// `cpal`'s callback-driven stream into the blocking `read_frame` contract.
pub struct CpalCaptureLine {
    _stream: cpal::Stream,
    rx: std_mpsc::Receiver<Vec<u8>>,
}

impl CpalCaptureLine {
    pub fn open() -> Result<Self, cpal::BuildStreamError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(cpal::BuildStreamError::DeviceNotAvailable)?;
        let config = cpal::StreamConfig {
            channels: super::protocol::CHANNELS,
            sample_rate: cpal::SampleRate(super::protocol::SAMPLE_RATE),
            buffer_size: cpal::BufferSize::Default,
        };

        let (tx, rx) = std_mpsc::channel();
        let stream = device.build_input_stream(
            &config,
            move |data: &[i16], _| {
                let mut bytes = Vec::with_capacity(data.len() * 2);
                for sample in data {
                    bytes.extend_from_slice(&sample.to_le_bytes());
                }
                let _ = tx.send(bytes);
            },
            |err| tracing::warn!(error = %err, "cpal capture stream error"),
            None,
        )?;
        stream.play().map_err(|_| cpal::BuildStreamError::DeviceNotAvailable)?;

        Ok(Self { _stream: stream, rx })
    }
}

impl CaptureLine for CpalCaptureLine {
    fn read_frame(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.rx.recv_timeout(Duration::from_millis(100)) {
            Ok(bytes) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                Ok(n)
            }
            Err(std_mpsc::RecvTimeoutError::Timeout) => Ok(0),
            Err(std_mpsc::RecvTimeoutError::Disconnected) => {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "capture stream ended"))
            }
        }
    }
}

/// Plays to the default output device at 48kHz mono i16.
pub struct CpalPlaybackLine {
    _stream: cpal::Stream,
    tx: std_mpsc::SyncSender<Vec<u8>>,
}

impl CpalPlaybackLine {
    pub fn open() -> Result<Self, cpal::BuildStreamError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(cpal::BuildStreamError::DeviceNotAvailable)?;
        let config = cpal::StreamConfig {
            channels: super::protocol::CHANNELS,
            sample_rate: cpal::SampleRate(super::protocol::SAMPLE_RATE),
            buffer_size: cpal::BufferSize::Default,
        };

        let (tx, rx) = std_mpsc::sync_channel::<Vec<u8>>(8);
        let mut pending: Vec<i16> = Vec::new();
        let stream = device.build_output_stream(
            &config,
            move |data: &mut [i16], _| {
                while pending.len() < data.len() {
                    match rx.try_recv() {
                        Ok(bytes) => {
                            pending.extend(
                                bytes
                                    .chunks_exact(2)
                                    .map(|c| i16::from_le_bytes([c[0], c[1]])),
                            );
                        }
                        Err(_) => break,
                    }
                }
                let n = pending.len().min(data.len());
                data[..n].copy_from_slice(&pending[..n]);
                for sample in data[n..].iter_mut() {
                    *sample = 0;
                }
                pending.drain(..n);
            },
            |err| tracing::warn!(error = %err, "cpal playback stream error"),
            None,
        )?;
        stream.play().map_err(|_| cpal::BuildStreamError::DeviceNotAvailable)?;

        Ok(Self { _stream: stream, tx })
    }
}

impl PlaybackLine for CpalPlaybackLine {
    fn write_frame(&mut self, buf: &[u8]) -> io::Result<()> {
        self.tx
            .try_send(buf.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::WouldBlock, "playback queue full"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_capture_reads_zero() {
        let mut line = NullCaptureLine;
        let mut buf = [0u8; 1920];
        assert_eq!(line.read_frame(&mut buf).unwrap(), 0);
    }

    #[test]
    fn null_playback_accepts_writes() {
        let mut line = NullPlaybackLine;
        assert!(line.write_frame(&[0u8; 1920]).is_ok());
    }
}
