//! AudioServer — single-client TCP audio bridge: handshake, then four
//! concurrent tasks (capture, receive, playback, stats) per session
//! (spec.md §4.7).

use super::device::{CaptureLine, NullCaptureLine, NullPlaybackLine, PlaybackLine};
use super::protocol::{
    AudioFrame, ControlMessage, FrameType, RejectReason, BITS_PER_SAMPLE, CHANNELS, FRAME_BYTES,
    FRAME_MS, SAMPLE_RATE,
};
use super::ring_buffer::AudioRingBuffer;
use crate::cat::cowlist::CowList;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};
use tracing::{info, warn};

pub struct AudioServerConfig {
    pub target_latency_ms: u64,
    pub heartbeat_interval_s: u64,
    pub heartbeat_timeout_multiplier: u32,
}

#[derive(Debug, Clone, Default)]
pub struct AudioStreamStats {
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub buffer_fill_pct: u8,
    pub buffer_level_ms: u64,
    pub latency_ms: u64,
    pub underrun_count: u64,
    pub overrun_count: u64,
    pub crc_error_count: u64,
    pub connection_age_ms: u64,
}

type DeviceHandles = (Box<dyn CaptureLine>, Box<dyn PlaybackLine>);

pub struct AudioServer {
    listener: TcpListener,
    devices: AsyncMutex<Option<DeviceHandles>>,
    configured: bool,
    config: AudioServerConfig,
    busy: AtomicBool,
    stats_listeners: CowList<mpsc::UnboundedSender<AudioStreamStats>>,
}

impl AudioServer {
    /// Builds devices from `capture`/`playback`; pass `None` for either to
    /// force the no-op backend (devices unconfigured).
    pub fn new(
        listener: TcpListener,
        capture: Option<Box<dyn CaptureLine>>,
        playback: Option<Box<dyn PlaybackLine>>,
        config: AudioServerConfig,
    ) -> Self {
        let configured = capture.is_some() && playback.is_some();
        let capture = capture.unwrap_or_else(|| Box::new(NullCaptureLine));
        let playback = playback.unwrap_or_else(|| Box::new(NullPlaybackLine));

        Self {
            listener,
            devices: AsyncMutex::new(Some((capture, playback))),
            configured,
            config,
            busy: AtomicBool::new(false),
            stats_listeners: CowList::new(),
        }
    }

    pub fn subscribe_stats(&self) -> mpsc::UnboundedReceiver<AudioStreamStats> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.stats_listeners.push(tx);
        rx
    }

    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((socket, peer)) => self.clone().handle_connect(socket, peer).await,
                        Err(e) => warn!(error = %e, "audio accept error"),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }

    async fn handle_connect(self: Arc<Self>, mut socket: TcpStream, peer: std::net::SocketAddr) {
        if self.busy.swap(true, Ordering::AcqRel) {
            let _ = write_control(&mut socket, &ControlMessage::ConnectReject(RejectReason::Busy)).await;
            return;
        }
        if !self.configured {
            self.busy.store(false, Ordering::Release);
            let _ = write_control(&mut socket, &ControlMessage::ConnectReject(RejectReason::Rejected)).await;
            return;
        }

        info!(%peer, "audio client connected, awaiting handshake");
        match tokio::time::timeout(Duration::from_secs(10), read_control(&mut socket)).await {
            Ok(Ok(ControlMessage::ConnectRequest)) => {}
            _ => {
                self.busy.store(false, Ordering::Release);
                return;
            }
        }

        let _ = write_control(
            &mut socket,
            &ControlMessage::AudioConfig {
                sample_rate: SAMPLE_RATE,
                bits: BITS_PER_SAMPLE,
                channels: CHANNELS,
                frame_ms: FRAME_MS,
            },
        )
        .await;
        let _ = write_control(&mut socket, &ControlMessage::ConnectAccept).await;

        let devices = self.devices.lock().await.take();
        let Some((capture, playback)) = devices else {
            self.busy.store(false, Ordering::Release);
            return;
        };

        self.clone().run_session(socket, capture, playback).await;
        self.busy.store(false, Ordering::Release);
    }

    async fn run_session(
        self: Arc<Self>,
        socket: TcpStream,
        capture: Box<dyn CaptureLine>,
        playback: Box<dyn PlaybackLine>,
    ) {
        let (read_half, write_half) = socket.into_split();
        let write_half = Arc::new(AsyncMutex::new(write_half));

        let target_fill = (SAMPLE_RATE as u64 * 2 * self.config.target_latency_ms / 1000) as usize;
        let capacity = target_fill * 4;
        let tx_ring = Arc::new(AudioRingBuffer::new(capacity, target_fill));

        let stats = Arc::new(SessionStats::default());
        // Shared CLOSING signal: any task can call `shutdown.send(true)` to
        // request the session end, and every task below selects on its own
        // subscriber to notice it. Unlike aborting the task handles, this
        // lets each task return its device handle so the next session can
        // reuse it (spec.md §4.7 CLOSING→INIT).
        let shutdown = Arc::new(watch::channel(false).0);

        let capture_task = tokio::spawn(run_capture_task(
            capture,
            write_half.clone(),
            stats.clone(),
            shutdown.clone(),
        ));
        let receive_task = tokio::spawn(run_receive_task(
            read_half,
            write_half.clone(),
            tx_ring.clone(),
            stats.clone(),
            shutdown.clone(),
        ));
        let playback_task = tokio::spawn(run_playback_task(
            playback,
            tx_ring.clone(),
            stats.clone(),
            shutdown.clone(),
        ));
        let stats_task = tokio::spawn(run_stats_task(
            self.stats_listeners_snapshot(),
            stats.clone(),
            tx_ring.clone(),
            self.config.target_latency_ms,
            shutdown.subscribe(),
        ));
        let heartbeat_task = tokio::spawn(run_heartbeat_task(
            write_half.clone(),
            stats.clone(),
            shutdown.clone(),
            self.config.heartbeat_interval_s,
            self.config.heartbeat_timeout_multiplier,
        ));

        let (capture_result, playback_result, _, _, _) =
            tokio::join!(capture_task, playback_task, receive_task, stats_task, heartbeat_task);

        if let (Ok(capture), Ok(playback)) = (capture_result, playback_result) {
            *self.devices.lock().await = Some((capture, playback));
        }
    }

    fn stats_listeners_snapshot(&self) -> Arc<Vec<mpsc::UnboundedSender<AudioStreamStats>>> {
        self.stats_listeners.snapshot()
    }
}

struct SessionStats {
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,
    crc_errors: AtomicU64,
    latency_ms: AtomicU64,
    started_at_ms: AtomicU64,
    last_activity_ms: AtomicU64,
}

impl Default for SessionStats {
    fn default() -> Self {
        Self {
            bytes_in: AtomicU64::new(0),
            bytes_out: AtomicU64::new(0),
            crc_errors: AtomicU64::new(0),
            latency_ms: AtomicU64::new(0),
            started_at_ms: AtomicU64::new(0),
            last_activity_ms: AtomicU64::new(now_epoch_ms()),
        }
    }
}

fn now_epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

async fn write_control(
    socket: &mut (impl tokio::io::AsyncWrite + Unpin),
    msg: &ControlMessage,
) -> std::io::Result<()> {
    let frame = AudioFrame::new(FrameType::Control, msg.encode());
    socket.write_all(&frame.encode()).await
}

async fn read_control(socket: &mut (impl tokio::io::AsyncRead + Unpin)) -> std::io::Result<ControlMessage> {
    let mut header = [0u8; 3];
    socket.read_exact(&mut header).await?;
    let len = u16::from_be_bytes([header[1], header[2]]) as usize;
    let mut rest = vec![0u8; len + 4];
    socket.read_exact(&mut rest).await?;

    let mut full = Vec::with_capacity(3 + rest.len());
    full.extend_from_slice(&header);
    full.extend_from_slice(&rest);
    match AudioFrame::decode(&full) {
        Ok(Some((frame, _))) => ControlMessage::decode(&frame.payload)
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidData, "bad control message")),
        _ => Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "bad control frame")),
    }
}

/// Reads exactly one frame's worth from the capture line and forwards it as
/// `AUDIO_RX`. Never blocks on anything the receive task is waiting on.
/// Returns the capture handle on every exit path (error or CLOSING) so the
/// device can be reused by the next session.
async fn run_capture_task(
    mut capture: Box<dyn CaptureLine>,
    write_half: Arc<AsyncMutex<tokio::net::tcp::OwnedWriteHalf>>,
    stats: Arc<SessionStats>,
    shutdown: Arc<watch::Sender<bool>>,
) -> Box<dyn CaptureLine> {
    let mut buf = vec![0u8; FRAME_BYTES];
    let mut ticker = tokio::time::interval(Duration::from_millis(FRAME_MS as u64));
    let mut shutdown_rx = shutdown.subscribe();
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let n = match tokio::task::block_in_place(|| capture.read_frame(&mut buf)) {
                    Ok(n) => n,
                    Err(e) => {
                        warn!(error = %e, "capture line error");
                        let _ = shutdown.send(true);
                        return capture;
                    }
                };
                if n == 0 {
                    continue;
                }
                let frame = AudioFrame::new(FrameType::AudioRx, buf[..n].to_vec());
                let mut w = write_half.lock().await;
                if w.write_all(&frame.encode()).await.is_err() {
                    drop(w);
                    let _ = shutdown.send(true);
                    return capture;
                }
                drop(w);
                stats.bytes_out.fetch_add(n as u64, Ordering::Relaxed);
            }
            _ = shutdown_rx.wait_for(|closing| *closing) => {
                return capture;
            }
        }
    }
}

/// Reads TCP frames with a short poll cadence and dispatches by type. Holds
/// no device handle, but still selects on CLOSING so it doesn't outlive the
/// session when some other task is the one that signals it.
async fn run_receive_task(
    mut read_half: tokio::net::tcp::OwnedReadHalf,
    write_half: Arc<AsyncMutex<tokio::net::tcp::OwnedWriteHalf>>,
    tx_ring: Arc<AudioRingBuffer>,
    stats: Arc<SessionStats>,
    shutdown: Arc<watch::Sender<bool>>,
) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let mut shutdown_rx = shutdown.subscribe();
    loop {
        let n = tokio::select! {
            result = read_half.read(&mut chunk) => {
                match result {
                    Ok(0) | Err(_) => {
                        let _ = shutdown.send(true);
                        return;
                    }
                    Ok(n) => n,
                }
            }
            _ = shutdown_rx.wait_for(|closing| *closing) => {
                return;
            }
        };
        buf.extend_from_slice(&chunk[..n]);

        loop {
            match AudioFrame::decode(&buf) {
                Ok(Some((frame, consumed))) => {
                    buf.drain(..consumed);
                    stats.last_activity_ms.store(now_epoch_ms(), Ordering::Relaxed);
                    match frame.frame_type {
                        FrameType::AudioTx => {
                            if frame.payload.len() != FRAME_BYTES {
                                let _ = shutdown.send(true);
                                return;
                            }
                            stats.bytes_in.fetch_add(frame.payload.len() as u64, Ordering::Relaxed);
                            tx_ring.write(&frame.payload);
                        }
                        FrameType::Control => match ControlMessage::decode(&frame.payload) {
                            Ok(ControlMessage::LatencyProbe { timestamp_ms }) => {
                                let reply = ControlMessage::LatencyResponse { timestamp_ms };
                                let mut w = write_half.lock().await;
                                let _ = w.write_all(&AudioFrame::new(FrameType::Control, reply.encode()).encode()).await;
                            }
                            Ok(ControlMessage::LatencyResponse { timestamp_ms }) => {
                                // `timestamp_ms` is the echo of a probe we sent (see
                                // `run_heartbeat_task`); round trip is wall-clock
                                // now minus that send time, halved for one-way latency.
                                let measured = now_epoch_ms().saturating_sub(timestamp_ms) / 2;
                                stats.latency_ms.store(measured, Ordering::Relaxed);
                            }
                            Ok(ControlMessage::Disconnect) => {
                                let _ = shutdown.send(true);
                                return;
                            }
                            _ => {}
                        },
                        FrameType::Heartbeat | FrameType::HeartbeatAck => {}
                        FrameType::AudioRx => {}
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    stats.crc_errors.fetch_add(1, Ordering::Relaxed);
                    buf.clear();
                    break;
                }
            }
        }
    }
}

/// Waits for startup fill, then drains the TX ring at frame cadence; writes
/// silence on underrun. Returns the playback handle on every exit path so it
/// can be reused by the next session.
async fn run_playback_task(
    mut playback: Box<dyn PlaybackLine>,
    tx_ring: Arc<AudioRingBuffer>,
    _stats: Arc<SessionStats>,
    shutdown: Arc<watch::Sender<bool>>,
) -> Box<dyn PlaybackLine> {
    let mut shutdown_rx = shutdown.subscribe();

    while !tx_ring.has_reached_target() {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(5)) => {}
            _ = shutdown_rx.wait_for(|closing| *closing) => {
                return playback;
            }
        }
    }

    let mut ticker = tokio::time::interval(Duration::from_millis(FRAME_MS as u64));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let mut buf = vec![0u8; FRAME_BYTES];
                let n = tx_ring
                    .read(&mut buf, FRAME_BYTES, Duration::from_millis(FRAME_MS as u64))
                    .await;
                if n == 0 {
                    buf.fill(0);
                }
                if tokio::task::block_in_place(|| playback.write_frame(&buf)).is_err() {
                    let _ = shutdown.send(true);
                    return playback;
                }
            }
            _ = shutdown_rx.wait_for(|closing| *closing) => {
                return playback;
            }
        }
    }
}

/// Sends a `HEARTBEAT` frame every `interval_s` and, independently, probes
/// round-trip latency on the same cadence; if no frame of any kind has been
/// received within `interval_s * timeout_multiplier`, notifies a timeout and
/// drops the session (spec.md §4.7's liveness rule).
async fn run_heartbeat_task(
    write_half: Arc<AsyncMutex<tokio::net::tcp::OwnedWriteHalf>>,
    stats: Arc<SessionStats>,
    shutdown: Arc<watch::Sender<bool>>,
    interval_s: u64,
    timeout_multiplier: u32,
) {
    let interval_s = interval_s.max(1);
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_s));
    let timeout_ms = interval_s * timeout_multiplier as u64 * 1000;
    let mut shutdown_rx = shutdown.subscribe();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let heartbeat = AudioFrame::new(FrameType::Heartbeat, Vec::new());
                let probe = ControlMessage::LatencyProbe { timestamp_ms: now_epoch_ms() };
                let probe_frame = AudioFrame::new(FrameType::Control, probe.encode());
                {
                    let mut w = write_half.lock().await;
                    if w.write_all(&heartbeat.encode()).await.is_err()
                        || w.write_all(&probe_frame.encode()).await.is_err()
                    {
                        let _ = shutdown.send(true);
                        return;
                    }
                }

                let elapsed = now_epoch_ms().saturating_sub(stats.last_activity_ms.load(Ordering::Relaxed));
                if elapsed > timeout_ms {
                    warn!(elapsed_ms = elapsed, "audio heartbeat timeout, dropping session");
                    let _ = shutdown.send(true);
                    return;
                }
            }
            _ = shutdown_rx.wait_for(|closing| *closing) => {
                return;
            }
        }
    }
}

async fn run_stats_task(
    listeners: Arc<Vec<mpsc::UnboundedSender<AudioStreamStats>>>,
    stats: Arc<SessionStats>,
    tx_ring: Arc<AudioRingBuffer>,
    target_latency_ms: u64,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    let start = tokio::time::Instant::now();
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let available = tx_ring.available();
                let capacity = (SAMPLE_RATE as u64 * 2 * target_latency_ms / 1000 * 4).max(1) as usize;
                let snapshot = AudioStreamStats {
                    bytes_in: stats.bytes_in.load(Ordering::Relaxed),
                    bytes_out: stats.bytes_out.load(Ordering::Relaxed),
                    buffer_fill_pct: ((available * 100) / capacity) as u8,
                    buffer_level_ms: (available as u64 * 1000) / (SAMPLE_RATE as u64 * 2),
                    latency_ms: stats.latency_ms.load(Ordering::Relaxed),
                    underrun_count: tx_ring.underrun_count(),
                    overrun_count: tx_ring.overrun_count(),
                    crc_error_count: stats.crc_errors.load(Ordering::Relaxed),
                    connection_age_ms: start.elapsed().as_millis() as u64,
                };
                for tx in listeners.iter() {
                    let _ = tx.send(snapshot.clone());
                }
            }
            _ = shutdown_rx.wait_for(|closing| *closing) => {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_format_constants_match_spec() {
        assert_eq!(SAMPLE_RATE, 48_000);
        assert_eq!(BITS_PER_SAMPLE, 16);
        assert_eq!(CHANNELS, 1);
        assert_eq!(FRAME_MS, 20);
        assert_eq!(FRAME_BYTES, 1920);
    }

    #[test]
    fn session_stats_default_seeds_last_activity_to_now() {
        let stats = SessionStats::default();
        let drift = now_epoch_ms().saturating_sub(stats.last_activity_ms.load(Ordering::Relaxed));
        assert!(drift < 1000, "last_activity_ms should start near now, drift was {drift}ms");
    }

    #[tokio::test]
    async fn heartbeat_task_drops_session_after_silence() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap().0 });
        let _client = TcpStream::connect(addr).await.unwrap();
        let server = accept.await.unwrap();

        let (_read_half, write_half) = server.into_split();
        let write_half = Arc::new(AsyncMutex::new(write_half));
        let stats = Arc::new(SessionStats::default());
        stats.last_activity_ms.store(now_epoch_ms() - 10_000, Ordering::Relaxed);
        let shutdown = Arc::new(watch::channel(false).0);
        let mut shutdown_rx = shutdown.subscribe();

        tokio::spawn(run_heartbeat_task(write_half, stats, shutdown, 1, 2));

        tokio::time::timeout(Duration::from_secs(2), shutdown_rx.wait_for(|closing| *closing))
            .await
            .expect("heartbeat task should signal closing once silence exceeds the timeout window")
            .expect("shutdown channel should still be open");
    }

    #[tokio::test]
    async fn devices_are_restored_after_session_closes_for_reconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let config = AudioServerConfig {
            target_latency_ms: 100,
            heartbeat_interval_s: 60,
            heartbeat_timeout_multiplier: 10,
        };
        let server = Arc::new(AudioServer::new(
            listener,
            Some(Box::new(NullCaptureLine)),
            Some(Box::new(NullPlaybackLine)),
            config,
        ));

        let (_run_shutdown_tx, run_shutdown_rx) = watch::channel(false);
        let accept_loop = tokio::spawn(server.clone().run(run_shutdown_rx));

        {
            let mut client = TcpStream::connect(addr).await.unwrap();
            write_control(&mut client, &ControlMessage::ConnectRequest).await.unwrap();
            assert!(matches!(
                read_control(&mut client).await.unwrap(),
                ControlMessage::AudioConfig { .. }
            ));
            assert!(matches!(read_control(&mut client).await.unwrap(), ControlMessage::ConnectAccept));
            write_control(&mut client, &ControlMessage::Disconnect).await.unwrap();
        }

        // Give the session's receive task time to see the disconnect and
        // the device handles time to land back in `self.devices`.
        tokio::time::sleep(Duration::from_millis(200)).await;

        let mut second_client = TcpStream::connect(addr).await.unwrap();
        write_control(&mut second_client, &ControlMessage::ConnectRequest).await.unwrap();
        let response = tokio::time::timeout(Duration::from_secs(2), read_control(&mut second_client))
            .await
            .expect("second connect attempt should not hang")
            .unwrap();
        assert!(
            matches!(response, ControlMessage::AudioConfig { .. }),
            "devices should have been restored for the reconnect instead of staying None"
        );

        accept_loop.abort();
    }
}
