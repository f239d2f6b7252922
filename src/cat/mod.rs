//! CatLink — the framed serial transport shared between request/response
//! traffic and asynchronous radio-pushed AI frames.
//!
//! One mutex (`send_lock`) serializes `send_command` callers so at most one
//! request is in flight, matching spec.md §4.1's concurrency contract. The
//! reader task runs independently, consulting a small, separately-locked
//! "pending request" register; it never waits on `send_lock`, so a stalled
//! client can't stall the reader (and therefore can't stall AI delivery to
//! everyone else).

pub mod cowlist;
pub mod frame;

use crate::error::CatError;
use cowlist::CowList;
use frame::CatFrame;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};
use tracing::{debug, trace, warn};

const MAX_FRAME_LEN: usize = 64;

struct PendingRequest {
    code: String,
    reply_tx: oneshot::Sender<Result<CatFrame, CatError>>,
}

struct Shared {
    pending: StdMutex<Option<PendingRequest>>,
    ai_subscribers: CowList<mpsc::UnboundedSender<CatFrame>>,
    closed: AtomicBool,
}

/// Framed serial channel to the radio, generic over the byte transport so
/// tests can substitute an in-memory duplex for real hardware.
pub struct CatLink<T> {
    writer: AsyncMutex<WriteHalf<T>>,
    send_lock: AsyncMutex<()>,
    shared: Arc<Shared>,
    response_timeout: Duration,
}

impl<T> CatLink<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Wraps a transport, splits it, and spawns the demultiplexing reader task.
    pub fn new(transport: T, response_timeout: Duration) -> Self {
        let (read_half, write_half) = tokio::io::split(transport);
        let shared = Arc::new(Shared {
            pending: StdMutex::new(None),
            ai_subscribers: CowList::new(),
            closed: AtomicBool::new(false),
        });

        tokio::spawn(reader_task(read_half, shared.clone()));

        Self {
            writer: AsyncMutex::new(write_half),
            send_lock: AsyncMutex::new(()),
            shared,
            response_timeout,
        }
    }

    fn ensure_open(&self) -> Result<(), CatError> {
        if self.shared.closed.load(Ordering::Acquire) {
            Err(CatError::LinkClosed)
        } else {
            Ok(())
        }
    }

    /// Sends `code + payload + ';'` and, if `expect_response` is set, waits
    /// up to the configured timeout for a frame whose code matches.
    pub async fn send_command(
        &self,
        code: &str,
        payload: &str,
        expect_response: bool,
    ) -> Result<Option<CatFrame>, CatError> {
        self.ensure_open()?;
        let _guard = self.send_lock.lock().await;
        self.ensure_open()?;

        let wire = frame::format_command(code, payload);
        trace!(direction = "sent", frame = %wire, "CAT");

        let reply_rx = if expect_response {
            let (tx, rx) = oneshot::channel();
            *self.shared.pending.lock().expect("pending mutex poisoned") = Some(PendingRequest {
                code: code.to_string(),
                reply_tx: tx,
            });
            Some(rx)
        } else {
            None
        };

        if let Err(e) = self.write_raw(&wire).await {
            if let Some(_rx) = reply_rx.as_ref() {
                *self.shared.pending.lock().expect("pending mutex poisoned") = None;
            }
            return Err(e);
        }

        let Some(reply_rx) = reply_rx else {
            return Ok(None);
        };

        match tokio::time::timeout(self.response_timeout, reply_rx).await {
            Ok(Ok(Ok(frame))) => Ok(Some(frame)),
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(_canceled)) => Err(CatError::LinkClosed),
            Err(_elapsed) => {
                // Clear the slot only if it's still ours; the reader may have
                // just delivered a late frame to a slot we're about to drop.
                let mut pending = self.shared.pending.lock().expect("pending mutex poisoned");
                if pending.as_ref().map(|p| p.code.as_str()) == Some(code) {
                    *pending = None;
                }
                Err(CatError::Timeout)
            }
        }
    }

    /// Sends a pre-formatted raw CAT command (appending `;` if absent) and
    /// waits for the matching reply. Used by the rigctl `w` / `send_cmd` verb.
    pub async fn send_raw(&self, text: &str) -> Result<String, CatError> {
        let text = if text.ends_with(';') {
            text.to_string()
        } else {
            format!("{text};")
        };
        let body = text.trim_end_matches(';');
        if body.len() < 2 {
            return Err(CatError::MalformedFrame);
        }
        let (code, payload) = body.split_at(2);
        let frame = self.send_command(code, payload, true).await?;
        Ok(frame.map(|f| f.raw).unwrap_or_default())
    }

    /// Enables the radio's unsolicited state-push mode.
    pub async fn enable_auto_info(&self) -> Result<(), CatError> {
        self.send_command("AI", "1", false).await.map(|_| ())
    }

    /// Disables the radio's unsolicited state-push mode.
    pub async fn disable_auto_info(&self) -> Result<(), CatError> {
        self.send_command("AI", "0", false).await.map(|_| ())
    }

    /// Registers a new AI-frame subscriber; returns the receiving half.
    pub fn subscribe_ai(&self) -> mpsc::UnboundedReceiver<CatFrame> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.ai_subscribers.push(tx);
        rx
    }

    async fn write_raw(&self, text: &str) -> Result<(), CatError> {
        let mut writer = self.writer.lock().await;
        writer.write_all(text.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }
}

async fn reader_task<T>(mut read_half: ReadHalf<T>, shared: Arc<Shared>)
where
    T: AsyncRead + Unpin + Send + 'static,
{
    let mut buf = Vec::with_capacity(MAX_FRAME_LEN);
    let mut byte = [0u8; 1];

    loop {
        match read_half.read_exact(&mut byte).await {
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "CAT serial read failed, closing link");
                close_link(&shared);
                return;
            }
        }

        if byte[0] == b';' {
            let body = match std::str::from_utf8(&buf) {
                Ok(s) => s.to_string(),
                Err(_) => {
                    warn!("discarding non-UTF8 CAT frame");
                    buf.clear();
                    continue;
                }
            };
            buf.clear();
            dispatch_frame(&shared, CatFrame::parse(&body));
        } else {
            buf.push(byte[0]);
            if buf.len() > MAX_FRAME_LEN {
                warn!("discarding malformed CAT frame (no ';' within 64 bytes)");
                buf.clear();
            }
        }
    }
}

fn dispatch_frame(shared: &Shared, frame: CatFrame) {
    trace!(direction = "received", frame = %frame.raw, "CAT");
    let mut pending = shared.pending.lock().expect("pending mutex poisoned");

    let matched = match pending.as_ref() {
        Some(_) if frame.is_reject() => true,
        Some(p) if p.code == frame.code => true,
        _ => false,
    };

    if matched {
        let PendingRequest { reply_tx, .. } = pending.take().expect("checked Some above");
        drop(pending);
        let result = if frame.is_reject() {
            Err(CatError::Protocol)
        } else {
            Ok(frame)
        };
        let _ = reply_tx.send(result);
        return;
    }
    drop(pending);

    debug!(frame = %frame.raw, "AI push");
    let subscribers = shared.ai_subscribers.snapshot();
    for tx in subscribers.iter() {
        let _ = tx.send(frame.clone());
    }
}

fn close_link(shared: &Shared) {
    shared.closed.store(true, Ordering::Release);
    if let Some(pending) = shared.pending.lock().expect("pending mutex poisoned").take() {
        let _ = pending.reply_tx.send(Err(CatError::LinkClosed));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncWriteExt, DuplexStream};

    fn link_with_mock() -> (CatLink<DuplexStream>, DuplexStream) {
        let (client, server) = tokio::io::duplex(4096);
        let link = CatLink::new(client, Duration::from_millis(200));
        (link, server)
    }

    #[tokio::test]
    async fn send_command_matches_reply_by_code() {
        let (link, mut server) = link_with_mock();
        let handle = tokio::spawn(async move { link.send_command("FA", "", true).await });

        let mut recv_buf = vec![0u8; 3];
        tokio::io::AsyncReadExt::read_exact(&mut server, &mut recv_buf)
            .await
            .unwrap();
        assert_eq!(&recv_buf, b"FA;");

        server.write_all(b"FA014074000;").await.unwrap();
        server.flush().await.unwrap();

        let result = handle.await.unwrap().unwrap();
        assert_eq!(result.unwrap().raw, "FA014074000;");
    }

    #[tokio::test]
    async fn reject_frame_surfaces_protocol_error() {
        let (link, mut server) = link_with_mock();
        let handle = tokio::spawn(async move { link.send_command("RT", "+10", true).await });

        let mut recv_buf = vec![0u8; 6];
        tokio::io::AsyncReadExt::read_exact(&mut server, &mut recv_buf)
            .await
            .unwrap();
        server.write_all(b"?;").await.unwrap();
        server.flush().await.unwrap();

        let result = handle.await.unwrap();
        assert!(matches!(result, Err(CatError::Protocol)));
    }

    #[tokio::test]
    async fn timeout_returns_timeout_error() {
        let (link, _server) = link_with_mock();
        let result = link.send_command("FA", "", true).await;
        assert!(matches!(result, Err(CatError::Timeout)));
    }

    #[tokio::test]
    async fn no_response_expected_returns_none_immediately() {
        let (link, mut server) = link_with_mock();
        let result = link.send_command("TX", "1", false).await.unwrap();
        assert!(result.is_none());

        let mut recv_buf = vec![0u8; 4];
        tokio::io::AsyncReadExt::read_exact(&mut server, &mut recv_buf)
            .await
            .unwrap();
        assert_eq!(&recv_buf, b"TX1;");
    }

    #[tokio::test]
    async fn ai_push_delivered_to_subscriber_without_pending_request() {
        let (link, mut server) = link_with_mock();
        let mut rx = link.subscribe_ai();

        server.write_all(b"FA014074050;").await.unwrap();
        server.flush().await.unwrap();

        let frame = rx.recv().await.unwrap();
        assert_eq!(frame.raw, "FA014074050;");
    }
}
