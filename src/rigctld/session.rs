//! Per-client rigctl session: one TCP connection, one line-reader task
//! feeding a shared outbound channel that also carries AI fan-out lines.

use crate::ai::AiBroadcaster;
use crate::hamlib;
use crate::radio::RadioModel;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

/// Runs one client's session to completion: registers for AI fan-out, reads
/// and dispatches lines until EOF/error, then unregisters.
pub async fn run_session<T>(
    session_id: u64,
    socket: TcpStream,
    radio: Arc<RadioModel<T>>,
    rig_lock: Arc<Mutex<()>>,
    ai: Arc<AiBroadcaster>,
) where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (read_half, mut write_half) = socket.into_split();
    let mut reader = BufReader::new(read_half);

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
    ai.register(session_id, outbound_tx.clone());

    let writer_handle = tokio::spawn(async move {
        while let Some(line) = outbound_rx.recv().await {
            if write_half.write_all(line.as_bytes()).await.is_err() {
                break;
            }
        }
    });

    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(session = session_id, error = %e, "rigctl session read error");
                break;
            }
        }

        let outcome = {
            let _guard = rig_lock.lock().await;
            hamlib::dispatch(&radio, &line).await
        };

        if outbound_tx.send(outcome.response).is_err() {
            break;
        }
        if outcome.close_session {
            break;
        }
    }

    debug!(session = session_id, "rigctl session closing");
    ai.unregister(session_id);
    drop(outbound_tx);
    let _ = writer_handle.await;
}
