//! RigctldServer — TCP acceptor for the rigctl line protocol.
//!
//! Multiple clients share one radio; `rig_lock` (held for the duration of
//! each dispatched line) serializes access so a command issued by one
//! client sees the radio in a consistent state when its reply is produced
//! (spec.md §5).

use super::session;
use crate::ai::AiBroadcaster;
use crate::radio::RadioModel;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub struct RigctldServer<T> {
    listener: TcpListener,
    radio: Arc<RadioModel<T>>,
    rig_lock: Arc<Mutex<()>>,
    ai: Arc<AiBroadcaster>,
    next_session_id: AtomicU64,
}

impl<T> RigctldServer<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(
        listener: TcpListener,
        radio: Arc<RadioModel<T>>,
        rig_lock: Arc<Mutex<()>>,
        ai: Arc<AiBroadcaster>,
    ) -> Self {
        Self { listener, radio, rig_lock, ai, next_session_id: AtomicU64::new(1) }
    }

    /// Accepts connections until `shutdown` fires, spawning one session task
    /// per client. On shutdown the listener stops accepting immediately,
    /// then this waits up to 5s for in-flight sessions to finish.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut sessions: Vec<JoinHandle<()>> = Vec::new();

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((socket, peer)) => {
                            let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
                            info!(session = session_id, %peer, "rigctl client connected");
                            let radio = self.radio.clone();
                            let rig_lock = self.rig_lock.clone();
                            let ai = self.ai.clone();
                            sessions.push(tokio::spawn(async move {
                                session::run_session(session_id, socket, radio, rig_lock, ai).await;
                            }));
                        }
                        Err(e) => warn!(error = %e, "rigctl accept error"),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("rigctl listener closed, waiting for sessions to drain");
        drop(self.listener);

        let drain = async {
            for handle in sessions {
                let _ = handle.await;
            }
        };
        if tokio::time::timeout(Duration::from_secs(5), drain).await.is_err() {
            warn!("rigctl sessions did not drain within 5s");
        }
    }
}
