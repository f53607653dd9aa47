// TLS accept loop: one task per beacon connection, bounded by a read deadline.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_rustls::TlsAcceptor;

use crate::intake::beacon::MAX_BEACON_LEN;
use crate::intake::pipeline::IntakePipeline;
use crate::metrics::{self, ConnectionGuard};

/// Pause after a failed accept so a persistent error (e.g. fd exhaustion)
/// doesn't spin the loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(10);

pub struct BeaconListener {
    listener: TcpListener,
    acceptor: TlsAcceptor,
    pipeline: Arc<IntakePipeline>,
    read_deadline: Duration,
}

impl BeaconListener {
    pub async fn bind(
        addr: SocketAddr,
        acceptor: TlsAcceptor,
        pipeline: Arc<IntakePipeline>,
        read_deadline: Duration,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            acceptor,
            pipeline,
            read_deadline,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections forever. Accept errors are logged and retried.
    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let acceptor = self.acceptor.clone();
                    let pipeline = self.pipeline.clone();
                    let deadline = self.read_deadline;
                    tokio::spawn(async move {
                        handle_connection(stream, peer, acceptor, pipeline, deadline).await;
                    });
                }
                Err(e) => {
                    metrics::record_transport_error("accept");
                    tracing::error!("Failed to accept beacon connection: {e}");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    acceptor: TlsAcceptor,
    pipeline: Arc<IntakePipeline>,
    deadline: Duration,
) {
    let _guard = ConnectionGuard::open();

    // Handshake and the single read share one deadline.
    let received = timeout(deadline, async {
        let mut tls = acceptor
            .accept(stream)
            .await
            .map_err(|e| ("handshake", e))?;
        let mut buf = vec![0u8; MAX_BEACON_LEN];
        let n = tls.read(&mut buf).await.map_err(|e| ("read", e))?;
        buf.truncate(n);
        Ok::<_, (&'static str, io::Error)>((tls, buf))
    })
    .await;

    let (mut tls, payload) = match received {
        Ok(Ok(received)) => received,
        Ok(Err((stage, e))) => {
            metrics::record_transport_error(stage);
            tracing::warn!(%peer, stage, "Beacon connection failed: {e}");
            return;
        }
        Err(_) => {
            metrics::record_transport_error("timeout");
            tracing::warn!(%peer, "Beacon connection timed out");
            return;
        }
    };

    let now = chrono::Utc::now().timestamp();
    pipeline.process(&payload, peer.ip(), now).await;

    // Nothing is ever written back; just close.
    let _ = timeout(deadline, tls.shutdown()).await;
}
