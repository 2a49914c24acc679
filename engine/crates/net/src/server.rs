use std::future::Future;
use std::io;

use engine_core::Listener;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

use crate::connection::Connection;
use crate::rate_limiter::ConnectionLimiter;

/// Accept Telnet connections until `shutdown` fires.
///
/// Each admitted connection runs `on_connect` in its own task; its limiter slot
/// is held until that task finishes. Rejected peers get one line and are closed.
pub async fn run_tcp_server_with_shutdown<F, Fut>(
    listener: TcpListener,
    limiter: ConnectionLimiter,
    max_line_len: usize,
    mut shutdown: Listener,
    on_connect: F,
) -> io::Result<()>
where
    F: Fn(Connection) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tracing::info!(addr = %listener.local_addr()?, "TCP server listening");

    loop {
        let (mut stream, peer_addr) = tokio::select! {
            biased;
            _ = shutdown.wait() => {
                tracing::info!("TCP server: shutdown signal received");
                return Ok(());
            }
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    continue;
                }
            },
        };

        let permit = match limiter.try_admit(peer_addr.ip()) {
            Ok(permit) => permit,
            Err(reason) => {
                tracing::warn!(%peer_addr, %reason, "connection rejected");
                tokio::spawn(async move {
                    let _ = stream.write_all(format!("{reason}\r\n").as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
                continue;
            }
        };

        tracing::info!(%peer_addr, "new connection");
        let conn = Connection::from_tcp(stream, max_line_len);
        let session = on_connect(conn);
        tokio::spawn(async move {
            session.await;
            drop(permit);
            tracing::info!(%peer_addr, "connection closed");
        });
    }
}
