use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

use crate::error::{Error, Result};
use crate::opts::Opts;
use crate::producer::QueryEngine;
use crate::protocol::backend::write_error_response;
use crate::state::{ServerAction, Session, handle_request};

use super::stream::Stream;

/// Async cursor server: one task and one [`Session`] per connection.
///
/// Requests are computed on tokio's blocking pool, so a slow producer does not
/// hold up the other connections.
pub struct Server {
    listener: TcpListener,
    engine: Arc<dyn QueryEngine>,
    opts: Opts,
    semaphore: Option<Arc<Semaphore>>,
}

impl Server {
    /// Bind to `opts.host:opts.port`. Port 0 picks a free port.
    pub async fn bind<E: QueryEngine + 'static>(opts: Opts, engine: E) -> Result<Self> {
        Self::bind_shared(opts, Arc::new(engine)).await
    }

    /// Bind with an engine shared with other servers.
    pub async fn bind_shared(opts: Opts, engine: Arc<dyn QueryEngine>) -> Result<Self> {
        let listener = TcpListener::bind(opts.addr()).await?;
        tracing::info!(addr = %listener.local_addr()?, "server listening");
        let semaphore = opts.max_connections.map(|n| Arc::new(Semaphore::new(n)));
        Ok(Self {
            listener,
            engine,
            opts,
            semaphore,
        })
    }

    /// Address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until the listener fails.
    pub async fn run(&self) -> Result<()> {
        loop {
            let permit = match &self.semaphore {
                Some(sem) => Some(
                    Arc::clone(sem)
                        .acquire_owned()
                        .await
                        .map_err(|e| Error::InvalidUsage(format!("server semaphore: {}", e)))?,
                ),
                None => None,
            };
            let stream = match self.listener.accept().await {
                Ok((stream, _)) => stream,
                Err(e) => {
                    tracing::warn!("accept failed: {}", e);
                    continue;
                }
            };
            let engine = Arc::clone(&self.engine);
            let opts = self.opts.clone();
            tokio::spawn(async move {
                let _permit = permit;
                // Errors are logged inside
                let _ = serve_connection(stream, engine, &opts).await;
            });
        }
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("addr", &self.listener.local_addr().ok())
            .field("max_connections", &self.opts.max_connections)
            .finish_non_exhaustive()
    }
}

/// Serve one client connection until it disconnects or sends Terminate.
pub async fn serve_connection(
    stream: TcpStream,
    engine: Arc<dyn QueryEngine>,
    opts: &Opts,
) -> Result<()> {
    stream.set_nodelay(true)?;
    let peer = stream.peer_addr().ok();
    let mut stream = Stream::tcp(stream);
    let mut buffer_set = opts.buffer_pool.get_buffer_set();
    let session =
        Arc::new(Session::new(engine, opts.fetch_mode()).with_max_cursors(opts.max_cursors));
    tracing::debug!(?peer, "connection opened");

    loop {
        match stream
            .read_message(&mut buffer_set, opts.max_message_size)
            .await
        {
            Ok(()) => {}
            Err(Error::Io(e)) if e.kind() == ErrorKind::UnexpectedEof => {
                tracing::debug!(?peer, "client disconnected");
                return Ok(());
            }
            Err(e @ Error::Protocol(_)) => {
                tracing::warn!(?peer, "closing connection: {}", e);
                buffer_set.write_buffer.clear();
                write_error_response(&mut buffer_set.write_buffer, &e.to_error_fields());
                stream.write_all(&buffer_set.write_buffer).await?;
                stream.flush().await?;
                return Err(e);
            }
            Err(e) => {
                tracing::warn!(?peer, "connection error: {}", e);
                return Err(e);
            }
        }

        let request_session = Arc::clone(&session);
        let (action, returned) = tokio::task::spawn_blocking(move || {
            let action = handle_request(&request_session, &mut buffer_set);
            (action, buffer_set)
        })
        .await
        .map_err(std::io::Error::from)?;
        buffer_set = returned;

        match action {
            ServerAction::Write => {
                if let Err(e) = write_response(&mut stream, &buffer_set.write_buffer).await {
                    tracing::warn!(?peer, "connection error: {}", e);
                    return Err(e.into());
                }
            }
            ServerAction::Terminate => {
                tracing::debug!(?peer, cursors = session.open_cursors(), "client terminated");
                return Ok(());
            }
        }
    }
}

async fn write_response(stream: &mut Stream, buf: &[u8]) -> std::io::Result<()> {
    stream.write_all(buf).await?;
    stream.flush().await
}
