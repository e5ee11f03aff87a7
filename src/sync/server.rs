use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

use std_semaphore::Semaphore;

use crate::error::{Error, Result};
use crate::opts::Opts;
use crate::producer::QueryEngine;
use crate::protocol::backend::write_error_response;
use crate::state::{ServerAction, Session, handle_request};

use super::stream::Stream;

/// Connection slot, released on drop.
struct Permit(Option<Arc<Semaphore>>);

impl Drop for Permit {
    fn drop(&mut self) {
        if let Some(sem) = &self.0 {
            sem.release();
        }
    }
}

/// Blocking cursor server: one thread and one [`Session`] per connection.
pub struct Server {
    listener: TcpListener,
    engine: Arc<dyn QueryEngine>,
    opts: Opts,
    semaphore: Option<Arc<Semaphore>>,
}

impl Server {
    /// Bind to `opts.host:opts.port`. Port 0 picks a free port.
    pub fn bind<E: QueryEngine + 'static>(opts: Opts, engine: E) -> Result<Self> {
        Self::bind_shared(opts, Arc::new(engine))
    }

    /// Bind with an engine shared with other servers.
    pub fn bind_shared(opts: Opts, engine: Arc<dyn QueryEngine>) -> Result<Self> {
        let listener = TcpListener::bind(opts.addr())?;
        tracing::info!(addr = %listener.local_addr()?, "server listening");
        let semaphore = opts
            .max_connections
            .map(|n| Arc::new(Semaphore::new(n as isize)));
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

    fn acquire(&self) -> Permit {
        if let Some(sem) = &self.semaphore {
            sem.acquire();
        }
        Permit(self.semaphore.clone())
    }

    /// Accept connections until the listener fails.
    ///
    /// With `max_connections` set, accepting pauses while that many are open.
    pub fn run(&self) -> Result<()> {
        loop {
            let permit = self.acquire();
            let stream = match self.listener.accept() {
                Ok((stream, _)) => stream,
                Err(e) => {
                    tracing::warn!("accept failed: {}", e);
                    continue;
                }
            };
            let engine = Arc::clone(&self.engine);
            let opts = self.opts.clone();
            thread::Builder::new()
                .name("zero-cursor-conn".into())
                .spawn(move || {
                    let _permit = permit;
                    // Errors are logged inside
                    let _ = serve_connection(stream, engine, &opts);
                })?;
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
///
/// Every cursor of the connection is released when this returns.
pub fn serve_connection(
    stream: TcpStream,
    engine: Arc<dyn QueryEngine>,
    opts: &Opts,
) -> Result<()> {
    stream.set_nodelay(true)?;
    let peer = stream.peer_addr().ok();
    let mut stream = Stream::tcp(stream);
    let mut buffer_set = opts.buffer_pool.get_buffer_set();
    let session = Session::new(engine, opts.fetch_mode()).with_max_cursors(opts.max_cursors);
    tracing::debug!(?peer, "connection opened");

    loop {
        match stream.read_message(&mut buffer_set, opts.max_message_size) {
            Ok(()) => {}
            Err(Error::Io(e)) if e.kind() == ErrorKind::UnexpectedEof => {
                tracing::debug!(?peer, "client disconnected");
                return Ok(());
            }
            Err(e @ Error::Protocol(_)) => {
                // The stream is out of sync; report and hang up
                tracing::warn!(?peer, "closing connection: {}", e);
                buffer_set.write_buffer.clear();
                write_error_response(&mut buffer_set.write_buffer, &e.to_error_fields());
                stream.write_all(&buffer_set.write_buffer)?;
                stream.flush()?;
                return Err(e);
            }
            Err(e) => {
                tracing::warn!(?peer, "connection error: {}", e);
                return Err(e);
            }
        }

        match handle_request(&session, &mut buffer_set) {
            ServerAction::Write => {
                if let Err(e) = stream
                    .write_all(&buffer_set.write_buffer)
                    .and_then(|()| stream.flush())
                {
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
