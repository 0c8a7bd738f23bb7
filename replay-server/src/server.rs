//! TCP endpoint serving the tables of a [`TableRegistry`].
use crate::{
    protocol::{decode, encode, read_frame_async, write_frame_async, Request, Response},
    ErrorKind, ServerConfig, TableRegistry,
};
use anyhow::Result;
use log::{debug, info, warn};
use replay_core::{ReplayError, Table};
use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};
use tokio::{
    net::{TcpListener, TcpStream},
    runtime::Runtime,
    sync::oneshot,
};

/// Replay buffer server.
///
/// The server owns its tables and a tokio runtime accepting connections in the
/// background. Requests of one connection are processed in order; a sample
/// request blocks only its own connection while waiting for the rate limiter.
///
/// Dropping the server closes the tables, which fails pending samples, and
/// shuts the runtime down.
pub struct Server {
    local_addr: SocketAddr,
    registry: Arc<TableRegistry>,
    shutdown: Option<oneshot::Sender<()>>,
    runtime: Option<Runtime>,
}

impl Server {
    /// Builds the tables and starts listening.
    pub fn start(config: ServerConfig) -> Result<Self> {
        let registry = Arc::new(TableRegistry::build(&config)?);

        let listener =
            std::net::TcpListener::bind((config.address.as_str(), config.port.unwrap_or(0)))?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("replay-server")
            .build()?;
        let listener = {
            let _guard = runtime.enter();
            TcpListener::from_std(listener)?
        };
        let (shutdown, shutdown_receiver) = oneshot::channel();
        runtime.spawn(accept_loop(listener, registry.clone(), shutdown_receiver));
        info!(
            "Replay server listening on {} with tables {:?}",
            local_addr,
            registry.names()
        );

        Ok(Self {
            local_addr,
            registry,
            shutdown: Some(shutdown),
            runtime: Some(runtime),
        })
    }

    /// Address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Port the server is bound to.
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// In-process access to a table.
    pub fn table(&self, name: &str) -> Result<Arc<Table>, ReplayError> {
        self.registry.get(name)
    }

    /// Writes checkpoints of all tables.
    pub fn checkpoint(&self) -> Result<Vec<PathBuf>, ReplayError> {
        self.registry.checkpoint()
    }

    /// Stops the server.
    pub fn stop(mut self) {
        self.shutdown_now();
    }

    fn shutdown_now(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            self.registry.close_all();
            if let Some(shutdown) = self.shutdown.take() {
                let _ = shutdown.send(());
            }
            runtime.shutdown_timeout(Duration::from_secs(1));
            info!("Stopped replay server on {}", self.local_addr);
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.shutdown_now();
    }
}

async fn accept_loop(
    listener: TcpListener,
    registry: Arc<TableRegistry>,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!("Accepted connection from {}", peer);
                    let registry = registry.clone();
                    tokio::spawn(async move {
                        match handle_connection(stream, registry).await {
                            Ok(()) => debug!("Closed connection from {}", peer),
                            Err(e) => warn!("Connection from {} failed: {}", peer, e),
                        }
                    });
                }
                Err(e) => warn!("Failed to accept connection: {}", e),
            }
        }
    }
    debug!("Stopped accepting connections");
}

async fn handle_connection(mut stream: TcpStream, registry: Arc<TableRegistry>) -> Result<()> {
    stream.set_nodelay(true)?;
    while let Some(payload) = read_frame_async(&mut stream).await? {
        let response = match decode::<Request>(&payload) {
            Ok(request) => dispatch(&registry, request).await,
            Err(e) => Response::error(
                ErrorKind::InvalidArgument,
                format!("malformed request: {}", e),
            ),
        };
        let payload = match encode(&response) {
            Ok(payload) => payload,
            Err(e) => encode(&Response::error(ErrorKind::Internal, e.to_string()))?,
        };
        write_frame_async(&mut stream, &payload).await?;
    }
    Ok(())
}

/// Runs a blocking table operation off the async workers.
async fn blocking<F>(f: F) -> Response
where
    F: FnOnce() -> Response + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(response) => response,
        Err(e) => Response::error(ErrorKind::Internal, e.to_string()),
    }
}

async fn dispatch(registry: &Arc<TableRegistry>, request: Request) -> Response {
    match request {
        Request::Insert {
            table,
            steps,
            priority,
            token,
        } => match registry
            .get(&table)
            .and_then(|t| t.insert_with_token(token, steps, priority))
        {
            Ok(inserted) => Response::Inserted { key: inserted.key },
            Err(e) => e.into(),
        },
        Request::Sample {
            table,
            batch_size,
            timeout_ms,
        } => {
            let table = match registry.get(&table) {
                Ok(table) => table,
                Err(e) => return e.into(),
            };
            blocking(move || {
                let sampled = match timeout_ms {
                    Some(ms) => table.sample_timeout(batch_size, Duration::from_millis(ms)),
                    None => table.sample(batch_size).map(Some),
                };
                match sampled {
                    Ok(Some(batch)) => Response::Sampled(batch),
                    Ok(None) => Response::Starved,
                    Err(e) => e.into(),
                }
            })
            .await
        }
        Request::UpdatePriorities {
            table,
            keys,
            priorities,
        } => match registry
            .get(&table)
            .and_then(|t| t.update_priorities(&keys, &priorities))
        {
            Ok(n_updated) => Response::PrioritiesUpdated { n_updated },
            Err(e) => e.into(),
        },
        Request::ServerInfo { table } => match registry.info(table.as_deref()) {
            Ok(infos) => Response::Info(infos),
            Err(e) => e.into(),
        },
        Request::Checkpoint => {
            let registry = registry.clone();
            blocking(move || match registry.checkpoint() {
                Ok(paths) => Response::Checkpointed(paths),
                Err(e) => e.into(),
            })
            .await
        }
    }
}
