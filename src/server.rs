use std::future::Future;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use crate::aof::Aof;
use crate::codec::FrameCodec;
use crate::commands::dispatch;
use crate::config::Config;
use crate::connection::Connection;
use crate::peer::{Peer, Registry};
use crate::store::Store;
use crate::Error;

pub async fn run(config: Config) -> Result<(), Error> {
    let _ = tracing_subscriber::fmt()
        .try_init()
        .map_err(|e| debug!("Failed to initialize global tracing: {}", e));

    // The store is rebuilt before the listener exists, so no client sees a partial state.
    let server = Server::open(config.clone()).await?;
    let listener = TcpListener::bind((config.bind.as_str(), config.port)).await?;

    server
        .serve(listener, async {
            if let Err(e) = signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await
}

/// A server whose store has been restored from the append-only log and is ready to accept
/// connections.
pub struct Server {
    config: Config,
    store: Store,
    aof: Aof,
}

impl Server {
    /// Opens the log named in `config` and replays it into a fresh store.
    ///
    /// A log that can't be fully decoded is not fatal: the records before the bad one are
    /// applied, a warning is logged, and the server starts anyway.
    pub async fn open(config: Config) -> Result<Server, Error> {
        let store = Store::new();
        let aof = Aof::open(&config.aof_path).await?;

        match restore(&aof, &store).await {
            Ok(records) => info!(
                records,
                path = %aof.path().display(),
                "Restored store from append-only log"
            ),
            Err(e) => warn!(
                error = %e,
                "Append-only log replay stopped early, continuing with a partially restored store"
            ),
        }

        Ok(Server { config, store, aof })
    }

    /// Accepts connections until `shutdown` completes. Open connections are then closed once
    /// their current request is answered, and the log is flushed one last time.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), Error> {
        let (registry, _) = Registry::spawn();
        let (notify_shutdown, shutdown_rx) = watch::channel(());
        let flusher = self
            .aof
            .spawn_flusher(self.config.flush_interval(), shutdown_rx.clone());
        let mut connections = JoinSet::new();

        info!("Redis server listening on {}", listener.local_addr()?);

        tokio::pin!(shutdown);

        let result = loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (socket, client_address) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => break Err(e.into()),
                    };

                    info!("Accepted connection from {:?}", client_address);

                    connections.spawn(handle_connection(
                        socket,
                        client_address,
                        FrameCodec::new(self.config.max_frame_size),
                        self.store.clone(),
                        self.aof.clone(),
                        registry.clone(),
                        shutdown_rx.clone(),
                    ));
                }
                // Reap finished connections so the set only holds live ones.
                Some(_) = connections.join_next() => {}
                _ = &mut shutdown => break Ok(()),
            }
        };

        info!(connections = connections.len(), "Shutting down");

        let _ = notify_shutdown.send(());

        // Every reply sent so far has its record in the log buffer once these are done.
        while let Some(joined) = connections.join_next().await {
            if let Err(e) = joined {
                error!("Connection task failed: {}", e);
            }
        }

        if let Err(e) = flusher.await {
            error!("Append-only log flusher failed: {}", e);
        }
        self.aof.flush().await?;

        result
    }
}

/// Replays every record of the log through the command table. Replies are dropped.
async fn restore(aof: &Aof, store: &Store) -> Result<usize, Error> {
    let records = aof
        .replay(|frame| {
            let record = frame.to_string();
            if !dispatch(frame, store).mutating {
                warn!(%record, "Replayed a record that is not a write command");
            }
        })
        .await?;

    Ok(records)
}

#[instrument(
    name = "connection",
    skip(stream, codec, store, aof, registry, shutdown),
    fields(connection_id, client_address)
)]
async fn handle_connection(
    stream: TcpStream,
    client_address: SocketAddr,
    codec: FrameCodec,
    store: Store,
    aof: Aof,
    registry: Registry,
    shutdown: watch::Receiver<()>,
) {
    let mut conn = Connection::with_codec(stream, codec);

    tracing::Span::current()
        .record("connection_id", conn.id.to_string())
        .record("client_address", client_address.to_string());

    registry.add(Peer {
        id: conn.id,
        address: client_address,
    });

    let result = serve_connection(&mut conn, &store, &aof, shutdown).await;

    registry.remove(conn.id);

    match result {
        Ok(()) => info!("Connection closed"),
        Err(e) => warn!("Connection closed: {}", e),
    }
}

/// The request/response loop of a single connection. Requests are handled strictly one at a time;
/// a write is in the log buffer before its reply is sent. Returns when the client hangs up or the
/// server shuts down, never in the middle of a request.
async fn serve_connection(
    conn: &mut Connection,
    store: &Store,
    aof: &Aof,
    mut shutdown: watch::Receiver<()>,
) -> Result<(), Error> {
    loop {
        let frame = tokio::select! {
            read = conn.read_frame() => match read? {
                Some(frame) => frame,
                None => return Ok(()),
            },
            _ = shutdown.changed() => {
                debug!("Server shutting down, closing connection");
                return Ok(());
            }
        };

        debug!("Received frame from client: {}", frame);

        let record = frame.clone();
        let res = dispatch(frame, store);

        if res.mutating {
            if let Err(e) = aof.append(&record).await {
                // The write is applied in memory only and will be lost on restart.
                error!(error = %e, "Failed to append command to the log");
            }
        }

        debug!("Sending response to client: {}", res.reply);
        conn.write_frame(res.reply).await?;
    }
}
