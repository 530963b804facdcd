//! Per-connection forwarder: owns the downstream/upstream TLS sockets,
//! the two byte queues, and the [`StreamProcessor`] that sits between
//! them.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex};
use tokio_native_tls::{TlsAcceptor, TlsConnector, TlsStream};

use crate::hook::Hook;
use crate::processor::StreamProcessor;

const READ_CHUNK: usize = 8192;
const INITIAL_BACKOFF: Duration = Duration::from_millis(200);
const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Constructs a fresh hook instance per connection, so stateful hooks
/// don't leak state across unrelated sessions.
pub type HookFactory = Arc<dyn Fn() -> Box<dyn Hook> + Send + Sync>;

/// Everything [`run`] needs besides the accepted downstream socket.
#[derive(Clone)]
pub struct ConnectionConfig {
    /// Upstream host to dial.
    pub target_host: String,
    /// Upstream port to dial.
    pub target_port: u16,
    /// Stanza depth threshold (see [`crate::extractor::StanzaExtractor`]).
    pub threshold: u32,
    /// Hook factory for the client→server direction.
    pub client_hook: HookFactory,
    /// Hook factory for the server→client direction.
    pub server_hook: HookFactory,
}

/// Drives one accepted connection end to end: dials upstream, then pumps
/// both directions through the stream processor until either side
/// closes.
pub async fn run(downstream: TlsStream<TcpStream>, config: ConnectionConfig, connector: TlsConnector) {
    let (down_read, down_write) = tokio::io::split(downstream);

    let (alive_tx, alive_rx) = watch::channel(true);
    // Bounded to one in-flight chunk: the downstream reader must not run
    // ahead of however slowly the upstream side can tokenize/hook/write,
    // so the next read is scheduled only after the previous chunk has
    // been handed off.
    let (cli_tx, cli_rx) = mpsc::channel::<Vec<u8>>(1);

    let mut reader_task = tokio::spawn(pump_into_queue(down_read, cli_tx, alive_tx));

    let upstream = match dial_with_backoff(&config, &connector, alive_rx).await {
        Some(stream) => stream,
        None => {
            debug!("downstream closed before upstream connection could be established");
            reader_task.abort();
            return;
        }
    };
    let (up_read, up_write) = tokio::io::split(upstream);

    let processor = Arc::new(Mutex::new(StreamProcessor::new(
        config.threshold,
        (config.client_hook)(),
        (config.server_hook)(),
    )));

    let mut c2s = tokio::spawn(drain_queue_into(cli_rx, up_write, processor.clone(), true));
    let mut s2c = tokio::spawn(pump_directly(up_read, down_write, processor, false));

    tokio::select! {
        _ = &mut c2s => debug!("client->server direction ended; closing connection"),
        _ = &mut s2c => debug!("server->client direction ended; closing connection"),
        _ = &mut reader_task => debug!("downstream reader ended; closing connection"),
    }

    // Whichever side didn't win the race above is left running detached
    // unless aborted: propagate the close instead of leaking its task and
    // socket.
    c2s.abort();
    s2c.abort();
    reader_task.abort();
}

/// Reads raw chunks from `reader` and forwards them into `queue`
/// unprocessed; processing happens when the chunk is dequeued. `queue`
/// has capacity 1, so a stalled or not-yet-connected upstream backs up
/// into this read loop rather than letting it run arbitrarily far ahead.
/// Clears `alive` to `false` on EOF or error so a concurrent upstream
/// dial can give up.
async fn pump_into_queue<R: tokio::io::AsyncRead + Unpin>(
    mut reader: R,
    queue: mpsc::Sender<Vec<u8>>,
    alive: watch::Sender<bool>,
) {
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                debug!("downstream closed (EOF)");
                break;
            }
            Ok(n) => {
                if queue.send(buf[..n].to_vec()).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!("downstream read error: {}", e);
                break;
            }
        }
    }
    let _ = alive.send(false);
}

/// Dial the upstream target, retrying with exponential backoff (capped
/// at [`MAX_BACKOFF`]) as long as the downstream session is still alive.
/// Returns `None` once `alive` flips to `false`.
async fn dial_with_backoff(
    config: &ConnectionConfig,
    connector: &TlsConnector,
    mut alive: watch::Receiver<bool>,
) -> Option<TlsStream<TcpStream>> {
    let mut backoff = INITIAL_BACKOFF;

    loop {
        if !*alive.borrow() {
            return None;
        }

        match try_connect(config, connector).await {
            Ok(stream) => {
                info!("connected to upstream {}:{}", config.target_host, config.target_port);
                return Some(stream);
            }
            Err(e) => {
                warn!(
                    "failed to connect to upstream {}:{}: {} (retrying in {:?})",
                    config.target_host, config.target_port, e, backoff
                );
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(backoff) => {}
            changed = alive.changed() => {
                if changed.is_err() || !*alive.borrow() {
                    return None;
                }
            }
        }

        backoff = std::cmp::min(backoff * 2, MAX_BACKOFF);
    }
}

async fn try_connect(
    config: &ConnectionConfig,
    connector: &TlsConnector,
) -> Result<TlsStream<TcpStream>, crate::error::Error> {
    let tcp = TcpStream::connect((config.target_host.as_str(), config.target_port)).await?;
    let tls = connector.connect(&config.target_host, tcp).await?;
    Ok(tls)
}

/// Drains `queue`, processing each chunk through the stream processor
/// before writing it to `writer`. Ends when the queue closes (upstream
/// direction) or a write fails.
async fn drain_queue_into<W: tokio::io::AsyncWrite + Unpin>(
    mut queue: mpsc::Receiver<Vec<u8>>,
    mut writer: W,
    processor: Arc<Mutex<StreamProcessor>>,
    is_client_direction: bool,
) {
    while let Some(chunk) = queue.recv().await {
        let result = {
            let mut p = processor.lock().await;
            if is_client_direction {
                p.client_chunk(&chunk)
            } else {
                p.server_chunk(&chunk)
            }
        };

        let out = match result {
            Ok(out) => out,
            Err(e) => {
                error!("stanza extraction failed, closing connection: {}", e);
                break;
            }
        };

        if let Err(e) = writer.write_all(&out).await {
            warn!("upstream write error: {}", e);
            break;
        }
    }
    let _ = writer.shutdown().await;
}

/// Reads directly from `reader`, processes each chunk, and writes the
/// result to `writer`. Used for the server→client direction, which has
/// no queueing need since the upstream connection already exists by the
/// time this runs.
async fn pump_directly<R: tokio::io::AsyncRead + Unpin, W: tokio::io::AsyncWrite + Unpin>(
    mut reader: R,
    mut writer: W,
    processor: Arc<Mutex<StreamProcessor>>,
    is_client_direction: bool,
) {
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                warn!("upstream read error: {}", e);
                break;
            }
        };

        let result = {
            let mut p = processor.lock().await;
            if is_client_direction {
                p.client_chunk(&buf[..n])
            } else {
                p.server_chunk(&buf[..n])
            }
        };

        let out = match result {
            Ok(out) => out,
            Err(e) => {
                error!("stanza extraction failed, closing connection: {}", e);
                break;
            }
        };

        if let Err(e) = writer.write_all(&out).await {
            warn!("downstream write error: {}", e);
            break;
        }
    }
    let _ = writer.shutdown().await;
}

/// Accept a downstream TLS connection, wrapping the raw TCP stream.
pub async fn accept_downstream(
    acceptor: &TlsAcceptor,
    tcp: TcpStream,
) -> Result<TlsStream<TcpStream>, crate::error::Error> {
    acceptor.accept(tcp).await.map_err(|e| {
        error!("TLS handshake with downstream client failed: {}", e);
        crate::error::Error::from(e)
    })
}
