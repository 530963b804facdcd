//! TLS accept loop: binds the configured listen address, and spawns one
//! connection task per accepted socket.

use log::{error, info, warn};
use tokio::net::TcpListener;
use tokio_native_tls::{TlsAcceptor, TlsConnector};

use crate::connection::{self, ConnectionConfig};
use crate::error::Error;

/// Bind `listen_addr` and accept connections forever, handing each one
/// off to [`connection::run`] on its own task.
///
/// Per-connection failures (a bad handshake, a refused accept) are
/// logged and do not bring the listener down; only a failure to bind
/// the listening socket itself is fatal.
pub async fn serve(
    listen_addr: (String, u16),
    acceptor: TlsAcceptor,
    connector: TlsConnector,
    config: ConnectionConfig,
) -> Result<(), Error> {
    let tcp_listener = TcpListener::bind((listen_addr.0.as_str(), listen_addr.1)).await?;
    info!("listening on {}:{}", listen_addr.0, listen_addr.1);

    loop {
        let (socket, peer) = match tcp_listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!("accept failed: {}", e);
                continue;
            }
        };

        let acceptor = acceptor.clone();
        let connector = connector.clone();
        let config = config.clone();

        tokio::spawn(async move {
            info!("accepted connection from {}", peer);
            match connection::accept_downstream(&acceptor, socket).await {
                Ok(downstream) => connection::run(downstream, config, connector).await,
                Err(e) => error!("handshake with {} failed: {}", peer, e),
            }
            info!("connection from {} closed", peer);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_cert_file_surfaces_as_config_error_before_binding() {
        let acceptor = crate::tls::load_server_acceptor(std::path::Path::new("/nonexistent"));
        assert!(acceptor.is_err());
    }
}
