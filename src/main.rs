use std::process::ExitCode;
use std::sync::Arc;

use log::error;

use xmpp_research_proxy::config::{Cli, DEFAULT_THRESHOLD};
use xmpp_research_proxy::connection::ConnectionConfig;
use xmpp_research_proxy::hook::IdentityHook;
use xmpp_research_proxy::{listener, tls};

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    let cli = Cli::from_args();
    if let Err(e) = cli.validate() {
        error!("{}", e);
        return ExitCode::FAILURE;
    }

    let acceptor = match tls::load_server_acceptor(&cli.cert) {
        Ok(acceptor) => acceptor,
        Err(e) => {
            error!("failed to load server certificate: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let connector = match tls::upstream_connector() {
        Ok(connector) => connector,
        Err(e) => {
            error!("failed to build upstream TLS connector: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let config = ConnectionConfig {
        target_host: cli.target_address.clone(),
        target_port: cli.target_port,
        threshold: DEFAULT_THRESHOLD,
        client_hook: Arc::new(|| Box::new(IdentityHook)),
        server_hook: Arc::new(|| Box::new(IdentityHook)),
    };

    match listener::serve(
        (cli.listen_address.clone(), cli.listen_port),
        acceptor,
        connector,
        config,
    )
    .await
    {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("listener failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
