//! Command-line configuration.

use std::path::PathBuf;

use clap::Parser;

use crate::error::Error;

/// Stanza boundary depth: `<stream:stream>` children sit at depth 2.
pub const DEFAULT_THRESHOLD: u32 = 2;

/// Intercepting TLS-to-TLS proxy for XMPP.
#[derive(Debug, Parser)]
#[command(name = "xmpp-research-proxy", version, about)]
pub struct Cli {
    /// Hostname or IP address of the upstream XMPP server to forward to.
    pub target_address: String,

    /// Port of the upstream XMPP server to forward to.
    pub target_port: u16,

    /// PEM file containing the downstream-facing certificate chain and
    /// private key, concatenated.
    #[arg(long, default_value = "./certs/server.pem")]
    pub cert: PathBuf,

    /// Address to listen for incoming client connections on.
    #[arg(long, default_value = "0.0.0.0")]
    pub listen_address: String,

    /// Port to listen for incoming client connections on.
    #[arg(long, default_value_t = 1337)]
    pub listen_port: u16,
}

impl Cli {
    /// Parse `std::env::args`, exiting the process with a usage message
    /// on failure (clap's default behavior for `Parser::parse`).
    pub fn from_args() -> Self {
        Cli::parse()
    }

    /// Validate anything clap's type-level parsing can't express.
    pub fn validate(&self) -> Result<(), Error> {
        if self.target_address.trim().is_empty() {
            return Err(Error::Config("target address must not be empty".into()));
        }
        if !self.cert.exists() {
            return Err(Error::Config(format!(
                "certificate file {} does not exist",
                self.cert.display()
            )));
        }
        Ok(())
    }
}
