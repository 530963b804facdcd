//! TLS glue: loading the server's identity from a combined PEM file,
//! building the downstream acceptor, and building the upstream
//! connector with peer verification disabled.
//!
//! Mirrors `tokio-xmpp`'s `tls-native` pairing of `native-tls` with
//! `tokio-native-tls` (see `starttls.rs`'s `get_tls_stream`), but on the
//! accept side rather than the outbound `starttls` side, and with
//! verification deliberately disabled for the upstream dial per this
//! proxy's research-tool contract.

use std::path::Path;

use crate::error::Error;

/// Load a server certificate+key PEM file and build a TLS acceptor for
/// the downstream (client-facing) listener.
///
/// The file is expected to contain both the certificate chain and the
/// private key, PEM-encoded, concatenated in one file (as produced by
/// e.g. `openssl req -x509 -newkey rsa:2048 -keyout key.pem -out
/// cert.pem -nodes && cat cert.pem key.pem > server.pem`).
pub fn load_server_acceptor(cert_path: &Path) -> Result<tokio_native_tls::TlsAcceptor, Error> {
    let pem = std::fs::read(cert_path)
        .map_err(|e| Error::Config(format!("reading {}: {}", cert_path.display(), e)))?;

    let identity = native_tls::Identity::from_pkcs8(&pem, &pem)
        .map_err(|e| Error::Config(format!("parsing {}: {}", cert_path.display(), e)))?;

    let acceptor = native_tls::TlsAcceptor::new(identity)?;
    Ok(tokio_native_tls::TlsAcceptor::from(acceptor))
}

/// Build a TLS connector for the upstream (target-facing) dial. Peer
/// certificate verification is disabled: this is a research proxy meant
/// to intercept traffic to arbitrary, often self-signed or spoofed,
/// targets, matching the original Twisted source's unconditional
/// `ssl.CertificateOptions(verify=False)`.
pub fn upstream_connector() -> Result<tokio_native_tls::TlsConnector, Error> {
    let connector = native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(true)
        .danger_accept_invalid_hostnames(true)
        .build()?;
    Ok(tokio_native_tls::TlsConnector::from(connector))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_cert_file_is_a_config_error() {
        let err = load_server_acceptor(Path::new("/nonexistent/server.pem")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn valid_self_signed_cert_loads() {
        let rcgen::CertifiedKey { cert, key_pair } =
            rcgen::generate_simple_self_signed(vec!["localhost".into()]).unwrap();
        let pem = format!("{}\n{}", cert.pem(), key_pair.serialize_pem());
        let dir = std::env::temp_dir();
        let path = dir.join(format!("xmpp-research-proxy-test-{}.pem", std::process::id()));
        std::fs::write(&path, pem).unwrap();

        let result = load_server_acceptor(&path);
        std::fs::remove_file(&path).ok();
        assert!(result.is_ok());
    }

    #[test]
    fn upstream_connector_builds() {
        assert!(upstream_connector().is_ok());
    }
}
