// Server-side TLS configuration for the beacon listener.

use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;
use thiserror::Error;
use tokio_rustls::TlsAcceptor;

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("certificate error: {0}")]
    Certificate(String),
    #[error("private key error: {0}")]
    PrivateKey(String),
    #[error("TLS configuration error: {0}")]
    Config(#[from] rustls::Error),
}

/// Load a PEM certificate chain and private key from disk.
pub async fn load_acceptor(cert_path: &Path, key_path: &Path) -> Result<TlsAcceptor, TlsError> {
    let cert_pem = read_pem(cert_path).await?;
    let key_pem = read_pem(key_path).await?;
    let config = server_config_from_pem(&cert_pem, &key_pem)?;
    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Build a server config with no client authentication: agents are
/// identified by the UUID in their payload, not by certificate.
pub fn server_config_from_pem(cert_pem: &[u8], key_pem: &[u8]) -> Result<ServerConfig, TlsError> {
    let certs = parse_certificates(cert_pem)?;
    if certs.is_empty() {
        return Err(TlsError::Certificate("no certificates found".into()));
    }
    let key = parse_private_key(key_pem)?;

    let config = ServerConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()?
    .with_no_client_auth()
    .with_single_cert(certs, key)?;
    Ok(config)
}

async fn read_pem(path: &Path) -> Result<Vec<u8>, TlsError> {
    tokio::fs::read(path).await.map_err(|source| TlsError::Read {
        path: path.display().to_string(),
        source,
    })
}

fn parse_certificates(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    CertificateDer::pem_slice_iter(pem)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TlsError::Certificate(format!("failed to parse certificates: {e}")))
}

fn parse_private_key(pem: &[u8]) -> Result<PrivateKeyDer<'static>, TlsError> {
    PrivateKeyDer::from_pem_slice(pem)
        .map_err(|e| TlsError::PrivateKey(format!("failed to parse private key: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn self_signed() -> (Vec<u8>, Vec<u8>) {
        let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        (
            certified.cert.pem().into_bytes(),
            certified.key_pair.serialize_pem().into_bytes(),
        )
    }

    #[test]
    fn test_server_config_from_pem() {
        let (cert, key) = self_signed();
        assert!(server_config_from_pem(&cert, &key).is_ok());
    }

    #[test]
    fn test_rejects_missing_certificate() {
        let (_, key) = self_signed();
        assert!(matches!(
            server_config_from_pem(b"", &key),
            Err(TlsError::Certificate(_))
        ));
    }

    #[test]
    fn test_rejects_missing_key() {
        let (cert, _) = self_signed();
        assert!(matches!(
            server_config_from_pem(&cert, b"not a key"),
            Err(TlsError::PrivateKey(_))
        ));
    }

    #[tokio::test]
    async fn test_load_acceptor_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.pem");
        let result = load_acceptor(&missing, &missing).await;
        assert!(matches!(result, Err(TlsError::Read { .. })));
    }

    #[tokio::test]
    async fn test_load_acceptor_from_files() {
        let (cert, key) = self_signed();
        let dir = tempfile::tempdir().unwrap();
        let cert_path = dir.path().join("cert.pem");
        let key_path = dir.path().join("key.pem");
        std::fs::write(&cert_path, cert).unwrap();
        std::fs::write(&key_path, key).unwrap();
        assert!(load_acceptor(&cert_path, &key_path).await.is_ok());
    }
}
