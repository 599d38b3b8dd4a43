//! TLS material and trust decisions.
//!
//! The caller supplies the trust decision through [`TrustDecider`]; the
//! engine adapts it into a rustls certificate verifier. Client certificate
//! chains and keys load from PEM files. Key material problems are fatal:
//! they surface once and disable reconnect.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use rustls::client::{ServerCertVerified, ServerCertVerifier};
use rustls::{Certificate, ClientConfig as RustlsConfig, PrivateKey, ServerName};
use tokio_rustls::TlsConnector;

use crate::config::ClientConfig;
use crate::error::ClientError;

/// Caller-supplied trust decision over the server's certificate chain.
///
/// The chain is presented leaf-first in DER encoding.
pub trait TrustDecider: Send + Sync {
    /// Return true to accept the presented chain.
    fn verify(&self, chain: &[Vec<u8>]) -> bool;
}

/// Accepts any certificate chain.
///
/// This mirrors the long-standing default of IRC client libraries, where
/// self-signed server certificates are routine. Supply a stricter
/// [`TrustDecider`] to pin or validate chains.
#[derive(Debug, Default)]
pub struct AcceptAllCertificates;

impl TrustDecider for AcceptAllCertificates {
    fn verify(&self, _chain: &[Vec<u8>]) -> bool {
        true
    }
}

struct DeciderVerifier {
    decider: Arc<dyn TrustDecider>,
}

impl ServerCertVerifier for DeciderVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &Certificate,
        intermediates: &[Certificate],
        _server_name: &ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: SystemTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let mut chain = Vec::with_capacity(1 + intermediates.len());
        chain.push(end_entity.0.clone());
        chain.extend(intermediates.iter().map(|c| c.0.clone()));
        if self.decider.verify(&chain) {
            Ok(ServerCertVerified::assertion())
        } else {
            Err(rustls::Error::InvalidCertificate(
                rustls::CertificateError::ApplicationVerificationFailure,
            ))
        }
    }
}

/// Build a TLS connector from the configuration and trust decider.
pub(crate) fn connector(
    config: &ClientConfig,
    decider: Arc<dyn TrustDecider>,
) -> Result<TlsConnector, ClientError> {
    let builder = RustlsConfig::builder()
        .with_safe_defaults()
        .with_custom_certificate_verifier(Arc::new(DeciderVerifier { decider }));

    let tls_config = match (&config.tls_cert_chain, &config.tls_key) {
        (Some(cert_path), Some(key_path)) => {
            let chain = load_cert_chain(cert_path)?;
            let key = load_key(key_path, config.tls_key_password.as_deref())?;
            builder
                .with_client_auth_cert(chain, key)
                .map_err(|e| ClientError::Fatal(format!("client certificate rejected: {e}")))?
        }
        (None, None) => builder.with_no_client_auth(),
        _ => {
            return Err(ClientError::Fatal(
                "client certificate chain and key must be configured together".to_string(),
            ))
        }
    };

    Ok(TlsConnector::from(Arc::new(tls_config)))
}

/// The SNI name for the handshake.
pub(crate) fn server_name(host: &str) -> Result<ServerName, ClientError> {
    ServerName::try_from(host)
        .map_err(|_| ClientError::Fatal(format!("invalid tls server name: {host}")))
}

fn load_cert_chain(path: &Path) -> Result<Vec<Certificate>, ClientError> {
    let file = File::open(path)
        .map_err(|e| ClientError::Fatal(format!("cannot open {}: {e}", path.display())))?;
    let mut reader = BufReader::new(file);
    let certs = rustls_pemfile::certs(&mut reader)
        .map_err(|e| ClientError::Fatal(format!("bad certificate pem: {e}")))?;
    if certs.is_empty() {
        return Err(ClientError::Fatal(format!(
            "no certificates found in {}",
            path.display()
        )));
    }
    Ok(certs.into_iter().map(Certificate).collect())
}

fn load_key(path: &Path, password: Option<&str>) -> Result<PrivateKey, ClientError> {
    let file = File::open(path)
        .map_err(|e| ClientError::Fatal(format!("cannot open {}: {e}", path.display())))?;
    let mut reader = BufReader::new(file);

    use rustls_pemfile::Item;
    loop {
        match rustls_pemfile::read_one(&mut reader)
            .map_err(|e| ClientError::Fatal(format!("bad key pem: {e}")))?
        {
            Some(Item::RSAKey(key)) | Some(Item::PKCS8Key(key)) | Some(Item::ECKey(key)) => {
                return Ok(PrivateKey(key))
            }
            Some(_) => continue,
            None => break,
        }
    }

    // An encrypted key yields no parsable item; the passphrase cannot help
    // because PEM decryption is out of scope for the loader.
    if password.is_some() {
        Err(ClientError::Fatal(format!(
            "no usable private key in {}; passphrase-protected keys must be decrypted first",
            path.display()
        )))
    } else {
        Err(ClientError::Fatal(format!(
            "no usable private key in {}",
            path.display()
        )))
    }
}
