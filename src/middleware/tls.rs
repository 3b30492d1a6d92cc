// middleware/tls.rs
// rustls client configuration for the middleware websocket

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::MiddlewareConfig;
use crate::error::{PortalError, Result};

/// Build the client TLS config: webpki roots plus an optional PEM bundle,
/// or no verification at all when `verify_tls` is off
pub fn client_config(config: &MiddlewareConfig) -> Result<ClientConfig> {
    if !config.verify_tls {
        warn!("TLS certificate verification disabled for middleware connection");
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        return Ok(ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert { provider }))
            .with_no_client_auth());
    }

    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    if let Some(path) = &config.ca_bundle {
        let file = File::open(path).map_err(|e| {
            PortalError::Configuration(format!("cannot read CA bundle {}: {}", path.display(), e))
        })?;
        let certs = rustls_pemfile::certs(&mut BufReader::new(file))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| {
                PortalError::Configuration(format!("invalid CA bundle {}: {}", path.display(), e))
            })?;
        let (added, skipped) = roots.add_parsable_certificates(certs);
        if added == 0 {
            return Err(PortalError::Configuration(format!(
                "CA bundle {} contains no usable certificates",
                path.display()
            )));
        }
        debug!(added, skipped, "Loaded middleware CA bundle");
    }

    Ok(ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth())
}

/// Accepts any server certificate; handshake signatures are still checked
#[derive(Debug)]
struct AcceptAnyServerCert {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}
