//! TLS material shared by every client of a run.
//!
//! The CA bundle is read and parsed once. Each fixture record with a client
//! certificate gets its own `ClientConfig`, built once and then shared by
//! reference with every client bound to that record.

use std::fs;
use std::sync::Arc;

use rumqttc::tokio_rustls::rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use rumqttc::tokio_rustls::rustls::pki_types::{
    CertificateDer, PrivateKeyDer, ServerName, UnixTime,
};
use rumqttc::tokio_rustls::rustls::{
    self, ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme,
};

use crate::config::TlsSettings;
use crate::utils::error::ConfigError;

/// Client configuration handed to a session.
pub type TlsConfig = Arc<ClientConfig>;

/// Server trust settings loaded once per run.
#[derive(Debug, Clone)]
pub struct TlsContext {
    roots: Arc<RootCertStore>,
    skip_verify: bool,
}

/// A client certificate chain and its private key.
#[derive(Debug)]
pub struct ClientIdentity {
    certs: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
}

impl ClientIdentity {
    pub fn from_pem(cert_pem: &str, key_pem: &str) -> Result<Self, ConfigError> {
        let certs = parse_certs(cert_pem.as_bytes())?;
        let key = rustls_pemfile::private_key(&mut key_pem.as_bytes())
            .map_err(|e| ConfigError::Tls(format!("cannot parse client key: {e}")))?
            .ok_or_else(|| ConfigError::Tls("no private key found in PEM".to_string()))?;
        Ok(Self { certs, key })
    }
}

impl TlsContext {
    /// Loads the CA bundle named in `settings`.
    ///
    /// A CA is mandatory unless verification is skipped.
    pub fn load(settings: &TlsSettings) -> Result<Self, ConfigError> {
        match &settings.ca {
            Some(path) => {
                let pem = fs::read(path).map_err(|source| ConfigError::Io {
                    path: path.clone(),
                    source,
                })?;
                Self::from_ca_pem(&pem, settings.skip_tls_verify)
            }
            None if settings.skip_tls_verify => Ok(Self {
                roots: Arc::new(RootCertStore::empty()),
                skip_verify: true,
            }),
            None => Err(ConfigError::Tls(
                "TLS needs a CA bundle (--ca) or --skip-tls-verify".to_string(),
            )),
        }
    }

    pub fn from_ca_pem(pem: &[u8], skip_verify: bool) -> Result<Self, ConfigError> {
        let mut roots = RootCertStore::empty();
        for cert in parse_certs(pem)? {
            roots
                .add(cert)
                .map_err(|e| ConfigError::Tls(format!("bad CA certificate: {e}")))?;
        }
        Ok(Self {
            roots: Arc::new(roots),
            skip_verify,
        })
    }

    pub fn skips_verification(&self) -> bool {
        self.skip_verify
    }

    /// Builds the client configuration for one identity (or none).
    pub fn client_config(&self, identity: Option<ClientIdentity>) -> Result<TlsConfig, ConfigError> {
        let builder = if self.skip_verify {
            ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoCertVerifier))
        } else {
            ClientConfig::builder().with_root_certificates(Arc::clone(&self.roots))
        };

        let config = match identity {
            Some(identity) => builder
                .with_client_auth_cert(identity.certs, identity.key)
                .map_err(|e| ConfigError::Tls(format!("client certificate rejected: {e}")))?,
            None => builder.with_no_client_auth(),
        };

        Ok(Arc::new(config))
    }
}

fn parse_certs(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>, ConfigError> {
    let mut reader = pem;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ConfigError::Tls(format!("cannot parse certificate: {e}")))?;
    if certs.is_empty() {
        return Err(ConfigError::Tls("no certificate found in PEM".to_string()));
    }
    Ok(certs)
}

// Accepts any server certificate. Only reachable through --skip-tls-verify.
#[derive(Debug)]
struct NoCertVerifier;

impl ServerCertVerifier for NoCertVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ED25519,
        ]
    }
}
