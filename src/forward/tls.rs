//! Origin TLS client configuration per trust tier.
//!
//! The config is built once at startup and shared by every pooled connection.
//!
//! | Tier       | Suites / curves                        | Certificates |
//! |------------|----------------------------------------|--------------|
//! | `strong`   | TLS 1.3 + ECDHE AEAD, X25519/P-256/P-384 | verified     |
//! | `relaxed`  | provider defaults                      | verified     |
//! | `insecure` | provider defaults                      | not verified |

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{aws_lc_rs, verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{CipherSuite, ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use thiserror::Error;

use crate::config::TrustTier;

/// Cipher suites the strong tier keeps: TLS 1.3 plus forward-secret AEAD TLS 1.2.
const STRONG_SUITES: &[CipherSuite] = &[
    CipherSuite::TLS13_AES_256_GCM_SHA384,
    CipherSuite::TLS13_AES_128_GCM_SHA256,
    CipherSuite::TLS13_CHACHA20_POLY1305_SHA256,
    CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
    CipherSuite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
    CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
    CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
    CipherSuite::TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256,
    CipherSuite::TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256,
];

#[derive(Debug, Error)]
pub enum TrustError {
    #[error("failed to read CA file {path}: {source}")]
    CaFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no usable certificates in CA file {path}")]
    EmptyCaFile { path: String },

    #[error("TLS configuration rejected: {0}")]
    Rustls(#[from] rustls::Error),
}

/// Build the origin-facing client config for `tier`.
pub fn client_config(tier: TrustTier, ca_cert_path: Option<&str>) -> Result<ClientConfig, TrustError> {
    let provider = match tier {
        TrustTier::Strong => strong_provider(),
        TrustTier::Relaxed | TrustTier::Insecure => aws_lc_rs::default_provider(),
    };
    let provider = Arc::new(provider);

    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_protocol_versions(&[&rustls::version::TLS13, &rustls::version::TLS12])?;

    let config = match tier {
        TrustTier::Insecure => {
            tracing::warn!(
                "Origin TLS certificate verification is DISABLED (trust_tier = insecure); \
                 traffic to the origin can be intercepted"
            );
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoVerifier { provider }))
                .with_no_client_auth()
        }
        TrustTier::Strong | TrustTier::Relaxed => {
            let roots = root_store(ca_cert_path)?;
            tracing::info!(tier = %tier, roots = roots.len(), "Origin TLS configured");
            builder.with_root_certificates(roots).with_no_client_auth()
        }
    };

    Ok(config)
}

fn strong_provider() -> CryptoProvider {
    let base = aws_lc_rs::default_provider();
    let cipher_suites = base
        .cipher_suites
        .iter()
        .copied()
        .filter(|suite| STRONG_SUITES.contains(&suite.suite()))
        .collect();

    CryptoProvider {
        cipher_suites,
        kx_groups: vec![
            aws_lc_rs::kx_group::X25519,
            aws_lc_rs::kx_group::SECP256R1,
            aws_lc_rs::kx_group::SECP384R1,
        ],
        ..base
    }
}

/// System roots plus the optional extra CA bundle.
fn root_store(ca_cert_path: Option<&str>) -> Result<RootCertStore, TrustError> {
    let mut roots = RootCertStore::empty();

    let native = rustls_native_certs::load_native_certs();
    for err in &native.errors {
        tracing::debug!(error = %err, "Skipping unreadable system certificate");
    }
    let (added, ignored) = roots.add_parsable_certificates(native.certs);
    tracing::debug!(added, ignored, "Loaded system trust anchors");

    if let Some(path) = ca_cert_path {
        let file = File::open(path).map_err(|source| TrustError::CaFile {
            path: path.to_string(),
            source,
        })?;
        let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut BufReader::new(file))
            .collect::<Result<_, _>>()
            .map_err(|source| TrustError::CaFile {
                path: path.to_string(),
                source,
            })?;
        let (added, _) = roots.add_parsable_certificates(certs);
        if added == 0 {
            return Err(TrustError::EmptyCaFile {
                path: path.to_string(),
            });
        }
    }

    if roots.is_empty() {
        tracing::warn!("No trust anchors loaded; HTTPS origins will fail verification");
    }
    Ok(roots)
}

/// Accepts any server certificate. Handshake signatures are still checked so
/// the peer must hold the key of the certificate it presents.
#[derive(Debug)]
struct NoVerifier {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for NoVerifier {
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
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
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
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strong_tier_keeps_only_listed_suites() {
        let provider = strong_provider();
        assert!(!provider.cipher_suites.is_empty());
        for suite in &provider.cipher_suites {
            assert!(STRONG_SUITES.contains(&suite.suite()), "{:?}", suite.suite());
        }
        assert_eq!(provider.kx_groups.len(), 3);
    }

    #[test]
    fn every_tier_builds() {
        for tier in [TrustTier::Strong, TrustTier::Relaxed, TrustTier::Insecure] {
            client_config(tier, None).unwrap();
        }
    }

    #[test]
    fn missing_ca_file_is_an_error() {
        let err = client_config(TrustTier::Strong, Some("/nonexistent/ca.pem")).unwrap_err();
        assert!(matches!(err, TrustError::CaFile { .. }));
    }

    #[test]
    fn ca_file_without_certificates_is_rejected() {
        let path = std::env::temp_dir().join(format!("edge-gateway-ca-{}.pem", uuid::Uuid::new_v4()));
        std::fs::write(&path, "not a certificate\n").unwrap();

        let err = client_config(TrustTier::Relaxed, path.to_str()).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert!(matches!(err, TrustError::EmptyCaFile { .. }));
    }
}
