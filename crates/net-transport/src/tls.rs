//! TOFU (trust-on-first-use) TLS (§6). The client skips CA validation and
//! supplies its own peer-certificate verifier: no cached cert for the host
//! → store the leaf DER and accept; cached cert → require byte-exact
//! equality or fail with `cert_mismatch`.
//!
//! Certificate storage itself is an external collaborator (§6); this module
//! only names the seam (`CertStore`) that `crates/storage` implements.

use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
use thiserror::Error;

/// Certificate cache/persistence seam (§6). Case-insensitive on `host`.
pub trait CertStore: Send + Sync {
    fn get(&self, host: &str) -> Option<Vec<u8>>;
    fn put(&self, host: &str, der: &[u8]);
}

#[derive(Debug, Error)]
pub enum TofuError {
    #[error("certificate for {host} does not match the one pinned on first use")]
    CertMismatch { host: String },
    #[error("certificate expired or not yet valid")]
    Expiry,
}

/// A `ServerCertVerifier` that pins the first certificate seen for each
/// hostname and rejects any subsequent mismatch.
#[derive(Debug)]
pub struct TofuVerifier<S: CertStore> {
    store: Arc<S>,
}

impl<S: CertStore> TofuVerifier<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

impl<S: CertStore + std::fmt::Debug> ServerCertVerifier for TofuVerifier<S> {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        check_expiry(end_entity, now).map_err(tofu_to_rustls_error)?;

        let host = server_name_to_host(server_name);
        let leaf = end_entity.as_ref();

        match self.store.get(&host) {
            Some(cached) if cached == leaf => Ok(ServerCertVerified::assertion()),
            Some(_) => Err(tofu_to_rustls_error(TofuError::CertMismatch { host })),
            None => {
                self.store.put(&host, leaf);
                Ok(ServerCertVerified::assertion())
            }
        }
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Err(rustls::Error::General("TLS 1.2 is not supported".into()))
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
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
        ]
    }
}

fn tofu_to_rustls_error(e: TofuError) -> rustls::Error {
    rustls::Error::General(e.to_string())
}

fn server_name_to_host(name: &ServerName<'_>) -> String {
    match name {
        ServerName::DnsName(dns) => net_protocol::normalize_hostname(dns.as_ref()),
        ServerName::IpAddress(ip) => net_protocol::normalize_hostname(&ip.to_string()),
        _ => String::new(),
    }
}

/// `not_before ≤ now ≤ not_after` against the leaf's actual X.509 validity
/// window (§6). `now` comes from rustls; parsing failures are treated as
/// expired rather than silently accepted.
fn check_expiry(der: &CertificateDer<'_>, now: UnixTime) -> Result<(), TofuError> {
    let (_, cert) =
        x509_parser::parse_x509_certificate(der.as_ref()).map_err(|_| TofuError::Expiry)?;
    let validity = cert.validity();
    let epoch_now = now.as_secs();
    if epoch_now < validity.not_before.timestamp() as u64
        || epoch_now > validity.not_after.timestamp() as u64
    {
        return Err(TofuError::Expiry);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct InMemoryCertStore(Mutex<std::collections::HashMap<String, Vec<u8>>>);

    impl CertStore for InMemoryCertStore {
        fn get(&self, host: &str) -> Option<Vec<u8>> {
            self.0.lock().unwrap().get(&host.to_lowercase()).cloned()
        }
        fn put(&self, host: &str, der: &[u8]) {
            self.0
                .lock()
                .unwrap()
                .insert(host.to_lowercase(), der.to_vec());
        }
    }

    fn fake_name<'a>() -> ServerName<'a> {
        ServerName::try_from("example.com").unwrap()
    }

    /// A fresh self-signed leaf, currently valid (rcgen defaults to a
    /// multi-year validity window from generation time).
    fn generate_leaf_der() -> Vec<u8> {
        rcgen::generate_simple_self_signed(vec!["example.com".to_owned()])
            .unwrap()
            .cert
            .der()
            .to_vec()
    }

    #[test]
    fn first_use_stores_and_accepts() {
        let store = Arc::new(InMemoryCertStore::default());
        let verifier = TofuVerifier::new(store.clone());
        let leaf = generate_leaf_der();
        let der = CertificateDer::from(leaf.clone());
        let name = fake_name();
        let result = verifier.verify_server_cert(&der, &[], &name, &[], UnixTime::now());
        assert!(result.is_ok());
        assert_eq!(store.get("example.com"), Some(leaf));
    }

    #[test]
    fn matching_cached_cert_is_accepted() {
        let leaf = generate_leaf_der();
        let store = Arc::new(InMemoryCertStore::default());
        store.put("example.com", &leaf);
        let verifier = TofuVerifier::new(store);
        let der = CertificateDer::from(leaf);
        let name = fake_name();
        assert!(verifier
            .verify_server_cert(&der, &[], &name, &[], UnixTime::now())
            .is_ok());
    }

    #[test]
    fn mismatched_cached_cert_is_rejected() {
        let store = Arc::new(InMemoryCertStore::default());
        store.put("example.com", &generate_leaf_der());
        let verifier = TofuVerifier::new(store);
        let der = CertificateDer::from(generate_leaf_der());
        let name = fake_name();
        let err = verifier
            .verify_server_cert(&der, &[], &name, &[], UnixTime::now())
            .unwrap_err();
        assert!(matches!(err, rustls::Error::General(_)));
    }

    #[test]
    fn malformed_certificate_is_treated_as_expired() {
        let store = Arc::new(InMemoryCertStore::default());
        let verifier = TofuVerifier::new(store);
        let der = CertificateDer::from(vec![1, 2, 3]);
        let name = fake_name();
        let err = verifier
            .verify_server_cert(&der, &[], &name, &[], UnixTime::now())
            .unwrap_err();
        assert!(matches!(err, rustls::Error::General(_)));
    }
}
