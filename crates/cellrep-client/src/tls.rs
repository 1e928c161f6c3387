//! TLS settings for talking to cells, and URL selection.
//!
//! Cells may announce both a plain address and an `https` rep URL. Which
//! one the client uses depends on whether TLS is required and whether the
//! client holds a certificate, key, and CA.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::client::Resumption;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ClientConfig, RootCertStore};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::error::{ClientError, ClientResult};

/// Client-side TLS settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    pub require_tls: bool,
    pub cert_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
    pub ca_cert_file: Option<PathBuf>,
    /// Entries in the TLS session cache; 0 uses the rustls default.
    pub client_session_cache_size: usize,
    pub insecure_skip_verify: bool,
}

impl TlsConfig {
    /// True when certificate, key, and CA are all configured.
    pub fn has_creds(&self) -> bool {
        self.cert_file.is_some() && self.key_file.is_some() && self.ca_cert_file.is_some()
    }

    /// Choose between a cell's bare `address` and its announced `rep_url`.
    ///
    /// 1. TLS not required, no credentials: `https` is impossible; prefer
    ///    `rep_url`, else `address`.
    /// 2. TLS not required, credentials present: prefer `rep_url`, else
    ///    `address`, whatever the scheme.
    /// 3. TLS required: `rep_url` must be `https`.
    pub fn pick_url(&self, address: &str, rep_url: Option<&str>) -> ClientResult<String> {
        let rep_url = rep_url.filter(|u| !u.is_empty());

        let secure = match rep_url {
            Some(u) => Url::parse(u)?.scheme() == "https",
            None => false,
        };

        if !self.require_tls && !self.has_creds() {
            if secure {
                return Err(ClientError::HttpsNotSupported);
            }
            Ok(rep_url.unwrap_or(address).to_string())
        } else if !self.require_tls {
            // Branch 2 does not re-check the scheme.
            Ok(rep_url.unwrap_or(address).to_string())
        } else {
            match rep_url {
                Some(u) if secure => Ok(u.to_string()),
                _ => Err(ClientError::HttpsRequired),
            }
        }
    }

    /// Build the rustls client configuration, if any is needed.
    ///
    /// With credentials the client presents its certificate and trusts only
    /// the configured CA. Without them, a TLS-required client trusts the
    /// Mozilla roots. Otherwise there is no TLS at all.
    pub fn client_config(&self) -> ClientResult<Option<Arc<ClientConfig>>> {
        let builder = ClientConfig::builder_with_provider(crypto_provider())
            .with_safe_default_protocol_versions()?;

        let mut config = match (&self.cert_file, &self.key_file, &self.ca_cert_file) {
            (Some(cert_file), Some(key_file), Some(ca_cert_file)) => {
                let certs = load_certs(cert_file)?;
                let key = load_private_key(key_file)?;
                let config = if self.insecure_skip_verify {
                    builder
                        .dangerous()
                        .with_custom_certificate_verifier(Arc::new(danger::NoVerifier))
                        .with_client_auth_cert(certs, key)?
                } else {
                    builder
                        .with_root_certificates(load_root_store(ca_cert_file)?)
                        .with_client_auth_cert(certs, key)?
                };
                info!(cert = %cert_file.display(), ca = %ca_cert_file.display(), "loaded client certificate");
                config
            }
            _ if self.require_tls => {
                if self.insecure_skip_verify {
                    builder
                        .dangerous()
                        .with_custom_certificate_verifier(Arc::new(danger::NoVerifier))
                        .with_no_client_auth()
                } else {
                    let mut roots = RootCertStore::empty();
                    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
                    builder.with_root_certificates(roots).with_no_client_auth()
                }
            }
            _ => {
                debug!("no TLS credentials configured, using plaintext only");
                return Ok(None);
            }
        };

        if self.client_session_cache_size > 0 {
            config.resumption = Resumption::in_memory_sessions(self.client_session_cache_size);
        }

        Ok(Some(Arc::new(config)))
    }
}

/// The ring provider, used explicitly so no process-wide default is needed.
pub fn crypto_provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

/// Read every PEM certificate in `path`.
pub fn load_certs(path: &Path) -> ClientResult<Vec<CertificateDer<'static>>> {
    let mut reader = BufReader::new(File::open(path)?);
    let certs = rustls_pemfile::certs(&mut reader).collect::<Result<Vec<_>, _>>()?;
    if certs.is_empty() {
        return Err(ClientError::NoCertificates(path.to_path_buf()));
    }
    Ok(certs)
}

/// Read the first PEM private key in `path`.
pub fn load_private_key(path: &Path) -> ClientResult<PrivateKeyDer<'static>> {
    let mut reader = BufReader::new(File::open(path)?);
    rustls_pemfile::private_key(&mut reader)?.ok_or_else(|| ClientError::NoPrivateKey(path.to_path_buf()))
}

/// Build a root store holding the CA certificates in `path`.
pub fn load_root_store(path: &Path) -> ClientResult<RootCertStore> {
    let mut roots = RootCertStore::empty();
    for cert in load_certs(path)? {
        roots.add(cert)?;
    }
    Ok(roots)
}

mod danger {
    use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
    use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
    use rustls::{DigitallySignedStruct, Error, SignatureScheme};

    /// Accepts any server certificate (`insecure_skip_verify`).
    #[derive(Debug)]
    pub struct NoVerifier;

    impl ServerCertVerifier for NoVerifier {
        fn verify_server_cert(
            &self,
            _end_entity: &CertificateDer<'_>,
            _intermediates: &[CertificateDer<'_>],
            _server_name: &ServerName<'_>,
            _ocsp_response: &[u8],
            _now: UnixTime,
        ) -> Result<ServerCertVerified, Error> {
            Ok(ServerCertVerified::assertion())
        }

        fn verify_tls12_signature(
            &self,
            _message: &[u8],
            _cert: &CertificateDer<'_>,
            _dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, Error> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn verify_tls13_signature(
            &self,
            _message: &[u8],
            _cert: &CertificateDer<'_>,
            _dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, Error> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
            rustls::crypto::ring::default_provider()
                .signature_verification_algorithms
                .supported_schemes()
        }
    }
}
