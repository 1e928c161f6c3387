//! Listener loops for the plaintext and TLS servers.

use std::path::Path;
use std::sync::Arc;

use axum::Router;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use rustls::ServerConfig;
use rustls::server::WebPkiClientVerifier;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info, warn};

use cellrep_client::tls::{crypto_provider, load_certs, load_private_key, load_root_store};

use crate::error::RepResult;

/// Server TLS settings. With a CA, clients must present a certificate
/// signed by it.
pub fn server_tls_config(
    cert_file: &Path,
    key_file: &Path,
    ca_cert_file: Option<&Path>,
) -> RepResult<Arc<ServerConfig>> {
    let provider = crypto_provider();
    let certs = load_certs(cert_file)?;
    let key = load_private_key(key_file)?;

    let builder = ServerConfig::builder_with_provider(provider.clone()).with_safe_default_protocol_versions()?;
    let builder = match ca_cert_file {
        Some(ca_cert_file) => {
            let roots = Arc::new(load_root_store(ca_cert_file)?);
            let verifier = WebPkiClientVerifier::builder_with_provider(roots, provider).build()?;
            builder.with_client_cert_verifier(verifier)
        }
        None => builder.with_no_client_auth(),
    };

    let mut config = builder.with_single_cert(certs, key)?;
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Ok(Arc::new(config))
}

/// Serve `router` over plaintext HTTP until `shutdown` flips.
pub async fn serve_plain(
    listener: TcpListener,
    router: Router,
    mut shutdown: watch::Receiver<bool>,
) -> RepResult<()> {
    info!(addr = %listener.local_addr()?, "plaintext listener started");
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await?;
    info!("plaintext listener stopped");
    Ok(())
}

/// Serve `router` over TLS until `shutdown` flips.
///
/// One task per connection; a failed handshake only drops that
/// connection.
pub async fn serve_tls(
    listener: TcpListener,
    config: Arc<ServerConfig>,
    router: Router,
    mut shutdown: watch::Receiver<bool>,
) -> RepResult<()> {
    let acceptor = TlsAcceptor::from(config);
    info!(addr = %listener.local_addr()?, "tls listener started");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer_addr) = accepted?;
                let acceptor = acceptor.clone();
                let service = TowerToHyperService::new(router.clone());

                tokio::spawn(async move {
                    let tls = match acceptor.accept(stream).await {
                        Ok(tls) => tls,
                        Err(e) => {
                            warn!(%peer_addr, error = %e, "tls handshake failed");
                            return;
                        }
                    };

                    if let Err(e) = http1::Builder::new()
                        .serve_connection(TokioIo::new(tls), service)
                        .await
                    {
                        debug!(%peer_addr, error = %e, "connection error");
                    }
                });
            }
            _ = shutdown.changed() => {
                info!("tls listener stopped");
                break;
            }
        }
    }

    Ok(())
}
