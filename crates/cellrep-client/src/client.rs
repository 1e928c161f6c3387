//! The wire client for one cell, and the factory that builds it.

use std::net::IpAddr;
use std::time::Duration;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HOST, USER_AGENT};
use http::{Request, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::debug;
use url::{Host, Position, Url};

use cellrep_models::{ActualLrpInstanceKey, ActualLrpKey, Work};
use cellrep_placement::CellState;

use crate::error::{ClientError, ClientResult};
use crate::routes::{self, Route};
use crate::tls::TlsConfig;

const USER_AGENT_VALUE: &str = concat!("cellrep-client/", env!("CARGO_PKG_VERSION"));

/// Builds [`CellClient`]s that share timeouts and TLS settings.
///
/// The TLS configuration is loaded once here; creating a client afterwards
/// only picks a URL.
#[derive(Clone)]
pub struct ClientFactory {
    timeout: Duration,
    state_timeout: Duration,
    tls: TlsConfig,
    connector: Option<TlsConnector>,
}

impl ClientFactory {
    pub fn new(timeout: Duration, state_timeout: Duration, tls: TlsConfig) -> ClientResult<Self> {
        let connector = tls.client_config()?.map(TlsConnector::from);
        Ok(Self {
            timeout,
            state_timeout,
            tls,
            connector,
        })
    }

    /// A client for the cell announcing `address` and, optionally, `rep_url`.
    pub fn create_client(&self, address: &str, rep_url: Option<&str>) -> ClientResult<CellClient> {
        let picked = self.tls.pick_url(address, rep_url)?;
        let base = parse_base(&picked)?;

        if base.scheme() == "https" && self.connector.is_none() {
            return Err(ClientError::TlsUnavailable);
        }

        debug!(cell = %base, "created cell client");
        Ok(CellClient {
            http: Transport::new(self.timeout, self.connector.clone()),
            state: Transport::new(self.state_timeout, self.connector.clone()),
            base,
        })
    }
}

fn parse_base(address: &str) -> ClientResult<Url> {
    let url = if address.contains("://") {
        Url::parse(address)?
    } else {
        Url::parse(&format!("http://{address}"))?
    };
    match url.scheme() {
        "http" | "https" if url.host().is_some() => Ok(url),
        _ => Err(ClientError::InvalidAddress(address.to_string())),
    }
}

/// One HTTP/1.1 request per call, bounded by a single timeout.
#[derive(Clone)]
struct Transport {
    timeout: Duration,
    connector: Option<TlsConnector>,
}

impl Transport {
    fn new(timeout: Duration, connector: Option<TlsConnector>) -> Self {
        Self { timeout, connector }
    }

    async fn round_trip(
        &self,
        method: http::Method,
        url: &Url,
        body: Option<Vec<u8>>,
    ) -> ClientResult<(StatusCode, Bytes)> {
        tokio::time::timeout(self.timeout, self.send(method, url, body))
            .await
            .map_err(|_| {
                debug!(%url, timeout = ?self.timeout, "request timed out");
                ClientError::Timeout(self.timeout)
            })?
    }

    async fn send(
        &self,
        method: http::Method,
        url: &Url,
        body: Option<Vec<u8>>,
    ) -> ClientResult<(StatusCode, Bytes)> {
        let port = url
            .port_or_known_default()
            .ok_or_else(|| ClientError::InvalidAddress(url.to_string()))?;
        let host = url
            .host()
            .ok_or_else(|| ClientError::InvalidAddress(url.to_string()))?;

        let stream = match &host {
            Host::Domain(domain) => TcpStream::connect((*domain, port)).await?,
            Host::Ipv4(ip) => TcpStream::connect((IpAddr::V4(*ip), port)).await?,
            Host::Ipv6(ip) => TcpStream::connect((IpAddr::V6(*ip), port)).await?,
        };

        let mut builder = Request::builder()
            .method(method)
            .uri(&url[Position::BeforePath..Position::AfterQuery])
            .header(HOST, &url[Position::BeforeHost..Position::AfterPort])
            .header(USER_AGENT, USER_AGENT_VALUE);
        if body.is_some() {
            builder = builder.header(CONTENT_TYPE, "application/json");
        }
        let request = builder.body(Full::new(Bytes::from(body.unwrap_or_default())))?;

        if url.scheme() == "https" {
            let connector = self.connector.as_ref().ok_or(ClientError::TlsUnavailable)?;
            let server_name = match host {
                Host::Domain(domain) => ServerName::try_from(domain.to_string())
                    .map_err(|_| ClientError::InvalidAddress(domain.to_string()))?,
                Host::Ipv4(ip) => ServerName::IpAddress(IpAddr::V4(ip).into()),
                Host::Ipv6(ip) => ServerName::IpAddress(IpAddr::V6(ip).into()),
            };
            let tls = connector.connect(server_name, stream).await?;
            exchange(tls, request).await
        } else {
            exchange(stream, request).await
        }
    }
}

async fn exchange<S>(io: S, request: Request<Full<Bytes>>) -> ClientResult<(StatusCode, Bytes)>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(io)).await?;

    // Drive the connection in the background.
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!(error = %e, "cell connection closed with error");
        }
    });

    let response = sender.send_request(request).await?;
    let status = response.status();
    let body = response.into_body().collect().await?.to_bytes();
    Ok((status, body))
}

/// Client for a single cell's secure API.
///
/// `state` uses its own timeout; every other call uses the general one.
#[derive(Clone)]
pub struct CellClient {
    http: Transport,
    state: Transport,
    base: Url,
}

impl CellClient {
    pub fn address(&self) -> &str {
        self.base.as_str()
    }

    /// Replace the timeout used by [`CellClient::state`].
    pub fn set_state_timeout(&mut self, timeout: Duration) {
        self.state.timeout = timeout;
    }

    pub fn state_client_timeout(&self) -> Duration {
        self.state.timeout
    }

    /// Fetch the cell's current snapshot. Expects 200.
    pub async fn state(&self) -> ClientResult<CellState> {
        let url = self.url(&routes::STATE, &[])?;
        let (status, body) = self.state.round_trip(routes::STATE.method.as_http(), &url, None).await?;
        if status != StatusCode::OK {
            return Err(ClientError::UnexpectedStatus(status.as_u16()));
        }
        Ok(serde_json::from_slice(&body)?)
    }

    /// Ask the cell to run `work`; returns the subset it could not start.
    pub async fn perform(&self, work: &Work) -> ClientResult<Work> {
        let url = self.url(&routes::PERFORM, &[])?;
        let payload = serde_json::to_vec(work)?;
        let (status, body) = self
            .http
            .round_trip(routes::PERFORM.method.as_http(), &url, Some(payload))
            .await?;
        if status != StatusCode::OK {
            return Err(ClientError::UnexpectedStatus(status.as_u16()));
        }
        Ok(serde_json::from_slice(&body)?)
    }

    /// Stop one LRP instance. Expects 202.
    pub async fn stop_lrp_instance(
        &self,
        key: &ActualLrpKey,
        instance_key: &ActualLrpInstanceKey,
    ) -> ClientResult<()> {
        let index = key.index.to_string();
        let url = self.url(
            &routes::STOP_LRP_INSTANCE,
            &[
                ("process_guid", key.process_guid.as_str()),
                ("instance_guid", instance_key.instance_guid.as_str()),
                ("index", index.as_str()),
            ],
        )?;
        // The Go client sets a JSON content type on this bodyless request.
        let (status, _) = self
            .http
            .round_trip(routes::STOP_LRP_INSTANCE.method.as_http(), &url, Some(Vec::new()))
            .await?;
        expect_accepted(status)
    }

    /// Cancel a task. Expects 202.
    pub async fn cancel_task(&self, task_guid: &str) -> ClientResult<()> {
        let url = self.url(&routes::CANCEL_TASK, &[("task_guid", task_guid)])?;
        let (status, _) = self
            .http
            .round_trip(routes::CANCEL_TASK.method.as_http(), &url, None)
            .await?;
        expect_accepted(status)
    }

    /// Reset a simulation cell. Expects 200.
    pub async fn reset(&self) -> ClientResult<()> {
        let url = self.url(&routes::SIM_RESET, &[])?;
        let (status, _) = self
            .http
            .round_trip(routes::SIM_RESET.method.as_http(), &url, None)
            .await?;
        if status != StatusCode::OK {
            return Err(ClientError::UnexpectedStatus(status.as_u16()));
        }
        Ok(())
    }

    fn url(&self, route: &Route, params: &[(&str, &str)]) -> ClientResult<Url> {
        let segments = route.segments(params)?;
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidAddress(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

fn expect_accepted(status: StatusCode) -> ClientResult<()> {
    if status == StatusCode::ACCEPTED {
        return Ok(());
    }
    Err(ClientError::HttpStatus {
        code: status.as_u16(),
        text: status.canonical_reason().unwrap_or_default().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    fn factory() -> ClientFactory {
        ClientFactory::new(Duration::from_secs(5), Duration::from_secs(10), TlsConfig::default()).unwrap()
    }

    /// Serve exactly one canned HTTP response and hand back the raw request.
    async fn canned(response: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let n = socket.read(&mut buf).await.unwrap();
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8_lossy(&buf[..n]).to_string()
        });
        (format!("http://{addr}"), handle)
    }

    #[test]
    fn address_without_scheme_defaults_to_http() {
        let client = factory().create_client("10.0.0.1:1800", None).unwrap();
        assert_eq!(client.address(), "http://10.0.0.1:1800/");
    }

    #[test]
    fn builds_stop_url_from_keys() {
        let client = factory().create_client("http://cell:1800", None).unwrap();
        let url = client
            .url(
                &routes::STOP_LRP_INSTANCE,
                &[("process_guid", "pg"), ("instance_guid", "ig"), ("index", "1")],
            )
            .unwrap();
        assert_eq!(url.as_str(), "http://cell:1800/v1/lrps/pg/instances/ig/stop");
    }

    #[test]
    fn keeps_base_path_prefix() {
        let client = factory().create_client("http://cell:1800/rep", None).unwrap();
        let url = client.url(&routes::STATE, &[]).unwrap();
        assert_eq!(url.as_str(), "http://cell:1800/rep/state");
    }

    #[test]
    fn rejects_https_without_certificates() {
        let err = factory().create_client("http://a", Some("https://b")).err().unwrap();
        assert!(matches!(err, ClientError::HttpsNotSupported));
    }

    #[test]
    fn rejects_non_http_addresses() {
        assert!(matches!(
            factory().create_client("ftp://cell", None),
            Err(ClientError::InvalidAddress(_))
        ));
    }

    #[test]
    fn state_timeout_is_adjustable() {
        let mut client = factory().create_client("cell:1800", None).unwrap();
        assert_eq!(client.state_client_timeout(), Duration::from_secs(10));
        client.set_state_timeout(Duration::from_secs(3));
        assert_eq!(client.state_client_timeout(), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn state_reports_unexpected_status() {
        let (addr, server) =
            canned("HTTP/1.1 500 Internal Server Error\r\ncontent-length: 0\r\nconnection: close\r\n\r\n").await;
        let client = factory().create_client(&addr, None).unwrap();

        let err = client.state().await.unwrap_err();
        assert_eq!(err.to_string(), "unexpected status code: 500");

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /state HTTP/1.1"));
    }

    #[tokio::test]
    async fn cancel_reports_status_text() {
        let (addr, server) = canned("HTTP/1.1 404 Not Found\r\ncontent-length: 0\r\nconnection: close\r\n\r\n").await;
        let client = factory().create_client(&addr, None).unwrap();

        let err = client.cancel_task("task-1").await.unwrap_err();
        assert_eq!(err.to_string(), "http error: status code 404 (Not Found)");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /v1/tasks/task-1/cancel HTTP/1.1"));
    }

    #[tokio::test]
    async fn perform_sends_json() {
        let (addr, server) = canned(
            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 25\r\nconnection: close\r\n\r\n{\"LRPs\":null,\"Tasks\":[]}\n",
        )
        .await;
        let client = factory().create_client(&addr, None).unwrap();

        let failed = client.perform(&Work::default()).await.unwrap();
        assert!(failed.is_empty());

        let request = server.await.unwrap().to_ascii_lowercase();
        assert!(request.contains("content-type: application/json"));
    }

    #[tokio::test]
    async fn slow_cell_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });

        let factory = ClientFactory::new(
            Duration::from_millis(100),
            Duration::from_millis(100),
            TlsConfig::default(),
        )
        .unwrap();
        let client = factory.create_client(&format!("http://{addr}"), None).unwrap();
        assert!(matches!(client.reset().await, Err(ClientError::Timeout(_))));
    }
}
