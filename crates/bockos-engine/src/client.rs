//! Engine API client.
//!
//! The [`Engine`] trait is the seam between boot logic and the container
//! engine; [`DockerEngine`] speaks the Docker-compatible HTTP API over a Unix
//! socket, one connection per request.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use bockos_common::{BockOsError, BockOsResult};
use bytes::Bytes;
use futures::TryStreamExt;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::header::{CONNECTION, CONTENT_TYPE, HOST, UPGRADE};
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use tokio::net::UnixStream;
use tokio::task::JoinHandle;
use tokio_util::io::ReaderStream;

use crate::reference::ImageRef;
use crate::types::CreateConfig;

type RequestBody = BoxBody<Bytes, std::io::Error>;

/// What the engine reports about an existing container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExistingContainer {
    /// Engine container id.
    pub id: String,
    /// Labels set at create time.
    pub labels: BTreeMap<String, String>,
    /// Whether the container is currently running.
    pub running: bool,
}

/// Stdio forwarding for an attached container.
///
/// Output copying ends with the container's stream; the stdin reader does
/// not, so it is aborted when this value is dropped.
#[derive(Debug, Default)]
pub struct Attachment {
    input: Option<JoinHandle<()>>,
}

impl Attachment {
    /// Track the task copying stdin into the container.
    #[must_use]
    pub const fn new(input: JoinHandle<()>) -> Self {
        Self { input: Some(input) }
    }
}

impl Drop for Attachment {
    fn drop(&mut self) {
        if let Some(input) = self.input.take() {
            input.abort();
        }
    }
}

/// Operations the boot sequence needs from a container engine.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Check that the engine answers.
    async fn ping(&self) -> BockOsResult<()>;

    /// Import a root filesystem archive as `image`.
    async fn import_image(&self, archive: &Path, image: &ImageRef) -> BockOsResult<()>;

    /// Load a saved image archive (`docker save` format).
    async fn load_image(&self, archive: &Path) -> BockOsResult<()>;

    /// Look up a container by name; `None` if it does not exist.
    async fn inspect_container(&self, name: &str) -> BockOsResult<Option<ExistingContainer>>;

    /// Create a container and return its engine id.
    async fn create_container(&self, name: &str, config: &CreateConfig) -> BockOsResult<String>;

    /// Start a created container. Starting a running container is not an error.
    async fn start_container(&self, id: &str) -> BockOsResult<()>;

    /// Connect this process's stdio to the container's terminal.
    ///
    /// Returns once the stream is established; copying runs in the background
    /// until the returned [`Attachment`] is dropped or the container closes
    /// its side.
    async fn attach_container(&self, id: &str) -> BockOsResult<Attachment>;

    /// Block until the container exits and return its exit code.
    async fn wait_container(&self, id: &str) -> BockOsResult<i64>;

    /// Restart a container, allowing `timeout` for it to stop.
    async fn restart_container(&self, id: &str, timeout: Duration) -> BockOsResult<()>;

    /// Remove a container, killing it first if it runs. A missing container
    /// is not an error.
    async fn remove_container(&self, id: &str) -> BockOsResult<()>;
}

/// Poll `engine` until it answers, at most `attempts` times.
///
/// # Errors
///
/// Returns the last ping error once all attempts are used.
pub async fn wait_for_engine(
    engine: &dyn Engine,
    attempts: u32,
    interval: Duration,
) -> BockOsResult<()> {
    let attempts = attempts.max(1);
    let mut last = BockOsError::engine("ping", "no attempts made");
    for attempt in 1..=attempts {
        match engine.ping().await {
            Ok(()) => {
                tracing::debug!(attempt, "Engine is up");
                return Ok(());
            }
            Err(e) => {
                tracing::trace!(attempt, error = %e, "Engine not ready");
                last = e;
            }
        }
        if attempt < attempts {
            tokio::time::sleep(interval).await;
        }
    }
    Err(last)
}

/// Docker-compatible engine reached over a Unix socket.
#[derive(Debug, Clone)]
pub struct DockerEngine {
    socket: PathBuf,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreateResponse {
    id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WaitResponse {
    status_code: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectResponse {
    id: String,
    #[serde(default)]
    config: InspectConfig,
    #[serde(default)]
    state: InspectState,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
struct InspectConfig {
    #[serde(default)]
    labels: Option<BTreeMap<String, String>>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
struct InspectState {
    #[serde(default)]
    running: bool,
}

fn empty_body() -> RequestBody {
    Empty::<Bytes>::new()
        .map_err(|never| -> std::io::Error { match never {} })
        .boxed()
}

fn json_body(value: &impl serde::Serialize) -> BockOsResult<RequestBody> {
    let bytes = serde_json::to_vec(value)?;
    Ok(Full::new(Bytes::from(bytes))
        .map_err(|never| -> std::io::Error { match never {} })
        .boxed())
}

async fn file_body(path: &Path) -> BockOsResult<RequestBody> {
    let file = tokio::fs::File::open(path).await?;
    let frames = ReaderStream::new(file).map_ok(Frame::data);
    Ok(StreamBody::new(frames).boxed())
}

/// Percent-encode a query value.
fn encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~') {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

/// Map a non-success response to an engine error, preferring its `message`.
fn check(operation: &str, status: StatusCode, body: &[u8]) -> BockOsResult<()> {
    if status.is_success() {
        return Ok(());
    }
    let message = serde_json::from_slice::<ErrorBody>(body).map_or_else(
        |_| String::from_utf8_lossy(body).trim().to_string(),
        |e| e.message,
    );
    Err(BockOsError::engine(operation, format!("{status}: {message}")))
}

/// Scan a JSON progress stream for an `error` entry.
fn check_progress(operation: &str, body: &[u8]) -> BockOsResult<()> {
    let stream = serde_json::Deserializer::from_slice(body).into_iter::<serde_json::Value>();
    for message in stream {
        let Ok(message) = message else { break };
        if let Some(error) = message.get("error").and_then(serde_json::Value::as_str) {
            return Err(BockOsError::engine(operation, error));
        }
    }
    Ok(())
}

impl DockerEngine {
    /// Client for the engine listening on `socket`.
    #[must_use]
    pub fn new(socket: impl Into<PathBuf>) -> Self {
        Self {
            socket: socket.into(),
        }
    }

    /// Socket path this client connects to.
    #[must_use]
    pub fn socket(&self) -> &Path {
        &self.socket
    }

    async fn send(
        &self,
        operation: &str,
        request: Request<RequestBody>,
    ) -> BockOsResult<Response<Incoming>> {
        let stream = UnixStream::connect(&self.socket).await.map_err(|e| {
            tracing::debug!(socket = %self.socket.display(), error = %e, "Engine connect failed");
            BockOsError::EngineUnavailable {
                socket: self.socket.display().to_string(),
            }
        })?;

        let (mut sender, connection) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .map_err(|e| BockOsError::engine(operation, e.to_string()))?;

        tokio::spawn(async move {
            if let Err(e) = connection.with_upgrades().await {
                tracing::debug!(error = %e, "Engine connection closed");
            }
        });

        sender
            .send_request(request)
            .await
            .map_err(|e| BockOsError::engine(operation, e.to_string()))
    }

    /// Send a request and collect the whole response body.
    async fn call(
        &self,
        operation: &str,
        method: Method,
        path: &str,
        body: RequestBody,
        content_type: Option<&str>,
    ) -> BockOsResult<(StatusCode, Bytes)> {
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header(HOST, "bockos");
        if let Some(content_type) = content_type {
            builder = builder.header(CONTENT_TYPE, content_type);
        }
        let request = builder
            .body(body)
            .map_err(|e| BockOsError::engine(operation, e.to_string()))?;

        tracing::trace!(operation, path, "Engine request");
        let response = self.send(operation, request).await?;
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .map_err(|e| BockOsError::engine(operation, e.to_string()))?
            .to_bytes();
        Ok((status, bytes))
    }
}

#[async_trait]
impl Engine for DockerEngine {
    async fn ping(&self) -> BockOsResult<()> {
        let (status, body) = self
            .call("ping", Method::GET, "/_ping", empty_body(), None)
            .await?;
        check("ping", status, &body)
    }

    async fn import_image(&self, archive: &Path, image: &ImageRef) -> BockOsResult<()> {
        let path = format!(
            "/images/create?fromSrc=-&repo={}&tag={}",
            encode(&image.repository),
            encode(&image.tag)
        );
        let body = file_body(archive).await?;
        let (status, body) = self
            .call("import", Method::POST, &path, body, Some("application/x-tar"))
            .await?;
        check("import", status, &body)?;
        check_progress("import", &body)
    }

    async fn load_image(&self, archive: &Path) -> BockOsResult<()> {
        let body = file_body(archive).await?;
        let (status, body) = self
            .call(
                "load",
                Method::POST,
                "/images/load?quiet=1",
                body,
                Some("application/x-tar"),
            )
            .await?;
        check("load", status, &body)?;
        check_progress("load", &body)
    }

    async fn inspect_container(&self, name: &str) -> BockOsResult<Option<ExistingContainer>> {
        let path = format!("/containers/{}/json", encode(name));
        let (status, body) = self
            .call("inspect", Method::GET, &path, empty_body(), None)
            .await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        check("inspect", status, &body)?;

        let inspect: InspectResponse = serde_json::from_slice(&body)?;
        Ok(Some(ExistingContainer {
            id: inspect.id,
            labels: inspect.config.labels.unwrap_or_default(),
            running: inspect.state.running,
        }))
    }

    async fn create_container(&self, name: &str, config: &CreateConfig) -> BockOsResult<String> {
        let path = format!("/containers/create?name={}", encode(name));
        let (status, body) = self
            .call(
                "create",
                Method::POST,
                &path,
                json_body(config)?,
                Some("application/json"),
            )
            .await?;
        check("create", status, &body)?;
        let created: CreateResponse = serde_json::from_slice(&body)?;
        Ok(created.id)
    }

    async fn start_container(&self, id: &str) -> BockOsResult<()> {
        let path = format!("/containers/{}/start", encode(id));
        let (status, body) = self
            .call("start", Method::POST, &path, empty_body(), None)
            .await?;
        if status == StatusCode::NOT_MODIFIED {
            tracing::debug!(container = %id, "Container already running");
            return Ok(());
        }
        check("start", status, &body)
    }

    async fn attach_container(&self, id: &str) -> BockOsResult<Attachment> {
        let path = format!(
            "/containers/{}/attach?stream=1&stdin=1&stdout=1&stderr=1",
            encode(id)
        );
        let request = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header(HOST, "bockos")
            .header(CONNECTION, "Upgrade")
            .header(UPGRADE, "tcp")
            .body(empty_body())
            .map_err(|e| BockOsError::engine("attach", e.to_string()))?;

        let response = self.send("attach", request).await?;
        if response.status() != StatusCode::SWITCHING_PROTOCOLS {
            let status = response.status();
            let body = response
                .into_body()
                .collect()
                .await
                .map_err(|e| BockOsError::engine("attach", e.to_string()))?
                .to_bytes();
            check("attach", status, &body)?;
            return Err(BockOsError::engine("attach", format!("unexpected {status}")));
        }

        let upgraded = hyper::upgrade::on(response)
            .await
            .map_err(|e| BockOsError::engine("attach", e.to_string()))?;
        let (mut from_container, mut to_container) = tokio::io::split(TokioIo::new(upgraded));

        let id = id.to_string();
        let input = tokio::spawn(async move {
            let mut stdin = tokio::io::stdin();
            if let Err(e) = tokio::io::copy(&mut stdin, &mut to_container).await {
                tracing::debug!(container = %id, error = %e, "Attach stdin closed");
            }
        });
        tokio::spawn(async move {
            let mut stdout = tokio::io::stdout();
            if let Err(e) = tokio::io::copy(&mut from_container, &mut stdout).await {
                tracing::debug!(error = %e, "Attach output closed");
            }
        });
        Ok(Attachment::new(input))
    }

    async fn wait_container(&self, id: &str) -> BockOsResult<i64> {
        let path = format!("/containers/{}/wait", encode(id));
        let (status, body) = self
            .call("wait", Method::POST, &path, empty_body(), None)
            .await?;
        check("wait", status, &body)?;
        let waited: WaitResponse = serde_json::from_slice(&body)?;
        Ok(waited.status_code)
    }

    async fn restart_container(&self, id: &str, timeout: Duration) -> BockOsResult<()> {
        let path = format!("/containers/{}/restart?t={}", encode(id), timeout.as_secs());
        let (status, body) = self
            .call("restart", Method::POST, &path, empty_body(), None)
            .await?;
        check("restart", status, &body)
    }

    async fn remove_container(&self, id: &str) -> BockOsResult<()> {
        let path = format!("/containers/{}?force=1", encode(id));
        let (status, body) = self
            .call("remove", Method::DELETE, &path, empty_body(), None)
            .await?;
        if status == StatusCode::NOT_FOUND {
            tracing::debug!(container = %id, "Container already gone");
            return Ok(());
        }
        check("remove", status, &body)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[test]
    fn query_encoding() {
        assert_eq!(encode("bockos/console"), "bockos%2Fconsole");
        assert_eq!(encode("v0.1.0"), "v0.1.0");
        assert_eq!(encode("a b"), "a%20b");
    }

    #[test]
    fn error_message_is_extracted() {
        let err = check(
            "create",
            StatusCode::CONFLICT,
            br#"{"message":"name already in use"}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("name already in use"));
        assert!(check("create", StatusCode::CREATED, b"").is_ok());
    }

    #[test]
    fn progress_errors_are_detected() {
        let ok = br#"{"status":"Loading layer"}
{"stream":"Loaded image: bockos/syslog:v0.1.0"}"#;
        assert!(check_progress("load", ok).is_ok());

        let failed = br#"{"status":"Loading layer"}
{"errorDetail":{"message":"bad tar"},"error":"bad tar"}"#;
        let err = check_progress("load", failed).unwrap_err();
        assert!(err.to_string().contains("bad tar"));
    }

    #[test]
    fn inspect_body_decodes_without_labels() {
        let body = br#"{"Id":"abc","Config":{"Labels":null},"State":{"Running":true}}"#;
        let inspect: InspectResponse = serde_json::from_slice(body).unwrap();
        assert_eq!(inspect.id, "abc");
        assert!(inspect.config.labels.is_none());
        assert!(inspect.state.running);
    }

    #[tokio::test]
    async fn missing_socket_is_unavailable() {
        let temp = tempfile::tempdir().unwrap();
        let engine = DockerEngine::new(temp.path().join("absent.sock"));
        let err = engine.ping().await.unwrap_err();
        assert!(matches!(err, BockOsError::EngineUnavailable { .. }));
    }

    struct FlakyEngine {
        failures: AtomicU32,
    }

    #[async_trait]
    impl Engine for FlakyEngine {
        async fn ping(&self) -> BockOsResult<()> {
            if self.failures.load(Ordering::SeqCst) == 0 {
                return Ok(());
            }
            self.failures.fetch_sub(1, Ordering::SeqCst);
            Err(BockOsError::EngineUnavailable {
                socket: "test".to_string(),
            })
        }
        async fn import_image(&self, _: &Path, _: &ImageRef) -> BockOsResult<()> {
            Ok(())
        }
        async fn load_image(&self, _: &Path) -> BockOsResult<()> {
            Ok(())
        }
        async fn inspect_container(&self, _: &str) -> BockOsResult<Option<ExistingContainer>> {
            Ok(None)
        }
        async fn create_container(&self, name: &str, _: &CreateConfig) -> BockOsResult<String> {
            Ok(name.to_string())
        }
        async fn start_container(&self, _: &str) -> BockOsResult<()> {
            Ok(())
        }
        async fn attach_container(&self, _: &str) -> BockOsResult<Attachment> {
            Ok(Attachment::default())
        }
        async fn wait_container(&self, _: &str) -> BockOsResult<i64> {
            Ok(0)
        }
        async fn restart_container(&self, _: &str, _: Duration) -> BockOsResult<()> {
            Ok(())
        }
        async fn remove_container(&self, _: &str) -> BockOsResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn wait_for_engine_retries_then_gives_up() {
        let engine = FlakyEngine {
            failures: AtomicU32::new(2),
        };
        wait_for_engine(&engine, 5, Duration::from_millis(1))
            .await
            .unwrap();

        let engine = FlakyEngine {
            failures: AtomicU32::new(10),
        };
        let err = wait_for_engine(&engine, 3, Duration::from_millis(1))
            .await
            .unwrap_err();
        assert!(matches!(err, BockOsError::EngineUnavailable { .. }));
    }

    #[tokio::test]
    async fn last_failed_ping_does_not_sleep() {
        let engine = FlakyEngine {
            failures: AtomicU32::new(10),
        };
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            wait_for_engine(&engine, 2, Duration::from_millis(200)),
        )
        .await
        .unwrap();
        assert!(result.is_err());
        assert_eq!(engine.failures.load(Ordering::SeqCst), 8);

        let single = FlakyEngine {
            failures: AtomicU32::new(10),
        };
        tokio::time::timeout(
            Duration::from_secs(5),
            wait_for_engine(&single, 1, Duration::from_secs(3600)),
        )
        .await
        .unwrap()
        .unwrap_err();
    }

    #[tokio::test]
    async fn dropping_attachment_stops_input() {
        let (held, released) = tokio::sync::oneshot::channel::<()>();
        let input = tokio::spawn(async move {
            let _held = held;
            std::future::pending::<()>().await;
        });

        drop(Attachment::new(input));
        assert!(released.await.is_err());
    }
}
