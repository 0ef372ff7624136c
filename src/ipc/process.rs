//! Stdio transport to plugin processes.
//!
//! Each endpoint gets one long-lived child process, spawned on first use
//! from the executable its package manifest declares. Requests are
//! multiplexed by id; a background task routes responses back to the
//! waiting callers.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;

use super::protocol::{
    CallParams, CancelParams, JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    QueryParams, RequestId, METHOD_CALL, METHOD_CANCEL, METHOD_NOT_FOUND, METHOD_QUERY,
    PERMISSION_DENIED,
};
use super::transport::{PluginTransport, TransportError};
use crate::contract::{AppIdentity, Bundle, QueryAddress, RowSet};
use crate::plugin::{ExecSpec, PackageIndex};

/// Default deadline for out-of-band calls.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Longest line accepted from a plugin.
const MAX_LINE_LENGTH: usize = 8 * 1024 * 1024;

/// How long a cancel notification may wait for the plugin's stdin.
const CANCEL_WRITE_TIMEOUT: Duration = Duration::from_millis(500);

type Pending = Arc<Mutex<HashMap<i64, oneshot::Sender<JsonRpcResponse>>>>;

enum Outcome {
    Response(JsonRpcResponse),
    Cancelled,
}

/// A running plugin process.
struct Connection {
    authority: String,
    child: tokio::sync::Mutex<Child>,
    stdin: tokio::sync::Mutex<ChildStdin>,
    pending: Pending,
    next_id: AtomicI64,
    closed: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

impl Connection {
    fn spawn(authority: &str, exec: &ExecSpec) -> Result<Self, TransportError> {
        let mut cmd = command(exec);
        cmd.arg("serve");

        // stdout is the protocol channel; plugin logs go to our stderr
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::inherit());
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::Protocol("Failed to capture stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::Protocol("Failed to capture stdout".to_string()))?;

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let reader = tokio::spawn(read_responses(
            authority.to_string(),
            stdout,
            Arc::clone(&pending),
            Arc::clone(&closed),
        ));

        tracing::debug!(authority, command = %exec.command.display(), "Spawned plugin process");

        Ok(Self {
            authority: authority.to_string(),
            child: tokio::sync::Mutex::new(child),
            stdin: tokio::sync::Mutex::new(stdin),
            pending,
            next_id: AtomicI64::new(1),
            closed,
            reader,
        })
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn write_line(&self, line: &str) -> Result<(), TransportError> {
        let mut stdin = self.stdin.lock().await;
        let result = async {
            stdin.write_all(line.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            stdin.flush().await
        }
        .await;
        result.map_err(|_| TransportError::Closed(self.authority.clone()))
    }

    async fn notify_cancel(&self, id: i64) {
        let params = CancelParams { id: RequestId::Number(id) };
        let notification =
            JsonRpcNotification::new(METHOD_CANCEL, serde_json::to_value(params).ok());
        let Ok(line) = serde_json::to_string(&notification) else { return };

        if tokio::time::timeout(CANCEL_WRITE_TIMEOUT, self.write_line(&line)).await.is_err() {
            tracing::warn!(authority = %self.authority, "Plugin stopped reading its input");
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    /// Give up on request `id`. A request whose line was only partly
    /// written leaves the input stream unusable, so the connection is
    /// retired instead of notified.
    async fn abandon(&self, id: i64, written: bool) {
        self.pending.lock().remove(&id);
        if written {
            self.notify_cancel(id).await;
        } else {
            tracing::debug!(authority = %self.authority, id, "Retiring connection after unsent request");
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    /// Send a request and wait for its response, the cancellation token, or
    /// the deadline, whichever comes first. The token and the deadline
    /// also apply while the request is still being written.
    async fn request(
        &self,
        method: &str,
        params: serde_json::Value,
        cancel: Option<&CancellationToken>,
        timeout: Option<Duration>,
    ) -> Result<Outcome, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        let request_json = serde_json::to_string(&JsonRpcRequest::new(id, method, Some(params)))?;
        tracing::debug!("plugin {} <- {}", self.authority, request_json);

        let written = AtomicBool::new(false);
        let exchange = async {
            if let Err(e) = self.write_line(&request_json).await {
                self.pending.lock().remove(&id);
                return Err(e);
            }
            written.store(true, Ordering::SeqCst);
            rx.await.map_err(|_| TransportError::Closed(self.authority.clone()))
        };

        let cancelled = async {
            match cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending().await,
            }
        };
        let deadline = async {
            match timeout {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            response = exchange => response.map(Outcome::Response),
            () = cancelled => {
                self.abandon(id, written.load(Ordering::SeqCst)).await;
                Ok(Outcome::Cancelled)
            }
            () = deadline => {
                self.abandon(id, written.load(Ordering::SeqCst)).await;
                Err(TransportError::Timeout(self.authority.clone()))
            }
        }
    }

    async fn kill(&self) {
        let _ = self.child.lock().await.kill().await;
        self.reader.abort();
    }
}

async fn read_responses(authority: String, stdout: ChildStdout, pending: Pending, closed: Arc<AtomicBool>) {
    let mut lines = FramedRead::new(stdout, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));

    while let Some(frame) = lines.next().await {
        let line = match frame {
            Ok(line) => line,
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                tracing::warn!(authority = %authority, max = MAX_LINE_LENGTH, "Plugin output line too long");
                break;
            }
            Err(LinesCodecError::Io(e)) => {
                tracing::warn!(authority = %authority, error = %e, "Failed to read from plugin");
                break;
            }
        };

        tracing::debug!("plugin {} -> {}", authority, line.trim());
        match serde_json::from_str::<JsonRpcResponse>(&line) {
            Ok(response) => {
                let RequestId::Number(id) = response.id else { continue };
                if let Some(tx) = pending.lock().remove(&id) {
                    let _ = tx.send(response);
                }
            }
            Err(e) => {
                tracing::warn!(authority = %authority, error = %e, "Ignoring malformed plugin output");
            }
        }
    }

    closed.store(true, Ordering::SeqCst);
    // dropping the senders wakes every waiter with `Closed`
    pending.lock().clear();
    tracing::debug!(authority = %authority, "Plugin process closed its output");
}

/// Base command for a plugin executable, without the subcommand.
fn command(exec: &ExecSpec) -> Command {
    let mut cmd = Command::new(&exec.command);
    cmd.args(&exec.args);

    for (key, value) in &exec.env {
        let expanded = shellexpand::env(value).unwrap_or_else(|_| value.as_str().into());
        cmd.env(key, expanded.as_ref());
    }

    if let Some(ref dir) = exec.working_dir {
        cmd.current_dir(dir);
    }
    cmd
}

fn remote_error(authority: &str, error: JsonRpcError) -> TransportError {
    match error.code {
        PERMISSION_DENIED => TransportError::PermissionDenied(authority.to_string()),
        METHOD_NOT_FOUND => {
            TransportError::Unsupported { authority: authority.to_string(), message: error.message }
        }
        _ => TransportError::Remote(error),
    }
}

/// Transport that runs plugins as child processes speaking JSON-RPC over
/// stdio.
pub struct ProcessTransport {
    caller: AppIdentity,
    index: Arc<dyn PackageIndex>,
    call_timeout: Duration,
    connections: tokio::sync::Mutex<HashMap<String, Arc<Connection>>>,
}

impl ProcessTransport {
    /// Create a transport calling on behalf of `caller`.
    pub fn new(caller: AppIdentity, index: Arc<dyn PackageIndex>) -> Self {
        Self {
            caller,
            index,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            connections: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Override the deadline applied to out-of-band calls.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// The caller identity sent with every request.
    pub fn caller(&self) -> &AppIdentity {
        &self.caller
    }

    fn exec_for(&self, authority: &str) -> Result<ExecSpec, TransportError> {
        let provider = self
            .index
            .provider(authority)
            .ok_or_else(|| TransportError::UnknownAuthority(authority.to_string()))?;
        provider.exec.ok_or_else(|| TransportError::Unsupported {
            authority: authority.to_string(),
            message: "no executable declared".to_string(),
        })
    }

    async fn connection(&self, authority: &str) -> Result<Arc<Connection>, TransportError> {
        let mut connections = self.connections.lock().await;

        if let Some(conn) = connections.get(authority) {
            if !conn.is_closed() {
                return Ok(Arc::clone(conn));
            }
        }

        let exec = self.exec_for(authority)?;
        let conn = Arc::new(Connection::spawn(authority, &exec)?);
        connections.insert(authority.to_string(), Arc::clone(&conn));
        Ok(conn)
    }

    /// Stop every running plugin process.
    pub async fn shutdown(&self) {
        let connections: Vec<_> = self.connections.lock().await.drain().map(|(_, c)| c).collect();
        for conn in connections {
            conn.kill().await;
        }
    }
}

#[async_trait]
impl PluginTransport for ProcessTransport {
    async fn call(&self, authority: &str, method: &str) -> Result<Option<Bundle>, TransportError> {
        let conn = self.connection(authority).await?;
        let params = CallParams { caller: self.caller.package.clone(), method: method.to_string() };

        let outcome = conn
            .request(METHOD_CALL, serde_json::to_value(params)?, None, Some(self.call_timeout))
            .await?;

        match outcome {
            Outcome::Response(response) => {
                response.into_result::<Bundle>().map_err(|e| remote_error(authority, e))
            }
            Outcome::Cancelled => Ok(None),
        }
    }

    async fn query(
        &self,
        address: &QueryAddress,
        cancel: CancellationToken,
    ) -> Result<Option<RowSet>, TransportError> {
        if cancel.is_cancelled() {
            return Ok(None);
        }

        let authority = address.authority();
        let conn = self.connection(authority).await?;
        let params =
            QueryParams { caller: self.caller.package.clone(), address: address.to_string() };

        let outcome =
            conn.request(METHOD_QUERY, serde_json::to_value(params)?, Some(&cancel), None).await?;

        match outcome {
            Outcome::Response(response) => {
                response.into_result::<RowSet>().map_err(|e| remote_error(authority, e))
            }
            Outcome::Cancelled => Ok(None),
        }
    }

    async fn request_permission(&self, authority: &str) -> Result<bool, TransportError> {
        let exec = self.exec_for(authority)?;

        let mut cmd = command(&exec);
        cmd.arg("grant-permission")
            .arg("--caller")
            .arg(&self.caller.package)
            .arg("--caller-label")
            .arg(&self.caller.label);

        // the consent prompt talks to the user's terminal
        let status = cmd
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await?;

        Ok(status.success())
    }
}
