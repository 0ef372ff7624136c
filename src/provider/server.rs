//! Stdio server loop of a plugin executable.
//!
//! Reads one JSON-RPC message per line and writes one response per line.
//! Every request runs on its own thread so that a slow search never blocks
//! out-of-band calls or the cancellation notification meant for it.

use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::endpoint::{Endpoint, EndpointError};
use crate::contract::QueryAddress;
use crate::ipc::protocol::{
    CallParams, CancelParams, IncomingMessage, JsonRpcResponse, QueryParams, RequestId,
    INTERNAL_ERROR, INVALID_PARAMS, METHOD_CALL, METHOD_CANCEL, METHOD_NOT_FOUND, METHOD_QUERY,
};

type InFlight = Arc<Mutex<HashMap<RequestId, CancellationToken>>>;

/// Serves one [`Endpoint`] over a line-based stream pair.
pub struct ProviderServer {
    endpoint: Arc<dyn Endpoint>,
}

impl ProviderServer {
    pub fn new(endpoint: Arc<dyn Endpoint>) -> Self {
        Self { endpoint }
    }

    /// Serve until `input` reaches end of file.
    ///
    /// End of input means the host went away: every in-flight request is
    /// cancelled and its thread joined before returning.
    pub fn serve<R, W>(&self, input: R, output: W) -> io::Result<()>
    where
        R: BufRead,
        W: Write + Send + 'static,
    {
        let output = Arc::new(Mutex::new(output));
        let in_flight: InFlight = Arc::new(Mutex::new(HashMap::new()));
        let mut workers: Vec<JoinHandle<()>> = Vec::new();

        let mut read_error = None;
        for line in input.lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    read_error = Some(e);
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            let message: IncomingMessage = match serde_json::from_str(&line) {
                Ok(message) => message,
                Err(e) => {
                    tracing::warn!(error = %e, "Ignoring malformed message");
                    continue;
                }
            };

            let Some(id) = message.id.clone() else {
                handle_notification(&message, &in_flight);
                continue;
            };

            let token = CancellationToken::new();
            in_flight.lock().insert(id.clone(), token.clone());

            let endpoint = Arc::clone(&self.endpoint);
            let output = Arc::clone(&output);
            let in_flight = Arc::clone(&in_flight);

            workers.retain(|worker| !worker.is_finished());
            workers.push(std::thread::spawn(move || {
                let response = dispatch(endpoint.as_ref(), id.clone(), message, &token);
                in_flight.lock().remove(&id);
                write_response(&output, &response);
            }));
        }

        for token in in_flight.lock().values() {
            token.cancel();
        }
        for worker in workers {
            let _ = worker.join();
        }

        match read_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn handle_notification(message: &IncomingMessage, in_flight: &InFlight) {
    if message.method != METHOD_CANCEL {
        tracing::debug!(method = %message.method, "Ignoring unknown notification");
        return;
    }

    match parse_params::<CancelParams>(message.params.clone()) {
        Ok(params) => {
            if let Some(token) = in_flight.lock().get(&params.id) {
                tracing::debug!(id = ?params.id, "Cancelling request");
                token.cancel();
            }
        }
        Err(e) => tracing::warn!(error = %e, "Invalid cancel notification"),
    }
}

fn parse_params<T: DeserializeOwned>(params: Option<serde_json::Value>) -> Result<T, String> {
    serde_json::from_value(params.unwrap_or(serde_json::Value::Null))
        .map_err(|e| format!("Invalid params: {}", e))
}

fn dispatch(
    endpoint: &dyn Endpoint,
    id: RequestId,
    message: IncomingMessage,
    cancel: &CancellationToken,
) -> JsonRpcResponse {
    match message.method.as_str() {
        METHOD_CALL => match parse_params::<CallParams>(message.params) {
            Ok(params) => respond(id, endpoint.call(&params.caller, &params.method)),
            Err(e) => JsonRpcResponse::failure(id, INVALID_PARAMS, e),
        },
        METHOD_QUERY => match parse_params::<QueryParams>(message.params) {
            Ok(params) => match params.address.parse::<QueryAddress>() {
                Ok(address) => respond(id, endpoint.query(&params.caller, &address, cancel)),
                Err(e) => respond::<()>(id, Err(EndpointError::from(e))),
            },
            Err(e) => JsonRpcResponse::failure(id, INVALID_PARAMS, e),
        },
        other => JsonRpcResponse::failure(id, METHOD_NOT_FOUND, format!("Method not found: {}", other)),
    }
}

fn respond<T: Serialize>(id: RequestId, result: Result<Option<T>, EndpointError>) -> JsonRpcResponse {
    match result {
        Ok(value) => match serde_json::to_value(value) {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(e) => JsonRpcResponse::failure(id, INTERNAL_ERROR, e.to_string()),
        },
        Err(e) => JsonRpcResponse::failure(id, e.code(), e.to_string()),
    }
}

fn write_response<W: Write>(output: &Mutex<W>, response: &JsonRpcResponse) {
    let line = match serde_json::to_string(response) {
        Ok(line) => line,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize response");
            return;
        }
    };

    let mut output = output.lock();
    if let Err(e) = writeln!(output, "{}", line).and_then(|()| output.flush()) {
        tracing::warn!(error = %e, "Failed to write response");
    }
}
