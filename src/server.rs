//! Line-delimited JSON transport over stdio (or any byte stream).
//!
//! Each input line is one request; each request produces exactly one
//! output line holding the serialized [`Envelope`].  Requests are served
//! in order, so the n-th output line answers the n-th input line.

use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::dispatch::Dispatcher;
use crate::envelope::{DispatchError, Envelope};

/// One request line.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Request {
    #[serde(rename_all = "camelCase")]
    Call {
        tool_name: String,
        #[serde(default)]
        arguments: Value,
    },
    Method { method: String },
}

/// Serve requests from `reader` until EOF or cancellation.
///
/// Returns the number of requests handled.
pub async fn serve<R, W>(
    dispatcher: &Dispatcher,
    reader: R,
    mut writer: W,
    cancel: CancellationToken,
) -> anyhow::Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    let mut handled = 0usize;

    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => {
                info!("server cancelled");
                break;
            }
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            debug!("input closed");
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let response = handle_line(dispatcher, &line).await;
        let mut out = serde_json::to_string(&response)?;
        out.push('\n');
        writer.write_all(out.as_bytes()).await?;
        writer.flush().await?;
        handled += 1;
    }

    Ok(handled)
}

/// Answer a single raw request line.
pub async fn handle_line(dispatcher: &Dispatcher, line: &str) -> Value {
    let request: Request = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(e) => {
            let env: Envelope =
                DispatchError::InvalidArguments(format!("malformed request: {e}")).into();
            return envelope_value(&env);
        }
    };

    match request {
        Request::Call {
            tool_name,
            arguments,
        } => envelope_value(&dispatcher.dispatch(&tool_name, arguments).await),
        Request::Method { method } if method == "list_tools" => serde_json::json!({
            "ok": true,
            "tools": dispatcher.registry().list(),
        }),
        Request::Method { method } => {
            let env: Envelope = DispatchError::UnknownTool(method).into();
            envelope_value(&env)
        }
    }
}

fn envelope_value(env: &Envelope) -> Value {
    serde_json::to_value(env).unwrap_or_else(|e| {
        serde_json::json!({ "ok": false, "kind": "StoreFailure", "message": e.to_string() })
    })
}
