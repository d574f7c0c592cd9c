//! Stdio transport: newline-delimited JSON-RPC for point-to-point sessions.
//!
//! One request per line in, one response per line out, over the same
//! dispatcher as the network transports. Blank lines are ignored; EOF ends
//! the session.

use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use hivemind::mcp::wire::handle_frame;
use hivemind::{Dispatcher, HubError, HubResult};

/// Runs the loop over arbitrary reader/writer pairs (tests use buffers).
pub async fn run_loop<R, W>(dispatcher: &Dispatcher, reader: R, mut writer: W) -> HubResult<()>
where
    R: tokio::io::AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| HubError::Internal(format!("stdio read: {}", e)))?
    {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let response = handle_frame(dispatcher, line).await;
        let mut encoded = serde_json::to_string(&response)
            .map_err(|e| HubError::Internal(format!("stdio encode: {}", e)))?;
        encoded.push('\n');
        writer
            .write_all(encoded.as_bytes())
            .await
            .map_err(|e| HubError::Internal(format!("stdio write: {}", e)))?;
        writer
            .flush()
            .await
            .map_err(|e| HubError::Internal(format!("stdio flush: {}", e)))?;
    }
    Ok(())
}

/// Serves the dispatcher over the process stdin/stdout.
pub async fn run(dispatcher: &Dispatcher) -> HubResult<()> {
    run_loop(dispatcher, tokio::io::stdin(), tokio::io::stdout()).await
}
