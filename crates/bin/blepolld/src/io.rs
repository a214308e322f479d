//! JSON-lines framing of the daemon's stdin and stdout.
//!
//! Each stdin line is one request: a JSON object
//! (`{"address": "...", "scan": true}`), a bare address, or an empty line
//! for the configured default. Each delivered reading becomes one JSON
//! object on stdout; statuses only go to the log.

use tokio::io::{AsyncWrite, AsyncWriteExt as _};

use blepoll_app::outbound::Outbound;
use blepoll_domain::request::Request;
use blepoll_domain::status::{Severity, Status};

/// Parse one stdin line into a request.
///
/// # Errors
///
/// Returns the JSON error when a line starting with `{` is malformed.
pub fn parse_request(line: &str) -> Result<Request, serde_json::Error> {
    let line = line.trim();
    if line.is_empty() {
        Ok(Request::default())
    } else if line.starts_with('{') {
        serde_json::from_str(line)
    } else {
        Ok(Request::for_address(line))
    }
}

/// Write a reading as one JSON line, or log a status.
///
/// # Errors
///
/// Returns an I/O error when writing to `out` fails.
pub async fn emit<W>(out: &mut W, message: Outbound) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    match message {
        Outbound::Reading(reading) => {
            let mut line = serde_json::to_vec(&reading)?;
            line.push(b'\n');
            out.write_all(&line).await?;
            out.flush().await
        }
        Outbound::Status(status) => {
            log_status(&status);
            Ok(())
        }
    }
}

fn log_status(status: &Status) {
    match status.severity {
        Severity::Error => tracing::error!(%status, "status"),
        Severity::Warning => tracing::warn!(%status, "status"),
        Severity::Info => tracing::info!(%status, "status"),
        Severity::Ok => tracing::debug!("status cleared"),
    }
}
