//! Vehicle count feed
//!
//! Reads detector output, one message per line: either a bare JSON array
//! of six non-negative integers or an object with a `counts` field. Bad
//! lines are logged and skipped so one garbled message never stalls the
//! controller.

use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::LinesStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::InputError;
use crate::signal::controller::TrafficController;
use crate::signal::lane::{LaneCounts, parse_counts};

#[derive(Deserialize)]
#[serde(untagged)]
enum CountMessage {
    Bare(Vec<i64>),
    Wrapped { counts: Vec<i64> },
}

/// Parses one feed line. Blank lines yield `Ok(None)`.
///
/// # Errors
///
/// Returns [`InputError::InvalidCounts`] for malformed JSON, a wrong
/// length or negative values.
pub fn parse_feed_line(line: &str) -> Result<Option<LaneCounts>, InputError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let message: CountMessage = serde_json::from_str(trimmed)
        .map_err(|e| InputError::InvalidCounts(format!("unreadable message: {e}")))?;
    let raw = match message {
        CountMessage::Bare(raw) | CountMessage::Wrapped { counts: raw } => raw,
    };
    parse_counts(&raw).map(Some)
}

/// Pumps counts from `reader` into `controller` until EOF or cancellation.
///
/// Returns the number of accepted updates.
///
/// # Errors
///
/// Returns an I/O error if reading fails.
pub async fn pump_counts<R>(
    reader: R,
    controller: &TrafficController,
    cancel: &CancellationToken,
) -> std::io::Result<u64>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = LinesStream::new(reader.lines());
    let mut accepted = 0_u64;
    let mut line_no = 0_u64;

    loop {
        let next = tokio::select! {
            () = cancel.cancelled() => break,
            next = lines.next() => next,
        };
        let Some(line) = next else {
            debug!(accepted, "count feed reached end of input");
            break;
        };
        line_no += 1;
        match parse_feed_line(&line?) {
            Ok(Some(counts)) => {
                controller.update_vehicle_counts(counts);
                accepted += 1;
            }
            Ok(None) => {}
            Err(e) => warn!(line = line_no, error = %e, "skipping count feed line"),
        }
    }
    Ok(accepted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_and_wrapped_messages() {
        assert_eq!(parse_feed_line("[1,0,2,0,0,3]").unwrap(), Some([1, 0, 2, 0, 0, 3]));
        assert_eq!(
            parse_feed_line(r#"{"counts": [0,0,0,4,0,0]}"#).unwrap(),
            Some([0, 0, 0, 4, 0, 0])
        );
        assert_eq!(parse_feed_line("   ").unwrap(), None);
    }

    #[test]
    fn rejects_bad_lines() {
        assert!(parse_feed_line("[1,2,3]").is_err());
        assert!(parse_feed_line("[1,0,-2,0,0,3]").is_err());
        assert!(parse_feed_line("not json").is_err());
        assert!(parse_feed_line(r#"{"lanes": [0,0,0,0,0,0]}"#).is_err());
    }
}
