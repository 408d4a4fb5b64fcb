//! G-code stream sender
//!
//! Drives a device's `send` over an ordered line source, one line at a time,
//! and reports each transmitted command as a `Sent` event so external
//! progress trackers can record the last line that reached the machine.

use super::event::DeviceEvent;
use super::CncDevice;
use crate::error::Result;
use crate::gcode::{parse_gcode, SourceLine};
use futures_util::stream::{self, BoxStream, StreamExt};

/// Ordered, single-pass source of G-code lines
pub type LineSource<'a> = BoxStream<'a, SourceLine>;

/// Build a line source from in-memory text, numbering lines from 1
pub fn lines_from_text(text: &str) -> LineSource<'static> {
    let lines: Vec<SourceLine> = text
        .lines()
        .enumerate()
        .map(|(i, line)| SourceLine::new(line, i + 1))
        .collect();
    stream::iter(lines).boxed()
}

/// Send every line of `source` through `device`
///
/// Line N+1 is not sent until line N has settled. A failed send stops the
/// stream and is returned. Blank lines are sent but produce no `Sent` event.
pub async fn send_lines<D>(
    device: &D,
    mut source: LineSource<'_>,
    total_lines: Option<usize>,
) -> Result<()>
where
    D: CncDevice + ?Sized,
{
    tracing::info!("Sending G-code...");

    let digits = total_lines.map(|t| t.to_string().len()).unwrap_or(0);
    let total = total_lines
        .map(|t| t.to_string())
        .unwrap_or_else(|| "?".to_string());

    while let Some(line) = source.next().await {
        tracing::debug!(
            "{:>width$}/{}: {}",
            line.number,
            total,
            line.text,
            width = digits
        );

        device.send(&line.text).await?;

        if line.text.trim().is_empty() {
            continue;
        }

        if let Some(gcode) = parse_gcode(&line.text) {
            device.events().publish(DeviceEvent::Sent { gcode, line });
        }
    }

    tracing::info!("Finished sending G-code.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lines_from_text_numbers_from_one() {
        let lines: Vec<SourceLine> = lines_from_text("G0 X1\n\nG1 Y2").collect().await;
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], SourceLine::new("G0 X1", 1));
        assert_eq!(lines[1], SourceLine::new("", 2));
        assert_eq!(lines[2].number, 3);
    }
}
