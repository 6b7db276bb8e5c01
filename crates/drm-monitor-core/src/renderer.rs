//! In-place terminal view of the state table.
//!
//! Every render repaints the whole table: it moves the cursor up over the
//! lines printed last time, clearing each, then prints one line per record.
//! The table length never changes, so the erase count always matches the
//! print count.

use std::io::{self, Write};

use crossterm::cursor::MoveUp;
use crossterm::queue;
use crossterm::terminal::{Clear, ClearType};

use crate::state::{CrtcRecord, StateTable};

/// Refresh rate implied by the time between two vblanks, or 0 if unknown.
pub fn refresh_rate_hz(delta_time_ns: u64) -> f64 {
    if delta_time_ns > 0 {
        1_000_000_000.0 / delta_time_ns as f64
    } else {
        0.0
    }
}

/// One display line for a record (no trailing newline).
pub fn format_record(record: &CrtcRecord) -> String {
    format!(
        "CRTC {}: seq={} ns={} delta_ns={} Hz={:.6}",
        record.id,
        record.sequence,
        record.timestamp_ns,
        record.delta_time_ns,
        refresh_rate_hz(record.delta_time_ns)
    )
}

pub struct TerminalRenderer<W: Write> {
    out: W,
    /// Lines written by the previous render; 0 before the first one.
    printed: usize,
}

impl<W: Write> TerminalRenderer<W> {
    pub fn new(out: W) -> Self {
        Self { out, printed: 0 }
    }

    /// Repaints the table.
    ///
    /// # Errors
    /// Returns the underlying write error.
    pub fn render(&mut self, table: &StateTable) -> io::Result<()> {
        for _ in 0..self.printed {
            queue!(self.out, MoveUp(1), Clear(ClearType::CurrentLine))?;
        }
        for record in table.iter() {
            writeln!(self.out, "{}", format_record(record))?;
        }
        self.out.flush()?;
        self.printed = table.len();
        Ok(())
    }

    pub fn writer(&self) -> &W {
        &self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
