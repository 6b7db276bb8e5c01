//! Fatal monitor errors.

use std::fmt;
use std::io;

use crate::source::{CompletionToken, CrtcId, SourceError};

/// Every error here ends the process; tolerated conditions never surface as
/// a `MonitorError`.
#[derive(Debug)]
pub enum MonitorError {
    /// A source operation failed with something other than a tolerated
    /// "disabled" outcome.
    Source {
        operation: &'static str,
        crtc: Option<CrtcId>,
        source: SourceError,
    },
    /// The device exposes more CRTCs than the state table can hold.
    TooManyCrtcs { found: usize, capacity: usize },
    /// The device listed the same CRTC twice.
    DuplicateCrtc(CrtcId),
    /// A completion arrived with a token that names no table slot.
    UnknownToken(CompletionToken),
    /// A completion did not advance the CRTC's sequence counter.
    SequenceRegression {
        crtc: CrtcId,
        previous: u64,
        received: u64,
    },
    /// A completion did not advance the CRTC's timestamp.
    TimestampRegression {
        crtc: CrtcId,
        previous: u64,
        received: u64,
    },
    /// Writing the display failed.
    Render(io::Error),
}

impl MonitorError {
    pub(crate) fn from_source(
        operation: &'static str,
        crtc: Option<CrtcId>,
        source: SourceError,
    ) -> Self {
        MonitorError::Source {
            operation,
            crtc,
            source,
        }
    }
}

impl fmt::Display for MonitorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorError::Source {
                operation,
                crtc: Some(crtc),
                ..
            } => write!(f, "{operation} failed for CRTC {crtc}"),
            MonitorError::Source {
                operation,
                crtc: None,
                ..
            } => write!(f, "{operation} failed"),
            MonitorError::TooManyCrtcs { found, capacity } => write!(
                f,
                "device exposes {found} CRTCs, more than the supported {capacity}"
            ),
            MonitorError::DuplicateCrtc(crtc) => write!(f, "CRTC {crtc} listed twice"),
            MonitorError::UnknownToken(token) => {
                write!(f, "completion for unknown token {}", token.0)
            }
            MonitorError::SequenceRegression {
                crtc,
                previous,
                received,
            } => write!(
                f,
                "CRTC {crtc}: sequence went from {previous} to {received}"
            ),
            MonitorError::TimestampRegression {
                crtc,
                previous,
                received,
            } => write!(
                f,
                "CRTC {crtc}: timestamp went from {previous}ns to {received}ns"
            ),
            MonitorError::Render(_) => write!(f, "write display"),
        }
    }
}

impl std::error::Error for MonitorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MonitorError::Source { source, .. } => Some(source),
            MonitorError::Render(err) => Some(err),
            _ => None,
        }
    }
}
