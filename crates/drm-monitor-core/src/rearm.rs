//! Issuing the next sequence notification for a CRTC.

use tracing::debug;

use crate::error::MonitorError;
use crate::source::{
    CompletionToken, NotificationRequest, QueueFlags, SequenceSource, SourceError,
};
use crate::state::StateTable;

/// What to do when a CRTC turns out to be disabled while rearming after a
/// completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisabledPolicy {
    /// Leave the CRTC unarmed and keep running.
    #[default]
    Tolerate,
    /// Treat it like any other request failure.
    Fatal,
}

/// Result of a single rearm attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RearmOutcome {
    Armed,
    /// The CRTC is disabled; no request is outstanding for it.
    Skipped,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RearmPolicy {
    on_disabled: DisabledPolicy,
}

impl RearmPolicy {
    pub fn new(on_disabled: DisabledPolicy) -> Self {
        Self { on_disabled }
    }

    /// Builds the request for table slot `index`: one sequence past the
    /// current one, firing on the next vblank if that target was missed.
    pub fn request_for(table: &StateTable, index: usize) -> Option<NotificationRequest> {
        table.get(index).map(|record| NotificationRequest {
            crtc: record.id,
            target: 1,
            flags: QueueFlags::RELATIVE | QueueFlags::NEXT_ON_MISS,
            token: CompletionToken::for_index(index),
        })
    }

    /// Arms slot `index` at startup. A disabled CRTC is always tolerated here.
    ///
    /// # Errors
    /// Fails on any request error other than "disabled".
    pub fn prime<S: SequenceSource>(
        &self,
        source: &mut S,
        table: &StateTable,
        index: usize,
    ) -> Result<RearmOutcome, MonitorError> {
        issue(source, table, index, DisabledPolicy::Tolerate)
    }

    /// Rearms slot `index` after one of its completions was handled.
    ///
    /// # Errors
    /// Fails on any request error other than "disabled", and on "disabled"
    /// too when the policy is [`DisabledPolicy::Fatal`].
    pub fn rearm<S: SequenceSource>(
        &self,
        source: &mut S,
        table: &StateTable,
        index: usize,
    ) -> Result<RearmOutcome, MonitorError> {
        issue(source, table, index, self.on_disabled)
    }
}

fn issue<S: SequenceSource>(
    source: &mut S,
    table: &StateTable,
    index: usize,
    on_disabled: DisabledPolicy,
) -> Result<RearmOutcome, MonitorError> {
    let request = RearmPolicy::request_for(table, index)
        .ok_or(MonitorError::UnknownToken(CompletionToken::for_index(index)))?;

    match source.request_notification(&request) {
        Ok(()) => Ok(RearmOutcome::Armed),
        Err(SourceError::Disabled) if on_disabled == DisabledPolicy::Tolerate => {
            debug!(crtc = %request.crtc, "CRTC disabled, not armed");
            Ok(RearmOutcome::Skipped)
        }
        Err(err) => Err(MonitorError::from_source(
            "queue sequence",
            Some(request.crtc),
            err,
        )),
    }
}
