//! Sequence sources: anything that can report CRTC vblank counters and
//! deliver asynchronous "sequence reached" completions.
//!
//! The production source is [`DrmDevice`], which talks to a kernel DRM node.
//! The dispatch loop only sees the [`SequenceSource`] trait, so tests drive
//! it with an in-memory script instead.

use std::fmt;
use std::io;

use bitflags::bitflags;

#[cfg(target_os = "linux")]
mod drm;
#[cfg(target_os = "linux")]
mod uapi;

#[cfg(target_os = "linux")]
pub use drm::DrmDevice;

/// Opaque handle identifying a CRTC to the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CrtcId(pub u32);

impl fmt::Display for CrtcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Correlates a completion with the state table slot that requested it.
///
/// Travels through the kernel as the 64-bit `user_data` of a queued request
/// and comes back untouched in the completion event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CompletionToken(pub u64);

impl CompletionToken {
    pub fn for_index(index: usize) -> Self {
        Self(index as u64)
    }

    /// Returns the table index this token was minted for, if it fits in `usize`.
    pub fn index(self) -> Option<usize> {
        usize::try_from(self.0).ok()
    }
}

/// A `(sequence, timestamp)` pair as reported by the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SequenceSample {
    pub sequence: u64,
    /// Nanoseconds in the source's monotonic clock domain.
    pub timestamp_ns: u64,
}

bitflags! {
    /// Flags for a queued sequence request (`DRM_CRTC_SEQUENCE_*`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct QueueFlags: u32 {
        /// Target is relative to the current sequence.
        const RELATIVE = 0x0000_0001;
        /// If the target already passed, fire on the next vblank instead.
        const NEXT_ON_MISS = 0x0000_0002;
    }
}

/// A request for a completion once `crtc` reaches `target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationRequest {
    pub crtc: CrtcId,
    pub target: u64,
    pub flags: QueueFlags,
    pub token: CompletionToken,
}

/// A delivered completion event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub token: CompletionToken,
    pub sample: SequenceSample,
}

/// Failure reported by a [`SequenceSource`] operation.
#[derive(Debug)]
pub enum SourceError {
    /// The CRTC is not currently enabled (`EINVAL` from the kernel).
    Disabled,
    /// Any other OS-level failure.
    Os(io::Error),
}

impl SourceError {
    pub fn is_disabled(&self) -> bool {
        matches!(self, SourceError::Disabled)
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::Disabled => write!(f, "CRTC is disabled"),
            SourceError::Os(err) => write!(f, "{err}"),
        }
    }
}

// `Os` displays the wrapped error itself, so it is not reported again as a source.
impl std::error::Error for SourceError {}

impl From<io::Error> for SourceError {
    fn from(err: io::Error) -> Self {
        SourceError::Os(err)
    }
}

/// Kernel-side view of CRTC vblank counters.
///
/// All calls except [`SequenceSource::wait_for_next_completion`] must return
/// promptly; the wait blocks until an event arrives or the device fails.
pub trait SequenceSource {
    /// Lists every CRTC the device exposes, in kernel order.
    fn enumerate_crtcs(&mut self) -> Result<Vec<CrtcId>, SourceError>;

    /// Reads the current sequence and timestamp of `crtc`.
    fn query_current(&mut self, crtc: CrtcId) -> Result<SequenceSample, SourceError>;

    /// Queues one completion for `request.crtc`.
    fn request_notification(&mut self, request: &NotificationRequest) -> Result<(), SourceError>;

    /// Blocks until the next completion is delivered.
    fn wait_for_next_completion(&mut self) -> Result<Completion, SourceError>;
}
