//! [`SequenceSource`] backed by a kernel DRM device node.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, Read};
use std::os::fd::{AsRawFd, RawFd};
use std::path::Path;

use super::uapi::{
    self, DRM_IOCTL_CRTC_GET_SEQUENCE, DRM_IOCTL_CRTC_QUEUE_SEQUENCE,
    DRM_IOCTL_MODE_GETRESOURCES, DrmCrtcGetSequence, DrmCrtcQueueSequence, DrmModeCardRes,
};
use super::{
    Completion, CrtcId, NotificationRequest, SequenceSample, SequenceSource, SourceError,
};

/// Upper bound of a single event read, same as libdrm.
const EVENT_BUFFER_LEN: usize = 1024;

/// An open DRM device (for example `/dev/dri/card0`).
///
/// The handle lives for the whole process and is only used from the thread
/// that opened it.
pub struct DrmDevice {
    file: File,
    pending: VecDeque<Completion>,
}

impl DrmDevice {
    /// Opens the device read-only.
    ///
    /// # Errors
    /// Returns the OS error if the node cannot be opened.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            file,
            pending: VecDeque::new(),
        })
    }

    fn fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }

    fn read_events(&mut self) -> Result<(), SourceError> {
        let mut buf = [0u8; EVENT_BUFFER_LEN];
        loop {
            let len = match self.file.read(&mut buf) {
                Ok(0) => {
                    return Err(SourceError::Os(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "DRM device closed its event stream",
                    )));
                }
                Ok(len) => len,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(SourceError::Os(err)),
            };
            self.pending.extend(uapi::parse_events(&buf[..len])?);
            return Ok(());
        }
    }
}

/// Issues a DRM ioctl, restarting it on `EINTR`/`EAGAIN` like `drmIoctl`.
fn drm_ioctl<T>(fd: RawFd, request: u64, arg: &mut T) -> io::Result<()> {
    loop {
        // SAFETY: `arg` is a live, exclusively borrowed `#[repr(C)]` value whose
        // layout matches what the kernel expects for `request`.
        let ret = unsafe {
            libc::ioctl(
                fd,
                request as _,
                std::ptr::from_mut(arg).cast::<libc::c_void>(),
            )
        };
        if ret == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EINTR | libc::EAGAIN) => {}
            _ => return Err(err),
        }
    }
}

/// Maps `EINVAL` to [`SourceError::Disabled`]; the kernel reports a CRTC
/// without vblank interrupts enabled that way.
fn classify(err: io::Error) -> SourceError {
    if err.raw_os_error() == Some(libc::EINVAL) {
        SourceError::Disabled
    } else {
        SourceError::Os(err)
    }
}

impl SequenceSource for DrmDevice {
    fn enumerate_crtcs(&mut self) -> Result<Vec<CrtcId>, SourceError> {
        let mut probe = DrmModeCardRes::default();
        drm_ioctl(self.fd(), DRM_IOCTL_MODE_GETRESOURCES, &mut probe)?;

        // The count can grow between the two calls (hotplug); retry until the
        // buffer is big enough.
        let mut capacity = probe.count_crtcs;
        loop {
            let mut ids = vec![0u32; capacity as usize];
            let mut res = DrmModeCardRes {
                crtc_id_ptr: ids.as_mut_ptr() as u64,
                count_crtcs: capacity,
                ..DrmModeCardRes::default()
            };
            drm_ioctl(self.fd(), DRM_IOCTL_MODE_GETRESOURCES, &mut res)?;

            if res.count_crtcs <= capacity {
                ids.truncate(res.count_crtcs as usize);
                return Ok(ids.into_iter().map(CrtcId).collect());
            }
            capacity = res.count_crtcs;
        }
    }

    fn query_current(&mut self, crtc: CrtcId) -> Result<SequenceSample, SourceError> {
        let mut arg = DrmCrtcGetSequence {
            crtc_id: crtc.0,
            ..DrmCrtcGetSequence::default()
        };
        drm_ioctl(self.fd(), DRM_IOCTL_CRTC_GET_SEQUENCE, &mut arg).map_err(classify)?;
        Ok(SequenceSample {
            sequence: arg.sequence,
            timestamp_ns: arg.sequence_ns as u64,
        })
    }

    fn request_notification(&mut self, request: &NotificationRequest) -> Result<(), SourceError> {
        let mut arg = DrmCrtcQueueSequence {
            crtc_id: request.crtc.0,
            flags: request.flags.bits(),
            sequence: request.target,
            user_data: request.token.0,
        };
        drm_ioctl(self.fd(), DRM_IOCTL_CRTC_QUEUE_SEQUENCE, &mut arg).map_err(classify)
    }

    fn wait_for_next_completion(&mut self) -> Result<Completion, SourceError> {
        loop {
            if let Some(completion) = self.pending.pop_front() {
                return Ok(completion);
            }
            self.read_events()?;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;
    use crate::source::CompletionToken;

    fn sequence_event(user_data: u64, time_ns: u64, sequence: u64) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&uapi::DRM_EVENT_CRTC_SEQUENCE.to_ne_bytes());
        buf.extend_from_slice(&32u32.to_ne_bytes());
        buf.extend_from_slice(&user_data.to_ne_bytes());
        buf.extend_from_slice(&time_ns.to_ne_bytes());
        buf.extend_from_slice(&sequence.to_ne_bytes());
        buf
    }

    fn event_file(events: &[Vec<u8>]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for event in events {
            file.write_all(event).unwrap();
        }
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_completions_from_one_read_are_delivered_one_at_a_time() {
        let file = event_file(&[sequence_event(0, 100, 1), sequence_event(1, 200, 2)]);
        let mut device = DrmDevice::open(file.path()).unwrap();

        let first = device.wait_for_next_completion().unwrap();
        assert_eq!(first.token, CompletionToken(0));
        assert_eq!(first.sample.sequence, 1);
        assert_eq!(device.pending.len(), 1);

        let second = device.wait_for_next_completion().unwrap();
        assert_eq!(second.token, CompletionToken(1));
        assert_eq!(second.sample.timestamp_ns, 200);
        assert!(device.pending.is_empty());
    }

    #[test]
    fn test_end_of_event_stream_is_fatal() {
        let file = event_file(&[sequence_event(0, 100, 1)]);
        let mut device = DrmDevice::open(file.path()).unwrap();

        device.wait_for_next_completion().unwrap();
        let err = device.wait_for_next_completion().unwrap_err();
        assert!(matches!(
            err,
            SourceError::Os(ref e) if e.kind() == io::ErrorKind::UnexpectedEof
        ));
    }

    #[test]
    fn test_short_read_is_fatal() {
        let file = event_file(&[vec![0u8; 4]]);
        let mut device = DrmDevice::open(file.path()).unwrap();

        let err = device.wait_for_next_completion().unwrap_err();
        assert!(matches!(
            err,
            SourceError::Os(ref e) if e.kind() == io::ErrorKind::InvalidData
        ));
    }

    #[test]
    fn test_non_drm_file_fails_enumeration() {
        let file = event_file(&[]);
        let mut device = DrmDevice::open(file.path()).unwrap();

        let err = device.enumerate_crtcs().unwrap_err();
        assert!(matches!(err, SourceError::Os(_)));
    }

    #[test]
    fn test_open_missing_device_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(DrmDevice::open(&dir.path().join("card9")).is_err());
    }
}
