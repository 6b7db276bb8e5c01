//! Kernel DRM uapi structures and ioctl numbers used by [`super::DrmDevice`].
//!
//! Layouts mirror `include/uapi/drm/drm.h` and `drm_mode.h`.

use std::io;

use super::{Completion, CompletionToken, SequenceSample};

const DRM_IOCTL_BASE: u32 = b'd' as u32;

const IOC_NRBITS: u32 = 8;
const IOC_TYPEBITS: u32 = 8;
const IOC_SIZEBITS: u32 = 14;
const IOC_NRSHIFT: u32 = 0;
const IOC_TYPESHIFT: u32 = IOC_NRSHIFT + IOC_NRBITS;
const IOC_SIZESHIFT: u32 = IOC_TYPESHIFT + IOC_TYPEBITS;
const IOC_DIRSHIFT: u32 = IOC_SIZESHIFT + IOC_SIZEBITS;
const IOC_READ_WRITE: u32 = 0b11;

/// `_IOWR('d', nr, T)` with the generic Linux ioctl encoding.
const fn drm_iowr<T>(nr: u32) -> u64 {
    let size = size_of::<T>() as u32;
    ((IOC_READ_WRITE << IOC_DIRSHIFT)
        | (size << IOC_SIZESHIFT)
        | (DRM_IOCTL_BASE << IOC_TYPESHIFT)
        | (nr << IOC_NRSHIFT)) as u64
}

pub const DRM_IOCTL_CRTC_GET_SEQUENCE: u64 = drm_iowr::<DrmCrtcGetSequence>(0x3b);
pub const DRM_IOCTL_CRTC_QUEUE_SEQUENCE: u64 = drm_iowr::<DrmCrtcQueueSequence>(0x3c);
pub const DRM_IOCTL_MODE_GETRESOURCES: u64 = drm_iowr::<DrmModeCardRes>(0xa0);

pub const DRM_EVENT_CRTC_SEQUENCE: u32 = 0x03;

/// `struct drm_mode_card_res`
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct DrmModeCardRes {
    pub fb_id_ptr: u64,
    pub crtc_id_ptr: u64,
    pub connector_id_ptr: u64,
    pub encoder_id_ptr: u64,
    pub count_fbs: u32,
    pub count_crtcs: u32,
    pub count_connectors: u32,
    pub count_encoders: u32,
    pub min_width: u32,
    pub max_width: u32,
    pub min_height: u32,
    pub max_height: u32,
}

/// `struct drm_crtc_get_sequence`
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct DrmCrtcGetSequence {
    pub crtc_id: u32,
    pub active: u32,
    pub sequence: u64,
    pub sequence_ns: i64,
}

/// `struct drm_crtc_queue_sequence`
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct DrmCrtcQueueSequence {
    pub crtc_id: u32,
    pub flags: u32,
    pub sequence: u64,
    pub user_data: u64,
}

/// Size of `struct drm_event` (type + length).
const EVENT_HEADER_LEN: usize = 8;
/// Size of `struct drm_event_crtc_sequence`.
const CRTC_SEQUENCE_EVENT_LEN: usize = 32;

fn read_u32(buf: &[u8], at: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[at..at + 4]);
    u32::from_ne_bytes(bytes)
}

fn read_u64(buf: &[u8], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[at..at + 8]);
    u64::from_ne_bytes(bytes)
}

/// Splits one `read(2)` worth of DRM events into sequence completions.
///
/// Events of other types are skipped. A record that runs past the end of the
/// buffer ends parsing, matching libdrm.
///
/// # Errors
/// Returns `InvalidData` if the buffer is shorter than an event header or a
/// record declares a length smaller than its header.
pub fn parse_events(buf: &[u8]) -> io::Result<Vec<Completion>> {
    if buf.len() < EVENT_HEADER_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("short DRM event read ({} bytes)", buf.len()),
        ));
    }

    let mut completions = Vec::new();
    let mut offset = 0;
    while offset + EVENT_HEADER_LEN <= buf.len() {
        let kind = read_u32(buf, offset);
        let length = read_u32(buf, offset + 4) as usize;
        if length < EVENT_HEADER_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("malformed DRM event (type {kind}, length {length})"),
            ));
        }
        let Some(end) = offset.checked_add(length).filter(|&end| end <= buf.len()) else {
            break;
        };

        if kind == DRM_EVENT_CRTC_SEQUENCE && length >= CRTC_SEQUENCE_EVENT_LEN {
            let user_data = read_u64(buf, offset + 8);
            let time_ns = read_u64(buf, offset + 16);
            let sequence = read_u64(buf, offset + 24);
            completions.push(Completion {
                token: CompletionToken(user_data),
                sample: SequenceSample {
                    sequence,
                    timestamp_ns: time_ns,
                },
            });
        }

        offset = end;
    }

    Ok(completions)
}
