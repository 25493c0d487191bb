//! Kernel `input_event` records and readiness waits on device nodes.

// SAFETY: `input_event` is plain integers on every target, so any byte
// pattern of the right length is a valid value. Reads go through
// `read_unaligned` on slices checked to be exactly one record long. The
// byte view of a record covers exactly `size_of::<input_event>()` bytes of
// a live reference, and the struct has no padding. `poll` is handed one
// pollfd that lives on the stack for the whole call.
#![allow(unsafe_code)]

use std::fs::File;
use std::io;
use std::os::unix::io::AsRawFd;
use std::time::Duration;

use input_linux_sys::input_event;

/// Size of one kernel `input_event` on this target.
pub const INPUT_EVENT_SIZE: usize = std::mem::size_of::<input_event>();

/// Reads one record. `None` unless `bytes` is exactly one record long.
#[must_use]
pub fn read_event(bytes: &[u8]) -> Option<input_event> {
    if bytes.len() != INPUT_EVENT_SIZE {
        return None;
    }
    // SAFETY: length checked above; every bit pattern is a valid record.
    Some(unsafe { std::ptr::read_unaligned(bytes.as_ptr().cast::<input_event>()) })
}

/// The wire bytes of one record, as the kernel would deliver it.
#[must_use]
pub fn event_bytes(event: &input_event) -> Vec<u8> {
    let ptr = std::ptr::addr_of!(*event).cast::<u8>();
    // SAFETY: `ptr` points at a live record of exactly INPUT_EVENT_SIZE bytes.
    unsafe { std::slice::from_raw_parts(ptr, INPUT_EVENT_SIZE) }.to_vec()
}

/// Waits up to `timeout` for `file` to become readable or hung up.
///
/// # Errors
///
/// The io error from `poll`, except for interrupts which count as not ready.
pub fn wait_readable(file: &File, timeout: Duration) -> io::Result<bool> {
    let mut fds = libc::pollfd {
        fd: file.as_raw_fd(),
        events: libc::POLLIN,
        revents: 0,
    };
    let millis = libc::c_int::try_from(timeout.as_millis()).unwrap_or(libc::c_int::MAX);
    // SAFETY: one valid pollfd, alive for the duration of the call.
    let ready = unsafe { libc::poll(&mut fds, 1, millis) };
    match ready {
        0 => Ok(false),
        n if n > 0 => Ok(true),
        _ => {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                Ok(false)
            } else {
                Err(err)
            }
        }
    }
}
