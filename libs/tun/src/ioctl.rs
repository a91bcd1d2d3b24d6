use std::{io, os::fd::RawFd};

/// Executes the `ioctl` syscall on the given file descriptor with the
/// provided request.
///
/// # Safety
///
/// The file descriptor must be open and `req` must match the layout the
/// request code expects.
pub unsafe fn exec<P>(fd: RawFd, code: libc::c_ulong, req: &mut Request<P>) -> io::Result<()> {
    let ret = unsafe { libc::ioctl(fd, code as _, req) };

    if ret < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

/// A control request addressed to an interface by name.
///
/// The payload must be `#[repr(C)]` with the layout of the particular
/// request being sent.
#[repr(C)]
pub struct Request<P> {
    name: [std::ffi::c_uchar; libc::IF_NAMESIZE],
    payload: P,
}

impl<P> Request<P> {
    pub fn new(name: &str, payload: P) -> io::Result<Self> {
        let bytes = name.as_bytes();

        if bytes.is_empty() || bytes.len() >= libc::IF_NAMESIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid interface name",
            ));
        }

        let mut name = [0u8; libc::IF_NAMESIZE];
        name[..bytes.len()].copy_from_slice(bytes);

        Ok(Self { name, payload })
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }
}

// The payloads are padded to the full size of the `ifreq` union; the
// kernel copies the whole structure regardless of which request it is.

#[cfg(target_os = "linux")]
#[repr(C)]
pub struct SetTunFlagsPayload {
    pub flags: std::ffi::c_short,
    _pad: [u8; 22],
}

#[cfg(target_os = "linux")]
impl SetTunFlagsPayload {
    pub fn new(flags: std::ffi::c_short) -> Self {
        Self { flags, _pad: [0; 22] }
    }
}

#[repr(C)]
pub struct MtuPayload {
    pub mtu: std::ffi::c_int,
    _pad: [u8; 20],
}

impl MtuPayload {
    pub fn new() -> Self {
        Self { mtu: 0, _pad: [0; 20] }
    }
}

impl Default for MtuPayload {
    fn default() -> Self {
        Self::new()
    }
}
