use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::os::fd::{AsRawFd, RawFd};

use anyhow::{Context as _, Result};
use ip_packet::AddressFamily;

use crate::{PI_LEN, decode_pi, encode_pi, ioctl};

/// One queue of a TUN device.
///
/// The device is opened with `IFF_MULTI_QUEUE`, so every worker gets its
/// own file descriptor over the same interface and reads an independent
/// share of the traffic.
#[derive(Debug)]
pub struct Tun {
    file: File,
    name: String,
}

impl Tun {
    /// Opens `queues` descriptors on the TUN interface `name`, creating
    /// it if need be. The descriptors are non-blocking.
    pub fn open(name: &str, queues: usize) -> Result<Vec<Tun>> {
        (0..queues)
            .map(|i| Self::open_queue(name).with_context(|| format!("Failed to open queue {i}")))
            .collect()
    }

    fn open_queue(name: &str) -> Result<Tun> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open("/dev/net/tun")
            .context("Failed to open /dev/net/tun")?;

        let mut req = ioctl::Request::new(
            name,
            ioctl::SetTunFlagsPayload::new((libc::IFF_TUN | libc::IFF_MULTI_QUEUE) as _),
        )?;

        // Safety: `file` is open and the payload matches TUNSETIFF.
        unsafe {
            ioctl::exec(file.as_raw_fd(), libc::TUNSETIFF, &mut req)
                .context("TUNSETIFF failed; does the process have CAP_NET_ADMIN?")?;
        }

        set_nonblocking(file.as_raw_fd())?;

        Ok(Tun {
            file,
            name: name.to_owned(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reads one datagram. `Ok(None)` means the frame carried a protocol
    /// we do not translate. The datagram occupies `buf[PI_LEN..PI_LEN + n]`.
    pub fn recv(&self, buf: &mut [u8]) -> io::Result<Option<(AddressFamily, usize)>> {
        let read = (&self.file).read(buf)?;

        if read < PI_LEN {
            return Ok(None);
        }

        let mut pi = [0u8; PI_LEN];
        pi.copy_from_slice(&buf[..PI_LEN]);

        Ok(decode_pi(&pi).map(|af| (af, read - PI_LEN)))
    }

    /// Writes one datagram as packet-information header, IP header and
    /// payload in a single gather write.
    pub fn send(&self, af: AddressFamily, header: &[u8], payload: &[u8]) -> io::Result<()> {
        let pi = encode_pi(af);

        let iov = [
            libc::iovec {
                iov_base: pi.as_ptr() as *mut _,
                iov_len: pi.len(),
            },
            libc::iovec {
                iov_base: header.as_ptr() as *mut _,
                iov_len: header.len(),
            },
            libc::iovec {
                iov_base: payload.as_ptr() as *mut _,
                iov_len: payload.len(),
            },
        ];

        let iov_count = if payload.is_empty() { 2 } else { 3 };

        // Safety: the iovecs point into live slices for the duration of
        // the call.
        let written =
            unsafe { libc::writev(self.file.as_raw_fd(), iov.as_ptr(), iov_count) };

        if written < 0 {
            return Err(io::Error::last_os_error());
        }

        let expected = pi.len() + header.len() + payload.len();
        if written as usize != expected {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short write: {written} of {expected} bytes"),
            ));
        }

        Ok(())
    }
}

impl AsRawFd for Tun {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

/// Queries the interface MTU via `SIOCGIFMTU` on a throwaway socket.
pub fn interface_mtu(name: &str) -> Result<u16> {
    let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_DGRAM, 0) };
    if fd < 0 {
        return Err(io::Error::last_os_error()).context("Failed to create socket");
    }

    let mut req = ioctl::Request::new(name, ioctl::MtuPayload::new())?;

    // Safety: the socket is open and the payload matches SIOCGIFMTU.
    let result = unsafe { ioctl::exec(fd, libc::SIOCGIFMTU, &mut req) };

    unsafe {
        libc::close(fd);
    }

    result.with_context(|| format!("SIOCGIFMTU failed for {name}"))?;

    u16::try_from(req.payload().mtu).context("Interface MTU does not fit a datagram length")
}

fn set_nonblocking(fd: RawFd) -> Result<()> {
    // Safety: fd is open; F_GETFL/F_SETFL take no pointers.
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags < 0 {
            return Err(io::Error::last_os_error()).context("F_GETFL failed");
        }

        if libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
            return Err(io::Error::last_os_error()).context("F_SETFL failed");
        }
    }

    Ok(())
}
