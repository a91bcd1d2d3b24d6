use std::sync::Arc;

use anyhow::{Context as _, Result};
use ip_packet::AddressFamily;
use tokio::io::Interest;
use tokio::io::unix::AsyncFd;
use tokio::sync::watch;
use tun::Tun;
use xlat::Translator;

/// Room for the largest possible datagram plus the packet-information
/// header.
const RECV_BUF_SIZE: usize = 65535 + tun::PI_LEN;

/// One worker: owns one TUN queue and loops read -> translate -> write
/// until shutdown. All per-packet state lives in this thread; the
/// translator is shared read-only.
///
/// The only suspension points are the TUN read and the shutdown signal;
/// translation itself never blocks. Writes go straight out: the kernel
/// accepts an MTU-sized datagram on a TUN device without blocking, and if
/// it ever refuses, the packet is dropped with a warning rather than
/// retried.
pub fn run(
    queue: Tun,
    translator: Arc<Translator>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create runtime")?
        .block_on(async move {
            let fd = AsyncFd::with_interest(queue, Interest::READABLE)
                .context("Failed to register TUN queue")?;
            let mut buf = vec![0u8; RECV_BUF_SIZE];

            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    guard = fd.readable() => {
                        let mut guard = guard.context("TUN queue poll failed")?;

                        let received = match guard.try_io(|fd| fd.get_ref().recv(&mut buf)) {
                            Ok(result) => result.context("Failed to read from TUN device")?,
                            Err(_would_block) => continue,
                        };

                        // Frames carrying anything but IP fall through.
                        let Some((af, len)) = received else {
                            continue;
                        };

                        let datagram = &mut buf[tun::PI_LEN..tun::PI_LEN + len];
                        let frames = match af {
                            AddressFamily::V4 => translator.handle_ipv4(datagram),
                            AddressFamily::V6 => translator.handle_ipv6(datagram),
                        };

                        for frame in frames {
                            if let Err(e) = fd.get_ref().send(frame.af, &frame.header, frame.payload)
                            {
                                tracing::warn!("Failed to write packet to TUN device: {e}");
                            }
                        }
                    }
                }
            }

            anyhow::Ok(())
        })
}
