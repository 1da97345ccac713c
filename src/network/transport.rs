//! Datagram transport dengan bounded wait
//!
//! Socket non-blocking di-register ke mio `Poll` bersama sebuah
//! `Waker`, sehingga `recv` bisa dibatasi timeout dan bisa
//! di-interrupt dari thread lain lewat `Canceller`.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use mio::net::UdpSocket;
use mio::{Events, Interest, Poll, Token, Waker};

const SOCKET_TOKEN: Token = Token(0);
const WAKER_TOKEN: Token = Token(1);
const EVENTS_CAPACITY: usize = 8;

/// Upper bound for a send to become writable again
const SEND_TIMEOUT: Duration = Duration::from_secs(1);

/// Hasil satu kali menunggu datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Received {
    /// Datagram diterima, berisi jumlah byte yang benar-benar dibaca
    Datagram(usize),
    /// Tidak ada datagram sampai batas waktu
    TimedOut,
    /// Menunggu dibatalkan lewat `Canceller`
    Cancelled,
}

/// Minimal datagram capability used by the exchange driver
pub trait Transport {
    /// Fire-and-forget send ke peer yang sudah dikonfigurasi
    fn send(&mut self, payload: &[u8]) -> io::Result<usize>;

    /// Block sampai tepat satu datagram masuk ke `buf`
    ///
    /// `timeout = None` menunggu tanpa batas (tetap bisa di-cancel).
    /// Datagram yang lebih besar dari `buf` dipotong oleh OS.
    fn recv(&mut self, buf: &mut [u8], timeout: Option<Duration>) -> io::Result<Received>;

    /// Jeda sampai `duration` habis atau di-cancel, mana yang lebih dulu
    ///
    /// Datagram yang masuk selama jeda tidak dibaca.
    fn pause(&mut self, duration: Duration) -> io::Result<()>;

    /// Handle untuk membatalkan `recv` atau `pause` yang sedang berjalan
    fn canceller(&self) -> Canceller;
}

/// Cancellation signal, safe to clone into other threads
#[derive(Clone, Default)]
pub struct Canceller {
    flag: Arc<AtomicBool>,
    waker: Option<Arc<Waker>>,
}

impl Canceller {
    /// Canceller tanpa waker (hanya dicek di antara iterasi)
    pub fn new() -> Self {
        Self::default()
    }

    fn with_waker(waker: Arc<Waker>) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            waker: Some(waker),
        }
    }

    /// Set flag lalu bangunkan poll yang sedang menunggu
    pub fn cancel(&self) -> io::Result<()> {
        self.flag.store(true, Ordering::Release);
        match &self.waker {
            Some(waker) => waker.wake(),
            None => Ok(()),
        }
    }

    #[inline(always)]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Clear the flag so the same handle can stop a later run
    pub fn reset(&self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl fmt::Debug for Canceller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Canceller")
            .field("cancelled", &self.is_cancelled())
            .field("wakes_poll", &self.waker.is_some())
            .finish()
    }
}

/// UDP transport ke satu peer
///
/// Socket di-acquire sekali saat `bind` dan dilepas oleh `Drop`,
/// termasuk ketika run berakhir karena error.
pub struct UdpTransport {
    poll: Poll,
    events: Events,
    socket: UdpSocket,
    peer: SocketAddr,
    canceller: Canceller,
    /// WRITABLE ikut di-register hanya selama send menunggu
    write_interest: bool,
}

impl UdpTransport {
    /// Bind socket lokal dan register ke poll
    pub fn bind(local: SocketAddr, peer: SocketAddr) -> io::Result<Self> {
        let poll = Poll::new()?;

        let mut socket = UdpSocket::bind(local)?;
        poll.registry()
            .register(&mut socket, SOCKET_TOKEN, Interest::READABLE)?;

        let waker = Arc::new(Waker::new(poll.registry(), WAKER_TOKEN)?);

        log::debug!(
            "UDP transport bound to {} (peer {})",
            socket.local_addr()?,
            peer
        );

        Ok(Self {
            poll,
            events: Events::with_capacity(EVENTS_CAPACITY),
            socket,
            peer,
            canceller: Canceller::with_waker(waker),
            write_interest: false,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Set SO_RCVBUF kernel untuk socket ini
    #[cfg(unix)]
    pub fn set_socket_recv_buffer(&self, bytes: usize) -> io::Result<()> {
        use std::os::unix::io::AsRawFd;

        let optval = libc::c_int::try_from(bytes)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "buffer size too large"))?;
        let rc = unsafe {
            libc::setsockopt(
                self.socket.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_RCVBUF,
                &optval as *const _ as *const libc::c_void,
                std::mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Not supported off unix; the OS default stays in place
    #[cfg(not(unix))]
    pub fn set_socket_recv_buffer(&self, bytes: usize) -> io::Result<()> {
        log::warn!("SO_RCVBUF sizing unsupported on this platform, ignoring {} bytes", bytes);
        Ok(())
    }

    /// Tambah atau lepas WRITABLE dari registrasi socket
    fn watch_writable(&mut self, on: bool) -> io::Result<()> {
        if self.write_interest == on {
            return Ok(());
        }
        let interest = if on {
            Interest::READABLE | Interest::WRITABLE
        } else {
            Interest::READABLE
        };
        self.poll
            .registry()
            .reregister(&mut self.socket, SOCKET_TOKEN, interest)?;
        self.write_interest = on;
        Ok(())
    }

    /// Poll sampai ada event atau `wait` habis
    fn wait(&mut self, wait: Option<Duration>) -> io::Result<()> {
        match self.poll.poll(&mut self.events, wait) {
            Ok(()) => Ok(()),
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl Transport for UdpTransport {
    fn send(&mut self, payload: &[u8]) -> io::Result<usize> {
        let deadline = Instant::now() + SEND_TIMEOUT;

        let sent = loop {
            match self.socket.send_to(payload, self.peer) {
                Ok(n) => break Ok(n),
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    let now = Instant::now();
                    if now >= deadline {
                        break Err(io::Error::new(
                            io::ErrorKind::TimedOut,
                            "socket never became writable",
                        ));
                    }
                    if let Err(e) = self.watch_writable(true) {
                        break Err(e);
                    }
                    if let Err(e) = self.wait(Some(deadline - now)) {
                        break Err(e);
                    }
                }
                Err(e) => break Err(e),
            }
        };

        self.watch_writable(false)?;
        sent
    }

    fn recv(&mut self, buf: &mut [u8], timeout: Option<Duration>) -> io::Result<Received> {
        let deadline = timeout.map(|t| Instant::now() + t);

        // Selalu coba recv dulu sebelum poll: readiness mio edge-triggered,
        // event yang sudah terpakai oleh send tidak akan datang lagi.
        loop {
            if self.canceller.is_cancelled() {
                return Ok(Received::Cancelled);
            }

            match self.socket.recv_from(buf) {
                Ok((n, from)) => {
                    log::trace!("received {} bytes from {}", n, from);
                    return Ok(Received::Datagram(n));
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => return Err(e),
            }

            let wait = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(Received::TimedOut);
                    }
                    Some(deadline - now)
                }
                None => None,
            };
            self.wait(wait)?;
        }
    }

    fn pause(&mut self, duration: Duration) -> io::Result<()> {
        let deadline = Instant::now() + duration;

        // Event READABLE selama jeda diabaikan, datagram tetap di socket
        loop {
            if self.canceller.is_cancelled() {
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            self.wait(Some(deadline - now))?;
        }
    }

    fn canceller(&self) -> Canceller {
        self.canceller.clone()
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        if let Err(e) = self.poll.registry().deregister(&mut self.socket) {
            log::debug!("deregister on close failed: {}", e);
        }
        log::debug!("UDP transport to {} closed", self.peer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[test]
    fn test_canceller_without_waker() {
        let canceller = Canceller::new();
        let clone = canceller.clone();
        assert!(!clone.is_cancelled());
        canceller.cancel().unwrap();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_canceller_reset() {
        let canceller = Canceller::new();
        canceller.cancel().unwrap();
        canceller.clone().reset();
        assert!(!canceller.is_cancelled());
    }

    #[test]
    fn test_pause_runs_full_duration() {
        let peer = std::net::UdpSocket::bind(loopback()).unwrap();
        let mut transport = UdpTransport::bind(loopback(), peer.local_addr().unwrap()).unwrap();

        let start = Instant::now();
        transport.pause(Duration::from_millis(30)).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_cancel_interrupts_pause() {
        let peer = std::net::UdpSocket::bind(loopback()).unwrap();
        let mut transport = UdpTransport::bind(loopback(), peer.local_addr().unwrap()).unwrap();

        let canceller = transport.canceller();
        let cancel = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            canceller.cancel().unwrap();
        });

        let start = Instant::now();
        transport.pause(Duration::from_secs(10)).unwrap();
        cancel.join().unwrap();
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_pause_leaves_datagram_for_recv() {
        let peer = std::net::UdpSocket::bind(loopback()).unwrap();
        let mut transport = UdpTransport::bind(loopback(), peer.local_addr().unwrap()).unwrap();

        peer.send_to(b"late", transport.local_addr().unwrap()).unwrap();
        transport.pause(Duration::from_millis(20)).unwrap();

        let mut buf = [0u8; 16];
        let outcome = transport
            .recv(&mut buf, Some(Duration::from_secs(2)))
            .unwrap();
        assert_eq!(outcome, Received::Datagram(4));
    }

    #[test]
    fn test_send_drops_write_interest() {
        let peer = std::net::UdpSocket::bind(loopback()).unwrap();
        let mut transport = UdpTransport::bind(loopback(), peer.local_addr().unwrap()).unwrap();
        assert!(!transport.write_interest);

        transport.watch_writable(true).unwrap();
        assert!(transport.write_interest);
        transport.send(b"ping").unwrap();
        assert!(!transport.write_interest);

        // Setelah send, recv tetap menunggu reply sampai timeout
        let mut buf = [0u8; 16];
        let start = Instant::now();
        let outcome = transport
            .recv(&mut buf, Some(Duration::from_millis(30)))
            .unwrap();
        assert_eq!(outcome, Received::TimedOut);
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_recv_times_out() {
        let peer = std::net::UdpSocket::bind(loopback()).unwrap();
        let mut transport = UdpTransport::bind(loopback(), peer.local_addr().unwrap()).unwrap();

        let mut buf = [0u8; 64];
        let start = Instant::now();
        let outcome = transport
            .recv(&mut buf, Some(Duration::from_millis(30)))
            .unwrap();
        assert_eq!(outcome, Received::TimedOut);
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_send_then_recv_reply() {
        let peer = std::net::UdpSocket::bind(loopback()).unwrap();
        let mut transport = UdpTransport::bind(loopback(), peer.local_addr().unwrap()).unwrap();

        assert_eq!(transport.send(b"ping").unwrap(), 4);

        let mut peer_buf = [0u8; 16];
        let (n, from) = peer.recv_from(&mut peer_buf).unwrap();
        assert_eq!(&peer_buf[..n], b"ping");
        assert_eq!(from.port(), transport.local_addr().unwrap().port());
        peer.send_to(b"pong!", from).unwrap();

        let mut buf = [0u8; 64];
        let outcome = transport
            .recv(&mut buf, Some(Duration::from_secs(2)))
            .unwrap();
        assert_eq!(outcome, Received::Datagram(5));
        assert_eq!(&buf[..5], b"pong!");
    }

    #[cfg(unix)]
    #[test]
    fn test_oversized_datagram_is_truncated_to_buffer() {
        let peer = std::net::UdpSocket::bind(loopback()).unwrap();
        let mut transport = UdpTransport::bind(loopback(), peer.local_addr().unwrap()).unwrap();

        peer.send_to(&[7u8; 100], transport.local_addr().unwrap())
            .unwrap();

        let mut buf = [0u8; 16];
        let outcome = transport
            .recv(&mut buf, Some(Duration::from_secs(2)))
            .unwrap();
        assert_eq!(outcome, Received::Datagram(16));
    }

    #[test]
    fn test_cancelled_before_wait() {
        let peer = std::net::UdpSocket::bind(loopback()).unwrap();
        let mut transport = UdpTransport::bind(loopback(), peer.local_addr().unwrap()).unwrap();

        transport.canceller().cancel().unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(transport.recv(&mut buf, None).unwrap(), Received::Cancelled);
    }

    #[cfg(unix)]
    #[test]
    fn test_set_socket_recv_buffer() {
        let transport = UdpTransport::bind(loopback(), loopback()).unwrap();
        transport.set_socket_recv_buffer(64 * 1024).unwrap();
    }
}
