//! Listen and broadcast endpoints.

use crate::{
    config::QuerierConfig,
    error::{ErrorKind, QuerierError, QuerierResult},
};
use log::{debug, error, trace};
use mio::{Events, Interest, Poll, Token};
use rand::Rng;
use std::{
    io,
    net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket},
    thread,
    time::Duration,
};

const LISTEN: Token = Token(0);

/// Receiving endpoint, bound to a random port of the configured range.
///
/// Readiness is tracked as in mio's examples: a readable edge is remembered
/// until a read reports `WouldBlock`.
pub struct ListenEndpoint {
    socket: mio::net::UdpSocket,
    poll: Poll,
    events: Events,
    readable: bool,
    local_addr: SocketAddr,
}

impl ListenEndpoint {
    /// Allocates the socket and binds it, retrying on conflicts.
    pub fn bind<R: Rng>(config: &QuerierConfig, rng: &mut R) -> QuerierResult<Self> {
        let ip = config.listen_ip()?;
        let builder = new_builder(ip).map_err(|e| {
            QuerierError::socket_unavailable(&format!("cannot allocate listen socket: {}", e))
        })?;

        let (socket, port) = bind_with_retry(
            rng,
            config.listen_ports(),
            config.bind_retries,
            config.bind_retry_delay(),
            |port| builder.bind((ip, port)),
        )?;
        socket.set_nonblocking(true)?;
        let local_addr = socket.local_addr().unwrap_or_else(|_| SocketAddr::new(ip, port));

        let mut socket = mio::net::UdpSocket::from_std(socket);
        let poll = Poll::new()?;
        poll.registry()
            .register(&mut socket, LISTEN, Interest::READABLE)?;

        debug!("listen endpoint bound on {}", local_addr);

        Ok(ListenEndpoint {
            socket,
            poll,
            events: Events::with_capacity(4),
            readable: false,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Blocks until the socket is readable or `timeout` elapses.
    ///
    /// Fails with [PollTimeout](ErrorKind::PollTimeout) when nothing arrived
    /// and with [OsReadError](ErrorKind::OsReadError) when the wait itself
    /// failed.
    pub fn wait_readable(&mut self, timeout: Duration) -> QuerierResult<()> {
        if self.readable {
            return Ok(());
        }

        if let Err(e) = self.poll.poll(&mut self.events, Some(timeout)) {
            return Err(QuerierError::new(ErrorKind::OsReadError(e)));
        }

        if self
            .events
            .iter()
            .any(|event| event.token() == LISTEN && event.is_readable())
        {
            self.readable = true;
            Ok(())
        } else {
            Err(QuerierError::new(ErrorKind::PollTimeout))
        }
    }

    /// Reads exactly one datagram.
    pub fn recv_from(&mut self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        let received = self.socket.recv_from(buf);
        if let Err(ref e) = received {
            if e.kind() == io::ErrorKind::WouldBlock {
                self.readable = false;
            }
        }
        received
    }
}

/// Sending endpoint, only ever used for broadcast datagrams.
pub struct BroadcastEndpoint {
    socket: UdpSocket,
}

impl BroadcastEndpoint {
    pub fn open() -> QuerierResult<Self> {
        let socket = new_builder(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
            .and_then(|builder| builder.bind((Ipv4Addr::UNSPECIFIED, 0)))
            .map_err(|e| {
                QuerierError::socket_unavailable(&format!("cannot allocate broadcast socket: {}", e))
            })?;
        Ok(BroadcastEndpoint { socket })
    }

    pub fn enable_broadcast(&self) -> QuerierResult<()> {
        self.socket
            .set_broadcast(true)
            .map_err(|e| QuerierError::new(ErrorKind::BroadcastUnsupported(e)))
    }

    pub fn send_to(&self, datagram: &[u8], dest: SocketAddr) -> io::Result<usize> {
        self.socket.send_to(datagram, dest)
    }
}

fn new_builder(ip: IpAddr) -> io::Result<net2::UdpBuilder> {
    match ip {
        IpAddr::V4(_) => net2::UdpBuilder::new_v4(),
        IpAddr::V6(_) => net2::UdpBuilder::new_v6(),
    }
}

/// Binds to ports drawn uniformly from the inclusive range `ports`.
///
/// The first failure is followed by at most `retries` more attempts, each
/// after sleeping `delay`.
pub(crate) fn bind_with_retry<T, R, F>(
    rng: &mut R,
    ports: (u16, u16),
    retries: u32,
    delay: Duration,
    mut bind: F,
) -> QuerierResult<(T, u16)>
where
    R: Rng,
    F: FnMut(u16) -> io::Result<T>,
{
    let (low, high) = ports;
    let mut failures = 0;

    loop {
        let drawn: u32 = rng.gen_range(u32::from(low), u32::from(high) + 1);
        let port = drawn as u16;
        match bind(port) {
            Ok(bound) => return Ok((bound, port)),
            Err(e) => {
                failures += 1;
                if failures > retries {
                    error!("cannot bind to port {}, giving up: {}", port, e);
                    return Err(QuerierError::socket_unavailable(&format!(
                        "cannot bind to port {} after {} attempts: {}",
                        port, failures, e
                    )));
                }
                trace!("bind to port {} failed: {}", port, e);
                thread::sleep(delay);
            }
        }
    }
}
