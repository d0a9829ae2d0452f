//! Broadcast query / response exchange.

use crate::{
    buffer::PacketBuffer,
    component::{ComponentId, ComponentType},
    config::QuerierConfig,
    decoder::scan_records,
    endpoint::{BroadcastEndpoint, ListenEndpoint},
    error::{ErrorKind, QuerierError, QuerierResult},
    fingerprint::host_fingerprint,
    wire::{single_datagram, MessageFramer, QueryRequest, ResponseRecord},
    MAX_UDP_PAYLOAD,
};
use log::{debug, error, trace, warn};
use rand::Rng;
use std::{
    io,
    net::{IpAddr, SocketAddr},
    time::{Duration, Instant},
};

/// A datagram accepted by [Querier::receive].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Received {
    /// Address the datagram came from.
    pub from: SocketAddr,
    /// Size of the datagram.
    pub len: usize,
    /// Leading record, when decoding was requested.
    pub first: Option<ResponseRecord>,
}

enum QueryState {
    Idle,
    Sent,
    Waiting,
    Retrying,
    Decoding(ResponseRecord),
    Done(ComponentId),
}

/// Resolves component ids by broadcasting queries on the local network.
///
/// A querier whose sockets could not be set up is still returned by
/// [Querier::new] but reports `false` from [Querier::is_ready]; every
/// operation on it then fails fast with
/// [SocketUnavailable](ErrorKind::SocketUnavailable).
pub struct Querier {
    config: QuerierConfig,
    broadcast_ip: IpAddr,
    listen: Option<ListenEndpoint>,
    broadcast: Option<BroadcastEndpoint>,
    framer: MessageFramer,
    last_request: Option<QueryRequest>,
    buffer: PacketBuffer,
    host_fingerprint: i32,
    broadcasts_sent: u64,
}

impl Querier {
    /// Sets up both endpoints, drawing the listen port from the thread rng.
    pub fn new(config: QuerierConfig) -> QuerierResult<Self> {
        Querier::with_rng(config, &mut rand::thread_rng())
    }

    /// Sets up both endpoints, drawing the listen port from `rng`.
    ///
    /// Only an invalid configuration is an error; socket failures are logged
    /// and leave the querier not ready.
    pub fn with_rng<R: Rng>(config: QuerierConfig, rng: &mut R) -> QuerierResult<Self> {
        config.validate()?;
        let broadcast_ip = config.broadcast_ip()?;

        let broadcast = match BroadcastEndpoint::open() {
            Ok(endpoint) => Some(endpoint),
            Err(e) => {
                error!("broadcast endpoint initialization failed: {}", e);
                None
            }
        };
        let listen = match ListenEndpoint::bind(&config, rng) {
            Ok(endpoint) => Some(endpoint),
            Err(e) => {
                error!("listen endpoint initialization failed: {}", e);
                None
            }
        };

        let host_fingerprint = config.host_fingerprint.unwrap_or_else(host_fingerprint);

        Ok(Querier {
            config,
            broadcast_ip,
            listen,
            broadcast,
            framer: MessageFramer::new(MAX_UDP_PAYLOAD),
            last_request: None,
            buffer: PacketBuffer::with_capacity(MAX_UDP_PAYLOAD),
            host_fingerprint,
            broadcasts_sent: 0,
        })
    }

    pub fn is_ready(&self) -> bool {
        self.listen.is_some() && self.broadcast.is_some()
    }

    /// Port advertised as the reply-to port of every query.
    pub fn listen_port(&self) -> Option<u16> {
        self.listen.as_ref().map(ListenEndpoint::port)
    }

    pub fn listen_addr(&self) -> Option<SocketAddr> {
        self.listen.as_ref().map(ListenEndpoint::local_addr)
    }

    pub fn host_fingerprint(&self) -> i32 {
        self.host_fingerprint
    }

    /// Number of datagrams actually handed to the OS.
    pub fn broadcasts_sent(&self) -> u64 {
        self.broadcasts_sent
    }

    pub fn config(&self) -> &QuerierConfig {
        &self.config
    }

    /// Releases both sockets. Calling it again is a no-op.
    pub fn close(&mut self) {
        if self.listen.take().is_some() {
            trace!("listen endpoint closed");
        }
        if self.broadcast.take().is_some() {
            trace!("broadcast endpoint closed");
        }
    }

    /// Resolves the id currently serving `component_type` for `uid`.
    ///
    /// Blocks until some peer answers, resending the query after every
    /// silent receive window. `Ok(None)` means an answer arrived but held no
    /// usable id.
    pub fn query(
        &mut self,
        component_type: ComponentType,
        uid: i32,
    ) -> QuerierResult<Option<ComponentId>> {
        self.run_query(component_type, uid, None)
    }

    /// Same as [Querier::query], giving up with
    /// [DeadlineExceeded](ErrorKind::DeadlineExceeded) once `deadline` has
    /// passed without an answer.
    pub fn query_with_deadline(
        &mut self,
        component_type: ComponentType,
        uid: i32,
        deadline: Duration,
    ) -> QuerierResult<Option<ComponentId>> {
        self.run_query(component_type, uid, Some(Instant::now() + deadline))
    }

    fn run_query(
        &mut self,
        component_type: ComponentType,
        uid: i32,
        deadline: Option<Instant>,
    ) -> QuerierResult<Option<ComponentId>> {
        if !self.is_ready() {
            return Err(QuerierError::socket_unavailable("querier is not ready"));
        }

        let timeout = self.config.query_timeout();
        let mut state = QueryState::Idle;

        loop {
            state = match state {
                QueryState::Idle => {
                    self.send_unchecked(component_type, uid, false);
                    QueryState::Sent
                }
                QueryState::Sent => QueryState::Waiting,
                QueryState::Waiting => {
                    let window = match deadline {
                        Some(deadline) => {
                            let now = Instant::now();
                            if now >= deadline {
                                return Err(QuerierError::new(ErrorKind::DeadlineExceeded));
                            }
                            timeout.min(deadline - now)
                        }
                        None => timeout,
                    };
                    match self.receive(true, window, false) {
                        Ok(Received {
                            first: Some(first),
                            from,
                            ..
                        }) => {
                            debug!("answer for {} from {}", component_type, from);
                            QueryState::Decoding(first)
                        }
                        Ok(_) => QueryState::Retrying,
                        Err(e) => {
                            trace!("no answer yet: {}", e);
                            QueryState::Retrying
                        }
                    }
                }
                QueryState::Retrying => {
                    self.send_unchecked(component_type, uid, true);
                    QueryState::Waiting
                }
                QueryState::Decoding(first) => {
                    let mut stream = self.buffer.stream();
                    QueryState::Done(scan_records(first, &mut stream))
                }
                QueryState::Done(id) => {
                    return Ok(if id.is_set() { Some(id) } else { None });
                }
            };
        }
    }

    // A failed send still goes on to wait, the answer to an earlier send
    // may yet arrive.
    fn send_unchecked(&mut self, component_type: ComponentType, uid: i32, is_retry: bool) {
        if let Err(e) = self.send(component_type, uid, is_retry) {
            warn!("query broadcast failed, waiting anyway: {}", e);
        }
    }

    /// Builds a query for `component_type` / `uid` and broadcasts it.
    ///
    /// A retry of the same request replays the datagram framed for the
    /// previous attempt.
    pub fn send(&mut self, component_type: ComponentType, uid: i32, is_retry: bool) -> QuerierResult<()> {
        let reply_port = self
            .listen_port()
            .ok_or_else(|| QuerierError::socket_unavailable("listen endpoint"))?;
        let request = QueryRequest::new(component_type, uid, reply_port, self.host_fingerprint);

        warn!(
            "send: {}, uid={} again={} fingerprint={}",
            component_type, uid, is_retry, self.host_fingerprint
        );

        let replay = is_retry && self.last_request.as_ref() == Some(&request);
        if !replay {
            request.add_to(&mut self.framer)?;
            self.last_request = Some(request);
        }
        self.broadcast(0, replay)
    }

    /// Broadcasts the current framed message to `port`, or to the discovery
    /// port when `port` is 0.
    ///
    /// Fails when no message has been framed yet.
    ///
    /// # Panics
    ///
    /// When the message does not fit a single datagram.
    pub fn broadcast(&mut self, port: u16, is_retry: bool) -> QuerierResult<()> {
        let endpoint = self
            .broadcast
            .as_ref()
            .ok_or_else(|| QuerierError::socket_unavailable("broadcast endpoint"))?;

        let port = if port == 0 {
            self.config.discovery_port
        } else {
            port
        };
        let dest = SocketAddr::new(self.broadcast_ip, port);

        if let Err(e) = endpoint.enable_broadcast() {
            error!("cannot broadcast socket on port {}: {}", port, e);
            return Err(e);
        }

        let datagram = single_datagram(self.framer.finalize(!is_retry))?;
        endpoint.send_to(datagram, dest)?;
        self.broadcasts_sent += 1;
        Ok(())
    }

    /// Waits for one datagram on the listen endpoint.
    ///
    /// The `timeout` window is split into `max_attempts + 1` waits; once all
    /// of them time out the call fails with
    /// [PollExhausted](ErrorKind::PollExhausted). Read errors retry at once
    /// without using up a wait. With `decode_first`, a datagram whose leading
    /// record is malformed is dropped and polling goes on. Neither of those
    /// outlives `timeout`.
    pub fn receive(
        &mut self,
        decode_first: bool,
        timeout: Duration,
        report_errors: bool,
    ) -> QuerierResult<Received> {
        let max_attempts = self.config.max_attempts;
        let wait = timeout / max_attempts.saturating_add(1);
        let listen = self
            .listen
            .as_mut()
            .ok_or_else(|| QuerierError::socket_unavailable("listen endpoint"))?;

        let started = Instant::now();
        let mut attempts: u32 = 1;
        loop {
            if let Err(err) = listen.wait_readable(wait) {
                if let ErrorKind::PollTimeout = err.kind() {
                    if attempts > max_attempts {
                        if report_errors {
                            error!(
                                "receive failed after {} attempts! It can be caused by the firewall \
                                 or the broadcast address. Maybe the broadcast address is not a \
                                 LAN address, or no discovery responder is running.",
                                attempts
                            );
                        }
                        return Err(QuerierError::new(ErrorKind::PollExhausted { attempts }));
                    }
                    attempts += 1;
                    continue;
                }
                if report_errors {
                    error!("receive: wait error: {}", err);
                }
                return Err(err);
            }

            self.buffer.reset(MAX_UDP_PAYLOAD);
            let (len, from) = match listen.recv_from(self.buffer.writable()) {
                Ok(received) => received,
                Err(e) => {
                    if report_errors && e.kind() != io::ErrorKind::WouldBlock {
                        error!("receive: recv_from error: {}", e);
                    }
                    if started.elapsed() >= timeout {
                        return Err(QuerierError::new(ErrorKind::PollExhausted { attempts }));
                    }
                    continue;
                }
            };
            self.buffer.set_written(len);

            let first = if decode_first {
                let decoded = self.buffer.stream().decode_record();
                match decoded {
                    Ok((record, used)) => {
                        self.buffer.consume(used);
                        Some(record)
                    }
                    Err(e) => {
                        error!("receive: data wrong, size={} from {}: {}", len, from, e);
                        if started.elapsed() >= timeout {
                            return Err(QuerierError::new(ErrorKind::PollExhausted { attempts }));
                        }
                        continue;
                    }
                }
            } else {
                None
            };

            return Ok(Received { from, len, first });
        }
    }
}

impl Drop for Querier {
    fn drop(&mut self) {
        self.close();
    }
}
