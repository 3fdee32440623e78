//! Non-blocking, single-threaded connection loop.
//!
//! One `mio::Poll` instance multiplexes the listening socket and every
//! accepted connection. Each connection carries its own incoming/outgoing
//! byte buffers; reads append to `incoming`, completed request frames are
//! parsed off the front of it, and responses are appended to `outgoing` and
//! drained as the socket becomes writable. There is no per-connection
//! thread and no shared mutable state beyond the single `Keyspace` the
//! whole loop owns.

use std::collections::HashMap as ConnTable;
use std::io::{self, Read, Write};
use std::net::SocketAddr;

use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};

use crate::command;
use crate::config::Configuration;
use crate::entry::Keyspace;
use crate::error::{KvError, KvResult};
use crate::protocol;

const LISTENER: Token = Token(0);

struct Connection {
    stream: TcpStream,
    incoming: Vec<u8>,
    outgoing: Vec<u8>,
    outgoing_sent: usize,
    want_close: bool,
}

impl Connection {
    fn new(stream: TcpStream) -> Self {
        Connection { stream, incoming: Vec::new(), outgoing: Vec::new(), outgoing_sent: 0, want_close: false }
    }

    fn wants_write(&self) -> bool {
        self.outgoing_sent < self.outgoing.len()
    }
}

/// The running server: a listening socket, its connection table, and the
/// single keyspace every command reads and mutates.
pub struct Server {
    poll: Poll,
    listener: TcpListener,
    connections: ConnTable<Token, Connection>,
    next_token: usize,
    keyspace: Keyspace,
    config: Configuration,
}

impl Server {
    /// Binds the listening socket and registers it for readiness events.
    /// Any failure here is fatal: the caller is expected to log it and
    /// abort the process.
    pub fn bind(config: Configuration) -> KvResult<Self> {
        let addr: SocketAddr = (std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED), config.port).into();
        let mut listener = TcpListener::bind(addr).map_err(|e| {
            log::error!("failed to bind {addr}: {e}");
            KvError::Fatal("failed to bind listening socket")
        })?;
        let poll = Poll::new().map_err(|e| {
            log::error!("failed to create poll instance: {e}");
            KvError::Fatal("failed to create poll instance")
        })?;
        poll.registry().register(&mut listener, LISTENER, Interest::READABLE).map_err(|e| {
            log::error!("failed to register listening socket: {e}");
            KvError::Fatal("failed to register listening socket")
        })?;
        log::info!("listening on {addr}");

        Ok(Server {
            poll,
            listener,
            connections: ConnTable::new(),
            next_token: 1,
            keyspace: Keyspace::with_config(config.rehash_batch_size, config.rehash_load_factor),
            config,
        })
    }

    /// Runs the event loop. Only returns on a fatal I/O error from `poll`
    /// itself; per-connection errors are logged and close that connection.
    pub fn run(&mut self) -> KvResult<()> {
        let mut events = Events::with_capacity(1024);
        loop {
            self.poll.poll(&mut events, None).map_err(KvError::Io)?;

            for event in events.iter() {
                if event.token() == LISTENER {
                    self.accept_all();
                    continue;
                }
                self.handle_event(event.token(), event.is_readable(), event.is_writable());
            }

            self.sweep_closed_connections();
        }
    }

    fn accept_all(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((mut stream, addr)) => {
                    let token = Token(self.next_token);
                    self.next_token += 1;
                    if let Err(e) = self.poll.registry().register(&mut stream, token, Interest::READABLE) {
                        log::warn!("failed to register connection from {addr}: {e}");
                        continue;
                    }
                    log::debug!("accepted connection from {addr}");
                    self.connections.insert(token, Connection::new(stream));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::warn!("accept error: {e}");
                    return;
                }
            }
        }
    }

    fn handle_event(&mut self, token: Token, readable: bool, writable: bool) {
        if readable {
            self.process_readable(token);
        }
        if writable {
            if let Some(conn) = self.connections.get_mut(&token) {
                flush_outgoing(conn);
            }
        }
        self.reregister(token);
    }

    fn process_readable(&mut self, token: Token) {
        let read_chunk_bytes = self.config.read_chunk_bytes;
        if let Some(conn) = self.connections.get_mut(&token) {
            read_available(conn, read_chunk_bytes);
        }
        if let Some(conn) = self.connections.get_mut(&token) {
            drain_requests(conn, &mut self.keyspace, &self.config);
        }
    }

    fn reregister(&mut self, token: Token) {
        let Some(conn) = self.connections.get_mut(&token) else { return };
        if conn.want_close && !conn.wants_write() {
            return;
        }
        let interest = if conn.wants_write() { Interest::WRITABLE } else { Interest::READABLE };
        if let Err(e) = self.poll.registry().reregister(&mut conn.stream, token, interest) {
            log::warn!("failed to reregister connection: {e}");
            conn.want_close = true;
        }
    }

    fn sweep_closed_connections(&mut self) {
        let poll = &self.poll;
        self.connections.retain(|_, conn| {
            let keep = !(conn.want_close && !conn.wants_write());
            if !keep {
                let _ = poll.registry().deregister(&mut conn.stream);
                log::debug!("closing connection");
            }
            keep
        });
    }
}

fn read_available(conn: &mut Connection, read_chunk_bytes: usize) {
    let mut chunk = vec![0u8; read_chunk_bytes];
    loop {
        match conn.stream.read(&mut chunk) {
            Ok(0) => {
                conn.want_close = true;
                return;
            }
            Ok(n) => conn.incoming.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                log::warn!("read error: {e}");
                conn.want_close = true;
                return;
            }
        }
    }
}

fn drain_requests(conn: &mut Connection, keyspace: &mut Keyspace, config: &Configuration) {
    loop {
        match protocol::try_parse_frame(&conn.incoming, config.max_message_bytes) {
            Ok(Some((consumed, payload))) => match protocol::parse_request_args(payload, config.max_args) {
                Ok(args) => {
                    let response = command::execute(keyspace, &args, config);
                    conn.outgoing.extend_from_slice(&response);
                    conn.incoming.drain(..consumed);
                }
                Err(e) => {
                    log::warn!("closing connection on malformed request: {e}");
                    conn.want_close = true;
                    return;
                }
            },
            Ok(None) => return,
            Err(e) => {
                log::warn!("closing connection on malformed frame: {e}");
                conn.want_close = true;
                return;
            }
        }
    }
}

fn flush_outgoing(conn: &mut Connection) {
    while conn.outgoing_sent < conn.outgoing.len() {
        match conn.stream.write(&conn.outgoing[conn.outgoing_sent..]) {
            Ok(0) => {
                conn.want_close = true;
                return;
            }
            Ok(n) => conn.outgoing_sent += n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                log::warn!("write error: {e}");
                conn.want_close = true;
                return;
            }
        }
    }
    conn.outgoing.clear();
    conn.outgoing_sent = 0;
}
