//! Local endpoint allocation.
//!
//! Every audio stream gets a datagram control endpoint and a data endpoint
//! (datagram for realtime, stream-oriented for buffered). Endpoints are bound
//! before any worker starts so their ports can be reported to the sender,
//! then moved into the workers that use them. Dropping an [`Endpoint`]
//! closes the socket, so release happens exactly once, when its owner goes
//! away.

use std::fmt;
use std::io;
use std::net::{SocketAddr, TcpListener, UdpSocket};

use crate::errors::AllocationError;

/// Socket flavour of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    /// UDP.
    Datagram,
    /// TCP listener.
    Stream,
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointKind::Datagram => f.write_str("datagram"),
            EndpointKind::Stream => f.write_str("stream"),
        }
    }
}

/// Bound socket behind an [`Endpoint`].
#[derive(Debug)]
pub enum EndpointSocket {
    Datagram(UdpSocket),
    Stream(TcpListener),
}

/// A locally bound, non-blocking socket with its resolved address.
#[derive(Debug)]
pub struct Endpoint {
    socket: EndpointSocket,
    local_addr: SocketAddr,
}

impl Endpoint {
    /// Wrap a bound socket. The socket is switched to non-blocking mode so a
    /// worker can hand it to the async runtime.
    pub fn new(socket: EndpointSocket) -> io::Result<Self> {
        let local_addr = match &socket {
            EndpointSocket::Datagram(s) => {
                s.set_nonblocking(true)?;
                s.local_addr()?
            }
            EndpointSocket::Stream(l) => {
                l.set_nonblocking(true)?;
                l.local_addr()?
            }
        };
        Ok(Self { socket, local_addr })
    }

    #[must_use]
    pub fn kind(&self) -> EndpointKind {
        match self.socket {
            EndpointSocket::Datagram(_) => EndpointKind::Datagram,
            EndpointSocket::Stream(_) => EndpointKind::Stream,
        }
    }

    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Port reported to the sender.
    #[must_use]
    pub fn local_port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Give up the wrapper and take the socket.
    #[must_use]
    pub fn into_socket(self) -> EndpointSocket {
        self.socket
    }
}

/// Hands out locally bound, currently unused endpoints.
pub trait EndpointAllocator: Send + Sync + fmt::Debug {
    /// Bind a new endpoint of `kind` on `addr`. Port 0 picks any free port.
    fn allocate(&self, addr: SocketAddr, kind: EndpointKind) -> Result<Endpoint, AllocationError>;
}

/// Binds real OS sockets.
#[derive(Debug, Clone, Copy, Default)]
pub struct SocketAllocator;

impl EndpointAllocator for SocketAllocator {
    fn allocate(&self, addr: SocketAddr, kind: EndpointKind) -> Result<Endpoint, AllocationError> {
        let bound = match kind {
            EndpointKind::Datagram => UdpSocket::bind(addr).map(EndpointSocket::Datagram),
            EndpointKind::Stream => TcpListener::bind(addr).map(EndpointSocket::Stream),
        };

        bound
            .and_then(Endpoint::new)
            .map_err(|source| AllocationError { addr, kind, source })
    }
}
