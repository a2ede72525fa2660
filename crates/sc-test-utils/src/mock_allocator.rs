//! Recording endpoint allocator.
//!
//! Binds real loopback sockets (so workers and port numbers behave as in
//! production) and keeps a log of every endpoint it handed out. Whether an
//! endpoint has been released is checked by binding its address again.
//!
//! # Example
//!
//! ```rust,ignore
//! let allocator = MockAllocator::failing_after(1);
//! // first allocation succeeds, the second returns AllocationError
//! ```

use std::io;
use std::net::{SocketAddr, TcpListener, UdpSocket};
use std::sync::Mutex;
use stream_controller::endpoint::{Endpoint, EndpointAllocator, EndpointKind, SocketAllocator};
use stream_controller::errors::AllocationError;

/// Endpoint allocator with an allocation log and optional failure injection.
#[derive(Debug, Default)]
pub struct MockAllocator {
    fail_after: Option<usize>,
    allocated: Mutex<Vec<(SocketAddr, EndpointKind)>>,
    attempts: Mutex<usize>,
}

impl MockAllocator {
    /// Allocator where every allocation succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocator that succeeds `successes` times, then fails every call.
    #[must_use]
    pub fn failing_after(successes: usize) -> Self {
        Self {
            fail_after: Some(successes),
            ..Self::default()
        }
    }

    /// Number of `allocate` calls, failed ones included.
    #[must_use]
    pub fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap()
    }

    /// Endpoints handed out so far, in order.
    #[must_use]
    pub fn allocated(&self) -> Vec<(SocketAddr, EndpointKind)> {
        self.allocated.lock().unwrap().clone()
    }

    /// Whether every endpoint handed out has been closed again.
    #[must_use]
    pub fn all_released(&self) -> bool {
        self.allocated()
            .into_iter()
            .all(|(addr, kind)| is_free(addr, kind))
    }
}

impl EndpointAllocator for MockAllocator {
    fn allocate(&self, addr: SocketAddr, kind: EndpointKind) -> Result<Endpoint, AllocationError> {
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            *attempts += 1;
            *attempts
        };

        if self.fail_after.is_some_and(|limit| attempt > limit) {
            return Err(AllocationError {
                addr,
                kind,
                source: io::Error::new(io::ErrorKind::AddrInUse, "mock allocator exhausted"),
            });
        }

        let endpoint = SocketAllocator.allocate(addr, kind)?;
        self.allocated
            .lock()
            .unwrap()
            .push((endpoint.local_addr(), kind));
        Ok(endpoint)
    }
}

fn is_free(addr: SocketAddr, kind: EndpointKind) -> bool {
    match kind {
        EndpointKind::Datagram => UdpSocket::bind(addr).is_ok(),
        EndpointKind::Stream => TcpListener::bind(addr).is_ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[test]
    fn test_records_allocations() {
        let allocator = MockAllocator::new();
        let endpoint = allocator
            .allocate(loopback(), EndpointKind::Datagram)
            .unwrap();

        assert_eq!(allocator.attempts(), 1);
        assert_eq!(
            allocator.allocated(),
            vec![(endpoint.local_addr(), EndpointKind::Datagram)]
        );
        assert!(!allocator.all_released());

        drop(endpoint);
        assert!(allocator.all_released());
    }

    #[test]
    fn test_failing_after() {
        let allocator = MockAllocator::failing_after(1);
        let _first = allocator
            .allocate(loopback(), EndpointKind::Datagram)
            .unwrap();

        let err = allocator
            .allocate(loopback(), EndpointKind::Stream)
            .unwrap_err();
        assert_eq!(err.kind, EndpointKind::Stream);
        assert_eq!(allocator.attempts(), 2);
        assert_eq!(allocator.allocated().len(), 1);
    }
}
