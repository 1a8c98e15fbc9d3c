/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! Non-blocking transport channels.
//!
//! A channel accepts as many bytes as it can and reports how many it took.
//! A write that would block takes zero bytes; any other I/O error means the
//! connection is gone.

use parking_lot::Mutex;
use std::io::{self, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;

/// Write side of a connection.
pub trait TransportChannel: Send {
    /// Writes a prefix of `bytes`.
    ///
    /// # Returns
    /// The number of bytes taken, zero if the channel is full.
    ///
    /// # Errors
    /// Any error means the peer is gone.
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize>;

    /// Closes the connection.
    fn close(&mut self);
}

impl TransportChannel for TcpStream {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        match Write::write(self, bytes) {
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => Ok(0),
            result => result,
        }
    }

    fn close(&mut self) {
        // The peer may already have gone.
        let _ = self.shutdown(Shutdown::Both);
    }
}

#[derive(Debug, Default)]
struct MemoryChannelState {
    written: Vec<u8>,
    max_write: Option<usize>,
    fail_writes: bool,
    closed: bool,
}

/// In-process channel that records everything written to it.
///
/// Clones share the same buffer, so one clone can be handed to the engine
/// while another observes it.
#[derive(Debug, Clone, Default)]
pub struct MemoryChannel {
    state: Arc<Mutex<MemoryChannelState>>,
}

impl MemoryChannel {
    /// Creates an open channel that accepts every write in full.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Limits each write to `max_write` bytes.
    #[must_use]
    pub fn with_max_write(self, max_write: usize) -> Self {
        self.state.lock().max_write = Some(max_write);
        self
    }

    /// Makes every later write fail as if the peer had gone.
    pub fn fail_writes(&self) {
        self.state.lock().fail_writes = true;
    }

    /// Everything written so far.
    #[must_use]
    pub fn written(&self) -> Vec<u8> {
        self.state.lock().written.clone()
    }

    /// Removes and returns everything written so far.
    pub fn take_written(&self) -> Vec<u8> {
        std::mem::take(&mut self.state.lock().written)
    }

    /// Returns true once the channel has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

impl TransportChannel for MemoryChannel {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        if state.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"));
        }
        if state.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "channel closed"));
        }
        let length = state.max_write.map_or(bytes.len(), |max| max.min(bytes.len()));
        state.written.extend_from_slice(&bytes[..length]);
        Ok(length)
    }

    fn close(&mut self) {
        self.state.lock().closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_writes() {
        let observer = MemoryChannel::new().with_max_write(3);
        let mut channel = observer.clone();
        assert_eq!(channel.write(b"abcdef").unwrap(), 3);
        assert_eq!(channel.write(b"def").unwrap(), 3);
        assert_eq!(observer.written(), b"abcdef");
    }

    #[test]
    fn test_closed_and_failed_channels() {
        let observer = MemoryChannel::new();
        let mut channel = observer.clone();
        channel.close();
        assert!(observer.is_closed());
        assert!(channel.write(b"x").is_err());

        let mut failing = MemoryChannel::new();
        failing.fail_writes();
        assert_eq!(
            failing.write(b"x").unwrap_err().kind(),
            io::ErrorKind::BrokenPipe
        );
    }
}
