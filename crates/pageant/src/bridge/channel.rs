//! Byte-stream view of the transport.
//!
//! Each write is one full synchronous exchange; the reply frame is queued and
//! handed out by subsequent reads. This lets stream-oriented protocol code
//! ("write a message, read a message") drive Pageant unchanged.
//!
//! Single reads and writes are atomic on their own. Callers that share a
//! channel and need a request and its reply to stay together go through
//! [`SerializedChannel::conversation`].

use std::io;
use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::{Buf, BytesMut};

use super::transport::Exchange;
use crate::error::Result;

pub struct SerializedChannel<E> {
    exchange: E,
    pending: Mutex<BytesMut>,
    turn: Mutex<()>,
}

impl<E: Exchange> SerializedChannel<E> {
    pub fn new(exchange: E) -> Self {
        Self {
            exchange,
            pending: Mutex::new(BytesMut::new()),
            turn: Mutex::new(()),
        }
    }

    /// Exclusive use of the channel until the returned guard is dropped.
    ///
    /// Other conversations block here; plain `send`/`recv` calls do not.
    pub fn conversation(&self) -> Conversation<'_, E> {
        Conversation {
            channel: self,
            _turn: self.turn.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }

    pub fn exchange(&self) -> &E {
        &self.exchange
    }

    fn pending_buf(&self) -> MutexGuard<'_, BytesMut> {
        // The buffer is only ever appended to or drained whole bytes at a
        // time, so a poisoned lock still holds consistent data.
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run one exchange with `request` and queue the reply. On failure
    /// nothing is queued.
    pub fn send(&self, request: &[u8]) -> Result<usize> {
        let mut pending = self.pending_buf();
        let response = self.exchange.exchange(request)?;
        pending.extend_from_slice(&response);
        Ok(request.len())
    }

    /// Drain up to `buf.len()` queued bytes. Returns 0 when nothing is queued.
    pub fn recv(&self, buf: &mut [u8]) -> usize {
        let mut pending = self.pending_buf();
        let n = buf.len().min(pending.len());
        buf[..n].copy_from_slice(&pending[..n]);
        pending.advance(n);
        n
    }

    pub fn pending(&self) -> usize {
        self.pending_buf().len()
    }

    /// Drop up to `n` queued bytes; returns how many were dropped.
    pub fn discard(&self, n: usize) -> usize {
        let mut pending = self.pending_buf();
        let n = n.min(pending.len());
        pending.advance(n);
        n
    }
}

impl<E: Exchange> io::Write for &SerializedChannel<E> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.send(buf).map_err(io::Error::other)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<E: Exchange> io::Read for &SerializedChannel<E> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.recv(buf))
    }
}

/// A request/reply turn on a shared channel. Holds the channel's turn lock.
pub struct Conversation<'a, E> {
    channel: &'a SerializedChannel<E>,
    _turn: MutexGuard<'a, ()>,
}

impl<E: Exchange> Conversation<'_, E> {
    pub fn pending(&self) -> usize {
        self.channel.pending()
    }

    pub fn discard(&self, n: usize) -> usize {
        self.channel.discard(n)
    }
}

impl<E: Exchange> io::Write for Conversation<'_, E> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.channel.send(buf).map_err(io::Error::other)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<E: Exchange> io::Read for Conversation<'_, E> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.channel.recv(buf))
    }
}
