/*!
 * Emulated Byte Stream
 * Pair of bounded ringbuf pipes giving one connection its two directions
 */

use crate::core::limits::EPIPE;
use crate::core::{RawStatus, ShutdownMode};
use parking_lot::{Condvar, Mutex};
use ringbuf::{traits::*, HeapRb};
use std::sync::Arc;
use uuid::Uuid;

struct PipeState {
    buffer: HeapRb<u8>,
    /// Writer will send nothing more; reader sees EOF once drained
    write_closed: bool,
    /// Reader is gone; writes fail with EPIPE
    read_closed: bool,
}

/// One direction of a connection
struct Pipe {
    state: Mutex<PipeState>,
    readable: Condvar,
    writable: Condvar,
}

impl Pipe {
    fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(PipeState {
                buffer: HeapRb::<u8>::new(capacity.max(1)),
                write_closed: false,
                read_closed: false,
            }),
            readable: Condvar::new(),
            writable: Condvar::new(),
        }
    }

    /// Block until there is space, then write what fits
    fn write(&self, data: &[u8]) -> Result<usize, RawStatus> {
        let mut state = self.state.lock();
        loop {
            if state.read_closed || state.write_closed {
                return Err(EPIPE);
            }
            if data.is_empty() {
                return Ok(0);
            }
            if state.buffer.vacant_len() > 0 {
                let written = state.buffer.push_slice(data);
                self.readable.notify_all();
                return Ok(written);
            }
            self.writable.wait(&mut state);
        }
    }

    /// Block until data is available or the stream is closed (returns 0)
    fn read(&self, buf: &mut [u8]) -> usize {
        let mut state = self.state.lock();
        loop {
            if buf.is_empty() {
                return 0;
            }
            if !state.buffer.is_empty() {
                let read = state.buffer.pop_slice(buf);
                self.writable.notify_all();
                return read;
            }
            if state.write_closed || state.read_closed {
                return 0;
            }
            self.readable.wait(&mut state);
        }
    }

    fn close_write(&self) {
        self.state.lock().write_closed = true;
        self.readable.notify_all();
        self.writable.notify_all();
    }

    fn close_read(&self) {
        let mut state = self.state.lock();
        state.read_closed = true;
        state.buffer.clear();
        drop(state);
        self.readable.notify_all();
        self.writable.notify_all();
    }

    fn buffered(&self) -> usize {
        self.state.lock().buffer.occupied_len()
    }
}

/// One end of an emulated connection
///
/// Dropping an end closes both of its directions, so the peer observes EOF.
pub struct StreamEnd {
    connection_id: Uuid,
    inbound: Arc<Pipe>,
    outbound: Arc<Pipe>,
}

impl StreamEnd {
    /// Create both ends of a new connection, each direction holding `capacity` bytes
    pub fn pair(capacity: usize) -> (StreamEnd, StreamEnd) {
        let connection_id = Uuid::new_v4();
        let a_to_b = Arc::new(Pipe::new(capacity));
        let b_to_a = Arc::new(Pipe::new(capacity));

        let a = StreamEnd {
            connection_id,
            inbound: Arc::clone(&b_to_a),
            outbound: Arc::clone(&a_to_b),
        };
        let b = StreamEnd {
            connection_id,
            inbound: a_to_b,
            outbound: b_to_a,
        };
        (a, b)
    }

    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    pub fn write(&self, data: &[u8]) -> Result<usize, RawStatus> {
        self.outbound.write(data)
    }

    pub fn read(&self, buf: &mut [u8]) -> usize {
        self.inbound.read(buf)
    }

    pub fn shutdown(&self, how: ShutdownMode) {
        if how.includes_read() {
            self.inbound.close_read();
        }
        if how.includes_write() {
            self.outbound.close_write();
        }
    }

    /// Bytes waiting to be read on this end
    pub fn pending_inbound(&self) -> usize {
        self.inbound.buffered()
    }
}

impl Drop for StreamEnd {
    fn drop(&mut self) {
        self.shutdown(ShutdownMode::Both);
    }
}

impl std::fmt::Debug for StreamEnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamEnd")
            .field("connection_id", &self.connection_id)
            .field("pending_inbound", &self.pending_inbound())
            .finish()
    }
}
