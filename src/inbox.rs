// /src/inbox.rs
//! Receive buffer shared between the UART receive path and the main loop.
//!
//! The producer appends one byte at a time and raises the ready flag. The
//! consumer never parses the live buffer: it copies a snapshot inside a
//! critical section and later drops exactly the bytes it handled, so bytes
//! arriving mid-parse are neither seen half-written nor lost.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use heapless::Vec;

use crate::constants::MSG_BUFFER_SIZE;

/// Private copy of the inbox contents.
pub type Frame = Vec<u8, MSG_BUFFER_SIZE>;

struct InboxState {
    buf: Frame,
    ready: bool,
    overflowed: bool,
}

pub struct Inbox {
    state: Mutex<CriticalSectionRawMutex, RefCell<InboxState>>,
}

impl Inbox {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(RefCell::new(InboxState {
                buf: Vec::new(),
                ready: false,
                overflowed: false,
            })),
        }
    }

    /// Appends a received byte. Safe to call from interrupt context.
    ///
    /// Returns `false` (and records the overflow) when the buffer is full.
    pub fn push_byte(&self, byte: u8) -> bool {
        self.state.lock(|s| {
            let mut s = s.borrow_mut();
            s.ready = true;
            if s.buf.push(byte).is_err() {
                s.overflowed = true;
                return false;
            }
            true
        })
    }

    pub fn push_bytes(&self, bytes: &[u8]) {
        for &b in bytes {
            self.push_byte(b);
        }
    }

    /// Returns and clears the "message ready" flag.
    pub fn take_ready(&self) -> bool {
        self.state.lock(|s| core::mem::replace(&mut s.borrow_mut().ready, false))
    }

    pub fn snapshot(&self) -> Frame {
        self.state.lock(|s| s.borrow().buf.clone())
    }

    /// Drops the first `n` bytes, keeping whatever arrived after them.
    pub fn consume(&self, n: usize) {
        self.state.lock(|s| {
            let mut s = s.borrow_mut();
            let len = s.buf.len();
            let n = n.min(len);
            s.buf.copy_within(n..len, 0);
            s.buf.truncate(len - n);
        })
    }

    pub fn flush(&self) {
        self.state.lock(|s| {
            let mut s = s.borrow_mut();
            s.buf.clear();
            s.ready = false;
        })
    }

    pub fn len(&self) -> usize {
        self.state.lock(|s| s.borrow().buf.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns and clears the overflow flag so it is reported once.
    pub fn take_overflow(&self) -> bool {
        self.state.lock(|s| core::mem::replace(&mut s.borrow_mut().overflowed, false))
    }
}

impl Default for Inbox {
    fn default() -> Self {
        Self::new()
    }
}
