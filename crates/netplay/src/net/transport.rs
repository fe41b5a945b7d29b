use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;

/// Non-blocking byte stream underneath a [`Connection`](super::Connection).
///
/// `send` and `recv` follow `std::io` conventions: `Ok(0)` from `recv` is end
/// of stream, `WouldBlock` means try again later and `Interrupted` may be
/// retried immediately. `send` may write only part of the buffer.
pub trait Transport {
    fn send(&mut self, buf: &[u8]) -> io::Result<usize>;
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn close(&mut self) -> io::Result<()>;
}

#[derive(Debug, Default)]
struct Pipe {
    data: VecDeque<u8>,
    writer_closed: bool,
    reader_closed: bool,
}

#[derive(Debug, Default)]
struct Throttle {
    max_write: Option<usize>,
    blocked: bool,
    interrupt_next: bool,
}

/// One end of an in-memory stream pair.
///
/// Writes can be throttled through a [`LoopbackControl`] to exercise partial
/// writes and back-pressure.
#[derive(Debug)]
pub struct LoopbackTransport {
    inbound: Rc<RefCell<Pipe>>,
    outbound: Rc<RefCell<Pipe>>,
    throttle: Rc<RefCell<Throttle>>,
}

/// Handle for throttling the write side of a [`LoopbackTransport`] after it
/// has been handed to a connection.
#[derive(Debug, Clone)]
pub struct LoopbackControl {
    outbound: Rc<RefCell<Pipe>>,
    throttle: Rc<RefCell<Throttle>>,
}

impl LoopbackTransport {
    pub fn pair() -> (Self, Self) {
        let a_to_b = Rc::new(RefCell::new(Pipe::default()));
        let b_to_a = Rc::new(RefCell::new(Pipe::default()));
        let a = Self {
            inbound: b_to_a.clone(),
            outbound: a_to_b.clone(),
            throttle: Rc::default(),
        };
        let b = Self {
            inbound: a_to_b,
            outbound: b_to_a,
            throttle: Rc::default(),
        };
        (a, b)
    }

    pub fn control(&self) -> LoopbackControl {
        LoopbackControl {
            outbound: self.outbound.clone(),
            throttle: self.throttle.clone(),
        }
    }
}

impl LoopbackControl {
    /// Caps every subsequent `send` at `limit` bytes.
    pub fn set_write_limit(&self, limit: Option<usize>) {
        self.throttle.borrow_mut().max_write = limit;
    }

    /// While blocked, `send` fails with `WouldBlock`.
    pub fn set_blocked(&self, blocked: bool) {
        self.throttle.borrow_mut().blocked = blocked;
    }

    /// Makes the next `send` fail once with `Interrupted`.
    pub fn interrupt_next_send(&self) {
        self.throttle.borrow_mut().interrupt_next = true;
    }

    /// Bytes written but not yet read by the other end.
    pub fn in_flight(&self) -> usize {
        self.outbound.borrow().data.len()
    }
}

impl Transport for LoopbackTransport {
    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut throttle = self.throttle.borrow_mut();
        if throttle.interrupt_next {
            throttle.interrupt_next = false;
            return Err(io::ErrorKind::Interrupted.into());
        }
        if throttle.blocked {
            return Err(io::ErrorKind::WouldBlock.into());
        }

        let mut pipe = self.outbound.borrow_mut();
        if pipe.writer_closed || pipe.reader_closed {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        let len = throttle.max_write.map_or(buf.len(), |max| buf.len().min(max));
        if len == 0 && !buf.is_empty() {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        pipe.data.extend(&buf[..len]);
        Ok(len)
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut pipe = self.inbound.borrow_mut();
        if pipe.data.is_empty() {
            return if pipe.writer_closed {
                Ok(0)
            } else {
                Err(io::ErrorKind::WouldBlock.into())
            };
        }
        let len = buf.len().min(pipe.data.len());
        for (dst, src) in buf.iter_mut().zip(pipe.data.drain(..len)) {
            *dst = src;
        }
        Ok(len)
    }

    fn close(&mut self) -> io::Result<()> {
        self.outbound.borrow_mut().writer_closed = true;
        self.inbound.borrow_mut().reader_closed = true;
        Ok(())
    }
}
