//! In-memory transport for tests
//!
//! Records every datagram with the [`ManualClock`] time at which it was
//! sent, and serves queued replies on the control and input channels.
//! While closed nothing is sent or received; queued replies stay queued
//! for the reopened transport.

use crate::socket::SocketError;
use crate::time::ManualClock;
use crate::transport::Transport;
use std::collections::VecDeque;

/// One datagram handed to the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentDatagram {
    pub at_ns: u64,
    pub bytes: Vec<u8>,
}

/// One `send_stream` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamRecord {
    pub start_ns: u64,
    pub len: usize,
    pub chunks: usize,
}

/// Transport that keeps everything in memory
#[derive(Debug)]
pub struct MockTransport {
    clock: ManualClock,
    sent: Vec<SentDatagram>,
    streams: Vec<StreamRecord>,
    control_inbox: VecDeque<Vec<u8>>,
    input_inbox: VecDeque<Vec<u8>>,
    recv_polls: u64,
    open: bool,
    closes: usize,
    reopens: usize,
}

impl MockTransport {
    pub fn new(clock: ManualClock) -> Self {
        MockTransport {
            clock,
            sent: Vec::new(),
            streams: Vec::new(),
            control_inbox: VecDeque::new(),
            input_inbox: VecDeque::new(),
            recv_polls: 0,
            open: true,
            closes: 0,
            reopens: 0,
        }
    }

    /// Queue a datagram for the control channel
    pub fn push_reply(&mut self, datagram: impl Into<Vec<u8>>) {
        self.control_inbox.push_back(datagram.into());
    }

    /// Queue a datagram for the input channel
    pub fn push_input(&mut self, datagram: impl Into<Vec<u8>>) {
        self.input_inbox.push_back(datagram.into());
    }

    /// Every datagram sent so far, stream chunks included
    pub fn sent(&self) -> &[SentDatagram] {
        &self.sent
    }

    pub fn streams(&self) -> &[StreamRecord] {
        &self.streams
    }

    /// Datagrams whose first byte is `code`
    ///
    /// Stream chunks are raw payload and may match by accident; use this on
    /// sessions whose payload bytes cannot collide with `code`.
    pub fn commands(&self, code: u8) -> Vec<&SentDatagram> {
        self.sent
            .iter()
            .filter(|d| d.bytes.first() == Some(&code))
            .collect()
    }

    /// Number of control receive attempts
    pub fn recv_polls(&self) -> u64 {
        self.recv_polls
    }

    /// Times the sockets were released
    pub fn closes(&self) -> usize {
        self.closes
    }

    /// Times fresh sockets were opened after a close
    pub fn reopens(&self) -> usize {
        self.reopens
    }

    pub fn clear(&mut self) {
        self.sent.clear();
        self.streams.clear();
    }
}

impl Transport for MockTransport {
    fn send(&mut self, datagram: &[u8]) {
        if !self.open {
            return;
        }
        self.sent.push(SentDatagram {
            at_ns: self.clock.peek(),
            bytes: datagram.to_vec(),
        });
    }

    fn send_stream(&mut self, payload: &[u8], mtu: usize) {
        if !self.open {
            return;
        }
        let start_ns = self.clock.peek();
        let mut chunks = 0;
        for chunk in payload.chunks(mtu.max(1)) {
            self.send(chunk);
            chunks += 1;
        }
        self.streams.push(StreamRecord {
            start_ns,
            len: payload.len(),
            chunks,
        });
    }

    fn try_recv(&mut self, buf: &mut [u8]) -> Option<usize> {
        self.recv_polls += 1;
        if !self.open {
            return None;
        }
        let datagram = self.control_inbox.pop_front()?;
        let n = datagram.len().min(buf.len());
        buf[..n].copy_from_slice(&datagram[..n]);
        Some(n)
    }

    fn try_recv_input(&mut self, buf: &mut [u8]) -> Option<usize> {
        if !self.open {
            return None;
        }
        let datagram = self.input_inbox.pop_front()?;
        let n = datagram.len().min(buf.len());
        buf[..n].copy_from_slice(&datagram[..n]);
        Some(n)
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.closes += 1;
        }
    }

    fn reopen(&mut self) -> Result<(), SocketError> {
        if !self.open {
            self.open = true;
            self.reopens += 1;
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_with_time() {
        let clock = ManualClock::with_step(1);
        let mut transport = MockTransport::new(clock.clone());

        transport.send(&[1]);
        clock.advance(500);
        transport.send_stream(&[9u8; 10], 4);

        let sent = transport.sent();
        assert_eq!(sent.len(), 4);
        assert_eq!(sent[0].at_ns, 0);
        assert_eq!(sent[1].at_ns, 500);
        assert_eq!(sent[3].bytes.len(), 2);

        assert_eq!(
            transport.streams(),
            &[StreamRecord {
                start_ns: 500,
                len: 10,
                chunks: 3
            }]
        );
    }

    #[test]
    fn test_inboxes_are_separate() {
        let mut transport = MockTransport::new(ManualClock::with_step(1));
        transport.push_reply(vec![1, 2, 3]);
        transport.push_input(vec![4]);

        let mut buf = [0u8; 8];
        assert_eq!(transport.try_recv_input(&mut buf), Some(1));
        assert_eq!(buf[0], 4);
        assert_eq!(transport.try_recv(&mut buf), Some(3));
        assert_eq!(&buf[..3], &[1, 2, 3]);
        assert_eq!(transport.try_recv(&mut buf), None);
        assert_eq!(transport.recv_polls(), 2);
    }

    #[test]
    fn test_closed_transport_drops_traffic() {
        let mut transport = MockTransport::new(ManualClock::with_step(1));
        transport.push_reply(vec![1]);
        transport.close();
        transport.close();
        assert_eq!(transport.closes(), 1);

        transport.send(&[2]);
        let mut buf = [0u8; 8];
        assert_eq!(transport.try_recv(&mut buf), None);
        assert!(transport.sent().is_empty());

        transport.reopen().unwrap();
        assert!(transport.is_open());
        assert_eq!(transport.reopens(), 1);
        assert_eq!(transport.try_recv(&mut buf), Some(1));
    }
}
