//! In-process fake of the Pageant side, for tests.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use ssh_encoding::Encode;

use crate::bridge::codec::declared_len;
use crate::locator::{AgentHandle, AgentLocator};
use crate::platform::{Delivery, Platform, SegmentName, SharedSegment};

/// Thread id reported by the fake platform.
pub(crate) const CONTEXT_ID: u32 = 0x2a;

/// Frame a payload with its big-endian length.
pub(crate) fn frame(payload: &[u8]) -> Vec<u8> {
    let mut out = (payload.len() as u32).to_be_bytes().to_vec();
    out.extend_from_slice(payload);
    out
}

/// Agent message payload built field by field.
#[derive(Default)]
pub(crate) struct Payload(Vec<u8>);

impl Payload {
    pub(crate) fn new(kind: u8) -> Self {
        Self(vec![kind])
    }

    pub(crate) fn u32(mut self, value: u32) -> Self {
        value.encode(&mut self.0).unwrap();
        self
    }

    /// Length-prefixed string.
    pub(crate) fn string(mut self, value: &[u8]) -> Self {
        value.encode(&mut self.0).unwrap();
        self
    }

    pub(crate) fn build(self) -> Vec<u8> {
        self.0
    }
}

type Handler = Arc<dyn Fn(&[u8]) -> Option<Vec<u8>> + Send + Sync>;

#[derive(Clone)]
pub(crate) enum FakeAgent {
    /// No agent window.
    Absent,
    /// Leaves the request in place as the response.
    Echo,
    /// Answers the notification with 0.
    Reject,
    /// Never answers; only meaningful with a send timeout.
    Hang,
    /// Writes this length prefix and nothing else.
    DeclareLength(u32),
    /// Echo after a delay.
    Slow(Duration),
    /// Request frame in, response frame out; `None` rejects.
    Respond(Handler),
}

impl FakeAgent {
    pub(crate) fn respond(handler: impl Fn(&[u8]) -> Option<Vec<u8>> + Send + Sync + 'static) -> Self {
        Self::Respond(Arc::new(handler))
    }

    /// Answers every request with the same payload.
    pub(crate) fn reply(payload: &[u8]) -> Self {
        let response = frame(payload);
        Self::respond(move |_| Some(response.clone()))
    }
}

#[derive(Default)]
pub(crate) struct FakeStats {
    pub lookups: AtomicUsize,
    pub created: AtomicUsize,
    pub released: AtomicUsize,
    names: Mutex<Vec<SegmentName>>,
    spans: Mutex<Vec<(Instant, Instant)>>,
    requests: Mutex<Vec<Vec<u8>>>,
}

impl FakeStats {
    pub(crate) fn names(&self) -> Vec<SegmentName> {
        self.names.lock().unwrap().clone()
    }

    /// Entry/exit instants of every notification.
    pub(crate) fn spans(&self) -> Vec<(Instant, Instant)> {
        self.spans.lock().unwrap().clone()
    }

    /// Request frames the agent saw, in order.
    pub(crate) fn requests(&self) -> Vec<Vec<u8>> {
        self.requests.lock().unwrap().clone()
    }
}

pub(crate) struct FakePlatform {
    agent: FakeAgent,
    stats: Arc<FakeStats>,
    send_timeout: Option<Duration>,
    fail_segments: bool,
}

impl FakePlatform {
    pub(crate) fn new(agent: FakeAgent) -> Self {
        Self::with_stats(agent, Arc::new(FakeStats::default()))
    }

    pub(crate) fn with_stats(agent: FakeAgent, stats: Arc<FakeStats>) -> Self {
        Self {
            agent,
            stats,
            send_timeout: None,
            fail_segments: false,
        }
    }

    pub(crate) fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = Some(timeout);
        self
    }

    pub(crate) fn failing_segments(mut self) -> Self {
        self.fail_segments = true;
        self
    }

    pub(crate) fn stats(&self) -> &FakeStats {
        &self.stats
    }
}

pub(crate) struct FakeSegment {
    buf: Vec<u8>,
    stats: Arc<FakeStats>,
}

impl SharedSegment for FakeSegment {
    fn bytes(&self) -> &[u8] {
        &self.buf
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }
}

impl Drop for FakeSegment {
    fn drop(&mut self) {
        self.stats.released.fetch_add(1, Ordering::SeqCst);
    }
}

impl AgentLocator for FakePlatform {
    fn locate(&self) -> Option<AgentHandle> {
        self.stats.lookups.fetch_add(1, Ordering::SeqCst);
        match self.agent {
            FakeAgent::Absent => None,
            _ => AgentHandle::from_raw(0x1234),
        }
    }
}

impl Platform for FakePlatform {
    type Segment = FakeSegment;

    fn context_id(&self) -> u32 {
        CONTEXT_ID
    }

    fn create_segment(&self, name: &SegmentName, capacity: usize) -> io::Result<FakeSegment> {
        if self.fail_segments {
            return Err(io::Error::new(io::ErrorKind::OutOfMemory, "no pagefile left"));
        }
        self.stats.created.fetch_add(1, Ordering::SeqCst);
        self.stats.names.lock().unwrap().push(name.clone());
        Ok(FakeSegment {
            buf: vec![0; capacity],
            stats: Arc::clone(&self.stats),
        })
    }

    fn notify(&self, _agent: AgentHandle, _name: &SegmentName, segment: &mut FakeSegment) -> Delivery {
        let entered = Instant::now();
        let request_len = declared_len(&segment.buf).unwrap_or(0) + 4;
        let request = segment.buf[..request_len.min(segment.buf.len())].to_vec();
        self.stats.requests.lock().unwrap().push(request.clone());

        let delivery = match &self.agent {
            FakeAgent::Absent | FakeAgent::Reject => Delivery::Rejected,
            FakeAgent::Echo => Delivery::Handled,
            FakeAgent::Hang => Delivery::TimedOut(self.send_timeout.unwrap_or_default()),
            FakeAgent::DeclareLength(len) => {
                segment.buf[..4].copy_from_slice(&len.to_be_bytes());
                Delivery::Handled
            }
            FakeAgent::Slow(delay) => {
                thread::sleep(*delay);
                Delivery::Handled
            }
            FakeAgent::Respond(handler) => match handler(&request) {
                Some(response) => {
                    segment.buf[..response.len()].copy_from_slice(&response);
                    Delivery::Handled
                }
                None => Delivery::Rejected,
            },
        };

        self.stats
            .spans
            .lock()
            .unwrap()
            .push((entered, Instant::now()));
        delivery
    }
}
