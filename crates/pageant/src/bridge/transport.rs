//! Shared-memory transport: one request/response exchange with Pageant.
//!
//! Exchange sequence (all under the serialization token):
//! 1. locate the agent window
//! 2. create + map a segment named after the calling thread
//! 3. copy the request frame in, notify the agent, wait for its answer
//! 4. validate and copy the response frame out
//! 5. unmap + close (segment drop), release the token
//!
//! Requests are validated before the token is taken, so malformed input
//! never reaches the OS.

use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use super::codec::{LENGTH_PREFIX_LEN, MAX_MESSAGE_LEN, MAX_PAYLOAD_LEN, declared_len, validate_request};
use crate::error::{PageantError, Result};
use crate::platform::{Delivery, Platform, SegmentName, SharedSegment};

/// Segment capacity: the largest frame plus room for its prefix.
pub const SEGMENT_CAPACITY: usize = MAX_MESSAGE_LEN + LENGTH_PREFIX_LEN;

/// Exclusive right to run an exchange.
///
/// Segment names are per thread and Pageant answers into the single segment
/// it was told about, so exchanges must not overlap. Clones share the lock.
#[derive(Debug, Clone, Default)]
pub struct SerializationToken(Arc<Mutex<()>>);

impl SerializationToken {
    /// A private token, not shared with anything else.
    pub fn new() -> Self {
        Self::default()
    }

    /// The token shared by every transport in this process.
    pub fn process_wide() -> Self {
        static TOKEN: OnceLock<SerializationToken> = OnceLock::new();
        TOKEN.get_or_init(SerializationToken::new).clone()
    }

    pub fn acquire(&self) -> MutexGuard<'_, ()> {
        // Nothing is guarded but the critical section itself, so a panic in
        // a previous holder leaves no state to repair.
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Something that turns a request frame into a response frame.
pub trait Exchange: Send + Sync {
    fn exchange(&self, request: &[u8]) -> Result<Vec<u8>>;
}

impl<E: Exchange + ?Sized> Exchange for Arc<E> {
    fn exchange(&self, request: &[u8]) -> Result<Vec<u8>> {
        (**self).exchange(request)
    }
}

pub struct SharedTransport<P> {
    platform: P,
    token: SerializationToken,
}

impl<P: Platform> SharedTransport<P> {
    /// Transport serialized with every other transport in the process.
    pub fn new(platform: P) -> Self {
        Self::with_token(platform, SerializationToken::process_wide())
    }

    pub fn with_token(platform: P, token: SerializationToken) -> Self {
        Self { platform, token }
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn is_agent_available(&self) -> bool {
        self.platform.locate().is_some()
    }

    fn run(&self, request: &[u8]) -> Result<Vec<u8>> {
        let agent = self
            .platform
            .locate()
            .ok_or(PageantError::AgentNotFound)?;

        let name = SegmentName::for_context(self.platform.context_id());
        let mut segment = self
            .platform
            .create_segment(&name, SEGMENT_CAPACITY)
            .map_err(|source| PageantError::Segment {
                op: "create",
                source,
            })?;

        tracing::trace!(segment = %name, agent = %agent, request_bytes = request.len(), "Sending request");

        let dst = segment
            .bytes_mut()
            .get_mut(..request.len())
            .ok_or_else(|| PageantError::Segment {
                op: "write",
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "segment smaller than request",
                ),
            })?;
        dst.copy_from_slice(request);

        match self.platform.notify(agent, &name, &mut segment) {
            Delivery::Handled => {}
            Delivery::Rejected => return Err(PageantError::SendFailed),
            Delivery::TimedOut(after) => return Err(PageantError::Timeout(after)),
        }

        let response = read_response(segment.bytes())?;
        tracing::trace!(segment = %name, response_bytes = response.len(), "Received response");
        Ok(response)
    }
}

/// Copy the response frame out of the segment, trusting nothing it declares.
fn read_response(segment: &[u8]) -> Result<Vec<u8>> {
    let len = declared_len(segment)
        .ok_or_else(|| PageantError::protocol("segment shorter than a length prefix"))?;
    if len > MAX_PAYLOAD_LEN {
        return Err(PageantError::ResponseTooLong { len });
    }
    segment
        .get(..LENGTH_PREFIX_LEN + len)
        .map(<[u8]>::to_vec)
        .ok_or(PageantError::ResponseTooLong { len })
}

impl<P: Platform> Exchange for SharedTransport<P> {
    fn exchange(&self, request: &[u8]) -> Result<Vec<u8>> {
        validate_request(request)?;

        let _token = self.token.acquire();
        let result = self.run(request);
        if let Err(e) = &result {
            tracing::debug!(error = %e, "Pageant exchange failed");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use std::thread;
    use std::time::Duration;

    use crate::testing::{CONTEXT_ID, FakeAgent, FakePlatform, FakeStats, frame};

    fn transport(agent: FakeAgent) -> SharedTransport<FakePlatform> {
        SharedTransport::with_token(FakePlatform::new(agent), SerializationToken::new())
    }

    #[test]
    fn echo_round_trip_is_repeatable() {
        let transport = transport(FakeAgent::Echo);
        let request = frame(b"\x0bhello");

        assert_eq!(transport.exchange(&request).unwrap(), request);
        assert_eq!(transport.exchange(&request).unwrap(), request);

        let stats = transport.platform().stats();
        assert_eq!(stats.created.load(Ordering::SeqCst), 2);
        assert_eq!(stats.released.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn largest_valid_request_round_trips() {
        let transport = transport(FakeAgent::Echo);
        let request = frame(&vec![0x5a; MAX_PAYLOAD_LEN]);
        assert_eq!(transport.exchange(&request).unwrap(), request);
    }

    #[test]
    fn oversized_request_skips_discovery() {
        let transport = transport(FakeAgent::Echo);
        let request = frame(&vec![0; MAX_PAYLOAD_LEN + 1]);

        let err = transport.exchange(&request).unwrap_err();
        assert!(matches!(err, PageantError::MessageTooLong { .. }));

        let stats = transport.platform().stats();
        assert_eq!(stats.lookups.load(Ordering::SeqCst), 0);
        assert_eq!(stats.created.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn inconsistent_prefix_allocates_nothing() {
        let transport = transport(FakeAgent::Echo);
        let mut request = frame(b"abc");
        request[3] = 9;

        let err = transport.exchange(&request).unwrap_err();
        assert!(matches!(err, PageantError::InvalidMessageFormat));
        assert_eq!(transport.platform().stats().created.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn missing_agent_is_not_found() {
        let transport = transport(FakeAgent::Absent);
        let err = transport.exchange(&frame(b"\x0b")).unwrap_err();
        assert!(err.is_agent_unavailable());
        assert!(!transport.is_agent_available());
        assert_eq!(transport.platform().stats().created.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn rejected_notification_releases_segment_once() {
        let transport = transport(FakeAgent::Reject);
        let err = transport.exchange(&frame(b"\x0b")).unwrap_err();
        assert!(matches!(err, PageantError::SendFailed));

        let stats = transport.platform().stats();
        assert_eq!(stats.created.load(Ordering::SeqCst), 1);
        assert_eq!(stats.released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn oversized_response_is_refused() {
        let transport = transport(FakeAgent::DeclareLength(MAX_PAYLOAD_LEN as u32 + 1));
        let err = transport.exchange(&frame(b"\x0b")).unwrap_err();
        assert!(matches!(
            err,
            PageantError::ResponseTooLong { len } if len == MAX_PAYLOAD_LEN + 1
        ));
        assert_eq!(transport.platform().stats().released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn timeout_is_reported() {
        let platform = FakePlatform::new(FakeAgent::Hang)
            .with_send_timeout(Duration::from_millis(250));
        let transport = SharedTransport::with_token(platform, SerializationToken::new());

        let err = transport.exchange(&frame(b"\x0b")).unwrap_err();
        assert!(matches!(err, PageantError::Timeout(d) if d == Duration::from_millis(250)));
        assert_eq!(transport.platform().stats().released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn segment_creation_failure_propagates() {
        let platform = FakePlatform::new(FakeAgent::Echo).failing_segments();
        let transport = SharedTransport::with_token(platform, SerializationToken::new());

        let err = transport.exchange(&frame(b"\x0b")).unwrap_err();
        assert!(matches!(err, PageantError::Segment { op: "create", .. }));
    }

    #[test]
    fn segment_is_named_after_context() {
        let transport = transport(FakeAgent::Echo);
        transport.exchange(&frame(b"\x0b")).unwrap();
        let names = transport.platform().stats().names();
        assert_eq!(names, vec![SegmentName::for_context(CONTEXT_ID)]);
    }

    #[test]
    fn concurrent_exchanges_never_overlap() {
        let transport = Arc::new(transport(FakeAgent::Slow(Duration::from_millis(20))));

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let transport = Arc::clone(&transport);
                thread::spawn(move || {
                    let request = frame(&[0x0b, i]);
                    assert_eq!(transport.exchange(&request).unwrap(), request);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let mut spans = transport.platform().stats().spans();
        assert_eq!(spans.len(), 4);
        spans.sort();
        for pair in spans.windows(2) {
            assert!(pair[0].1 <= pair[1].0, "exchanges overlapped: {pair:?}");
        }
    }

    #[test]
    fn transports_sharing_a_token_are_serialized() {
        let token = SerializationToken::new();
        let stats = Arc::new(FakeStats::default());
        let a = Arc::new(SharedTransport::with_token(
            FakePlatform::with_stats(FakeAgent::Slow(Duration::from_millis(20)), Arc::clone(&stats)),
            token.clone(),
        ));
        let b = Arc::new(SharedTransport::with_token(
            FakePlatform::with_stats(FakeAgent::Slow(Duration::from_millis(20)), Arc::clone(&stats)),
            token,
        ));

        let ta = {
            let a = Arc::clone(&a);
            thread::spawn(move || a.exchange(&frame(b"\x0ba")).unwrap())
        };
        let tb = {
            let b = Arc::clone(&b);
            thread::spawn(move || b.exchange(&frame(b"\x0bb")).unwrap())
        };
        ta.join().unwrap();
        tb.join().unwrap();

        let mut spans = stats.spans();
        spans.sort();
        assert_eq!(spans.len(), 2);
        assert!(spans[0].1 <= spans[1].0, "exchanges overlapped: {spans:?}");
    }

    #[test]
    fn read_response_bounds() {
        let mut segment = vec![0u8; SEGMENT_CAPACITY];
        segment[..4].copy_from_slice(&(MAX_PAYLOAD_LEN as u32).to_be_bytes());
        assert_eq!(read_response(&segment).unwrap().len(), MAX_MESSAGE_LEN);

        assert!(matches!(read_response(&[0, 0]), Err(PageantError::Protocol(_))));
        assert!(matches!(
            read_response(&[0, 0, 0, 9, 1]),
            Err(PageantError::ResponseTooLong { len: 9 })
        ));
    }
}
