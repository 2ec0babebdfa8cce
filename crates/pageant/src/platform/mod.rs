//! OS seam for the shared-memory transport.
//!
//! Platform-specific implementations:
//! - **Win32**: named file mapping + `WM_COPYDATA` to the Pageant window (Windows)
//! - **Unsupported**: every other target; the agent is never found
//!
//! The variant is chosen once, in [`native`]. Nothing outside this module
//! is conditionally compiled.

use std::convert::Infallible;
use std::fmt;
use std::io;
use std::time::Duration;

use crate::config::BridgeConfig;
use crate::locator::{AgentHandle, AgentLocator};

mod unsupported;
#[cfg(windows)]
mod win32;

pub use unsupported::Unsupported;
#[cfg(windows)]
pub use win32::{Win32, Win32Segment};

/// Name prefix Pageant expects for request mappings.
pub const SEGMENT_NAME_PREFIX: &str = "PageantRequest";

/// Name of the file mapping used for one exchange.
///
/// Format: `PageantRequest{context:08x}` where context is the calling thread id,
/// so concurrent clients on one machine don't collide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentName(String);

impl SegmentName {
    pub fn for_context(context: u32) -> Self {
        Self(format!("{SEGMENT_NAME_PREFIX}{context:08x}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name bytes plus the trailing NUL, as sent in the notification.
    pub fn to_bytes_with_nul(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.0.len() + 1);
        bytes.extend_from_slice(self.0.as_bytes());
        bytes.push(0);
        bytes
    }
}

impl fmt::Display for SegmentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A mapped view of a shared segment. Dropping it unmaps and closes.
pub trait SharedSegment {
    fn bytes(&self) -> &[u8];
    fn bytes_mut(&mut self) -> &mut [u8];
}

impl SharedSegment for Infallible {
    fn bytes(&self) -> &[u8] {
        match *self {}
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        match *self {}
    }
}

/// How the agent answered the synchronous notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Non-zero reply: the response frame is in the segment.
    Handled,
    /// Zero reply: the agent refused or could not process the request.
    Rejected,
    /// The configured bounded wait expired.
    TimedOut(Duration),
}

pub trait Platform: AgentLocator {
    type Segment: SharedSegment;

    /// Identifier of the calling context, used to name the segment.
    fn context_id(&self) -> u32;

    /// Create and map a read/write segment of `capacity` bytes.
    fn create_segment(&self, name: &SegmentName, capacity: usize) -> io::Result<Self::Segment>;

    /// Tell the agent a request is waiting in `name`. Blocks until it answers.
    ///
    /// The segment is passed along so in-process agents can serve the
    /// request through the same view; the OS implementation relies on the
    /// mapping being shared instead.
    fn notify(&self, agent: AgentHandle, name: &SegmentName, segment: &mut Self::Segment)
    -> Delivery;
}

#[cfg(windows)]
pub type NativePlatform = Win32;
#[cfg(not(windows))]
pub type NativePlatform = Unsupported;

/// The platform variant for the build target.
pub fn native(config: &BridgeConfig) -> NativePlatform {
    #[cfg(windows)]
    {
        Win32::new(config)
    }

    #[cfg(not(windows))]
    {
        tracing::debug!(window = %config.window_name, "No Pageant transport on this platform");
        Unsupported
    }
}
