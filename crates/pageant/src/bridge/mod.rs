//! Request/response plumbing between this process and Pageant.
//!
//! - `protocol`: agent message types and their payload encoding
//! - `codec`: length-prefixed framing and request validation
//! - `transport`: one exchange through a shared segment
//! - `channel`: byte-stream view over the transport

pub mod channel;
pub mod codec;
pub mod protocol;
pub mod transport;
