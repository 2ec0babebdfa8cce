//! Client bridge to PuTTY's Pageant.
//!
//! Pageant has no socket. A client writes its request into a named shared
//! file mapping, sends the agent window a `WM_COPYDATA` naming that mapping,
//! and reads the reply from the same mapping once the message returns. This
//! crate wraps that exchange as a serialized byte stream and puts a small
//! agent client and a certificate loader on top.
//!
//! Off Windows the agent is never found and every operation fails with
//! [`PageantError::AgentNotFound`].

pub mod agent;
pub mod bridge;
pub mod certificate;
pub mod client;
pub mod config;
pub mod error;
pub mod key;
pub mod locator;
pub mod platform;

#[cfg(test)]
mod testing;

pub use agent::{KeyAgent, Pageant, native_agent};
pub use bridge::channel::SerializedChannel;
pub use bridge::transport::{Exchange, SerializationToken, SharedTransport};
pub use certificate::{CertificateLine, load_certificate};
pub use config::BridgeConfig;
pub use error::{PageantError, Result};
pub use key::{KeyDescriptor, Signature};
pub use locator::{AgentHandle, AgentLocator};
