//! High-level Pageant handle.
//!
//! [`KeyAgent`] is what the rest of an application talks to; [`Pageant`] is
//! the one implementation, parameterized over the OS seam so tests can run it
//! against an in-process fake.

use crate::bridge::channel::SerializedChannel;
use crate::bridge::transport::SharedTransport;
use crate::certificate;
use crate::client::AgentClient;
use crate::config::BridgeConfig;
use crate::error::Result;
use crate::key::{KeyDescriptor, Signature};
use crate::platform::{self, Platform};

pub trait KeyAgent: Send + Sync {
    /// Whether an agent window can be found right now.
    fn is_available(&self) -> bool;

    /// Identities the agent can sign with.
    fn list_signable_keys(&self) -> Result<Vec<KeyDescriptor>>;

    fn sign(&self, key: &KeyDescriptor, data: &[u8], flags: u32) -> Result<Signature>;

    /// Upload a certificate given as an `authorized_keys`-style line.
    fn load_certificate(&self, line: &str) -> Result<()>;
}

/// Every call is one conversation on a shared channel, so a `Pageant` can
/// be used from several threads at once.
pub struct Pageant<P> {
    channel: SerializedChannel<SharedTransport<P>>,
}

impl Pageant<platform::NativePlatform> {
    pub fn new(config: &BridgeConfig) -> Self {
        Self::with_platform(platform::native(config))
    }
}

impl<P: Platform> Pageant<P> {
    pub fn with_platform(platform: P) -> Self {
        Self::with_transport(SharedTransport::new(platform))
    }

    pub fn with_transport(transport: SharedTransport<P>) -> Self {
        Self {
            channel: SerializedChannel::new(transport),
        }
    }

    pub fn channel(&self) -> &SerializedChannel<SharedTransport<P>> {
        &self.channel
    }
}

impl<P: Platform> KeyAgent for Pageant<P> {
    fn is_available(&self) -> bool {
        self.channel.exchange().is_agent_available()
    }

    fn list_signable_keys(&self) -> Result<Vec<KeyDescriptor>> {
        let keys = AgentClient::new(self.channel.conversation()).request_identities()?;
        tracing::debug!(count = keys.len(), "Listed agent identities");
        Ok(keys)
    }

    fn sign(&self, key: &KeyDescriptor, data: &[u8], flags: u32) -> Result<Signature> {
        AgentClient::new(self.channel.conversation()).sign(key, data, flags)
    }

    fn load_certificate(&self, line: &str) -> Result<()> {
        certificate::load_certificate(&self.channel, line)
    }
}

/// Agent for the build target, configured from the environment.
pub fn native_agent() -> Box<dyn KeyAgent> {
    let config = BridgeConfig::from_env();
    tracing::debug!(window = %config.window_name, timeout = ?config.send_timeout, "Using Pageant bridge");
    Box::new(Pageant::new(&config))
}
