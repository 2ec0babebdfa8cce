//! Agent discovery.
//!
//! Pageant registers a top-level window whose class and title are both
//! `Pageant`. Finding that window is the whole discovery step; "not found"
//! is the normal answer when the agent isn't running.

use std::fmt;
use std::num::NonZeroUsize;

/// Opaque reference to the agent's control window.
///
/// Not owned: it is a lookup result, re-resolved for every exchange because
/// the agent may have restarted in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AgentHandle(NonZeroUsize);

impl AgentHandle {
    /// Wrap a raw window handle. Zero means "no agent".
    pub fn from_raw(raw: usize) -> Option<Self> {
        NonZeroUsize::new(raw).map(Self)
    }

    pub fn as_raw(&self) -> usize {
        self.0.get()
    }
}

impl fmt::Display for AgentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0.get())
    }
}

pub trait AgentLocator: Send + Sync {
    fn locate(&self) -> Option<AgentHandle>;
}

impl<L: AgentLocator + ?Sized> AgentLocator for &L {
    fn locate(&self) -> Option<AgentHandle> {
        (**self).locate()
    }
}
