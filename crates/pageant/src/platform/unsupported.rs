use std::convert::Infallible;
use std::io;

use super::{Delivery, Platform, SegmentName};
use crate::locator::{AgentHandle, AgentLocator};

/// Platform without a Pageant transport. Discovery always comes back empty,
/// so every exchange stops at `AgentNotFound` before touching the OS.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unsupported;

impl AgentLocator for Unsupported {
    fn locate(&self) -> Option<AgentHandle> {
        None
    }
}

impl Platform for Unsupported {
    type Segment = Infallible;

    fn context_id(&self) -> u32 {
        std::process::id()
    }

    fn create_segment(&self, name: &SegmentName, _capacity: usize) -> io::Result<Infallible> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("cannot create {name}: shared segments need Windows"),
        ))
    }

    fn notify(&self, _agent: AgentHandle, _name: &SegmentName, segment: &mut Infallible) -> Delivery {
        match *segment {}
    }
}
