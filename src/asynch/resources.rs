use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::channel::Channel;

use crate::config::Settings;
use crate::framer::Frame;

use super::state::Shared;

/// Frames buffered between the receive path and the runner.
pub const FRAME_QUEUE_DEPTH: usize = 4;

/// Storage for one device. Must outlive the handles made by
/// [`new`](super::new).
pub struct Resources<const Q: usize = FRAME_QUEUE_DEPTH> {
    pub(crate) frames: Channel<NoopRawMutex, Frame, Q>,
    pub(crate) shared: Shared,
}

impl<const Q: usize> Resources<Q> {
    pub fn new(settings: Settings) -> Self {
        Self {
            frames: Channel::new(),
            shared: Shared::new(settings),
        }
    }
}
