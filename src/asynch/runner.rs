use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::channel::Receiver;

use crate::framer::Frame;
use crate::transaction::Event;

use super::state::Shared;

/// Background worker classifying every received frame.
///
/// You must call `.run()` in a background task for the device to operate.
pub struct Runner<'a, const Q: usize> {
    frames: Receiver<'a, NoopRawMutex, Frame, Q>,
    shared: &'a Shared,
}

impl<'a, const Q: usize> Runner<'a, Q> {
    pub(crate) fn new(frames: Receiver<'a, NoopRawMutex, Frame, Q>, shared: &'a Shared) -> Self {
        Self { frames, shared }
    }

    pub async fn run(&mut self) -> ! {
        loop {
            let frame = self.frames.receive().await;
            self.process(&frame);
        }
    }

    fn process(&self, frame: &Frame) {
        match self.shared.with(|engine| engine.on_frame(frame.as_frame())) {
            Event::Next => self.shared.step.signal(()),
            Event::Urc => self.shared.urc.signal(()),
            Event::Pending => {}
        }
    }
}
