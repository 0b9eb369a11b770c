//! Async backend: a [`Runner`] task classifies frames as they arrive while
//! [`Control`] runs SIDs and waits on the runner's signals.

pub mod control;
pub mod pwr;
pub mod resources;
pub mod runner;
pub mod state;

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::channel::Sender;
use embedded_io_async::Write;

use crate::framer::{Frame, FramingProfile, Ingress};

pub use control::Control;
pub use pwr::PwrCtrl;
pub use resources::{Resources, FRAME_QUEUE_DEPTH};
pub use runner::Runner;

/// Receive side, fed with every byte read from the modem.
pub type FrameIngress<'a, const Q: usize> =
    Ingress<'a, Sender<'a, NoopRawMutex, Frame, Q>>;

pub fn new<'a, W: Write, const Q: usize>(
    resources: &'a Resources<Q>,
    writer: W,
) -> (Control<'a, W>, Runner<'a, Q>, FrameIngress<'a, Q>) {
    let ingress = Ingress::new(
        FramingProfile::BG96,
        resources.frames.sender(),
        &resources.shared.selector,
    );
    let runner = Runner::new(resources.frames.receiver(), &resources.shared);
    let control = Control::new(&resources.shared, writer);
    (control, runner, ingress)
}
