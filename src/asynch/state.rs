use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;

use crate::config::Settings;
use crate::framer::FramingSelector;
use crate::transaction::Engine;

/// State shared by [`Control`](super::control::Control) and
/// [`Runner`](super::runner::Runner).
pub struct Shared {
    engine: Mutex<NoopRawMutex, RefCell<Engine>>,
    /// Raised by the runner once the current step is over.
    pub(crate) step: Signal<NoopRawMutex, ()>,
    /// Raised by the runner whenever URCs were queued.
    pub(crate) urc: Signal<NoopRawMutex, ()>,
    pub(crate) selector: FramingSelector,
}

impl Shared {
    pub fn new(settings: Settings) -> Self {
        Self {
            engine: Mutex::new(RefCell::new(Engine::new(settings))),
            step: Signal::new(),
            urc: Signal::new(),
            selector: FramingSelector::new(),
        }
    }

    pub(crate) fn with<R>(&self, f: impl FnOnce(&mut Engine) -> R) -> R {
        self.engine.lock(|engine| f(&mut engine.borrow_mut()))
    }
}
