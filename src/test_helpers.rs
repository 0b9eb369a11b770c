//! Scripted modems for the backend tests.
//!
//! Both answer every transmitted message with the next scripted chunk, fed
//! through a real [`Ingress`] so framing runs exactly as on a target. The
//! framer starts out of sync, so every script starts with `\r\n`.

use std::collections::VecDeque;
use std::string::String;
use std::sync::Once;
use std::vec::Vec;

use core::convert::Infallible;

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::channel::Sender;
use embassy_time::Duration;
use env_logger::Env;
use heapless::spsc::Producer;

use crate::blocking::{Channel, Link};
use crate::config::Settings;
use crate::error::Error;
use crate::framer::{Frame, FramingProfile, FramingSelector, Ingress};

/// Depth of the frame queue used by the blocking tests.
pub const FRAME_QUEUE: usize = 8;

static INIT: Once = Once::new();

pub fn init_logging() {
    INIT.call_once(|| {
        env_logger::Builder::from_env(Env::default().default_filter_or("info"))
            .is_test(true)
            .init();
    });
}

/// Settings with every timeout capped, so unanswered commands fail fast.
pub fn fast_settings() -> Settings {
    Settings {
        max_command_timeout: Some(Duration::from_millis(100)),
        ..Settings::default()
    }
}

fn record(sent: &mut Vec<String>, bytes: &[u8]) {
    sent.push(String::from_utf8_lossy(bytes).into_owned());
}

pub struct ScriptedLink<'q> {
    ingress: Ingress<'q, Producer<'q, Frame, FRAME_QUEUE>>,
    answers: VecDeque<&'static [u8]>,
    sent: Vec<String>,
    channel: Channel,
}

impl<'q> ScriptedLink<'q> {
    pub fn new(frames: Producer<'q, Frame, FRAME_QUEUE>, selector: &'q FramingSelector) -> Self {
        Self {
            ingress: Ingress::new(FramingProfile::BG96, frames, selector),
            answers: VecDeque::new(),
            sent: Vec::new(),
            channel: Channel::Command,
        }
    }

    /// Queue the answer to the next transmitted message.
    pub fn answer(mut self, bytes: &'static [u8]) -> Self {
        self.answers.push_back(bytes);
        self
    }

    pub fn sent(&self) -> &[String] {
        &self.sent
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }
}

impl Link for ScriptedLink<'_> {
    fn send(&mut self, bytes: &[u8]) -> Result<(), Error> {
        record(&mut self.sent, bytes);
        if let Some(answer) = self.answers.pop_front() {
            self.ingress.on_bytes(answer);
        }
        Ok(())
    }

    fn select(&mut self, channel: Channel) {
        self.channel = channel;
    }

    fn reset(&mut self, channel: Channel) {
        if channel == Channel::Command {
            self.ingress.reset();
        }
    }
}

pub struct ScriptedWriter<'a, const Q: usize> {
    ingress: Option<Ingress<'a, Sender<'a, NoopRawMutex, Frame, Q>>>,
    answers: VecDeque<&'static [u8]>,
    sent: Vec<String>,
}

impl<'a, const Q: usize> ScriptedWriter<'a, Q> {
    pub fn new() -> Self {
        Self {
            ingress: None,
            answers: VecDeque::new(),
            sent: Vec::new(),
        }
    }

    /// Connect the receive side made together with the writer's owner.
    pub fn attach(&mut self, ingress: Ingress<'a, Sender<'a, NoopRawMutex, Frame, Q>>) {
        self.ingress = Some(ingress);
    }

    pub fn answer(&mut self, bytes: &'static [u8]) -> &mut Self {
        self.answers.push_back(bytes);
        self
    }

    /// Bytes arriving without a command, URCs typically.
    pub fn inject(&mut self, bytes: &[u8]) {
        if let Some(ingress) = self.ingress.as_mut() {
            ingress.on_bytes(bytes);
        }
    }

    pub fn sent(&self) -> &[String] {
        &self.sent
    }
}

impl<const Q: usize> embedded_io_async::ErrorType for ScriptedWriter<'_, Q> {
    type Error = Infallible;
}

impl<const Q: usize> embedded_io_async::Write for ScriptedWriter<'_, Q> {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Infallible> {
        record(&mut self.sent, buf);
        if let Some(answer) = self.answers.pop_front() {
            self.inject(answer);
        }
        Ok(buf.len())
    }
}
