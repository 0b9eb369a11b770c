//! Byte classifier.
//!
//! Turns the unframed receive stream into complete messages, one byte at a
//! time. It runs from the receive interrupt, so every step is O(1) and never
//! blocks; completed messages leave through a [`FrameSink`].
//!
//! Three framing modes exist, selected by the transaction engine through a
//! [`FramingSelector`] before each command is transmitted:
//!
//! * [`FramingMode::Line`]: `\r\n` delimited lines, empty lines dropped.
//! * [`FramingMode::CountedPayload`]: like `Line`, but a line starting with
//!   the modem's counted header (`+QIRD:` on BG96) followed by a decimal
//!   length and `\r\n` is followed by exactly that many opaque bytes.
//! * [`FramingMode::Prompt`]: like `Line`, but `>` then space at the start of
//!   a line completes a [`Frame::Prompt`] immediately.

use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use heapless::Vec;

use crate::fmt::Bytes;

/// Maximum size of a received line or counted payload.
pub const FRAME_MAX: usize = 1472;

/// Longest decimal length accepted after a counted header.
const MAX_LENGTH_DIGITS: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum FramingMode {
    Line = 0,
    CountedPayload = 1,
    Prompt = 2,
}

impl FramingMode {
    const fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::CountedPayload,
            2 => Self::Prompt,
            _ => Self::Line,
        }
    }
}

/// Framing mode shared between the transaction engine and the receive path.
///
/// Written by the engine before a command goes out, read by the classifier
/// for every byte.
pub struct FramingSelector {
    mode: AtomicU8,
    reset: AtomicBool,
}

impl FramingSelector {
    pub const fn new() -> Self {
        Self {
            mode: AtomicU8::new(FramingMode::Line as u8),
            reset: AtomicBool::new(false),
        }
    }

    pub fn select(&self, mode: FramingMode) {
        self.mode.store(mode as u8, Ordering::Release);
    }

    pub fn current(&self) -> FramingMode {
        FramingMode::from_u8(self.mode.load(Ordering::Acquire))
    }

    /// Ask the receive path to drop its partial frame before the next byte.
    pub fn request_reset(&self) {
        self.reset.store(true, Ordering::Release);
    }

    // No compare-and-swap on thumbv6m.
    fn take_reset(&self) -> bool {
        let requested = self.reset.load(Ordering::Acquire);
        if requested {
            self.reset.store(false, Ordering::Release);
        }
        requested
    }
}

impl Default for FramingSelector {
    fn default() -> Self {
        Self::new()
    }
}

/// Modem specific framing literals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramingProfile {
    /// Response tag announcing a counted payload, matched at line start.
    pub counted_header: &'static [u8],
}

impl FramingProfile {
    pub const BG96: Self = Self {
        counted_header: b"+QIRD:",
    };
}

/// A complete message borrowed from the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameRef<'a> {
    /// A line without its `\r\n` terminator.
    Line(&'a [u8]),
    /// Opaque bytes of a counted payload.
    Payload(&'a [u8]),
    /// The send prompt (`> `).
    Prompt,
}

/// An owned message, as it travels through the frame queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame<const N: usize = FRAME_MAX> {
    Line(Vec<u8, N>),
    Payload(Vec<u8, N>),
    Prompt,
}

impl<const N: usize> Frame<N> {
    pub fn from_ref(frame: FrameRef<'_>) -> Option<Self> {
        Some(match frame {
            FrameRef::Line(b) => Self::Line(Vec::from_slice(b).ok()?),
            FrameRef::Payload(b) => Self::Payload(Vec::from_slice(b).ok()?),
            FrameRef::Prompt => Self::Prompt,
        })
    }

    pub fn as_frame(&self) -> FrameRef<'_> {
        match self {
            Self::Line(b) => FrameRef::Line(b),
            Self::Payload(b) => FrameRef::Payload(b),
            Self::Prompt => FrameRef::Prompt,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum State {
    /// Discard everything up to the next `\r`. Entered on reset.
    WaitingForInitCr,
    WaitingForFirstChar,
    WaitingForCr,
    WaitingForLf,
    /// Got `>` at line start in prompt mode.
    WaitingForPromptSpace,
    /// Counted header matched, parsing the decimal length.
    ReceivingHeader,
    ReceivingHeaderLf,
    ReceivingData,
}

pub struct Framer<const N: usize = FRAME_MAX> {
    profile: FramingProfile,
    state: State,
    buf: Vec<u8, N>,
    overflow: bool,
    digits: u8,
    remaining: usize,
}

impl<const N: usize> Framer<N> {
    pub const fn new(profile: FramingProfile) -> Self {
        Self {
            profile,
            state: State::WaitingForInitCr,
            buf: Vec::new(),
            overflow: false,
            digits: 0,
            remaining: 0,
        }
    }

    /// Drop any partial message and wait for the next line boundary.
    pub fn reset(&mut self) {
        self.state = State::WaitingForInitCr;
        self.buf.clear();
        self.overflow = false;
        self.digits = 0;
        self.remaining = 0;
    }

    /// `true` while opaque payload bytes are being counted.
    pub fn in_payload(&self) -> bool {
        self.state == State::ReceivingData
    }

    pub fn feed(&mut self, bytes: &[u8], mode: FramingMode, mut emit: impl FnMut(FrameRef<'_>)) {
        for &b in bytes {
            self.push(b, mode, &mut emit);
        }
    }

    /// Classify one byte, calling `emit` for every message it completes.
    ///
    /// A counted header with a zero length completes the header line and an
    /// empty payload on the same byte.
    pub fn push(&mut self, byte: u8, mode: FramingMode, mut emit: impl FnMut(FrameRef<'_>)) {
        match self.state {
            State::WaitingForInitCr => {
                if byte == b'\r' {
                    self.buf.clear();
                    self.overflow = false;
                    self.state = State::WaitingForLf;
                }
            }
            State::WaitingForFirstChar => match byte {
                b'\r' => self.state = State::WaitingForLf,
                b'\n' => {}
                b'>' if mode == FramingMode::Prompt => {
                    self.state = State::WaitingForPromptSpace;
                }
                _ => {
                    self.append(byte);
                    self.state = State::WaitingForCr;
                    self.match_header(mode);
                }
            },
            State::WaitingForCr => {
                if byte == b'\r' {
                    self.state = State::WaitingForLf;
                } else {
                    self.append(byte);
                    self.match_header(mode);
                }
            }
            State::WaitingForLf => match byte {
                b'\n' => {
                    self.complete_line(&mut emit);
                    self.state = State::WaitingForFirstChar;
                }
                // Echoed commands end with a lone `\r` before the `\r\n`.
                b'\r' => {}
                _ => {
                    self.append(b'\r');
                    self.append(byte);
                    self.state = State::WaitingForCr;
                }
            },
            State::WaitingForPromptSpace => {
                if byte == b' ' {
                    emit(FrameRef::Prompt);
                    self.state = State::WaitingForFirstChar;
                } else {
                    self.append(b'>');
                    self.state = State::WaitingForCr;
                    self.push(byte, mode, emit);
                }
            }
            State::ReceivingHeader => match byte {
                b' ' if self.digits == 0 => self.append(byte),
                b'0'..=b'9' if self.digits < MAX_LENGTH_DIGITS => {
                    self.append(byte);
                    self.digits += 1;
                    self.remaining = self.remaining * 10 + (byte - b'0') as usize;
                }
                b'\r' if self.digits > 0 => self.state = State::ReceivingHeaderLf,
                _ => {
                    // Not a counted header, e.g. `+QIRD: 10,5,5`.
                    self.remaining = 0;
                    self.digits = 0;
                    self.state = State::WaitingForCr;
                    self.push(byte, mode, emit);
                }
            },
            State::ReceivingHeaderLf => {
                if byte == b'\n' {
                    self.complete_line(&mut emit);
                    self.digits = 0;
                    if self.remaining == 0 {
                        emit(FrameRef::Payload(&[]));
                        self.state = State::WaitingForFirstChar;
                    } else {
                        self.state = State::ReceivingData;
                    }
                } else {
                    self.remaining = 0;
                    self.digits = 0;
                    self.append(b'\r');
                    self.state = State::WaitingForCr;
                    self.push(byte, mode, emit);
                }
            }
            State::ReceivingData => {
                self.append(byte);
                self.remaining -= 1;
                if self.remaining == 0 {
                    if self.overflow {
                        warn!("Counted payload exceeds {} bytes, dropped", N);
                    } else {
                        emit(FrameRef::Payload(&self.buf));
                    }
                    self.buf.clear();
                    self.overflow = false;
                    self.state = State::WaitingForFirstChar;
                }
            }
        }
    }

    fn append(&mut self, byte: u8) {
        if self.buf.push(byte).is_err() && !self.overflow {
            self.overflow = true;
        }
    }

    fn match_header(&mut self, mode: FramingMode) {
        if mode == FramingMode::CountedPayload
            && !self.overflow
            && self.buf.as_slice() == self.profile.counted_header
        {
            self.remaining = 0;
            self.digits = 0;
            self.state = State::ReceivingHeader;
        }
    }

    fn complete_line(&mut self, emit: &mut impl FnMut(FrameRef<'_>)) {
        if self.overflow {
            warn!("Line exceeds {} bytes, dropped", N);
            self.buf.clear();
            self.overflow = false;
            return;
        }
        if !self.buf.is_empty() {
            trace!("RX {:?}", Bytes(&self.buf));
            emit(FrameRef::Line(&self.buf));
        }
        self.buf.clear();
    }
}

/// Destination of completed frames, filled from interrupt context.
pub trait FrameSink<const N: usize> {
    /// Hand over one frame. Returns `false` when the frame had to be dropped.
    fn deliver(&mut self, frame: Frame<N>) -> bool;
}

impl<const N: usize, const Q: usize> FrameSink<N> for heapless::spsc::Producer<'_, Frame<N>, Q> {
    fn deliver(&mut self, frame: Frame<N>) -> bool {
        self.enqueue(frame).is_ok()
    }
}

impl<M, const N: usize, const Q: usize> FrameSink<N>
    for embassy_sync::channel::Sender<'_, M, Frame<N>, Q>
where
    M: embassy_sync::blocking_mutex::raw::RawMutex,
{
    fn deliver(&mut self, frame: Frame<N>) -> bool {
        self.try_send(frame).is_ok()
    }
}

/// Receive side actor: owns the framer exclusively and pushes completed
/// frames into a queue read by the transaction driver.
pub struct Ingress<'a, S, const N: usize = FRAME_MAX> {
    framer: Framer<N>,
    sink: S,
    selector: &'a FramingSelector,
}

impl<'a, S, const N: usize> Ingress<'a, S, N>
where
    S: FrameSink<N>,
{
    pub fn new(profile: FramingProfile, sink: S, selector: &'a FramingSelector) -> Self {
        Self {
            framer: Framer::new(profile),
            sink,
            selector,
        }
    }

    pub fn on_byte(&mut self, byte: u8) {
        self.check_reset();
        let mode = self.selector.current();
        let sink = &mut self.sink;
        self.framer.push(byte, mode, |frame| deliver(sink, frame));
    }

    pub fn on_bytes(&mut self, bytes: &[u8]) {
        self.check_reset();
        let mode = self.selector.current();
        let sink = &mut self.sink;
        self.framer.feed(bytes, mode, |frame| deliver(sink, frame));
    }

    pub fn reset(&mut self) {
        self.framer.reset();
    }

    fn check_reset(&mut self) {
        if self.selector.take_reset() {
            debug!("Framing reset");
            self.framer.reset();
        }
    }
}

fn deliver<S: FrameSink<N>, const N: usize>(sink: &mut S, frame: FrameRef<'_>) {
    match Frame::from_ref(frame) {
        Some(frame) => {
            if !sink.deliver(frame) {
                warn!("Frame queue full, dropping frame");
            }
        }
        None => warn!("Frame does not fit the queue slot, dropping"),
    }
}
