use embassy_futures::select::{select3, Either3};
use embassy_time::{Duration, Instant, Timer};
use embedded_io_async::Write;
use heapless::Vec;

use crate::command::OUTGOING_MAX;
use crate::datapack::PackBuf;
use crate::error::{Error, GenericError, UrcStatus};
use crate::framer::FramingMode;
use crate::service::Sid;
use crate::transaction::{Outgoing, UrcHandler};

use super::state::Shared;

enum Step {
    Send(Vec<u8, OUTGOING_MAX>, FramingMode, u32),
    /// The engine handed out more than a send buffer holds.
    Overflow,
    Wait(u32),
    Done,
}

/// Request side of a device. Runs one SID at a time.
pub struct Control<'a, W> {
    shared: &'a Shared,
    writer: W,
}

impl<'a, W: Write> Control<'a, W> {
    pub(crate) fn new(shared: &'a Shared, writer: W) -> Self {
        Self { shared, writer }
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    pub fn data_mode(&self) -> bool {
        self.shared.with(|engine| engine.data_mode())
    }

    /// Run `sid` to completion. URCs met on the way go to `on_urc`.
    pub async fn sendcmd<H: UrcHandler + ?Sized>(
        &mut self,
        sid: Sid,
        req: &PackBuf<'_>,
        rsp: &mut PackBuf<'_>,
        on_urc: &mut H,
    ) -> Result<(), Error> {
        self.shared.with(|engine| engine.begin(sid, req))?;
        loop {
            self.shared.step.reset();
            let step = self.shared.with(|engine| match engine.next() {
                Outgoing::Done(_) => Step::Done,
                Outgoing::Wait { timeout_ms } => Step::Wait(timeout_ms),
                Outgoing::Send {
                    bytes,
                    framing,
                    timeout_ms,
                } => match Vec::from_slice(bytes) {
                    Ok(out) => Step::Send(out, framing, timeout_ms),
                    Err(()) => Step::Overflow,
                },
            });

            let timeout_ms = match step {
                Step::Done => break,
                Step::Overflow => {
                    error!("Outgoing message too long");
                    self.shared
                        .with(|engine| engine.fail(GenericError::BuildRefused.into()));
                    continue;
                }
                Step::Wait(timeout_ms) => timeout_ms,
                Step::Send(bytes, framing, timeout_ms) => {
                    self.shared.selector.select(framing);
                    if let Err(e) = self.transmit(&bytes).await {
                        error!("Write failed: {:?}", e);
                        self.shared.with(|engine| engine.fail(e));
                        continue;
                    }
                    timeout_ms
                }
            };
            self.wait(timeout_ms, on_urc).await;
        }

        self.shared.selector.select(FramingMode::Line);
        self.shared.with(|engine| {
            engine.deliver_urcs(on_urc);
            engine.end(rsp)
        })
    }

    /// Pack the oldest pending URC into `buf`, if any.
    pub fn get_event(&mut self, buf: &mut PackBuf<'_>) -> Result<Option<UrcStatus>, Error> {
        self.shared.with(|engine| {
            if engine.is_busy() {
                return Err(GenericError::Busy.into());
            }
            Ok(engine.pop_urc(buf))
        })
    }

    /// Wait for the next URC and pack it into `buf`.
    pub async fn wait_event(&mut self, buf: &mut PackBuf<'_>) -> Result<UrcStatus, Error> {
        loop {
            if let Some(status) = self.get_event(buf)? {
                return Ok(status);
            }
            self.shared.urc.wait().await;
        }
    }

    /// Abort everything: leave data mode, forget the SID in flight and
    /// restart framing.
    pub fn reset_context(&mut self) {
        self.shared.with(|engine| engine.reset());
        self.shared.selector.select(FramingMode::Line);
        self.shared.selector.request_reset();
        self.shared.step.reset();
    }

    async fn transmit(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.writer
            .write_all(bytes)
            .await
            .map_err(|_| GenericError::Link)?;
        self.writer.flush().await.map_err(|_| GenericError::Link)?;
        Ok(())
    }

    async fn wait<H: UrcHandler + ?Sized>(&mut self, timeout_ms: u32, on_urc: &mut H) {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms as u64);
        loop {
            match select3(
                self.shared.step.wait(),
                self.shared.urc.wait(),
                Timer::at(deadline),
            )
            .await
            {
                Either3::First(()) => return,
                Either3::Second(()) => self.shared.with(|engine| engine.deliver_urcs(on_urc)),
                Either3::Third(()) => {
                    self.shared.with(|engine| engine.on_timeout());
                    return;
                }
            }
        }
    }
}
