//! Transaction engine shared by the blocking and async backends.
//!
//! The engine owns the modem context and the parser of one handle and never
//! touches I/O. A backend drives it:
//!
//! 1. [`Engine::begin`] with the SID and its packed request,
//! 2. [`Engine::next`] to get the bytes to send and how long to wait,
//! 3. [`Engine::on_frame`] for every frame received, or
//!    [`Engine::on_timeout`] when the wait ran out, until one of them asks
//!    for the next step,
//! 4. [`Engine::end`] once `next` reports the SID done.
//!
//! URCs met on the way are queued and handed out by [`Engine::pop_urc`].

use heapless::Vec;

use crate::command::{self, Action, ModeTransition, OUTGOING_MAX};
use crate::config::Settings;
use crate::context::ModemContext;
use crate::datapack::PackBuf;
use crate::error::{Error, GenericError, UrcStatus};
use crate::fmt::Bytes;
use crate::framer::{FrameRef, FramingMode};
use crate::parser::{self, Parser, Plan};
use crate::service::Sid;

/// What the backend does next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outgoing<'a> {
    /// Select `framing`, transmit `bytes`, then wait up to `timeout_ms`.
    Send {
        bytes: &'a [u8],
        framing: FramingMode,
        timeout_ms: u32,
    },
    /// Nothing to transmit, wait up to `timeout_ms`.
    Wait { timeout_ms: u32 },
    /// The SID is over, call [`Engine::end`].
    Done(Result<(), Error>),
}

/// Outcome of a received frame or a timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// Keep waiting for the current command.
    Pending,
    /// URCs were queued. Deliver them and keep waiting.
    Urc,
    /// The current step is over, call [`Engine::next`].
    Next,
}

/// Receiver of packed URCs.
pub trait UrcHandler {
    fn on_urc(&mut self, urc: &PackBuf<'_>);
}

impl<F> UrcHandler for F
where
    F: FnMut(&PackBuf<'_>),
{
    fn on_urc(&mut self, urc: &PackBuf<'_>) {
        self(urc)
    }
}

pub struct Engine {
    settings: Settings,
    ctx: ModemContext,
    parser: Parser,
    outgoing: Vec<u8, OUTGOING_MAX>,
    outcome: Option<Result<(), Error>>,
}

impl Engine {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            ctx: ModemContext::new(),
            parser: Parser::new(),
            outgoing: Vec::new(),
            outcome: None,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn context(&self) -> &ModemContext {
        &self.ctx
    }

    #[cfg(test)]
    pub(crate) fn context_mut(&mut self) -> &mut ModemContext {
        &mut self.ctx
    }

    pub fn is_busy(&self) -> bool {
        self.parser.is_busy()
    }

    pub fn data_mode(&self) -> bool {
        self.ctx.persist.data_mode
    }

    /// Start `sid`. Rejected without side effects while another SID is in
    /// flight.
    pub fn begin(&mut self, sid: Sid, req: &PackBuf<'_>) -> Result<(), Error> {
        if self.parser.is_busy() {
            warn!("{:?} rejected, {:?} in flight", sid, self.parser.sid());
            return Err(GenericError::Busy.into());
        }
        if self.ctx.persist.data_mode && sid != Sid::DataSuspend {
            warn!("{:?} rejected in data mode", sid);
            return Err(GenericError::DataMode.into());
        }

        self.ctx.begin_sid();
        parser::prepare(sid, req, &mut self.ctx)?;
        self.outcome = None;
        self.parser.start(sid);
        debug!("{:?} started", sid);
        Ok(())
    }

    /// Plan the next step of the SID in flight.
    pub fn next(&mut self) -> Outgoing<'_> {
        if let Some(outcome) = self.outcome {
            return Outgoing::Done(outcome);
        }
        if !self.parser.is_busy() {
            return Outgoing::Done(Err(GenericError::Unclassified.into()));
        }

        loop {
            self.ctx.begin_command();
            let planned = self.parser.advance(&self.ctx, &self.settings);
            match planned {
                Plan::Skip => continue,
                Plan::Finish => return self.conclude(Ok(())),
                Plan::Fail(e) => return self.conclude(Err(e.into())),
                Plan::Wait { .. } => {
                    return Outgoing::Wait {
                        timeout_ms: self.parser.current().timeout_ms,
                    }
                }
                Plan::Send { cmd, .. } => {
                    self.outgoing.clear();
                    if let Err(e) = cmd.build(&mut self.outgoing) {
                        warn!("{:?} refused by builder", cmd.id());
                        return self.conclude(Err(e.into()));
                    }
                    let framing = cmd.framing();
                    debug!("Sending {:?}", Bytes(&self.outgoing));
                    return Outgoing::Send {
                        bytes: &self.outgoing,
                        framing,
                        timeout_ms: self.parser.current().timeout_ms,
                    };
                }
            }
        }
    }

    /// Classify one frame, in a SID or while idle.
    pub fn on_frame(&mut self, frame: FrameRef<'_>) -> Event {
        let sid = self.parser.sid();
        let current = *self.parser.current();
        let response = command::dispatch(frame, sid, &current, &mut self.ctx);

        match response.mode {
            ModeTransition::ToData => {
                debug!("Entering data mode");
                self.ctx.persist.data_mode = true;
            }
            ModeTransition::ToCommand => {
                debug!("Leaving data mode");
                self.ctx.persist.data_mode = false;
            }
            ModeTransition::None => {}
        }

        let in_step = sid.is_some() && self.outcome.is_none();
        match response.action {
            Action::Intermediate | Action::Ignored | Action::UrcIgnored => Event::Pending,
            Action::UrcForwarded(urcs) => {
                for urc in urcs {
                    self.ctx.persist.push_urc(urc);
                }
                Event::Urc
            }
            Action::FinalEnd | Action::FinalContinue if in_step => Event::Next,
            Action::Error if in_step => {
                let _ = self.conclude(Err(GenericError::Rejected.into()));
                Event::Next
            }
            Action::FinalEnd | Action::FinalContinue | Action::Error => {
                trace!("Final result outside a step");
                Event::Pending
            }
        }
    }

    /// The wait of the current step ran out.
    pub fn on_timeout(&mut self) -> Event {
        if self.outcome.is_some() || !self.parser.is_busy() {
            return Event::Next;
        }
        let current = *self.parser.current();
        match current.answer.on_timeout() {
            Ok(()) => trace!("{:?} answered nothing", current.id),
            Err(e) => {
                warn!("{:?} timed out", current.id);
                let _ = self.conclude(Err(e));
            }
        }
        Event::Next
    }

    /// End the SID in flight with `err`, typically a transport failure.
    pub fn fail(&mut self, err: Error) {
        if self.outcome.is_none() && self.parser.is_busy() {
            let _ = self.conclude(Err(err));
        }
    }

    /// Finish the SID in flight and pack its response, or its error report
    /// on failure.
    pub fn end(&mut self, rsp: &mut PackBuf<'_>) -> Result<(), Error> {
        let Some(sid) = self.parser.sid() else {
            return Err(GenericError::Unclassified.into());
        };
        if self.outcome.is_none() {
            let _ = self.conclude(Err(GenericError::Unclassified.into()));
        }
        let outcome = self
            .outcome
            .take()
            .unwrap_or(Err(GenericError::Unclassified.into()));

        let result = outcome.and_then(|()| parser::respond(sid, &self.ctx, rsp));
        if result.is_err() {
            match self.ctx.sid.report {
                Some(report) => rsp.write_struct(&report)?,
                None => rsp.clear(),
            }
        }
        self.parser.finish();
        result
    }

    /// Pack the oldest queued URC into `buf`.
    pub fn pop_urc(&mut self, buf: &mut PackBuf<'_>) -> Option<UrcStatus> {
        while let Some(urc) = self.ctx.persist.urcs.pop_front() {
            if urc.pack(buf).is_err() {
                warn!("URC could not be packed, dropping");
                continue;
            }
            return Some(if self.ctx.persist.urcs.is_empty() {
                UrcStatus::Ok
            } else {
                UrcStatus::OkPendingMore
            });
        }
        None
    }

    /// Hand every queued URC to `handler`.
    pub fn deliver_urcs<H: UrcHandler + ?Sized>(&mut self, handler: &mut H) {
        let mut buf = PackBuf::new();
        while self.pop_urc(&mut buf).is_some() {
            handler.on_urc(&buf);
            buf.clear();
        }
    }

    /// Abort whatever is in flight and leave data mode.
    pub fn reset(&mut self) {
        if let Some(sid) = self.parser.sid() {
            warn!("{:?} aborted by reset", sid);
        }
        self.parser.finish();
        self.outcome = None;
        self.outgoing.clear();
        self.ctx.persist.data_mode = false;
        self.ctx.begin_sid();
    }

    fn conclude(&mut self, outcome: Result<(), Error>) -> Outgoing<'_> {
        if let Some(sid) = self.parser.sid() {
            match outcome {
                Ok(()) => debug!("{:?} done", sid),
                Err(e) => error!("{:?} failed at {:?}: {:?}", sid, self.parser.step(), e),
            }
            parser::conclude(sid, &outcome, &mut self.ctx);
        }
        self.outcome = Some(outcome);
        Outgoing::Done(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framer::{Frame, FramingProfile, Framer};
    use crate::service::{
        ActivatePdn, AttachStatus, ConfId, ErrorReport, IpAddressInfo, Protocol, SimState,
        SocketClosedUrc, SocketConnect, SocketDataBuffer, SocketDataPendingUrc, SocketHandle,
        SocketRxData, UrcEvent, UrcEventRequest,
    };
    use no_std_net::{IpAddr, Ipv4Addr};
    use std::collections::VecDeque;
    use std::string::String as StdString;
    use std::vec::Vec as StdVec;

    /// Runs one SID against scripted answers, one answer per planned wait.
    /// A missing or empty answer times out.
    struct Bench {
        engine: Engine,
        framer: Framer,
        answers: VecDeque<&'static [u8]>,
        sent: StdVec<StdString>,
        urcs: usize,
    }

    impl Bench {
        fn new(answers: &[&'static [u8]]) -> Self {
            Self {
                engine: Engine::new(Settings::default()),
                framer: Framer::new(FramingProfile::BG96),
                answers: answers.iter().copied().collect(),
                sent: StdVec::new(),
                urcs: 0,
            }
        }

        fn run(&mut self, sid: Sid, req: &PackBuf<'_>, rsp: &mut PackBuf<'_>) -> Result<(), Error> {
            self.engine.begin(sid, req)?;
            loop {
                let framing = match self.engine.next() {
                    Outgoing::Done(_) => break,
                    Outgoing::Send { bytes, framing, .. } => {
                        self.sent.push(StdString::from_utf8_lossy(bytes).into_owned());
                        framing
                    }
                    Outgoing::Wait { .. } => FramingMode::Line,
                };

                let mut frames: StdVec<Frame> = StdVec::new();
                let answer = self.answers.pop_front().unwrap_or_default();
                self.framer.feed(answer, framing, |f| {
                    frames.push(Frame::from_ref(f).unwrap())
                });

                let mut advanced = false;
                for frame in &frames {
                    match self.engine.on_frame(frame.as_frame()) {
                        Event::Next => {
                            advanced = true;
                            break;
                        }
                        Event::Urc => {
                            let urcs = &mut self.urcs;
                            self.engine.deliver_urcs(&mut |_: &PackBuf<'_>| *urcs += 1);
                        }
                        Event::Pending => {}
                    }
                }
                if !advanced {
                    self.engine.on_timeout();
                }
            }
            self.engine.end(rsp)
        }
    }

    #[test]
    fn second_begin_is_rejected() {
        let mut engine = Engine::new(Settings::default());
        engine.begin(Sid::GetAttachStatus, &PackBuf::new()).unwrap();
        assert_eq!(
            engine.begin(Sid::CheckCnx, &PackBuf::new()),
            Err(GenericError::Busy.into())
        );
        // The first SID is untouched.
        assert!(matches!(engine.next(), Outgoing::Send { bytes: b"AT+CGATT?\r", .. }));
    }

    #[test]
    fn error_abandons_the_remaining_steps() {
        let mut bench = Bench::new(&[
            b"\r\n+CEREG: 0,1\r\n\r\nOK\r\n",
            b"\r\n+CME ERROR: SIM PIN required\r\n",
            b"\r\n+CGREG: 0,1\r\n\r\nOK\r\n",
            b"\r\n+COPS: 0\r\n\r\nOK\r\n",
        ]);
        let mut rsp = PackBuf::new();
        let result = bench.run(Sid::GetNetStatus, &PackBuf::new(), &mut rsp);

        assert_eq!(result, Err(GenericError::Rejected.into()));
        assert_eq!(bench.sent, ["AT+CEREG?\r", "AT+CREG?\r"]);
        assert_eq!(
            rsp.read_struct::<ErrorReport>(),
            Ok(ErrorReport::sim(SimState::PinRequired))
        );
        assert!(!bench.engine.is_busy());
    }

    #[test]
    fn urc_before_the_result_is_delivered_once() {
        let mut bench = Bench::new(&[b"\r\n+CEREG: 1\r\n\r\n+CGATT: 1\r\n\r\nOK\r\n"]);
        bench
            .engine
            .ctx
            .persist
            .subscriptions
            .set(UrcEvent::EpsNetworkRegStat, true);

        let mut rsp = PackBuf::new();
        bench
            .run(Sid::GetAttachStatus, &PackBuf::new(), &mut rsp)
            .unwrap();
        assert_eq!(bench.urcs, 1);
        assert_eq!(
            rsp.read_struct::<AttachStatus>(),
            Ok(AttachStatus { attached: true })
        );
    }

    #[test]
    fn active_pdn_skips_activation() {
        let mut bench = Bench::new(&[
            b"\r\n+QIACT: 1,1,1,\"10.0.0.5\"\r\n\r\nOK\r\n",
            b"\r\n+QIACT: 1,1,1,\"10.0.0.5\"\r\n\r\nOK\r\n",
        ]);
        let mut req = PackBuf::new();
        req.write_struct(&ActivatePdn {
            conf: ConfId::Predef,
        })
        .unwrap();
        let mut rsp = PackBuf::new();
        bench.run(Sid::ActivatePdn, &req, &mut rsp).unwrap();

        assert_eq!(bench.sent, ["AT+QIACT?\r", "AT+QIACT?\r"]);
        assert_eq!(
            rsp.read_struct::<IpAddressInfo>(),
            Ok(IpAddressInfo {
                conf: ConfId::Predef,
                ip: Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5))),
            })
        );
        assert!(bench.engine.context().persist.cids[0].active);
    }

    #[test]
    fn replaying_a_script_gives_the_same_steps() {
        let script: &[&'static [u8]] = &[
            b"\r\n+QIACT: 1,1,1,\"10.0.0.5\"\r\n\r\nOK\r\n",
            b"\r\n+QIACT: 1,1,1,\"10.0.0.5\"\r\n\r\nOK\r\n",
        ];
        let mut req = PackBuf::new();
        req.write_struct(&ActivatePdn {
            conf: ConfId::Predef,
        })
        .unwrap();

        let mut first = Bench::new(script);
        let mut second = Bench::new(script);
        let a = first.run(Sid::ActivatePdn, &req, &mut PackBuf::new());
        let b = second.run(Sid::ActivatePdn, &req, &mut PackBuf::new());
        assert_eq!(a, b);
        assert_eq!(first.sent, second.sent);
    }

    #[test]
    fn optional_answer_may_time_out() {
        // QNWINFO stays silent, QENG answers.
        let mut bench = Bench::new(&[
            b"\r\n+CSQ: 20,99\r\n\r\nOK\r\n",
            b"",
            b"\r\nOK\r\n",
        ]);
        let mut rsp = PackBuf::new();
        bench
            .run(Sid::GetSignalQuality, &PackBuf::new(), &mut rsp)
            .unwrap();
        assert_eq!(bench.sent.len(), 3);
    }

    #[test]
    fn required_answer_times_out() {
        let mut bench = Bench::new(&[]);
        let mut rsp = PackBuf::new();
        assert_eq!(
            bench.run(Sid::GetAttachStatus, &PackBuf::new(), &mut rsp),
            Err(Error::Timeout)
        );
        assert!(rsp.is_empty());
    }

    #[test]
    fn subscription_request_reaches_the_modem() {
        let mut bench = Bench::new(&[b"\r\nOK\r\n"]);
        let mut req = PackBuf::new();
        req.write_struct(&UrcEventRequest {
            event: UrcEvent::EpsNetworkRegStat,
        })
        .unwrap();
        bench
            .run(Sid::SubscribeNetEvent, &req, &mut PackBuf::new())
            .unwrap();
        assert_eq!(bench.sent, ["AT+CEREG=2\r"]);
    }

    #[test]
    fn idle_urcs_are_drained_one_by_one() {
        let mut engine = Engine::new(Settings::default());
        for handle in 0..3 {
            engine.ctx.persist.reserve_socket(handle).unwrap();
        }
        assert_eq!(engine.on_frame(FrameRef::Line(b"+QIURC: \"recv\",2")), Event::Urc);
        assert_eq!(engine.on_frame(FrameRef::Line(b"+QIURC: \"closed\",2")), Event::Urc);

        let mut buf = PackBuf::new();
        assert_eq!(engine.pop_urc(&mut buf), Some(UrcStatus::OkPendingMore));
        buf.clear();
        assert_eq!(engine.pop_urc(&mut buf), Some(UrcStatus::Ok));
        assert_eq!(engine.pop_urc(&mut buf), None);
    }

    #[test]
    fn data_mode_blocks_everything_but_suspend() {
        let mut engine = Engine::new(Settings::default());
        engine.on_frame(FrameRef::Line(b"CONNECT"));
        assert!(engine.data_mode());
        assert_eq!(
            engine.begin(Sid::CheckCnx, &PackBuf::new()),
            Err(GenericError::DataMode.into())
        );
        engine.reset();
        assert!(!engine.data_mode());
        assert!(engine.begin(Sid::CheckCnx, &PackBuf::new()).is_ok());
    }

    fn dial(bench: &mut Bench, handle: u8) -> Result<(), Error> {
        let mut req = PackBuf::new();
        req.write_struct(&SocketConnect {
            socket: handle,
            conf: ConfId::Predef,
            protocol: Protocol::Udp,
            remote: IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1)),
            remote_port: 7,
            local_port: 0,
        })
        .unwrap();
        let mut rsp = PackBuf::new();
        bench.run(Sid::DialCommand, &req, &mut rsp)?;
        assert_eq!(
            rsp.read_struct::<SocketHandle>(),
            Ok(SocketHandle { socket: handle })
        );
        Ok(())
    }

    fn close(bench: &mut Bench, handle: u8) -> Result<(), Error> {
        let mut req = PackBuf::new();
        req.write_struct(&SocketHandle { socket: handle }).unwrap();
        bench.run(Sid::SocketClose, &req, &mut PackBuf::new())
    }

    #[test]
    fn dial_then_close_returns_the_connect_id() {
        let mut bench = Bench::new(&[
            b"\r\nOK\r\n",
            b"\r\n+QIOPEN: 0,0\r\n",
            b"\r\nOK\r\n",
            b"\r\nOK\r\n",
            b"\r\n+QIOPEN: 0,0\r\n",
        ]);
        dial(&mut bench, 5).unwrap();
        let socket = bench.engine.context().persist.socket(5).copied().unwrap();
        assert!(socket.connected);
        assert_eq!(socket.modem_cid, 0);

        close(&mut bench, 5).unwrap();
        assert!(bench.engine.context().persist.socket(5).is_none());

        // The freed connectID serves the next handle.
        dial(&mut bench, 9).unwrap();
        assert_eq!(bench.engine.context().persist.modem_cid(9), Some(0));
        assert_eq!(
            bench.sent,
            [
                "AT+QIOPEN=1,0,\"UDP\",\"192.0.2.1\",7,0,0\r",
                "AT+QICLOSE=0\r",
                "AT+QIOPEN=1,0,\"UDP\",\"192.0.2.1\",7,0,0\r",
            ]
        );
    }

    #[test]
    fn close_after_remote_close_frees_the_modem_side() {
        let mut bench = Bench::new(&[
            b"\r\nOK\r\n",
            b"\r\n+QIOPEN: 0,0\r\n",
            b"\r\nOK\r\n",
        ]);
        dial(&mut bench, 3).unwrap();

        assert_eq!(
            bench.engine.on_frame(FrameRef::Line(b"+QIURC: \"closed\",0")),
            Event::Urc
        );
        let mut urc = PackBuf::new();
        assert_eq!(bench.engine.pop_urc(&mut urc), Some(UrcStatus::Ok));
        assert_eq!(
            urc.read_struct::<SocketClosedUrc>(),
            Ok(SocketClosedUrc { socket: 3 })
        );
        let socket = bench.engine.context().persist.socket(3).copied().unwrap();
        assert!(socket.closed_by_remote);

        close(&mut bench, 3).unwrap();
        assert_eq!(bench.sent.last().map(StdString::as_str), Some("AT+QICLOSE=0\r"));
        assert!(bench.engine.context().persist.socket(3).is_none());
    }

    #[test]
    fn send_then_read_counted_payload() {
        let mut bench = Bench::new(&[
            b"\r\nOK\r\n",
            b"\r\n+QIOPEN: 1,0\r\n",
            b"\r\n> ",
            b"\r\nSEND OK\r\n",
            b"\r\n+QIRD: 6,0,6\r\n\r\nOK\r\n",
            b"\r\n+QIRD: 6\r\npo\r\nng\r\n\r\nOK\r\n",
        ]);
        // Holds connectID 0, so handle 7 gets 1.
        bench.engine.ctx.persist.reserve_socket(2).unwrap();
        dial(&mut bench, 7).unwrap();

        let mut out = SocketDataBuffer {
            socket: 7,
            ..Default::default()
        };
        out.data.extend_from_slice(b"ping").unwrap();
        let mut req = PackBuf::new();
        req.write_ref(&out);
        bench.run(Sid::SendData, &req, &mut PackBuf::new()).unwrap();

        assert_eq!(
            bench.engine.on_frame(FrameRef::Line(b"+QIURC: \"recv\",1")),
            Event::Urc
        );
        let mut urc = PackBuf::new();
        bench.engine.pop_urc(&mut urc);
        assert_eq!(
            urc.read_struct::<SocketDataPendingUrc>(),
            Ok(SocketDataPendingUrc { socket: 7 })
        );

        let mut req = PackBuf::new();
        req.write_struct(&SocketRxData { socket: 7, len: 64 }).unwrap();
        let mut incoming = SocketDataBuffer::default();
        let mut rsp = PackBuf::new();
        rsp.write_mut(&mut incoming);
        bench.run(Sid::ReceiveData, &req, &mut rsp).unwrap();
        drop(rsp);

        // CR LF inside the payload is data.
        assert_eq!(&incoming.data[..], b"po\r\nng");
        assert_eq!(incoming.socket, 7);
        assert!(!bench.engine.context().persist.socket(7).unwrap().data_pending);
        assert_eq!(
            bench.sent[1..],
            [
                "AT+QISEND=1,4\r",
                "ping",
                "AT+QIRD=1,0\r",
                "AT+QIRD=1,6\r",
            ]
        );
    }
}
