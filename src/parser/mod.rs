//! Parser context of the SID in flight.
//!
//! [`Parser`] walks the steps of one SID and keeps the descriptor of the
//! command being answered. [`prepare`] turns a request envelope into the SID
//! scope of the context, [`respond`] packs what the SID collected.

pub mod procedure;

use embassy_time::Duration;

pub use procedure::{plan, steps, Plan, Step};

use crate::command::{self, AtType, CurrentCommand};
use crate::config::Settings;
use crate::context::{ModemContext, Request};
use crate::datapack::PackBuf;
use crate::error::{Error, GenericError};
use crate::service::{
    ActivatePdn, AttachStatus, DeactivatePdn, DeviceInfo, DnsResponse, GetIpAddress,
    IpAddressInfo, ModemEventRequest, PdnDefinition, ResetKind, ResetRequest, SetDefaultPdn, Sid,
    SocketCnxInfo, SocketConnect, SocketDataBuffer, SocketHandle, SocketRxData, UrcEventRequest,
};

pub struct Parser {
    sid: Option<Sid>,
    next: usize,
    step: Option<Step>,
    current: CurrentCommand,
}

impl Parser {
    pub const fn new() -> Self {
        Self {
            sid: None,
            next: 0,
            step: None,
            current: CurrentCommand::IDLE,
        }
    }

    pub fn sid(&self) -> Option<Sid> {
        self.sid
    }

    /// Step planned last.
    pub fn step(&self) -> Option<Step> {
        self.step
    }

    pub fn current(&self) -> &CurrentCommand {
        &self.current
    }

    pub fn is_busy(&self) -> bool {
        self.sid.is_some()
    }

    pub fn start(&mut self, sid: Sid) {
        self.sid = Some(sid);
        self.next = 0;
        self.step = None;
        self.current = CurrentCommand::IDLE;
    }

    /// Plan the next step of the SID and make it the current command.
    pub fn advance<'c>(&mut self, ctx: &'c ModemContext, settings: &Settings) -> Plan<'c> {
        let Some(sid) = self.sid else {
            return Plan::Finish;
        };
        let all = steps(sid);
        let Some(&step) = all.get(self.next) else {
            self.current = CurrentCommand::IDLE;
            return Plan::Finish;
        };
        self.next += 1;
        self.step = Some(step);

        let planned = plan(step, sid, self.next == all.len(), ctx, settings);
        self.current = match planned {
            Plan::Send { cmd, answer, last } => CurrentCommand {
                id: cmd.id(),
                at_type: cmd.at_type(),
                answer,
                last,
                timeout_ms: clamp(settings, command::timeout_ms(cmd.id())),
            },
            Plan::Wait {
                id,
                timeout_ms,
                answer,
                last,
            } => CurrentCommand {
                id,
                at_type: AtType::NoCmd,
                answer,
                last,
                timeout_ms: clamp(settings, timeout_ms),
            },
            _ => CurrentCommand::IDLE,
        };
        trace!("{:?} step {:?}", sid, step);
        planned
    }

    pub fn finish(&mut self) {
        self.sid = None;
        self.step = None;
        self.current = CurrentCommand::IDLE;
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

fn clamp(settings: &Settings, timeout_ms: u32) -> u32 {
    settings
        .clamp(Duration::from_millis(timeout_ms as u64))
        .as_millis() as u32
}

/// Decode the request of `sid` into the SID scope and apply what the SID
/// changes before any command is sent.
pub fn prepare(sid: Sid, req: &PackBuf<'_>, ctx: &mut ModemContext) -> Result<(), Error> {
    let request = match sid {
        Sid::InitModem => Request::ModemInit(req.read_struct()?),
        Sid::Reset => {
            let ResetRequest { kind } = req.read_struct()?;
            if kind != ResetKind::Hardware {
                return Err(GenericError::Unsupported.into());
            }
            // The modem forgets everything, so does the context.
            ctx.reinit();
            Request::Reset(kind)
        }
        Sid::GetDeviceInfo => Request::DeviceInfo(req.read_struct::<DeviceInfo>()?.field),
        Sid::RegisterNet => Request::Operator(req.read_struct()?),
        Sid::SubscribeNetEvent | Sid::UnsubscribeNetEvent => {
            let UrcEventRequest { event } = req.read_struct()?;
            let on = sid == Sid::SubscribeNetEvent;
            ctx.sid.subscription_changed = ctx.persist.subscriptions.set(event, on);
            Request::UrcEvent(event)
        }
        Sid::RegisterPdnEvent | Sid::DeregisterPdnEvent => {
            let on = sid == Sid::RegisterPdnEvent;
            let subs = &mut ctx.persist.subscriptions;
            ctx.sid.subscription_changed = subs.pdn_event != on;
            subs.pdn_event = on;
            Request::None
        }
        Sid::ActivatePdn => Request::Pdn(req.read_struct::<ActivatePdn>()?.conf),
        Sid::DeactivatePdn => Request::Pdn(req.read_struct::<DeactivatePdn>()?.conf),
        Sid::GetIpAddress => Request::Pdn(req.read_struct::<GetIpAddress>()?.conf),
        Sid::SetDefaultPdn => {
            let conf = req.read_struct::<SetDefaultPdn>()?.conf;
            if conf.index().is_none() {
                return Err(GenericError::Rejected.into());
            }
            ctx.persist.default_conf = conf;
            Request::Pdn(conf)
        }
        Sid::DefinePdn => {
            let def: PdnDefinition = req.read_struct()?;
            let conf = def.conf;
            let slot = conf
                .index()
                .and_then(|i| ctx.persist.pdn.get_mut(i))
                .ok_or(GenericError::Rejected)?;
            *slot = Some(def);
            Request::Pdn(conf)
        }
        Sid::DialCommand => {
            let connect: SocketConnect = req.read_struct()?;
            ctx.persist.reserve_socket(connect.socket)?;
            ctx.sid.qiopen_pending = true;
            Request::Connect(connect)
        }
        Sid::SendData => {
            let buf: &SocketDataBuffer = req.read_ref()?;
            if buf.data.is_empty() {
                return Err(GenericError::BuildRefused.into());
            }
            ctx.sid
                .tx
                .extend_from_slice(&buf.data)
                .map_err(|_| GenericError::BuildRefused)?;
            Request::Socket(buf.socket)
        }
        Sid::ReceiveData => {
            let SocketRxData { socket, len } = req.read_struct()?;
            Request::Receive {
                socket,
                max_len: len,
            }
        }
        Sid::SocketClose | Sid::SocketCnxStatus => {
            Request::Socket(req.read_struct::<SocketHandle>()?.socket)
        }
        Sid::DnsReq => Request::Dns(req.read_struct()?),
        Sid::PingIpAddress => {
            ctx.persist.ping_index = 0;
            Request::Ping(req.read_struct()?)
        }
        Sid::SubscribeModemEvent => {
            let ModemEventRequest { events } = req.read_struct()?;
            ctx.persist.modem_events = events;
            Request::ModemEvents(events)
        }
        Sid::CheckCnx
        | Sid::ModemConfig
        | Sid::PowerOn
        | Sid::PowerOff
        | Sid::GetNetStatus
        | Sid::GetAttachStatus
        | Sid::GetSignalQuality
        | Sid::AttachPsDomain
        | Sid::DetachPsDomain
        | Sid::DataSuspend
        | Sid::DataResume => Request::None,
    };
    ctx.sid.request = request;
    Ok(())
}

/// Pack the response of a successful SID into `rsp`.
pub fn respond(sid: Sid, ctx: &ModemContext, rsp: &mut PackBuf<'_>) -> Result<(), Error> {
    let scope = &ctx.sid;
    match sid {
        Sid::GetDeviceInfo => {
            let Request::DeviceInfo(field) = scope.request else {
                return Err(GenericError::Unclassified.into());
            };
            rsp.write_struct(&DeviceInfo {
                field,
                value: scope.device_info.clone(),
            })?;
        }
        Sid::RegisterNet | Sid::GetNetStatus => rsp.write_struct(&scope.registration)?,
        Sid::GetAttachStatus => rsp.write_struct(&AttachStatus {
            attached: scope.attached,
        })?,
        Sid::GetSignalQuality => rsp.write_struct(&scope.signal)?,
        Sid::ActivatePdn | Sid::GetIpAddress => {
            let conf = scope.conf().ok_or(GenericError::Unclassified)?;
            rsp.write_struct(&IpAddressInfo { conf, ip: scope.ip })?;
        }
        Sid::DialCommand => {
            let socket = scope.socket().ok_or(GenericError::Unclassified)?;
            rsp.write_struct(&SocketHandle { socket })?;
        }
        Sid::ReceiveData => {
            let socket = scope.socket().ok_or(GenericError::Unclassified)?;
            let buf: &mut SocketDataBuffer = rsp.read_mut()?;
            buf.socket = socket;
            buf.data = scope.rx.clone();
        }
        Sid::SocketCnxStatus => {
            let socket = scope.socket().ok_or(GenericError::Unclassified)?;
            let info = scope.cnx.unwrap_or(SocketCnxInfo {
                socket,
                ..Default::default()
            });
            rsp.write_struct(&info)?;
        }
        Sid::DnsReq => {
            let host_addr = scope.dns.addr.ok_or(GenericError::Rejected)?;
            rsp.write_struct(&DnsResponse { host_addr })?;
        }
        _ => rsp.clear(),
    }
    Ok(())
}

/// Bookkeeping once a SID is over, whatever its outcome.
pub fn conclude(sid: Sid, result: &Result<(), Error>, ctx: &mut ModemContext) {
    match sid {
        // A seen RDY is used up by the boot sequence.
        Sid::PowerOn | Sid::Reset => ctx.persist.modem_at_ready = false,
        Sid::DialCommand if result.is_err() => release(ctx),
        Sid::SocketClose => release(ctx),
        Sid::ReceiveData if result.is_ok() => {
            if let Some(handle) = ctx.sid.socket() {
                if let Some(s) = ctx.persist.socket_mut(handle) {
                    s.data_pending = false;
                }
            }
        }
        _ => {}
    }
}

fn release(ctx: &mut ModemContext) {
    if let Some(handle) = ctx.sid.socket() {
        ctx.persist.release_socket(handle);
    }
}
