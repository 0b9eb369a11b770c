//! Per-SID procedures.
//!
//! Every SID is an ordered list of named [`Step`]s. A step looks at the
//! context and plans either one command, a wait for an unsolicited line, or
//! no I/O at all. Steps only ever move forward, so replaying the same modem
//! answers visits the same steps.

use crate::command::{Answer, Command, CommandId};
use crate::config::Settings;
use crate::context::{Domain, ModemContext, Request};
use crate::error::GenericError;
use crate::module_timing::{
    BG96_QIDNSGIP_TIMEOUT, BG96_QIOPEN_TIMEOUT, BG96_RDY_TIMEOUT, BG96_SOCKET_PROMPT_TIMEOUT,
    ESCAPE_GUARD_TIME,
};
use crate::service::{DeviceInfoField, ModemInitMode, Sid, UrcEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Step {
    // Boot
    AwaitRdy,
    Sync,
    EchoOff,
    ReportErrors,
    Verbose,
    IgnoreDtr,
    FlowControl,
    BaudRate,
    DisablePsm,
    DisableEdrx,
    Band,
    IotOpMode,
    ScanSequence,
    ScanMode,
    PowerDown,

    // SIM and functionality
    ReadPin,
    EnterPin,
    Functionality,
    ReadPdpContexts,
    Identify,

    // Network
    SignalQuality,
    NetworkInfo,
    ServingCell,
    ReadAttach,
    SetAttach,
    ReadOperator,
    SelectOperator,
    ReadEps,
    ReadCs,
    ReadGprs,
    RegistrationReporting,
    PdnEventReporting,

    // Packet data
    ReadActive,
    Activate,
    ReadActiveAgain,
    Deactivate,
    ConfigureContext,
    QueryContext,

    // Sockets
    Open,
    AwaitOpen,
    CloseUnopened,
    OpenFailed,
    SendLength,
    AwaitPrompt,
    Payload,
    ReadSize,
    Read,
    Close,
    SocketState,

    // DNS and ping
    ConfigureDns,
    Resolve,
    AwaitResolve,
    Ping,

    // Data mode
    GuardTime,
    Escape,
    Online,
}

/// Steps of `sid`, in order.
pub fn steps(sid: Sid) -> &'static [Step] {
    use Step::*;
    const BOOT: &[Step] = &[
        AwaitRdy,
        Sync,
        EchoOff,
        ReportErrors,
        Verbose,
        IgnoreDtr,
        FlowControl,
        BaudRate,
        DisablePsm,
        DisableEdrx,
        Band,
        IotOpMode,
        ScanSequence,
        ScanMode,
    ];
    match sid {
        Sid::CheckCnx | Sid::ModemConfig => &[Sync],
        Sid::PowerOn | Sid::Reset => BOOT,
        Sid::PowerOff => &[PowerDown],
        Sid::InitModem => &[ReadPin, EnterPin, Functionality, ReadPdpContexts],
        Sid::GetDeviceInfo => &[Identify],
        Sid::GetSignalQuality => &[SignalQuality, NetworkInfo, ServingCell],
        Sid::GetAttachStatus => &[ReadAttach],
        Sid::AttachPsDomain | Sid::DetachPsDomain => &[SetAttach],
        Sid::RegisterNet => &[ReadOperator, SelectOperator, ReadEps, ReadCs, ReadGprs],
        Sid::GetNetStatus => &[ReadEps, ReadCs, ReadGprs, ReadOperator],
        Sid::SubscribeNetEvent | Sid::UnsubscribeNetEvent => &[RegistrationReporting],
        Sid::RegisterPdnEvent | Sid::DeregisterPdnEvent => &[PdnEventReporting],
        Sid::ActivatePdn => &[ReadActive, Activate, ReadActiveAgain],
        Sid::DeactivatePdn => &[Deactivate],
        Sid::DefinePdn => &[ConfigureContext, QueryContext],
        Sid::GetIpAddress => &[ReadActive],
        Sid::SetDefaultPdn | Sid::SubscribeModemEvent => &[],
        Sid::DialCommand => &[Open, AwaitOpen, CloseUnopened, OpenFailed],
        Sid::SendData => &[SendLength, AwaitPrompt, Payload],
        Sid::ReceiveData => &[ReadSize, Read],
        Sid::SocketClose => &[Close],
        Sid::SocketCnxStatus => &[SocketState],
        Sid::DnsReq => &[ConfigureDns, Resolve, AwaitResolve],
        Sid::PingIpAddress => &[Ping],
        Sid::DataSuspend => &[GuardTime, Escape],
        Sid::DataResume => &[Online],
    }
}

/// What a step asks of the transaction driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan<'a> {
    /// Send a command and wait for its final answer.
    Send {
        cmd: Command<'a>,
        answer: Answer,
        last: bool,
    },
    /// Send nothing and wait for `id` to arrive.
    Wait {
        id: CommandId,
        timeout_ms: u32,
        answer: Answer,
        last: bool,
    },
    /// Nothing to do here, more steps follow.
    Skip,
    /// The SID is complete.
    Finish,
    Fail(GenericError),
}

impl<'a> Plan<'a> {
    fn send(cmd: Command<'a>, last: bool) -> Self {
        Self::Send {
            cmd,
            answer: Answer::Required,
            last,
        }
    }

    fn wait(id: CommandId, timeout_ms: u32, answer: Answer, last: bool) -> Self {
        Self::Wait {
            id,
            timeout_ms,
            answer,
            last,
        }
    }
}

/// Plan `step` of `sid`. `last` is set for the final step of the SID.
pub fn plan<'a>(
    step: Step,
    sid: Sid,
    last: bool,
    ctx: &'a ModemContext,
    settings: &Settings,
) -> Plan<'a> {
    let persist = &ctx.persist;
    let scope = &ctx.sid;
    let send = |cmd: Command<'a>| Plan::send(cmd, last);

    let cid = || scope.conf().and_then(|conf| persist.cid_for(conf));
    let socket = || scope.socket().and_then(|handle| persist.modem_cid(handle));

    match step {
        Step::AwaitRdy if persist.modem_at_ready => Plan::Skip,
        Step::AwaitRdy => Plan::wait(CommandId::Rdy, BG96_RDY_TIMEOUT, Answer::Optional, last),
        Step::Sync => send(Command::At),
        Step::EchoOff => send(Command::EchoOff),
        Step::ReportErrors => send(Command::ReportErrors(settings.cmee_level)),
        Step::Verbose => send(Command::Verbose),
        Step::IgnoreDtr => send(Command::IgnoreDtr),
        Step::FlowControl => send(Command::FlowControl(settings.flow_control)),
        Step::BaudRate => send(Command::ReadBaudRate),
        Step::DisablePsm if settings.disable_psm => send(Command::SetPsm(false)),
        Step::DisableEdrx if settings.disable_psm => send(Command::SetEdrx(false)),
        Step::DisablePsm | Step::DisableEdrx => Plan::Skip,
        Step::Band => send(Command::QueryConfig("band")),
        Step::IotOpMode => send(Command::QueryConfig("iotopmode")),
        Step::ScanSequence => send(Command::QueryConfig("nwscanseq")),
        Step::ScanMode => send(Command::QueryConfig("nwscanmode")),
        Step::PowerDown => send(Command::PowerDown),

        Step::ReadPin if settings.check_sim_pin => send(Command::ReadPin),
        Step::ReadPin => Plan::Skip,
        Step::EnterPin if !settings.check_sim_pin || persist.sim_pin_ready => Plan::Skip,
        Step::EnterPin => match &scope.request {
            Request::ModemInit(init) if !init.pincode.is_empty() => {
                send(Command::EnterPin(&init.pincode))
            }
            _ => Plan::Fail(GenericError::Rejected),
        },
        Step::Functionality => match &scope.request {
            Request::ModemInit(init) => {
                let fun = match init.init {
                    ModemInitMode::Minimum => 0,
                    ModemInitMode::Full => 1,
                    ModemInitMode::SimOnly => 4,
                };
                send(Command::SetFunctionality {
                    fun,
                    rst: init.reset as u8,
                })
            }
            _ => Plan::Fail(GenericError::Rejected),
        },
        Step::ReadPdpContexts => send(Command::ReadPdpContexts),
        Step::Identify => match scope.request {
            Request::DeviceInfo(field) => match field {
                DeviceInfoField::Manufacturer => send(Command::Manufacturer),
                DeviceInfoField::Model => send(Command::Model),
                DeviceInfoField::Revision => send(Command::Revision),
                DeviceInfoField::SerialNumber => send(Command::SerialNumber(None)),
                DeviceInfoField::Imei => send(Command::Imei),
                DeviceInfoField::Imsi => send(Command::Imsi),
                DeviceInfoField::PhoneNumber => Plan::Fail(GenericError::Unsupported),
            },
            _ => Plan::Fail(GenericError::Rejected),
        },

        Step::SignalQuality => send(Command::SignalQuality),
        Step::NetworkInfo => Plan::Send {
            cmd: Command::NetworkInfo,
            answer: Answer::Optional,
            last,
        },
        Step::ServingCell => send(Command::ServingCell),
        Step::ReadAttach => send(Command::ReadAttach),
        Step::SetAttach => send(Command::SetAttach(sid == Sid::AttachPsDomain)),
        Step::ReadOperator => send(Command::ReadOperator),
        Step::SelectOperator => match &scope.request {
            Request::Operator(op) => send(Command::SelectOperator {
                mode: op.mode,
                format: op.format,
                name: &op.name,
            }),
            _ => Plan::Fail(GenericError::Rejected),
        },
        Step::ReadEps => send(Command::ReadRegistration(Domain::Eps)),
        Step::ReadCs => send(Command::ReadRegistration(Domain::Cs)),
        Step::ReadGprs => send(Command::ReadRegistration(Domain::Gprs)),
        Step::RegistrationReporting => {
            let Request::UrcEvent(event) = scope.request else {
                return Plan::Fail(GenericError::Rejected);
            };
            let domain = match event {
                UrcEvent::EpsNetworkRegStat | UrcEvent::EpsLocationInfo => Domain::Eps,
                UrcEvent::GprsNetworkRegStat | UrcEvent::GprsLocationInfo => Domain::Gprs,
                UrcEvent::CsNetworkRegStat | UrcEvent::CsLocationInfo => Domain::Cs,
                UrcEvent::SignalQuality if scope.subscription_changed => {
                    return send(Command::SignalIndication(
                        persist.subscriptions.signal_quality,
                    ))
                }
                UrcEvent::SignalQuality | UrcEvent::PingRsp | UrcEvent::None => {
                    return Plan::Finish
                }
            };
            // Level 2 carries the location, which is filtered per subscription.
            let level = if persist.subscriptions.wants_domain(domain) { 2 } else { 0 };
            send(Command::SetRegistrationReporting(domain, level))
        }
        Step::PdnEventReporting if scope.subscription_changed => {
            send(Command::SetPdnEventReporting(persist.subscriptions.pdn_event))
        }
        Step::PdnEventReporting => Plan::Finish,

        Step::ReadActive | Step::ReadActiveAgain => send(Command::ReadActiveContexts),
        Step::Activate if scope.pdn_active => Plan::Skip,
        Step::Activate => match cid() {
            Some(cid) => send(Command::ActivateContext(cid)),
            None => Plan::Fail(GenericError::Rejected),
        },
        Step::Deactivate => match cid() {
            Some(cid) => send(Command::DeactivateContext(cid)),
            None => Plan::Fail(GenericError::Rejected),
        },
        Step::ConfigureContext => {
            let def = scope
                .conf()
                .and_then(|conf| conf.index())
                .and_then(|i| persist.pdn.get(i))
                .and_then(|def| def.as_ref());
            match (def, cid()) {
                (Some(def), Some(cid)) => send(Command::ConfigureContext {
                    cid,
                    pdp_type: def.pdp_type,
                    apn: &def.apn,
                    username: &def.username,
                    password: &def.password,
                }),
                _ => Plan::Fail(GenericError::Rejected),
            }
        }
        Step::QueryContext => match cid() {
            Some(cid) => send(Command::QueryContext(cid)),
            None => Plan::Fail(GenericError::Rejected),
        },

        Step::Open => match (&scope.request, cid(), socket()) {
            (Request::Connect(c), Some(cid), Some(s)) => send(Command::OpenSocket {
                cid,
                socket: s,
                protocol: c.protocol,
                remote: c.remote,
                remote_port: c.remote_port,
                local_port: c.local_port,
            }),
            _ => Plan::Fail(GenericError::Rejected),
        },
        Step::AwaitOpen if scope.socket_connected => Plan::Finish,
        Step::AwaitOpen => {
            Plan::wait(CommandId::Qiopen, BG96_QIOPEN_TIMEOUT, Answer::Optional, last)
        }
        Step::CloseUnopened if scope.socket_connected => Plan::Finish,
        Step::CloseUnopened => match socket() {
            Some(s) => send(Command::CloseSocket(s)),
            None => Plan::Fail(GenericError::Rejected),
        },
        Step::OpenFailed if scope.socket_connected => Plan::Finish,
        Step::OpenFailed => Plan::Fail(GenericError::Rejected),
        Step::SendLength => match socket() {
            Some(s) => send(Command::SendLength {
                socket: s,
                len: scope.tx.len() as u16,
            }),
            None => Plan::Fail(GenericError::Rejected),
        },
        Step::AwaitPrompt if scope.prompt_received => Plan::Skip,
        Step::AwaitPrompt => Plan::wait(
            CommandId::Prompt,
            BG96_SOCKET_PROMPT_TIMEOUT,
            Answer::Required,
            last,
        ),
        Step::Payload => send(Command::SendPayload(&scope.tx)),
        Step::ReadSize => match socket() {
            Some(s) => send(Command::ReadLength(s)),
            None => Plan::Fail(GenericError::Rejected),
        },
        Step::Read if scope.rx_expected == 0 => Plan::Finish,
        Step::Read => match socket() {
            Some(s) => send(Command::Read {
                socket: s,
                len: scope.rx_expected,
            }),
            None => Plan::Fail(GenericError::Rejected),
        },
        Step::Close => match scope.socket() {
            Some(handle) => match persist.socket(handle) {
                Some(s) if s.connected || s.closed_by_remote => {
                    send(Command::CloseSocket(s.modem_cid))
                }
                _ => Plan::Finish,
            },
            None => Plan::Fail(GenericError::Rejected),
        },
        Step::SocketState => match socket() {
            Some(s) => send(Command::SocketState(s)),
            None => Plan::Fail(GenericError::Rejected),
        },

        Step::ConfigureDns => match (&scope.request, cid()) {
            (Request::Dns(req), Some(cid)) => match req.primary_dns {
                Some(primary) => send(Command::ConfigureDns { cid, primary }),
                None => Plan::Skip,
            },
            _ => Plan::Fail(GenericError::Rejected),
        },
        Step::Resolve => match (&scope.request, cid()) {
            (Request::Dns(req), Some(cid)) => send(Command::ResolveHost {
                cid,
                host: &req.host,
            }),
            _ => Plan::Fail(GenericError::Rejected),
        },
        Step::AwaitResolve if scope.dns.done && scope.dns.error != 0 => {
            Plan::Fail(GenericError::Rejected)
        }
        Step::AwaitResolve if scope.dns.done => Plan::Finish,
        Step::AwaitResolve => Plan::wait(
            CommandId::Qidnsgip,
            BG96_QIDNSGIP_TIMEOUT,
            Answer::Required,
            last,
        ),
        Step::Ping => match (&scope.request, cid()) {
            (Request::Ping(req), Some(cid)) => send(Command::Ping {
                cid,
                host: &req.host,
                timeout: req.timeout,
                count: req.count,
            }),
            _ => Plan::Fail(GenericError::Rejected),
        },

        Step::GuardTime => Plan::wait(CommandId::Tempo, ESCAPE_GUARD_TIME, Answer::Optional, last),
        Step::Escape => send(Command::Escape),
        Step::Online => send(Command::Online),
    }
}
