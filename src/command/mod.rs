//! AT command catalogue and response dispatcher.
//!
//! Every command the engine can send is a [`Command`] variant carrying its
//! own typed parameters. Names and timeouts come from two lookup tables: the
//! BG96 table is searched first and overrides entries of the shared 3GPP
//! table. Received lines are classified by [`dispatch`], which asks the BG96
//! analyzers first and falls through to the 3GPP ones.

pub mod bg96;
pub mod common;
pub mod error;

use core::fmt::Write as _;

use heapless::{String, Vec};
use no_std_net::IpAddr;

use crate::config::{CmeeLevel, FlowControl};
use crate::context::{Domain, ModemContext};
use crate::error::{Error, GenericError};
use crate::fmt::Bytes;
use crate::framer::{FrameRef, FramingMode};
use crate::module_timing::MODEM_DEFAULT_TIMEOUT;
use crate::service::{NetworkRegMode, OperatorNameFormat, PdpType, Protocol, Sid, Urc};
use crate::tokenizer::{Separators, Token, Tokenizer};

/// Longest text command line.
pub const COMMAND_MAX: usize = 160;
/// Longest outbound message, a raw socket payload.
pub const OUTGOING_MAX: usize = crate::service::SOCKET_DATA_MAX;
/// Parameters kept per received line, extra ones are dropped.
pub const PARAMS_MAX: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandId {
    /// No command in flight.
    None,

    // Result codes
    Ok,
    Connect,
    Ring,
    NoCarrier,
    Error,
    NoDialtone,
    Busy,
    NoAnswer,
    CmeError,
    CmsError,

    // V.25ter
    At,
    Ate,
    Atv,
    AtAndD,
    Ato,
    Escape,

    // 3GPP TS 27.007
    Cmee,
    Ifc,
    Ipr,
    Cpin,
    Cfun,
    Cgmi,
    Cgmm,
    Cgmr,
    Cgsn,
    Gsn,
    Cimi,
    Csq,
    Cgatt,
    Cops,
    Creg,
    Cgreg,
    Cereg,
    Cgerep,
    Cgev,
    Cgdcont,
    Cpsms,
    Cedrxs,

    // BG96
    Rdy,
    PoweredDown,
    Qpowd,
    Qcfg,
    Qindcfg,
    Qind,
    Qusim,
    Qnwinfo,
    Qeng,
    Qicsgp,
    Qiact,
    Qideact,
    Qiopen,
    Qiclose,
    Qisend,
    Prompt,
    SendData,
    SendOk,
    SendFail,
    Qird,
    Qistate,
    Qiurc,
    Qidnscfg,
    Qidnsgip,
    Qping,

    /// A timed pause, no command sent.
    Tempo,
}

impl CommandId {
    /// `ATD`, `ATO` and `AT+CGDATA` end on `CONNECT`, not on `OK`.
    pub fn ends_on_connect(self) -> bool {
        matches!(self, Self::Ato)
    }

    pub fn domain(self) -> Option<Domain> {
        match self {
            Self::Cereg => Some(Domain::Eps),
            Self::Cgreg => Some(Domain::Gprs),
            Self::Creg => Some(Domain::Cs),
            _ => None,
        }
    }
}

impl Domain {
    pub fn command(self) -> CommandId {
        match self {
            Self::Eps => CommandId::Cereg,
            Self::Gprs => CommandId::Cgreg,
            Self::Cs => CommandId::Creg,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AtType {
    /// Nothing is sent, the step only waits.
    NoCmd,
    Test,
    Read,
    Write,
    Execution,
    /// Bytes sent exactly as built.
    Raw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LutEntry {
    pub id: CommandId,
    /// Wire name, `+CREG` or a result code such as `NO CARRIER`.
    pub name: &'static str,
    pub timeout_ms: u32,
    /// The name can start a received line.
    pub received: bool,
}

impl LutEntry {
    /// Sent command whose name also prefixes its responses.
    pub const fn cmd(id: CommandId, name: &'static str, timeout_ms: u32) -> Self {
        Self {
            id,
            name,
            timeout_ms,
            received: true,
        }
    }

    /// Sent only.
    pub const fn send(id: CommandId, name: &'static str, timeout_ms: u32) -> Self {
        Self {
            id,
            name,
            timeout_ms,
            received: false,
        }
    }

    /// Received only.
    pub const fn rsp(id: CommandId, name: &'static str) -> Self {
        Self {
            id,
            name,
            timeout_ms: MODEM_DEFAULT_TIMEOUT,
            received: true,
        }
    }
}

fn entries() -> impl Iterator<Item = &'static LutEntry> {
    bg96::LUT.iter().chain(common::LUT.iter())
}

/// Table entry of `id`, BG96 first.
pub fn entry(id: CommandId) -> Option<&'static LutEntry> {
    entries().find(|e| e.id == id)
}

/// Command id of a received name.
pub fn lookup(name: &[u8]) -> Option<CommandId> {
    entries()
        .find(|e| e.received && e.name.as_bytes() == name)
        .map(|e| e.id)
}

pub fn timeout_ms(id: CommandId) -> u32 {
    entry(id).map(|e| e.timeout_ms).unwrap_or(MODEM_DEFAULT_TIMEOUT)
}

/// What a missing answer means for a planned step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Answer {
    /// A timeout fails the SID.
    Required,
    /// A timeout is an acceptable empty answer and the SID moves on.
    Optional,
}

impl Answer {
    pub fn on_timeout(self) -> Result<(), Error> {
        match self {
            Self::Required => Err(Error::Timeout),
            Self::Optional => Ok(()),
        }
    }
}

/// Command descriptor of the step in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentCommand {
    pub id: CommandId,
    pub at_type: AtType,
    pub answer: Answer,
    pub last: bool,
    pub timeout_ms: u32,
}

impl CurrentCommand {
    pub const IDLE: Self = Self {
        id: CommandId::None,
        at_type: AtType::NoCmd,
        answer: Answer::Required,
        last: false,
        timeout_ms: 0,
    };

    pub fn is(&self, id: CommandId) -> bool {
        self.id == id
    }

    pub fn is_read(&self, id: CommandId) -> bool {
        self.id == id && self.at_type == AtType::Read
    }

    /// The step waits for `id` without having sent anything.
    pub fn waiting_for(&self, id: CommandId) -> bool {
        self.id == id && self.at_type == AtType::NoCmd
    }
}

impl Default for CurrentCommand {
    fn default() -> Self {
        Self::IDLE
    }
}

/// A command with its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    At,
    EchoOff,
    Verbose,
    IgnoreDtr,
    Online,
    Escape,
    ReportErrors(CmeeLevel),
    FlowControl(FlowControl),
    ReadBaudRate,
    ReadPin,
    EnterPin(&'a str),
    SetFunctionality { fun: u8, rst: u8 },
    Manufacturer,
    Model,
    Revision,
    /// `AT+CGSN`, with `<snt>` in the write form.
    SerialNumber(Option<u8>),
    Imei,
    Imsi,
    SignalQuality,
    ReadAttach,
    SetAttach(bool),
    ReadOperator,
    SelectOperator {
        mode: NetworkRegMode,
        format: OperatorNameFormat,
        name: &'a str,
    },
    ReadRegistration(Domain),
    SetRegistrationReporting(Domain, u8),
    SetPdnEventReporting(bool),
    ReadPdpContexts,
    PowerDown,
    SetPsm(bool),
    SetEdrx(bool),
    QueryConfig(&'static str),
    SignalIndication(bool),
    NetworkInfo,
    ServingCell,
    ConfigureContext {
        cid: u8,
        pdp_type: PdpType,
        apn: &'a str,
        username: &'a str,
        password: &'a str,
    },
    QueryContext(u8),
    ReadActiveContexts,
    ActivateContext(u8),
    DeactivateContext(u8),
    OpenSocket {
        cid: u8,
        socket: u8,
        protocol: Protocol,
        remote: IpAddr,
        remote_port: u16,
        local_port: u16,
    },
    CloseSocket(u8),
    SendLength { socket: u8, len: u16 },
    SendPayload(&'a [u8]),
    ReadLength(u8),
    Read { socket: u8, len: u16 },
    SocketState(u8),
    ConfigureDns { cid: u8, primary: IpAddr },
    ResolveHost { cid: u8, host: &'a str },
    Ping {
        cid: u8,
        host: &'a str,
        timeout: u8,
        count: u8,
    },
}

impl Command<'_> {
    pub fn id(&self) -> CommandId {
        use CommandId as Id;
        match self {
            Self::At => Id::At,
            Self::EchoOff => Id::Ate,
            Self::Verbose => Id::Atv,
            Self::IgnoreDtr => Id::AtAndD,
            Self::Online => Id::Ato,
            Self::Escape => Id::Escape,
            Self::ReportErrors(_) => Id::Cmee,
            Self::FlowControl(_) => Id::Ifc,
            Self::ReadBaudRate => Id::Ipr,
            Self::ReadPin | Self::EnterPin(_) => Id::Cpin,
            Self::SetFunctionality { .. } => Id::Cfun,
            Self::Manufacturer => Id::Cgmi,
            Self::Model => Id::Cgmm,
            Self::Revision => Id::Cgmr,
            Self::SerialNumber(_) => Id::Cgsn,
            Self::Imei => Id::Gsn,
            Self::Imsi => Id::Cimi,
            Self::SignalQuality => Id::Csq,
            Self::ReadAttach | Self::SetAttach(_) => Id::Cgatt,
            Self::ReadOperator | Self::SelectOperator { .. } => Id::Cops,
            Self::ReadRegistration(d) | Self::SetRegistrationReporting(d, _) => d.command(),
            Self::SetPdnEventReporting(_) => Id::Cgerep,
            Self::ReadPdpContexts => Id::Cgdcont,
            Self::PowerDown => Id::Qpowd,
            Self::SetPsm(_) => Id::Cpsms,
            Self::SetEdrx(_) => Id::Cedrxs,
            Self::QueryConfig(_) => Id::Qcfg,
            Self::SignalIndication(_) => Id::Qindcfg,
            Self::NetworkInfo => Id::Qnwinfo,
            Self::ServingCell => Id::Qeng,
            Self::ConfigureContext { .. } | Self::QueryContext(_) => Id::Qicsgp,
            Self::ReadActiveContexts | Self::ActivateContext(_) => Id::Qiact,
            Self::DeactivateContext(_) => Id::Qideact,
            Self::OpenSocket { .. } => Id::Qiopen,
            Self::CloseSocket(_) => Id::Qiclose,
            Self::SendLength { .. } => Id::Qisend,
            Self::SendPayload(_) => Id::SendData,
            Self::ReadLength(_) | Self::Read { .. } => Id::Qird,
            Self::SocketState(_) => Id::Qistate,
            Self::ConfigureDns { .. } => Id::Qidnscfg,
            Self::ResolveHost { .. } => Id::Qidnsgip,
            Self::Ping { .. } => Id::Qping,
        }
    }

    pub fn at_type(&self) -> AtType {
        match self {
            Self::Escape | Self::SendPayload(_) => AtType::Raw,
            Self::ReadBaudRate
            | Self::ReadPin
            | Self::ReadAttach
            | Self::ReadOperator
            | Self::ReadRegistration(_)
            | Self::ReadPdpContexts
            | Self::ReadActiveContexts => AtType::Read,
            Self::At
            | Self::EchoOff
            | Self::Verbose
            | Self::IgnoreDtr
            | Self::Online
            | Self::Manufacturer
            | Self::Model
            | Self::Revision
            | Self::SerialNumber(None)
            | Self::Imei
            | Self::Imsi
            | Self::SignalQuality
            | Self::NetworkInfo => AtType::Execution,
            _ => AtType::Write,
        }
    }

    /// Receive framing to select before the command goes out.
    pub fn framing(&self) -> FramingMode {
        match self {
            Self::Read { .. } => FramingMode::CountedPayload,
            Self::SendLength { .. } => FramingMode::Prompt,
            _ => FramingMode::Line,
        }
    }

    /// Render the command into `out`.
    pub fn build(&self, out: &mut Vec<u8, OUTGOING_MAX>) -> Result<(), GenericError> {
        bg96::check(self)?;
        common::check(self)?;
        out.clear();

        match self {
            Self::Escape => {
                return out
                    .extend_from_slice(b"+++")
                    .map_err(|_| GenericError::BuildRefused)
            }
            Self::SendPayload(data) => {
                return out
                    .extend_from_slice(data)
                    .map_err(|_| GenericError::BuildRefused)
            }
            _ => {}
        }

        let entry = entry(self.id()).ok_or(GenericError::BuildRefused)?;
        let mut line: String<COMMAND_MAX> = String::new();
        self.render(&mut line, entry.name)
            .map_err(|_| GenericError::BuildRefused)?;
        out.extend_from_slice(line.as_bytes())
            .map_err(|_| GenericError::BuildRefused)
    }

    fn render(&self, s: &mut String<COMMAND_MAX>, name: &str) -> core::fmt::Result {
        write!(s, "AT{}", name)?;
        match self {
            Self::EchoOff | Self::IgnoreDtr => write!(s, "0")?,
            Self::Verbose => write!(s, "1")?,
            _ => match self.at_type() {
                AtType::Read => write!(s, "?")?,
                AtType::Test => write!(s, "=?")?,
                AtType::Write => {
                    write!(s, "=")?;
                    self.render_params(s)?;
                }
                _ => {}
            },
        }
        write!(s, "\r")
    }

    fn render_params(&self, s: &mut String<COMMAND_MAX>) -> core::fmt::Result {
        match *self {
            Self::ReportErrors(level) => write!(s, "{}", level as u8),
            Self::FlowControl(fc) => write!(s, "{0},{0}", fc as u8),
            Self::EnterPin(pin) => write!(s, "\"{}\"", pin),
            Self::SetFunctionality { fun, rst } => write!(s, "{},{}", fun, rst),
            Self::SerialNumber(Some(snt)) => write!(s, "{}", snt),
            Self::SetAttach(on) => write!(s, "{}", on as u8),
            Self::SelectOperator { mode, format, name } => match mode {
                NetworkRegMode::Manual | NetworkRegMode::ManualThenAuto => {
                    write!(s, "{},{},\"{}\"", mode as u8, format as u8, name)
                }
                _ => write!(s, "{}", mode as u8),
            },
            Self::SetRegistrationReporting(_, n) => write!(s, "{}", n),
            Self::SetPdnEventReporting(true) => write!(s, "1,0"),
            Self::SetPdnEventReporting(false) => write!(s, "0"),
            Self::PowerDown => write!(s, "1"),
            Self::SetPsm(on) | Self::SetEdrx(on) => write!(s, "{}", on as u8),
            Self::QueryConfig(param) => write!(s, "\"{}\"", param),
            Self::SignalIndication(on) => write!(s, "\"csq\",{},0", on as u8),
            Self::ServingCell => write!(s, "\"servingcell\""),
            Self::ConfigureContext {
                cid,
                pdp_type,
                apn,
                username,
                password,
            } => {
                let context_type = match pdp_type {
                    PdpType::Ipv6 | PdpType::Ipv4v6 => 2,
                    PdpType::Ip | PdpType::Ppp => 1,
                };
                write!(
                    s,
                    "{},{},\"{}\",\"{}\",\"{}\",0",
                    cid, context_type, apn, username, password
                )
            }
            Self::QueryContext(cid) | Self::ActivateContext(cid) | Self::DeactivateContext(cid) => {
                write!(s, "{}", cid)
            }
            Self::OpenSocket {
                cid,
                socket,
                protocol,
                remote,
                remote_port,
                local_port,
            } => {
                let service = match protocol {
                    Protocol::Tcp => "TCP",
                    Protocol::Udp => "UDP",
                };
                write!(
                    s,
                    "{},{},\"{}\",\"{}\",{},{},0",
                    cid, socket, service, remote, remote_port, local_port
                )
            }
            Self::CloseSocket(socket) => write!(s, "{}", socket),
            Self::SendLength { socket, len } => write!(s, "{},{}", socket, len),
            Self::ReadLength(socket) => write!(s, "{},0", socket),
            Self::Read { socket, len } => write!(s, "{},{}", socket, len),
            Self::SocketState(socket) => write!(s, "1,{}", socket),
            Self::ConfigureDns { cid, primary } => write!(s, "{},\"{}\"", cid, primary),
            Self::ResolveHost { cid, host } => write!(s, "{},\"{}\"", cid, host),
            Self::Ping {
                cid,
                host,
                timeout,
                count,
            } => write!(s, "{},\"{}\",{},{}", cid, host, timeout, count),
            _ => Ok(()),
        }
    }
}

/// Classification of a received message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Verdict {
    Intermediate,
    /// Final answer of the current command.
    FinalEnd,
    /// Final answer of a command that is not the SID's last one.
    FinalContinue,
    Error,
    Ignored,
    UrcIgnored,
    UrcForwarded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ModeTransition {
    None,
    ToData,
    ToCommand,
}

/// Result of one analyzer.
#[derive(Debug, Clone, Default)]
pub struct Analysis {
    /// Overrides the generic classification when set.
    pub verdict: Option<Verdict>,
    pub urcs: Vec<Urc, 2>,
}

impl Analysis {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn verdict(verdict: Verdict) -> Self {
        Self {
            verdict: Some(verdict),
            urcs: Vec::new(),
        }
    }

    pub fn urc(urc: Urc) -> Self {
        let mut a = Self::verdict(Verdict::UrcForwarded);
        a.push(urc);
        a
    }

    pub fn push(&mut self, urc: Urc) {
        if self.urcs.push(urc).is_err() {
            warn!("Too many URCs in one line, dropping one");
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Intermediate,
    FinalEnd,
    FinalContinue,
    Error,
    Ignored,
    UrcIgnored,
    UrcForwarded(Vec<Urc, 2>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub action: Action,
    pub mode: ModeTransition,
}

/// One received line, split into its name and parameters.
pub struct Line<'a> {
    pub raw: &'a [u8],
    pub id: CommandId,
    /// Parameters, rank 2 onwards.
    pub params: Vec<Token<'a>, PARAMS_MAX>,
}

impl<'a> Line<'a> {
    pub fn param(&self, index: usize) -> Option<&Token<'a>> {
        self.params.get(index)
    }

    pub fn parse<T: core::str::FromStr>(&self, index: usize) -> Option<T> {
        self.param(index)?.parse()
    }

    pub fn text(&self) -> Option<&'a str> {
        core::str::from_utf8(self.raw).ok()
    }
}

/// Everything an analyzer may look at besides the line itself.
pub struct Scope<'c> {
    pub sid: Option<Sid>,
    pub current: &'c CurrentCommand,
    pub ctx: &'c mut ModemContext,
}

impl Scope<'_> {
    pub fn in_sid(&self, sid: Sid) -> bool {
        self.sid == Some(sid)
    }
}

/// Classify one received message against the command in flight.
pub fn dispatch(
    frame: FrameRef<'_>,
    sid: Option<Sid>,
    current: &CurrentCommand,
    ctx: &mut ModemContext,
) -> Response {
    let mut scope = Scope { sid, current, ctx };
    let (id, analysis) = match frame {
        FrameRef::Prompt => (CommandId::Prompt, bg96::on_prompt(&mut scope)),
        FrameRef::Payload(data) => (CommandId::Qird, bg96::on_payload(data, &mut scope)),
        FrameRef::Line(raw) => match split(raw) {
            Some(line) => {
                let analysis = bg96::analyze(&line, &mut scope)
                    .unwrap_or_else(|| common::analyze(&line, &mut scope));
                (line.id, analysis)
            }
            None if is_echo(raw) => (CommandId::None, Analysis::verdict(Verdict::Ignored)),
            None => (CommandId::None, common::analyze_text(raw, &mut scope)),
        },
    };

    let verdict = analysis
        .verdict
        .unwrap_or_else(|| classify(id, current));
    let verdict = terminate(verdict, id, current);
    let mode = transition(id, verdict, sid);

    let action = match verdict {
        Verdict::Intermediate => Action::Intermediate,
        Verdict::FinalEnd => Action::FinalEnd,
        Verdict::FinalContinue => Action::FinalContinue,
        Verdict::Error => Action::Error,
        Verdict::Ignored => Action::Ignored,
        Verdict::UrcIgnored => Action::UrcIgnored,
        Verdict::UrcForwarded if analysis.urcs.is_empty() => Action::UrcIgnored,
        Verdict::UrcForwarded => Action::UrcForwarded(analysis.urcs),
    };

    trace!("{:?} -> {:?}", id, verdict);
    Response { action, mode }
}

/// Split a line into its command id and parameters, or `None` if its name
/// is not in the tables.
pub fn split(raw: &[u8]) -> Option<Line<'_>> {
    let mut tokens = Tokenizer::new(raw, Separators::DEFAULT);
    let name = tokens.next()?;
    let id = match lookup(name.bytes()) {
        Some(id) => id,
        None => {
            // `CONNECT 150`
            let mut words = Tokenizer::new(raw, Separators::WITH_SPACE);
            let id = lookup(words.next()?.bytes())?;
            if id != CommandId::Connect {
                return None;
            }
            tokens = words;
            id
        }
    };

    let mut params = Vec::new();
    for token in tokens {
        if params.push(token).is_err() {
            debug!("Parameters beyond {} dropped: {:?}", PARAMS_MAX, Bytes(raw));
            break;
        }
    }
    Some(Line { raw, id, params })
}

fn is_echo(raw: &[u8]) -> bool {
    raw.len() >= 2 && raw[..2].eq_ignore_ascii_case(b"AT")
}

/// Generic classification by command id.
fn classify(id: CommandId, current: &CurrentCommand) -> Verdict {
    use CommandId as Id;
    match id {
        Id::Ok | Id::Connect => Verdict::FinalEnd,
        // Incoming calls are not handled.
        Id::Ring => Verdict::UrcIgnored,
        Id::NoCarrier | Id::NoDialtone | Id::Busy | Id::NoAnswer => Verdict::Error,
        Id::Error | Id::CmeError | Id::CmsError => Verdict::Error,
        id if id == current.id && id != Id::None => Verdict::Intermediate,
        _ => Verdict::Ignored,
    }
}

/// Apply the properties of the command in flight to a final verdict.
fn terminate(verdict: Verdict, id: CommandId, current: &CurrentCommand) -> Verdict {
    match verdict {
        Verdict::FinalEnd if current.id.ends_on_connect() && id != CommandId::Connect => {
            Verdict::Intermediate
        }
        Verdict::FinalEnd if !current.last => Verdict::FinalContinue,
        v => v,
    }
}

fn transition(id: CommandId, verdict: Verdict, sid: Option<Sid>) -> ModeTransition {
    match (id, verdict) {
        (CommandId::Connect, Verdict::FinalEnd | Verdict::FinalContinue) => ModeTransition::ToData,
        (CommandId::Ok, Verdict::FinalEnd | Verdict::FinalContinue)
            if sid == Some(Sid::DataSuspend) =>
        {
            ModeTransition::ToCommand
        }
        (CommandId::NoCarrier, _) => ModeTransition::ToCommand,
        _ => ModeTransition::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use no_std_net::Ipv4Addr;

    fn built(cmd: Command<'_>) -> std::string::String {
        let mut out = Vec::new();
        cmd.build(&mut out).unwrap();
        std::string::String::from_utf8(out.to_vec()).unwrap()
    }

    fn current(id: CommandId, at_type: AtType, last: bool) -> CurrentCommand {
        CurrentCommand {
            id,
            at_type,
            answer: Answer::Required,
            last,
            timeout_ms: 1000,
        }
    }

    #[test]
    fn every_command_has_a_name() {
        for cmd in [
            Command::At,
            Command::EchoOff,
            Command::ReadPin,
            Command::Imei,
            Command::ReadRegistration(Domain::Gprs),
            Command::PowerDown,
            Command::NetworkInfo,
            Command::ReadActiveContexts,
            Command::SocketState(0),
            Command::ResolveHost { cid: 1, host: "a" },
        ] {
            assert!(entry(cmd.id()).is_some(), "{:?}", cmd);
        }
    }

    #[test]
    fn renders_the_command_line_shapes() {
        assert_eq!(built(Command::At), "AT\r");
        assert_eq!(built(Command::EchoOff), "ATE0\r");
        assert_eq!(built(Command::Verbose), "ATV1\r");
        assert_eq!(built(Command::IgnoreDtr), "AT&D0\r");
        assert_eq!(built(Command::ReadPin), "AT+CPIN?\r");
        assert_eq!(built(Command::ReportErrors(CmeeLevel::Verbose)), "AT+CMEE=2\r");
        assert_eq!(built(Command::FlowControl(FlowControl::RtsCts)), "AT+IFC=2,2\r");
        assert_eq!(built(Command::SetFunctionality { fun: 1, rst: 0 }), "AT+CFUN=1,0\r");
        assert_eq!(built(Command::ReadRegistration(Domain::Eps)), "AT+CEREG?\r");
        assert_eq!(built(Command::SetRegistrationReporting(Domain::Cs, 2)), "AT+CREG=2\r");
        assert_eq!(built(Command::SetPdnEventReporting(true)), "AT+CGEREP=1,0\r");
        assert_eq!(built(Command::SetPdnEventReporting(false)), "AT+CGEREP=0\r");
        assert_eq!(built(Command::QueryConfig("band")), "AT+QCFG=\"band\"\r");
        assert_eq!(built(Command::SignalIndication(true)), "AT+QINDCFG=\"csq\",1,0\r");
        assert_eq!(built(Command::ServingCell), "AT+QENG=\"servingcell\"\r");
        assert_eq!(built(Command::ReadActiveContexts), "AT+QIACT?\r");
        assert_eq!(built(Command::ActivateContext(1)), "AT+QIACT=1\r");
        assert_eq!(built(Command::ReadLength(2)), "AT+QIRD=2,0\r");
        assert_eq!(built(Command::SocketState(3)), "AT+QISTATE=1,3\r");
        assert_eq!(built(Command::Escape), "+++");
    }

    #[test]
    fn renders_operator_selection() {
        let auto = Command::SelectOperator {
            mode: NetworkRegMode::Auto,
            format: OperatorNameFormat::Numeric,
            name: "24001",
        };
        assert_eq!(built(auto), "AT+COPS=0\r");

        let manual = Command::SelectOperator {
            mode: NetworkRegMode::Manual,
            format: OperatorNameFormat::Numeric,
            name: "24001",
        };
        assert_eq!(built(manual), "AT+COPS=1,2,\"24001\"\r");
    }

    #[test]
    fn renders_socket_commands() {
        let open = Command::OpenSocket {
            cid: 1,
            socket: 0,
            protocol: Protocol::Tcp,
            remote: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 10)),
            remote_port: 8080,
            local_port: 0,
        };
        assert_eq!(built(open), "AT+QIOPEN=1,0,\"TCP\",\"192.168.1.10\",8080,0,0\r");
        assert_eq!(open.framing(), FramingMode::Line);

        let send = Command::SendLength { socket: 0, len: 5 };
        assert_eq!(built(send), "AT+QISEND=0,5\r");
        assert_eq!(send.framing(), FramingMode::Prompt);

        let read = Command::Read { socket: 0, len: 100 };
        assert_eq!(built(read), "AT+QIRD=0,100\r");
        assert_eq!(read.framing(), FramingMode::CountedPayload);

        assert_eq!(built(Command::SendPayload(b"a\r\nb")), "a\r\nb");
    }

    #[test]
    fn refused_builds() {
        let mut out = Vec::new();
        assert_eq!(
            Command::SerialNumber(Some(1)).build(&mut out),
            Err(GenericError::BuildRefused)
        );
        assert_eq!(
            Command::EnterPin("").build(&mut out),
            Err(GenericError::BuildRefused)
        );
        assert_eq!(built(Command::SerialNumber(None)), "AT+CGSN\r");
    }

    #[test]
    fn bg96_table_overrides_common_timeouts() {
        assert_eq!(timeout_ms(CommandId::Cops), crate::module_timing::BG96_COPS_TIMEOUT);
        assert_eq!(timeout_ms(CommandId::At), crate::module_timing::BG96_AT_TIMEOUT);
        assert_eq!(lookup(b"+CREG"), Some(CommandId::Creg));
        assert_eq!(lookup(b"NO CARRIER"), Some(CommandId::NoCarrier));
        assert_eq!(lookup(b"+QIACT"), Some(CommandId::Qiact));
        assert_eq!(lookup(b"E"), None);
    }

    #[test]
    fn splits_connect_with_rate() {
        let line = split(b"CONNECT 150").unwrap();
        assert_eq!(line.id, CommandId::Connect);
        assert_eq!(line.parse::<u32>(0), Some(150));

        let line = split(b"+QIACT: 1,1,1,\"10.0.0.5\"").unwrap();
        assert_eq!(line.id, CommandId::Qiact);
        assert_eq!(line.params.len(), 4);
        assert!(split(b"Quectel").is_none());
    }

    #[test]
    fn final_answer_of_intermediate_step_continues() {
        let mut ctx = ModemContext::new();
        let cur = current(CommandId::Cereg, AtType::Read, false);
        let rsp = dispatch(FrameRef::Line(b"OK"), Some(Sid::GetNetStatus), &cur, &mut ctx);
        assert_eq!(rsp.action, Action::FinalContinue);

        let cur = current(CommandId::Cops, AtType::Read, true);
        let rsp = dispatch(FrameRef::Line(b"OK"), Some(Sid::GetNetStatus), &cur, &mut ctx);
        assert_eq!(rsp.action, Action::FinalEnd);
        assert_eq!(rsp.mode, ModeTransition::None);
    }

    #[test]
    fn online_needs_connect() {
        let mut ctx = ModemContext::new();
        let cur = current(CommandId::Ato, AtType::Execution, true);
        let rsp = dispatch(FrameRef::Line(b"OK"), Some(Sid::DataResume), &cur, &mut ctx);
        assert_eq!(rsp.action, Action::Intermediate);

        let rsp = dispatch(FrameRef::Line(b"CONNECT"), Some(Sid::DataResume), &cur, &mut ctx);
        assert_eq!(rsp.action, Action::FinalEnd);
        assert_eq!(rsp.mode, ModeTransition::ToData);
    }

    #[test]
    fn echo_and_unknown_lines_are_ignored() {
        let mut ctx = ModemContext::new();
        let cur = current(CommandId::At, AtType::Execution, true);
        let rsp = dispatch(FrameRef::Line(b"AT"), None, &cur, &mut ctx);
        assert_eq!(rsp.action, Action::Ignored);
        let rsp = dispatch(FrameRef::Line(b"+XYZ: 1"), None, &cur, &mut ctx);
        assert_eq!(rsp.action, Action::Ignored);
    }

    #[test]
    fn result_codes_fail_the_command() {
        let mut ctx = ModemContext::new();
        let cur = current(CommandId::Cops, AtType::Write, false);
        for code in [&b"ERROR"[..], b"NO CARRIER", b"BUSY", b"+CMS ERROR: 500"] {
            let rsp = dispatch(FrameRef::Line(code), Some(Sid::RegisterNet), &cur, &mut ctx);
            assert_eq!(rsp.action, Action::Error, "{:?}", code);
        }
    }

    #[test]
    fn ring_does_not_end_the_command() {
        let mut ctx = ModemContext::new();
        let cur = current(CommandId::Cops, AtType::Write, false);
        let rsp = dispatch(FrameRef::Line(b"RING"), Some(Sid::RegisterNet), &cur, &mut ctx);
        assert_eq!(rsp.action, Action::UrcIgnored);
        let rsp = dispatch(FrameRef::Line(b"RING"), None, &CurrentCommand::IDLE, &mut ctx);
        assert_eq!(rsp.action, Action::UrcIgnored);
    }

    #[test]
    fn answer_kind_decides_timeout() {
        assert_eq!(Answer::Required.on_timeout(), Err(Error::Timeout));
        assert_eq!(Answer::Optional.on_timeout(), Ok(()));
    }
}
