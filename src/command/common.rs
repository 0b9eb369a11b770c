//! 3GPP TS 27.007 commands shared by every modem.

use heapless::String;

use super::error::ModemError;
use super::{Analysis, Command, CommandId as Id, Line, LutEntry, Scope, Verdict};
use crate::context::Domain;
use crate::error::GenericError;
use crate::module_timing::{AT_CMD_DEFAULT_TIMEOUT, MODEM_DEFAULT_TIMEOUT};
use crate::service::{
    AccessTechnology, ConfId, ErrorReport, Location, NetworkRegMode, OperatorNameFormat,
    PdnEvent, PdnEventUrc, RegState, Sid, SignalQuality, SimState, Urc,
};

pub const LUT: &[LutEntry] = &[
    LutEntry::rsp(Id::Ok, "OK"),
    LutEntry::rsp(Id::Connect, "CONNECT"),
    LutEntry::rsp(Id::Ring, "RING"),
    LutEntry::rsp(Id::NoCarrier, "NO CARRIER"),
    LutEntry::rsp(Id::Error, "ERROR"),
    LutEntry::rsp(Id::NoDialtone, "NO DIALTONE"),
    LutEntry::rsp(Id::Busy, "BUSY"),
    LutEntry::rsp(Id::NoAnswer, "NO ANSWER"),
    LutEntry::rsp(Id::CmeError, "+CME ERROR"),
    LutEntry::rsp(Id::CmsError, "+CMS ERROR"),
    LutEntry::send(Id::At, "", AT_CMD_DEFAULT_TIMEOUT),
    LutEntry::send(Id::Ate, "E", AT_CMD_DEFAULT_TIMEOUT),
    LutEntry::send(Id::Atv, "V", AT_CMD_DEFAULT_TIMEOUT),
    LutEntry::send(Id::AtAndD, "&D", AT_CMD_DEFAULT_TIMEOUT),
    LutEntry::send(Id::Ato, "O", MODEM_DEFAULT_TIMEOUT),
    LutEntry::send(Id::Escape, "+++", MODEM_DEFAULT_TIMEOUT),
    LutEntry::cmd(Id::Cmee, "+CMEE", MODEM_DEFAULT_TIMEOUT),
    LutEntry::cmd(Id::Ifc, "+IFC", MODEM_DEFAULT_TIMEOUT),
    LutEntry::cmd(Id::Ipr, "+IPR", MODEM_DEFAULT_TIMEOUT),
    LutEntry::cmd(Id::Cpin, "+CPIN", MODEM_DEFAULT_TIMEOUT),
    LutEntry::cmd(Id::Cfun, "+CFUN", MODEM_DEFAULT_TIMEOUT),
    LutEntry::cmd(Id::Cgmi, "+CGMI", MODEM_DEFAULT_TIMEOUT),
    LutEntry::cmd(Id::Cgmm, "+CGMM", MODEM_DEFAULT_TIMEOUT),
    LutEntry::cmd(Id::Cgmr, "+CGMR", MODEM_DEFAULT_TIMEOUT),
    LutEntry::cmd(Id::Cgsn, "+CGSN", MODEM_DEFAULT_TIMEOUT),
    LutEntry::cmd(Id::Gsn, "+GSN", MODEM_DEFAULT_TIMEOUT),
    LutEntry::cmd(Id::Cimi, "+CIMI", MODEM_DEFAULT_TIMEOUT),
    LutEntry::cmd(Id::Csq, "+CSQ", MODEM_DEFAULT_TIMEOUT),
    LutEntry::cmd(Id::Cgatt, "+CGATT", MODEM_DEFAULT_TIMEOUT),
    LutEntry::cmd(Id::Cops, "+COPS", MODEM_DEFAULT_TIMEOUT),
    LutEntry::cmd(Id::Creg, "+CREG", MODEM_DEFAULT_TIMEOUT),
    LutEntry::cmd(Id::Cgreg, "+CGREG", MODEM_DEFAULT_TIMEOUT),
    LutEntry::cmd(Id::Cereg, "+CEREG", MODEM_DEFAULT_TIMEOUT),
    LutEntry::cmd(Id::Cgerep, "+CGEREP", MODEM_DEFAULT_TIMEOUT),
    LutEntry::rsp(Id::Cgev, "+CGEV"),
    LutEntry::cmd(Id::Cgdcont, "+CGDCONT", MODEM_DEFAULT_TIMEOUT),
    LutEntry::cmd(Id::Cpsms, "+CPSMS", MODEM_DEFAULT_TIMEOUT),
    LutEntry::cmd(Id::Cedrxs, "+CEDRXS", MODEM_DEFAULT_TIMEOUT),
];

/// Parameter checks shared by all modems.
pub fn check(cmd: &Command<'_>) -> Result<(), GenericError> {
    let refused = match cmd {
        Command::EnterPin(pin) => pin.is_empty(),
        Command::SelectOperator {
            mode: NetworkRegMode::Manual | NetworkRegMode::ManualThenAuto,
            name,
            ..
        } => name.is_empty(),
        Command::ResolveHost { host, .. } | Command::Ping { host, .. } => host.is_empty(),
        _ => false,
    };
    if refused {
        warn!("Refusing to build {:?}", cmd.id());
        return Err(GenericError::BuildRefused);
    }
    Ok(())
}

pub fn analyze(line: &Line<'_>, scope: &mut Scope<'_>) -> Analysis {
    match line.id {
        Id::CmeError | Id::CmsError => error_report(line, scope),
        Id::Cpin => cpin(line, scope),
        Id::Cfun if !scope.current.is(Id::Cfun) => Analysis::verdict(Verdict::UrcIgnored),
        Id::Creg | Id::Cgreg | Id::Cereg => registration(line, scope),
        Id::Csq if scope.current.is(Id::Csq) => {
            scope.ctx.sid.signal = SignalQuality {
                rssi: line.parse(0).unwrap_or(99),
                ber: line.parse(1).unwrap_or(99),
            };
            Analysis::verdict(Verdict::Intermediate)
        }
        Id::Cgatt if scope.current.is_read(Id::Cgatt) => {
            scope.ctx.sid.attached = line.parse::<u8>(0) == Some(1);
            Analysis::verdict(Verdict::Intermediate)
        }
        Id::Cops if scope.current.is_read(Id::Cops) => cops(line, scope),
        Id::Cgev => cgev(line, scope),
        Id::Cgmi | Id::Cgmm | Id::Cgmr | Id::Cgsn | Id::Gsn | Id::Cimi
            if scope.current.is(line.id) =>
        {
            if let Some(text) = line.param(0).and_then(|t| t.text()) {
                device_text(text, scope);
            }
            Analysis::verdict(Verdict::Intermediate)
        }
        _ => Analysis::none(),
    }
}

/// Lines whose name is not in any table. Identification commands answer
/// with bare text.
pub fn analyze_text(raw: &[u8], scope: &mut Scope<'_>) -> Analysis {
    let text_command = matches!(
        scope.current.id,
        Id::Cgmi | Id::Cgmm | Id::Cgmr | Id::Cgsn | Id::Gsn | Id::Cimi
    );
    if !text_command || !scope.in_sid(Sid::GetDeviceInfo) {
        return Analysis::verdict(Verdict::Ignored);
    }
    if let Ok(text) = core::str::from_utf8(raw) {
        device_text(text, scope);
    }
    Analysis::verdict(Verdict::Intermediate)
}

fn device_text(text: &str, scope: &mut Scope<'_>) {
    // Only the first line is the value.
    if scope.ctx.cmd.lines == 0 {
        fill(&mut scope.ctx.sid.device_info, text.trim());
    }
    scope.ctx.cmd.lines = scope.ctx.cmd.lines.saturating_add(1);
}

/// Copy as much of `src` as fits.
pub(crate) fn fill<const N: usize>(dst: &mut String<N>, src: &str) {
    dst.clear();
    for c in src.chars() {
        if dst.push(c).is_err() {
            break;
        }
    }
}

fn error_report(line: &Line<'_>, scope: &mut Scope<'_>) -> Analysis {
    let err = line
        .text()
        .and_then(|t| t.parse::<ModemError>().ok())
        .unwrap_or(ModemError::Generic);
    warn!("Modem error: {:?}", err);

    // Anything not about the SIM is reported without detail.
    let report = match err.sim_state() {
        Some(state) => {
            scope.ctx.persist.sim_state = state;
            ErrorReport::sim(state)
        }
        None => ErrorReport::UNKNOWN,
    };
    scope.ctx.sid.report = Some(report);
    Analysis::none()
}

fn cpin(line: &Line<'_>, scope: &mut Scope<'_>) -> Analysis {
    let code = line.param(0).map(|t| t.unquoted()).unwrap_or(b"");
    let state = if code.eq_ignore_ascii_case(b"READY") {
        SimState::Ready
    } else if code.eq_ignore_ascii_case(b"SIM PIN") {
        SimState::PinRequired
    } else if code.eq_ignore_ascii_case(b"SIM PUK") {
        SimState::PukRequired
    } else if code.eq_ignore_ascii_case(b"SIM PIN2") {
        SimState::Pin2Required
    } else if code.eq_ignore_ascii_case(b"SIM PUK2") {
        SimState::Puk2Required
    } else {
        SimState::Unknown
    };

    let persist = &mut scope.ctx.persist;
    persist.sim_state = state;
    persist.sim_pin_ready = state == SimState::Ready;

    if !scope.current.is(Id::Cpin) {
        return Analysis::verdict(Verdict::UrcIgnored);
    }
    if state != SimState::Ready {
        scope.ctx.sid.report = Some(ErrorReport::sim(state));
    }
    Analysis::verdict(Verdict::Intermediate)
}

fn registration(line: &Line<'_>, scope: &mut Scope<'_>) -> Analysis {
    let Some(domain) = line.id.domain() else {
        return Analysis::none();
    };
    let read_form = is_read_form(line);
    if read_form && !scope.current.is_read(line.id) {
        debug!("Unexpected {:?} read answer", line.id);
    }
    let read = read_form && scope.current.is_read(line.id);

    // The read form starts with <n>, the URC form with <stat>.
    let mut params = line.params.iter().skip(read_form as usize);
    let state = params
        .next()
        .and_then(|t| t.parse::<u8>())
        .and_then(|v| RegState::try_from(v).ok())
        .unwrap_or(RegState::Unknown);
    let lac = params.next().and_then(|t| t.hex()).map(|v| v as u16);
    let ci = params.next().and_then(|t| t.hex());
    let act = params
        .next()
        .and_then(|t| t.parse::<u8>())
        .and_then(|v| AccessTechnology::try_from(v).ok());
    let location = Location { lac, ci };

    let reg = scope.ctx.persist.registration_mut(domain);
    reg.state = state;
    if lac.is_some() {
        reg.location = location;
    }

    if read {
        let status = &mut scope.ctx.sid.registration;
        match domain {
            Domain::Eps => status.eps = state,
            Domain::Gprs => status.gprs = state,
            Domain::Cs => status.cs = state,
        }
        if act.is_some() {
            status.act = act;
        }
        return Analysis::verdict(Verdict::Intermediate);
    }
    if read_form {
        return Analysis::verdict(Verdict::Ignored);
    }

    debug!("{:?} registration: {:?}", domain, state);
    let (reg_sub, loc_sub) = scope.ctx.persist.subscriptions.domain(domain);
    let mut analysis = Analysis::verdict(Verdict::UrcForwarded);
    if reg_sub {
        analysis.push(match domain {
            Domain::Eps => Urc::EpsRegistration(state),
            Domain::Gprs => Urc::GprsRegistration(state),
            Domain::Cs => Urc::CsRegistration(state),
        });
    }
    if loc_sub && lac.is_some() {
        analysis.push(match domain {
            Domain::Eps => Urc::EpsLocation(location),
            Domain::Gprs => Urc::GprsLocation(location),
            Domain::Cs => Urc::CsLocation(location),
        });
    }
    analysis
}

/// `<n>,<stat>[,<lac>,<ci>[,<AcT>...]]` against `<stat>[,<lac>,<ci>[,<AcT>]]`.
///
/// Two parameters are always the read form, one or three the URC form.
/// From four on the second one tells: `<stat>` is a bare number, `<lac>` is
/// quoted or empty.
fn is_read_form(line: &Line<'_>) -> bool {
    match line.params.len() {
        0 | 1 | 3 => false,
        2 => true,
        _ => line
            .param(1)
            .and_then(|t| t.bytes().first().copied())
            .map_or(false, |b| b.is_ascii_digit()),
    }
}

fn cops(line: &Line<'_>, scope: &mut Scope<'_>) -> Analysis {
    let status = &mut scope.ctx.sid.registration;
    if let Some(mode) = line
        .parse::<u8>(0)
        .and_then(|v| NetworkRegMode::try_from(v).ok())
    {
        status.mode = mode;
    }
    status.format = line
        .parse::<u8>(1)
        .and_then(|v| OperatorNameFormat::try_from(v).ok());
    match line.param(2).and_then(|t| t.text()) {
        Some(name) => fill(&mut status.operator, name),
        None => status.operator.clear(),
    }
    status.act = line
        .parse::<u8>(3)
        .and_then(|v| AccessTechnology::try_from(v).ok());
    Analysis::verdict(Verdict::Intermediate)
}

/// `+CGEV: NW DETACH`, `+CGEV: NW PDN DEACT <cid>`,
/// `+CGEV: NW DEACT <PDP_type>,<PDP_addr>,<cid>` and friends.
fn cgev(line: &Line<'_>, scope: &mut Scope<'_>) -> Analysis {
    let head = line.param(0).map(|t| t.unquoted()).unwrap_or(b"");
    let event = if head.starts_with(b"NW DETACH") || head.starts_with(b"ME DETACH") {
        PdnEvent::NwDetach
    } else if head.starts_with(b"NW PDN DEACT") || head.starts_with(b"ME PDN DEACT") {
        PdnEvent::NwPdnDeact
    } else if head.starts_with(b"NW DEACT") || head.starts_with(b"ME DEACT") {
        PdnEvent::NwDeact
    } else {
        PdnEvent::Other
    };

    // The cid, when present, is the last word of the line.
    let cid = line
        .params
        .last()
        .and_then(|t| t.unquoted().rsplit(|&b| b == b' ').next())
        .and_then(|w| core::str::from_utf8(w).ok())
        .and_then(|w| w.parse::<u8>().ok());

    let persist = &mut scope.ctx.persist;
    if event != PdnEvent::Other {
        if let Some(entry) = cid.and_then(|cid| persist.cid_mut(cid)) {
            entry.active = false;
            entry.ip = None;
        }
    }
    if !persist.subscriptions.pdn_event {
        return Analysis::verdict(Verdict::UrcIgnored);
    }
    let conf = cid.map(|cid| persist.conf_for(cid)).unwrap_or(ConfId::All);
    Analysis::urc(Urc::PdnEvent(PdnEventUrc { conf, event }))
}
