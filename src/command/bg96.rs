//! Quectel BG96 commands and the BG96 side of response analysis.
//!
//! Entries here shadow the shared table, so a timeout redefined below wins.

use no_std_net::IpAddr;

use super::{Analysis, Command, CommandId as Id, Line, LutEntry, Scope, Verdict};
use crate::context::Request;
use crate::error::GenericError;
use crate::module_timing::*;
use crate::service::{
    ModemEvent, PdnEvent, PdnEventUrc, PingResponse, Sid, SignalQuality, SocketCnxInfo, Urc,
    SOCKET_DATA_MAX,
};

pub const LUT: &[LutEntry] = &[
    LutEntry::send(Id::At, "", BG96_AT_TIMEOUT),
    LutEntry::send(Id::Escape, "+++", BG96_ESCAPE_TIMEOUT),
    LutEntry::cmd(Id::Cfun, "+CFUN", BG96_DEFAULT_TIMEOUT),
    LutEntry::cmd(Id::Cops, "+COPS", BG96_COPS_TIMEOUT),
    LutEntry::cmd(Id::Cgatt, "+CGATT", BG96_CGATT_TIMEOUT),
    // Boot and shutdown banners; RDY also bounds the wait after power on.
    LutEntry::cmd(Id::Rdy, "RDY", BG96_RDY_TIMEOUT),
    LutEntry::rsp(Id::PoweredDown, "POWERED DOWN"),
    LutEntry::cmd(Id::Qpowd, "+QPOWD", BG96_DEFAULT_TIMEOUT),
    LutEntry::cmd(Id::Qcfg, "+QCFG", MODEM_DEFAULT_TIMEOUT),
    LutEntry::cmd(Id::Qindcfg, "+QINDCFG", MODEM_DEFAULT_TIMEOUT),
    LutEntry::rsp(Id::Qind, "+QIND"),
    LutEntry::rsp(Id::Qusim, "+QUSIM"),
    LutEntry::cmd(Id::Qnwinfo, "+QNWINFO", BG96_QNWINFO_TIMEOUT),
    LutEntry::cmd(Id::Qeng, "+QENG", MODEM_DEFAULT_TIMEOUT),
    LutEntry::cmd(Id::Qicsgp, "+QICSGP", MODEM_DEFAULT_TIMEOUT),
    LutEntry::cmd(Id::Qiact, "+QIACT", BG96_QIACT_TIMEOUT),
    LutEntry::cmd(Id::Qideact, "+QIDEACT", BG96_QIDEACT_TIMEOUT),
    LutEntry::cmd(Id::Qiopen, "+QIOPEN", BG96_QIOPEN_TIMEOUT),
    LutEntry::cmd(Id::Qiclose, "+QICLOSE", BG96_QICLOSE_TIMEOUT),
    LutEntry::cmd(Id::Qisend, "+QISEND", BG96_SOCKET_PROMPT_TIMEOUT),
    LutEntry::send(Id::Prompt, ">", BG96_SOCKET_PROMPT_TIMEOUT),
    LutEntry::send(Id::SendData, "", BG96_DEFAULT_TIMEOUT),
    LutEntry::rsp(Id::SendOk, "SEND OK"),
    LutEntry::rsp(Id::SendFail, "SEND FAIL"),
    LutEntry::cmd(Id::Qird, "+QIRD", MODEM_DEFAULT_TIMEOUT),
    LutEntry::cmd(Id::Qistate, "+QISTATE", MODEM_DEFAULT_TIMEOUT),
    LutEntry::rsp(Id::Qiurc, "+QIURC"),
    LutEntry::cmd(Id::Qidnscfg, "+QIDNSCFG", MODEM_DEFAULT_TIMEOUT),
    LutEntry::cmd(Id::Qidnsgip, "+QIDNSGIP", BG96_QIDNSGIP_TIMEOUT),
    LutEntry::cmd(Id::Qping, "+QPING", BG96_QPING_TIMEOUT),
];

/// BG96 parameter restrictions.
pub fn check(cmd: &Command<'_>) -> Result<(), GenericError> {
    let refused = match cmd {
        // No `<snt>` selection on this modem.
        Command::SerialNumber(Some(_)) => true,
        Command::SendPayload(data) => data.len() > SOCKET_DATA_MAX,
        Command::SendLength { len, .. } => *len as usize > SOCKET_DATA_MAX,
        Command::Ping { timeout, count, .. } => *timeout == 0 || !(1..=10).contains(count),
        Command::OpenSocket { socket, .. } | Command::CloseSocket(socket) => {
            *socket >= crate::context::MODEM_CID_MAX
        }
        _ => false,
    };
    if refused {
        warn!("BG96 refuses {:?}", cmd.id());
        return Err(GenericError::BuildRefused);
    }
    Ok(())
}

/// BG96 analysis of a line, `None` to defer to the shared analyzers.
pub fn analyze(line: &Line<'_>, scope: &mut Scope<'_>) -> Option<Analysis> {
    let analysis = match line.id {
        Id::Error => return tolerated_error(scope),
        Id::Rdy => rdy(scope),
        Id::PoweredDown => {
            scope.ctx.persist.modem_at_ready = false;
            modem_event(scope, ModemEvent::PowerDown)
        }
        Id::SendOk if scope.in_sid(Sid::SendData) => Analysis::verdict(Verdict::FinalEnd),
        Id::SendOk | Id::SendFail => Analysis::verdict(Verdict::Error),
        Id::Qiurc => qiurc(line, scope),
        Id::Qiopen => qiopen(line, scope),
        Id::Qind => qind(line, scope),
        Id::Qping => qping(line, scope),
        Id::Qiact => qiact(line, scope),
        Id::Qistate => qistate(line, scope),
        Id::Qird => qird(line, scope),
        Id::Qcfg | Id::Cpsms | Id::Cedrxs | Id::Qnwinfo | Id::Qeng | Id::Qicsgp | Id::Cgdcont => {
            Analysis::verdict(Verdict::Intermediate)
        }
        Id::Qusim => Analysis::verdict(Verdict::UrcIgnored),
        _ => return None,
    };
    Some(analysis)
}

/// `>` after `AT+QISEND`.
pub fn on_prompt(scope: &mut Scope<'_>) -> Analysis {
    if !scope.in_sid(Sid::SendData) {
        return Analysis::verdict(Verdict::Ignored);
    }
    scope.ctx.sid.prompt_received = true;
    if scope.current.waiting_for(Id::Prompt) || scope.current.is(Id::Qisend) {
        Analysis::verdict(Verdict::FinalEnd)
    } else {
        Analysis::verdict(Verdict::Intermediate)
    }
}

/// Counted payload following `+QIRD: <len>`.
pub fn on_payload(data: &[u8], scope: &mut Scope<'_>) -> Analysis {
    if !scope.current.is(Id::Qird) || !scope.in_sid(Sid::ReceiveData) {
        return Analysis::verdict(Verdict::Ignored);
    }
    let sid = &mut scope.ctx.sid;
    let room = (sid.rx_expected as usize).saturating_sub(sid.rx.len());
    let take = data.len().min(room).min(sid.rx.capacity() - sid.rx.len());
    if take < data.len() {
        warn!("Dropping {} unexpected payload bytes", data.len() - take);
    }
    if sid.rx.extend_from_slice(&data[..take]).is_err() {
        return Analysis::verdict(Verdict::Error);
    }
    Analysis::verdict(Verdict::Intermediate)
}

fn tolerated_error(scope: &mut Scope<'_>) -> Option<Analysis> {
    let id = scope.current.id;
    let tolerated = matches!(
        id,
        Id::Creg | Id::Cgreg | Id::Cereg | Id::Cpsms | Id::Cedrxs | Id::Qnwinfo | Id::Qeng
    ) || (id == Id::Cgdcont && scope.in_sid(Sid::InitModem));
    if tolerated {
        debug!("ERROR to {:?} tolerated", id);
        return Some(Analysis::verdict(Verdict::FinalEnd));
    }

    if scope.in_sid(Sid::DialCommand) {
        if let Some(handle) = scope.ctx.sid.socket() {
            scope.ctx.persist.release_socket(handle);
        }
    }
    None
}

fn rdy(scope: &mut Scope<'_>) -> Analysis {
    scope.ctx.persist.modem_at_ready = true;
    if scope.current.waiting_for(Id::Rdy) {
        return Analysis::verdict(Verdict::FinalEnd);
    }
    modem_event(scope, ModemEvent::Boot)
}

fn modem_event(scope: &mut Scope<'_>, event: ModemEvent) -> Analysis {
    if scope.ctx.persist.modem_events.contains(event) {
        Analysis::urc(Urc::ModemEvent(event))
    } else {
        Analysis::verdict(Verdict::UrcIgnored)
    }
}

fn qiurc(line: &Line<'_>, scope: &mut Scope<'_>) -> Analysis {
    let Some(kind) = line.param(0) else {
        return Analysis::verdict(Verdict::UrcIgnored);
    };
    let persist = &mut scope.ctx.persist;

    let socket = match line.parse::<u8>(1) {
        Some(cid) if kind.eq_ignore_case("recv") || kind.eq_ignore_case("closed") => {
            persist.socket_by_cid(cid)
        }
        _ => None,
    };

    if kind.eq_ignore_case("recv") {
        match socket {
            Some(s) => {
                s.data_pending = true;
                Analysis::urc(Urc::SocketDataPending(s.handle))
            }
            None => Analysis::verdict(Verdict::UrcIgnored),
        }
    } else if kind.eq_ignore_case("closed") {
        match socket {
            // Still connected as far as the modem goes, until `+QICLOSE`.
            Some(s) => {
                s.closed_by_remote = true;
                Analysis::urc(Urc::SocketClosed(s.handle))
            }
            None => Analysis::verdict(Verdict::UrcIgnored),
        }
    } else if kind.eq_ignore_case("pdpdeact") {
        let cid = line.parse::<u8>(1).unwrap_or(0);
        if let Some(entry) = persist.cid_mut(cid) {
            entry.active = false;
            entry.ip = None;
        }
        if !persist.subscriptions.pdn_event {
            return Analysis::verdict(Verdict::UrcIgnored);
        }
        Analysis::urc(Urc::PdnEvent(PdnEventUrc {
            conf: persist.conf_for(cid),
            event: PdnEvent::NwPdnDeact,
        }))
    } else if kind.eq_ignore_case("dnsgip") {
        dnsgip(line, scope)
    } else {
        // "incoming", "incoming full"
        Analysis::verdict(Verdict::UrcIgnored)
    }
}

/// `+QIURC: "dnsgip",<err>,<IP_count>,<DNS_ttl>` then one
/// `+QIURC: "dnsgip","<addr>"` per address.
fn dnsgip(line: &Line<'_>, scope: &mut Scope<'_>) -> Analysis {
    if !scope.in_sid(Sid::DnsReq) {
        return Analysis::verdict(Verdict::Ignored);
    }
    let waiting = scope.current.waiting_for(Id::Qidnsgip);
    let dns = &mut scope.ctx.sid.dns;
    let header = line
        .param(1)
        .map_or(false, |t| !t.bytes().starts_with(b"\""));

    if header {
        let err = line.parse::<u16>(1).unwrap_or(u16::MAX);
        let count = line.parse::<u8>(2).unwrap_or(0);
        dns.started = true;
        dns.remaining = count;
        if err != 0 || count == 0 {
            warn!("DNS resolution failed: {}", err);
            dns.done = true;
            dns.error = if err != 0 { err } else { u16::MAX };
            return Analysis::verdict(if waiting { Verdict::Error } else { Verdict::Intermediate });
        }
        return Analysis::verdict(Verdict::Intermediate);
    }

    if dns.addr.is_none() {
        dns.addr = line
            .param(1)
            .and_then(|t| t.text())
            .and_then(|t| t.parse::<IpAddr>().ok());
    }
    dns.remaining = dns.remaining.saturating_sub(1);
    if dns.remaining == 0 {
        dns.done = true;
        if waiting {
            return Analysis::verdict(Verdict::FinalEnd);
        }
    }
    Analysis::verdict(Verdict::Intermediate)
}

/// `+QIOPEN: <connectID>,<err>`
fn qiopen(line: &Line<'_>, scope: &mut Scope<'_>) -> Analysis {
    let sid = &mut scope.ctx.sid;
    if !sid.qiopen_pending {
        return Analysis::verdict(Verdict::Ignored);
    }
    let persist = &mut scope.ctx.persist;
    let modem_cid = line.parse::<u8>(0);
    let err = line.parse::<u16>(1).unwrap_or(u16::MAX);
    let expected = sid.socket().and_then(|handle| persist.modem_cid(handle));
    if modem_cid.is_none() || modem_cid != expected || err != 0 {
        warn!("Socket open failed: {:?} {}", modem_cid, err);
        return Analysis::verdict(Verdict::Error);
    }

    sid.qiopen_pending = false;
    sid.socket_connected = true;
    if let Request::Connect(c) = &sid.request {
        if let Some(slot) = persist.socket_mut(c.socket) {
            slot.connected = true;
            slot.remote = Some(c.remote);
            slot.remote_port = c.remote_port;
            slot.local_port = c.local_port;
        }
    }
    if scope.current.waiting_for(Id::Qiopen) {
        Analysis::verdict(Verdict::FinalEnd)
    } else {
        Analysis::verdict(Verdict::Intermediate)
    }
}

fn qind(line: &Line<'_>, scope: &mut Scope<'_>) -> Analysis {
    let Some(kind) = line.param(0) else {
        return Analysis::verdict(Verdict::UrcIgnored);
    };
    let persist = &scope.ctx.persist;

    if kind.eq_ignore_case("csq") {
        if !persist.subscriptions.signal_quality {
            return Analysis::verdict(Verdict::UrcIgnored);
        }
        return Analysis::urc(Urc::SignalQuality(SignalQuality {
            rssi: line.parse(1).unwrap_or(99),
            ber: line.parse(2).unwrap_or(99),
        }));
    }
    if kind.eq_ignore_case("FOTA") {
        let stage = line.param(1);
        let event = if stage.map_or(false, |t| t.eq_ignore_case("HTTPSTART")) {
            ModemEvent::FotaStart
        } else if stage.map_or(false, |t| t.eq_ignore_case("HTTPEND")) {
            ModemEvent::FotaEnd
        } else {
            return Analysis::verdict(Verdict::UrcIgnored);
        };
        return modem_event(scope, event);
    }
    Analysis::verdict(Verdict::UrcIgnored)
}

/// `+QPING: <result>[,"<addr>",<bytes>,<time>,<ttl>]` per reply, then
/// `+QPING: <finresult>[,<sent>,<rcvd>,<lost>,<min>,<max>,<avg>]`.
fn qping(line: &Line<'_>, scope: &mut Scope<'_>) -> Analysis {
    let persist = &mut scope.ctx.persist;
    if !persist.subscriptions.ping {
        return Analysis::verdict(Verdict::UrcIgnored);
    }

    let mut rsp = PingResponse {
        index: persist.ping_index,
        ok: line.parse::<u16>(0) == Some(0),
        ..Default::default()
    };
    persist.ping_index = persist.ping_index.wrapping_add(1);

    match line.param(1) {
        Some(addr) if addr.bytes().starts_with(b"\"") => {
            rsp.addr = addr.text().and_then(|t| t.parse().ok());
            rsp.bytes = line.parse(2).unwrap_or(0);
            rsp.time = line.parse(3).unwrap_or(0);
            rsp.ttl = line.parse(4).unwrap_or(0);
        }
        _ => {
            rsp.is_final = true;
            rsp.sent = line.parse(1).unwrap_or(0);
            rsp.received = line.parse(2).unwrap_or(0);
            rsp.lost = line.parse(3).unwrap_or(0);
            rsp.min_time = line.parse(4).unwrap_or(0);
            rsp.max_time = line.parse(5).unwrap_or(0);
            rsp.avg_time = line.parse(6).unwrap_or(0);
        }
    }
    Analysis::urc(Urc::PingResponse(rsp))
}

/// `+QIACT: <contextID>,<state>,<type>[,"<addr>"]`
fn qiact(line: &Line<'_>, scope: &mut Scope<'_>) -> Analysis {
    let Some(cid) = line.parse::<u8>(0) else {
        return Analysis::verdict(Verdict::Ignored);
    };
    let active = line.parse::<u8>(1) == Some(1);
    let ip = line
        .param(3)
        .and_then(|t| t.text())
        .and_then(|t| t.parse::<IpAddr>().ok());

    let persist = &mut scope.ctx.persist;
    if let Some(entry) = persist.cid_mut(cid) {
        entry.active = active;
        entry.ip = ip;
    }

    let sid = &mut scope.ctx.sid;
    let mine = sid.conf().and_then(|c| persist.cid_for(c)) == Some(cid);
    if mine {
        if active && scope.sid == Some(Sid::ActivatePdn) {
            sid.pdn_active = true;
        }
        if scope.sid == Some(Sid::GetIpAddress) || scope.sid == Some(Sid::ActivatePdn) {
            sid.ip = ip;
        }
    }
    if scope.current.is(Id::Qiact) {
        Analysis::verdict(Verdict::Intermediate)
    } else {
        Analysis::verdict(Verdict::UrcIgnored)
    }
}

/// `+QISTATE: <connectID>,"<service>","<ip>",<remote_port>,<local_port>,
/// <state>,<contextID>,...`
fn qistate(line: &Line<'_>, scope: &mut Scope<'_>) -> Analysis {
    let Some(handle) = scope.ctx.sid.socket() else {
        return Analysis::verdict(Verdict::Intermediate);
    };
    let modem_cid = line.parse::<u8>(0);
    if modem_cid.is_none() || modem_cid != scope.ctx.persist.modem_cid(handle) {
        return Analysis::verdict(Verdict::Intermediate);
    }
    let local_ip = line
        .parse::<u8>(6)
        .and_then(|cid| scope.ctx.persist.cid_mut(cid))
        .and_then(|entry| entry.ip);
    scope.ctx.sid.cnx = Some(SocketCnxInfo {
        socket: handle,
        local_ip,
        local_port: line.parse(4).unwrap_or(0),
        remote_ip: line.param(2).and_then(|t| t.parse()),
        remote_port: line.parse(3).unwrap_or(0),
    });
    Analysis::verdict(Verdict::Intermediate)
}

/// `+QIRD: <total>,<read>,<unread>` answers the size query,
/// `+QIRD: <len>` heads a payload.
fn qird(line: &Line<'_>, scope: &mut Scope<'_>) -> Analysis {
    let sid = &mut scope.ctx.sid;
    if line.params.len() >= 3 {
        let unread = line.parse::<u16>(2).unwrap_or(0);
        if let Request::Receive { max_len, .. } = sid.request {
            sid.rx_expected = unread.min(max_len).min(SOCKET_DATA_MAX as u16);
        }
    } else {
        scope.ctx.cmd.rx_announced = line.parse(0);
    }
    Analysis::verdict(Verdict::Intermediate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{dispatch, Action, Answer, AtType, CurrentCommand};
    use crate::context::ModemContext;
    use crate::framer::FrameRef;
    use crate::service::{ConfId, ModemEvents, Protocol, SocketConnect};
    use no_std_net::Ipv4Addr;

    fn step(id: Id, at_type: AtType, last: bool) -> CurrentCommand {
        CurrentCommand {
            id,
            at_type,
            answer: Answer::Required,
            last,
            timeout_ms: 1000,
        }
    }

    fn feed(ctx: &mut ModemContext, sid: Option<Sid>, cur: &CurrentCommand, line: &[u8]) -> Action {
        dispatch(FrameRef::Line(line), sid, cur, ctx).action
    }

    #[test]
    fn qiact_marks_the_requested_context() {
        let mut ctx = ModemContext::new();
        ctx.sid.request = Request::Pdn(ConfId::Predef);
        let cur = step(Id::Qiact, AtType::Read, false);

        let action = feed(
            &mut ctx,
            Some(Sid::ActivatePdn),
            &cur,
            b"+QIACT: 1,1,1,\"10.150.3.27\"",
        );
        assert_eq!(action, Action::Intermediate);
        assert!(ctx.sid.pdn_active);
        assert_eq!(ctx.sid.ip, Some(IpAddr::V4(Ipv4Addr::new(10, 150, 3, 27))));
        assert!(ctx.persist.cids[0].active);

        // Another context does not count.
        ctx.sid.pdn_active = false;
        feed(&mut ctx, Some(Sid::ActivatePdn), &cur, b"+QIACT: 2,1,1,\"10.0.0.2\"");
        assert!(!ctx.sid.pdn_active);
        assert!(ctx.persist.cids[1].active);
    }

    #[test]
    fn socket_urcs() {
        let mut ctx = ModemContext::new();
        ctx.persist.reserve_socket(20).unwrap();
        assert_eq!(ctx.persist.reserve_socket(9), Ok(1));
        ctx.persist.socket_mut(9).unwrap().connected = true;

        // Reported by connectID, forwarded by handle.
        let action = feed(&mut ctx, None, &CurrentCommand::IDLE, b"+QIURC: \"recv\",1");
        assert_eq!(
            action,
            Action::UrcForwarded([Urc::SocketDataPending(9)].into_iter().collect())
        );
        assert!(ctx.persist.socket(9).unwrap().data_pending);

        let action = feed(&mut ctx, None, &CurrentCommand::IDLE, b"+QIURC: \"closed\",1");
        assert_eq!(
            action,
            Action::UrcForwarded([Urc::SocketClosed(9)].into_iter().collect())
        );
        let socket = ctx.persist.socket(9).unwrap();
        assert!(socket.closed_by_remote);
        assert!(socket.connected);

        // No handle behind connectID 5.
        let action = feed(&mut ctx, None, &CurrentCommand::IDLE, b"+QIURC: \"recv\",5");
        assert_eq!(action, Action::UrcIgnored);

        let action = feed(&mut ctx, None, &CurrentCommand::IDLE, b"+QIURC: \"incoming\",2,0");
        assert_eq!(action, Action::UrcIgnored);
    }

    #[test]
    fn dnsgip_sequence() {
        let mut ctx = ModemContext::new();
        let sid = Some(Sid::DnsReq);
        let wait = step(Id::Qidnsgip, AtType::NoCmd, true);

        // Outside a DNS request the URC means nothing.
        let action = feed(&mut ctx, None, &CurrentCommand::IDLE, b"+QIURC: \"dnsgip\",0,1,600");
        assert_eq!(action, Action::Ignored);

        assert_eq!(
            feed(&mut ctx, sid, &wait, b"+QIURC: \"dnsgip\",0,2,600"),
            Action::Intermediate
        );
        assert_eq!(
            feed(&mut ctx, sid, &wait, b"+QIURC: \"dnsgip\",\"93.184.216.34\""),
            Action::Intermediate
        );
        assert_eq!(
            feed(&mut ctx, sid, &wait, b"+QIURC: \"dnsgip\",\"93.184.216.35\""),
            Action::FinalEnd
        );
        assert!(ctx.sid.dns.done);
        assert_eq!(
            ctx.sid.dns.addr,
            Some(IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34)))
        );
    }

    #[test]
    fn dnsgip_failure_while_waiting() {
        let mut ctx = ModemContext::new();
        let wait = step(Id::Qidnsgip, AtType::NoCmd, true);
        let action = feed(&mut ctx, Some(Sid::DnsReq), &wait, b"+QIURC: \"dnsgip\",565,0,0");
        assert_eq!(action, Action::Error);
        assert_eq!(ctx.sid.dns.error, 565);
    }

    fn connect_request(socket: u8) -> Request {
        Request::Connect(SocketConnect {
            socket,
            conf: ConfId::Predef,
            protocol: Protocol::Tcp,
            remote: IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4)),
            remote_port: 80,
            local_port: 0,
        })
    }

    #[test]
    fn qiopen_is_only_heard_while_pending() {
        let mut ctx = ModemContext::new();
        ctx.persist.reserve_socket(30).unwrap();
        assert_eq!(ctx.persist.reserve_socket(2), Ok(1));
        ctx.sid.request = connect_request(2);
        let wait = step(Id::Qiopen, AtType::NoCmd, true);

        assert_eq!(
            feed(&mut ctx, Some(Sid::DialCommand), &wait, b"+QIOPEN: 1,0"),
            Action::Ignored
        );

        ctx.sid.qiopen_pending = true;
        // Another connectID.
        assert_eq!(
            feed(&mut ctx, Some(Sid::DialCommand), &wait, b"+QIOPEN: 2,0"),
            Action::Error
        );
        assert_eq!(
            feed(&mut ctx, Some(Sid::DialCommand), &wait, b"+QIOPEN: 1,0"),
            Action::FinalEnd
        );
        assert!(ctx.sid.socket_connected);
        let socket = ctx.persist.socket(2).unwrap();
        assert!(socket.connected);
        assert_eq!(socket.remote_port, 80);
    }

    #[test]
    fn qiopen_error_fails() {
        let mut ctx = ModemContext::new();
        ctx.persist.reserve_socket(2).unwrap();
        ctx.sid.request = connect_request(2);
        ctx.sid.qiopen_pending = true;
        let wait = step(Id::Qiopen, AtType::NoCmd, true);
        assert_eq!(
            feed(&mut ctx, Some(Sid::DialCommand), &wait, b"+QIOPEN: 0,566"),
            Action::Error
        );
        assert!(!ctx.sid.socket_connected);
    }

    #[test]
    fn ping_reports() {
        let mut ctx = ModemContext::new();
        let idle = CurrentCommand::IDLE;
        assert_eq!(
            feed(&mut ctx, None, &idle, b"+QPING: 0,\"8.8.8.8\",32,45,255"),
            Action::UrcIgnored
        );

        ctx.persist.subscriptions.ping = true;
        match feed(&mut ctx, None, &idle, b"+QPING: 0,\"8.8.8.8\",32,45,255") {
            Action::UrcForwarded(urcs) => match urcs[0] {
                Urc::PingResponse(r) => {
                    assert!(r.ok && !r.is_final);
                    assert_eq!(r.addr, Some(IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8))));
                    assert_eq!((r.bytes, r.time, r.ttl), (32, 45, 255));
                }
                other => panic!("{:?}", other),
            },
            other => panic!("{:?}", other),
        }
        match feed(&mut ctx, None, &idle, b"+QPING: 0,4,4,0,36,45,40") {
            Action::UrcForwarded(urcs) => match urcs[0] {
                Urc::PingResponse(r) => {
                    assert!(r.is_final);
                    assert_eq!(r.index, 1);
                    assert_eq!((r.sent, r.received, r.lost), (4, 4, 0));
                    assert_eq!(r.avg_time, 40);
                }
                other => panic!("{:?}", other),
            },
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn rdy_ends_the_wait_or_is_an_event() {
        let mut ctx = ModemContext::new();
        let wait = step(Id::Rdy, AtType::NoCmd, false);
        assert_eq!(
            feed(&mut ctx, Some(Sid::PowerOn), &wait, b"RDY"),
            Action::FinalContinue
        );
        assert!(ctx.persist.modem_at_ready);

        ctx.persist.modem_at_ready = false;
        assert_eq!(feed(&mut ctx, None, &CurrentCommand::IDLE, b"RDY"), Action::UrcIgnored);
        assert!(ctx.persist.modem_at_ready);

        ctx.persist.modem_events = ModemEvents::NONE.with(ModemEvent::Boot);
        assert_eq!(
            feed(&mut ctx, None, &CurrentCommand::IDLE, b"RDY"),
            Action::UrcForwarded([Urc::ModemEvent(ModemEvent::Boot)].into_iter().collect())
        );
    }

    #[test]
    fn some_errors_are_tolerated() {
        let mut ctx = ModemContext::new();
        let cur = step(Id::Cereg, AtType::Read, false);
        assert_eq!(
            feed(&mut ctx, Some(Sid::GetNetStatus), &cur, b"ERROR"),
            Action::FinalContinue
        );

        let cur = step(Id::Cgdcont, AtType::Read, true);
        assert_eq!(feed(&mut ctx, Some(Sid::InitModem), &cur, b"ERROR"), Action::FinalEnd);

        // A CME error still aborts.
        let cur = step(Id::Cereg, AtType::Read, false);
        assert_eq!(
            feed(&mut ctx, Some(Sid::GetNetStatus), &cur, b"+CME ERROR: 3"),
            Action::Error
        );
    }

    #[test]
    fn dial_error_releases_the_socket() {
        let mut ctx = ModemContext::new();
        ctx.sid.request = connect_request(4);
        ctx.persist.reserve_socket(4).unwrap();
        let cur = step(Id::Qiopen, AtType::Write, false);
        assert_eq!(feed(&mut ctx, Some(Sid::DialCommand), &cur, b"ERROR"), Action::Error);
        assert!(ctx.persist.socket(4).is_none());
    }

    #[test]
    fn send_prompt_and_confirmation() {
        let mut ctx = ModemContext::new();
        let sid = Some(Sid::SendData);
        let cur = step(Id::Qisend, AtType::Write, false);
        let rsp = dispatch(FrameRef::Prompt, sid, &cur, &mut ctx);
        assert_eq!(rsp.action, Action::FinalContinue);
        assert!(ctx.sid.prompt_received);

        let cur = step(Id::SendData, AtType::Raw, true);
        assert_eq!(feed(&mut ctx, sid, &cur, b"SEND OK"), Action::FinalEnd);
        assert_eq!(feed(&mut ctx, None, &CurrentCommand::IDLE, b"SEND OK"), Action::Error);
    }

    #[test]
    fn read_size_and_payload() {
        let mut ctx = ModemContext::new();
        ctx.sid.request = Request::Receive {
            socket: 0,
            max_len: 4,
        };
        let sid = Some(Sid::ReceiveData);
        let cur = step(Id::Qird, AtType::Write, false);
        feed(&mut ctx, sid, &cur, b"+QIRD: 10,0,10");
        assert_eq!(ctx.sid.rx_expected, 4);

        let cur = step(Id::Qird, AtType::Write, true);
        feed(&mut ctx, sid, &cur, b"+QIRD: 4");
        assert_eq!(ctx.cmd.rx_announced, Some(4));
        let rsp = dispatch(FrameRef::Payload(b"abcdef"), sid, &cur, &mut ctx);
        assert_eq!(rsp.action, Action::Intermediate);
        assert_eq!(&ctx.sid.rx[..], b"abcd");
    }

    #[test]
    fn socket_state_for_the_requested_socket() {
        let mut ctx = ModemContext::new();
        ctx.persist.reserve_socket(8).unwrap();
        ctx.persist.reserve_socket(1).unwrap();
        ctx.sid.request = Request::Socket(1);
        ctx.persist.cids[0].ip = Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 9)));
        let sid = Some(Sid::SocketCnxStatus);
        let cur = step(Id::Qistate, AtType::Write, true);

        feed(&mut ctx, sid, &cur, b"+QISTATE: 0,\"TCP\",\"1.1.1.1\",80,5000,2,1,0,0,\"usbmodem\"");
        assert!(ctx.sid.cnx.is_none());

        feed(&mut ctx, sid, &cur, b"+QISTATE: 1,\"TCP\",\"1.2.3.4\",443,6000,2,1,0,0,\"usbmodem\"");
        let cnx = ctx.sid.cnx.unwrap();
        assert_eq!(cnx.socket, 1);
        assert_eq!(cnx.remote_ip, Some(IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4))));
        assert_eq!((cnx.remote_port, cnx.local_port), (443, 6000));
        assert_eq!(cnx.local_ip, Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 9))));
    }

    #[test]
    fn signal_indication_and_fota() {
        let mut ctx = ModemContext::new();
        let idle = CurrentCommand::IDLE;
        assert_eq!(feed(&mut ctx, None, &idle, b"+QIND: \"csq\",20,99"), Action::UrcIgnored);

        ctx.persist.subscriptions.signal_quality = true;
        ctx.persist.modem_events = ModemEvents::NONE.with(ModemEvent::FotaEnd);
        assert_eq!(
            feed(&mut ctx, None, &idle, b"+QIND: \"csq\",20,99"),
            Action::UrcForwarded(
                [Urc::SignalQuality(SignalQuality { rssi: 20, ber: 99 })]
                    .into_iter()
                    .collect()
            )
        );
        assert_eq!(
            feed(&mut ctx, None, &idle, b"+QIND: \"FOTA\",\"HTTPSTART\""),
            Action::UrcIgnored
        );
        assert_eq!(
            feed(&mut ctx, None, &idle, b"+QIND: \"FOTA\",\"HTTPEND\",0"),
            Action::UrcForwarded([Urc::ModemEvent(ModemEvent::FotaEnd)].into_iter().collect())
        );
    }
}
