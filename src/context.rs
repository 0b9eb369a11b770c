//! Modem context.
//!
//! State is split by lifetime:
//!
//! * [`Persistent`] survives across SIDs: subscriptions, registration and
//!   PDN tables, sockets, the URC queue and DATA mode.
//! * [`SidScope`] is cleared when a SID starts and holds its request and the
//!   values collected for its response.
//! * [`CmdScope`] is cleared before every command of a SID.
//!
//! The whole context belongs to the single transaction in flight on a handle.

use heapless::{Deque, String, Vec};
use no_std_net::IpAddr;

use crate::error::GenericError;
use crate::service::{
    ConfId, DnsRequest, ErrorReport, Location, ModemEvents, ModemInit, OperatorSelection,
    PdnDefinition, PingRequest, RegState, RegistrationStatus, ResetKind, SignalQuality, SimState,
    SocketCnxInfo, SocketConnect, Urc, UrcEvent, DEVICE_INFO_MAX, SOCKET_DATA_MAX,
};

/// BG96 `connectID` range is 0..=11.
pub const MODEM_CID_MAX: u8 = 12;
/// Sockets open at once, one `connectID` each.
pub const SOCKET_MAX: usize = MODEM_CID_MAX as usize;
/// Caller side PDN configurations, `ConfId::Predef` to `ConfId::User5`.
pub const PDN_MAX: usize = 6;
/// Modem `contextID` range is 1..=16.
pub const CID_MAX: usize = 16;
pub const URC_QUEUE_DEPTH: usize = 8;

/// Network domain of a `+CxREG` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Domain {
    /// `+CEREG`
    Eps,
    /// `+CGREG`
    Gprs,
    /// `+CREG`
    Cs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Subscriptions {
    pub eps_reg: bool,
    pub eps_loc: bool,
    pub gprs_reg: bool,
    pub gprs_loc: bool,
    pub cs_reg: bool,
    pub cs_loc: bool,
    pub signal_quality: bool,
    pub ping: bool,
    pub pdn_event: bool,
}

impl Subscriptions {
    /// Update the flag behind `event`. Returns `true` if it changed.
    pub fn set(&mut self, event: UrcEvent, on: bool) -> bool {
        let flag = match event {
            UrcEvent::None => return false,
            UrcEvent::EpsNetworkRegStat => &mut self.eps_reg,
            UrcEvent::EpsLocationInfo => &mut self.eps_loc,
            UrcEvent::GprsNetworkRegStat => &mut self.gprs_reg,
            UrcEvent::GprsLocationInfo => &mut self.gprs_loc,
            UrcEvent::CsNetworkRegStat => &mut self.cs_reg,
            UrcEvent::CsLocationInfo => &mut self.cs_loc,
            UrcEvent::SignalQuality => &mut self.signal_quality,
            UrcEvent::PingRsp => &mut self.ping,
        };
        let changed = *flag != on;
        *flag = on;
        changed
    }

    /// Registration and location subscriptions of one domain.
    pub fn domain(&self, domain: Domain) -> (bool, bool) {
        match domain {
            Domain::Eps => (self.eps_reg, self.eps_loc),
            Domain::Gprs => (self.gprs_reg, self.gprs_loc),
            Domain::Cs => (self.cs_reg, self.cs_loc),
        }
    }

    /// `true` while any event of `domain` needs `+CxREG` URCs.
    pub fn wants_domain(&self, domain: Domain) -> bool {
        let (reg, loc) = self.domain(domain);
        reg || loc
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    pub state: RegState,
    pub location: Location,
}

impl Default for Registration {
    fn default() -> Self {
        Self {
            state: RegState::Unknown,
            location: Location::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CidEntry {
    pub active: bool,
    pub ip: Option<IpAddr>,
}

/// A caller side socket handle bound to a modem `connectID`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Socket {
    pub handle: u8,
    pub modem_cid: u8,
    pub connected: bool,
    pub data_pending: bool,
    /// `+QIURC: "closed"` seen. The `connectID` stays allocated on the
    /// modem until `+QICLOSE`.
    pub closed_by_remote: bool,
    pub remote: Option<IpAddr>,
    pub remote_port: u16,
    pub local_port: u16,
}

pub struct Persistent {
    pub data_mode: bool,
    pub subscriptions: Subscriptions,
    pub modem_events: ModemEvents,
    pub eps: Registration,
    pub gprs: Registration,
    pub cs: Registration,
    pub pdn: [Option<PdnDefinition>; PDN_MAX],
    pub default_conf: ConfId,
    pub cids: [CidEntry; CID_MAX],
    pub sockets: [Option<Socket>; SOCKET_MAX],
    pub modem_at_ready: bool,
    pub sim_pin_ready: bool,
    pub sim_state: SimState,
    /// Rank of the next `+QPING` report.
    pub ping_index: u8,
    pub urcs: Deque<Urc, URC_QUEUE_DEPTH>,
}

impl Persistent {
    pub fn new() -> Self {
        Self {
            data_mode: false,
            subscriptions: Subscriptions::default(),
            modem_events: ModemEvents::NONE,
            eps: Registration::default(),
            gprs: Registration::default(),
            cs: Registration::default(),
            pdn: Default::default(),
            default_conf: ConfId::Predef,
            cids: [CidEntry::default(); CID_MAX],
            sockets: [None; SOCKET_MAX],
            modem_at_ready: false,
            sim_pin_ready: false,
            sim_state: SimState::Unknown,
            ping_index: 0,
            urcs: Deque::new(),
        }
    }

    /// Modem `contextID` used for a caller side configuration.
    pub fn cid_for(&self, conf: ConfId) -> Option<u8> {
        let conf = match conf {
            ConfId::Default => self.default_conf,
            other => other,
        };
        conf.index().map(|i| i as u8 + 1)
    }

    /// Caller side configuration mapped to a modem `contextID`.
    pub fn conf_for(&self, cid: u8) -> ConfId {
        match cid.checked_sub(1) {
            Some(i) if (i as usize) < PDN_MAX => ConfId::try_from(i).unwrap_or(ConfId::NotDefined),
            _ => ConfId::NotDefined,
        }
    }

    pub fn cid_mut(&mut self, cid: u8) -> Option<&mut CidEntry> {
        self.cids.get_mut((cid as usize).checked_sub(1)?)
    }

    pub fn socket(&self, handle: u8) -> Option<&Socket> {
        self.sockets.iter().flatten().find(|s| s.handle == handle)
    }

    pub fn socket_mut(&mut self, handle: u8) -> Option<&mut Socket> {
        self.sockets.iter_mut().flatten().find(|s| s.handle == handle)
    }

    /// Modem `connectID` bound to `handle`.
    pub fn modem_cid(&self, handle: u8) -> Option<u8> {
        self.socket(handle).map(|s| s.modem_cid)
    }

    /// Handle bound to a `connectID` reported by the modem.
    pub fn socket_by_cid(&mut self, modem_cid: u8) -> Option<&mut Socket> {
        let socket = self
            .sockets
            .iter_mut()
            .flatten()
            .find(|s| s.modem_cid == modem_cid);
        if socket.is_none() {
            info!("No socket bound to connectID {}", modem_cid);
        }
        socket
    }

    /// Bind `handle` to the lowest free `connectID`.
    pub fn reserve_socket(&mut self, handle: u8) -> Result<u8, GenericError> {
        if self.socket(handle).is_some() {
            warn!("Socket {} already in use", handle);
            return Err(GenericError::Rejected);
        }
        let modem_cid = (0..MODEM_CID_MAX)
            .find(|cid| !self.sockets.iter().flatten().any(|s| s.modem_cid == *cid))
            .ok_or(GenericError::Exhausted)?;
        let slot = self
            .sockets
            .iter_mut()
            .find(|s| s.is_none())
            .ok_or(GenericError::Exhausted)?;
        *slot = Some(Socket {
            handle,
            modem_cid,
            connected: false,
            data_pending: false,
            closed_by_remote: false,
            remote: None,
            remote_port: 0,
            local_port: 0,
        });
        debug!("Socket {} bound to connectID {}", handle, modem_cid);
        Ok(modem_cid)
    }

    /// Return the `connectID` of `handle` to the pool.
    pub fn release_socket(&mut self, handle: u8) {
        for slot in self.sockets.iter_mut() {
            if let Some(s) = slot.filter(|s| s.handle == handle) {
                if s.data_pending || s.closed_by_remote {
                    info!("Socket {} released with pending URCs", handle);
                }
                *slot = None;
            }
        }
    }

    pub fn registration_mut(&mut self, domain: Domain) -> &mut Registration {
        match domain {
            Domain::Eps => &mut self.eps,
            Domain::Gprs => &mut self.gprs,
            Domain::Cs => &mut self.cs,
        }
    }

    /// Queue a URC for the service layer. The oldest entry makes room when
    /// the queue is full.
    pub fn push_urc(&mut self, urc: Urc) {
        if self.urcs.is_full() {
            warn!("URC queue full, dropping oldest");
            self.urcs.pop_front();
        }
        // Cannot fail, room was made above.
        let _ = self.urcs.push_back(urc);
    }
}

impl Default for Persistent {
    fn default() -> Self {
        Self::new()
    }
}

/// Decoded request of the SID in flight.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    None,
    ModemInit(ModemInit),
    Reset(ResetKind),
    DeviceInfo(crate::service::DeviceInfoField),
    Operator(OperatorSelection),
    UrcEvent(UrcEvent),
    Pdn(ConfId),
    Connect(SocketConnect),
    Socket(u8),
    Receive { socket: u8, max_len: u16 },
    Dns(DnsRequest),
    Ping(PingRequest),
    ModemEvents(ModemEvents),
}

/// Progress of a `+QIDNSGIP` resolution, reported through `+QIURC: "dnsgip"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DnsState {
    /// Header received.
    pub started: bool,
    /// Addresses still announced by the header.
    pub remaining: u8,
    pub done: bool,
    pub error: u16,
    pub addr: Option<IpAddr>,
}

pub struct SidScope {
    pub request: Request,
    pub report: Option<ErrorReport>,
    pub device_info: String<DEVICE_INFO_MAX>,
    pub signal: SignalQuality,
    pub attached: bool,
    pub registration: RegistrationStatus,
    /// Requested PDN found active by `+QIACT?`.
    pub pdn_active: bool,
    pub ip: Option<IpAddr>,
    /// `+QIOPEN` was sent and its URC is awaited.
    pub qiopen_pending: bool,
    pub socket_connected: bool,
    pub prompt_received: bool,
    pub tx: Vec<u8, SOCKET_DATA_MAX>,
    pub rx: Vec<u8, SOCKET_DATA_MAX>,
    /// Bytes announced by the `+QIRD` size query.
    pub rx_expected: u16,
    pub cnx: Option<SocketCnxInfo>,
    pub dns: DnsState,
    /// The request changed a subscription, so the modem needs telling.
    pub subscription_changed: bool,
}

impl SidScope {
    pub fn new() -> Self {
        Self {
            request: Request::None,
            report: None,
            device_info: String::new(),
            signal: SignalQuality::default(),
            attached: false,
            registration: RegistrationStatus::default(),
            pdn_active: false,
            ip: None,
            qiopen_pending: false,
            socket_connected: false,
            prompt_received: false,
            tx: Vec::new(),
            rx: Vec::new(),
            rx_expected: 0,
            cnx: None,
            dns: DnsState::default(),
            subscription_changed: false,
        }
    }

    pub fn clear(&mut self) {
        self.request = Request::None;
        self.report = None;
        self.device_info.clear();
        self.signal = SignalQuality::default();
        self.attached = false;
        self.registration = RegistrationStatus::default();
        self.pdn_active = false;
        self.ip = None;
        self.qiopen_pending = false;
        self.socket_connected = false;
        self.prompt_received = false;
        self.tx.clear();
        self.rx.clear();
        self.rx_expected = 0;
        self.cnx = None;
        self.dns = DnsState::default();
        self.subscription_changed = false;
    }

    /// Caller side handle of the request.
    pub fn socket(&self) -> Option<u8> {
        match &self.request {
            Request::Connect(c) => Some(c.socket),
            Request::Socket(s) => Some(*s),
            Request::Receive { socket, .. } => Some(*socket),
            _ => None,
        }
    }

    pub fn conf(&self) -> Option<ConfId> {
        match &self.request {
            Request::Pdn(conf) => Some(*conf),
            Request::Connect(c) => Some(c.conf),
            Request::Dns(d) => Some(d.conf),
            Request::Ping(p) => Some(p.conf),
            _ => None,
        }
    }
}

impl Default for SidScope {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CmdScope {
    /// Length announced by a `+QIRD: <len>` header.
    pub rx_announced: Option<u16>,
    /// Text lines answered to the current command.
    pub lines: u8,
}

#[derive(Default)]
pub struct ModemContext {
    pub persist: Persistent,
    pub sid: SidScope,
    pub cmd: CmdScope,
}

impl ModemContext {
    pub fn new() -> Self {
        Self {
            persist: Persistent::new(),
            sid: SidScope::new(),
            cmd: CmdScope::default(),
        }
    }

    pub fn begin_sid(&mut self) {
        self.sid.clear();
        self.cmd = CmdScope::default();
    }

    pub fn begin_command(&mut self) {
        self.cmd = CmdScope::default();
    }

    /// Forget everything, as after a modem reset.
    pub fn reinit(&mut self) {
        self.persist = Persistent::new();
        self.sid.clear();
        self.cmd = CmdScope::default();
    }
}
