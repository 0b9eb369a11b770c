//! Service identifiers and the typed payloads exchanged with the service
//! layer through [`PackBuf`] envelopes.

use heapless::{String, Vec};
use no_std_net::IpAddr;

use crate::datapack::{str_size, DataPackError, PackBuf, Packable, Reader, Tagged, Writer, IP_SIZE};
use crate::error::{Error, GenericError};

/// Largest socket payload moved by a single send or receive.
pub const SOCKET_DATA_MAX: usize = 1460;

pub const HOST_NAME_MAX: usize = 64;
pub const APN_MAX: usize = 32;
pub const CREDENTIAL_MAX: usize = 24;
pub const OPERATOR_NAME_MAX: usize = 32;
pub const DEVICE_INFO_MAX: usize = 64;
pub const PIN_MAX: usize = 8;

/// First SID value, so that SIDs never collide with message type tags.
pub const SERVICE_START_ID: u16 = 100;

/// Logical operations requested by the service layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum Sid {
    CheckCnx = SERVICE_START_ID,
    PowerOn,
    PowerOff,
    InitModem,
    GetDeviceInfo,
    RegisterNet,
    SubscribeNetEvent,
    UnsubscribeNetEvent,
    GetNetStatus,
    GetAttachStatus,
    GetSignalQuality,
    ActivatePdn,
    AttachPsDomain,
    DetachPsDomain,
    DeactivatePdn,
    RegisterPdnEvent,
    DeregisterPdnEvent,
    GetIpAddress,
    DefinePdn,
    SetDefaultPdn,
    DialCommand,
    SendData,
    ReceiveData,
    SocketClose,
    DataSuspend,
    DataResume,
    Reset,
    SocketCnxStatus,
    ModemConfig,
    DnsReq,
    PingIpAddress,
    SubscribeModemEvent,
}

/// Envelope tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum MessageType {
    Undefined = 3,
    None,
    UrcEpsNetworkRegistrationStatus,
    UrcEpsLocationInfo,
    UrcGprsNetworkRegistrationStatus,
    UrcGprsLocationInfo,
    UrcCsNetworkRegistrationStatus,
    UrcCsLocationInfo,
    UrcSignalQuality,
    UrcPacketDomainEvent,
    UrcSocketDataPending,
    UrcSocketClosed,
    UrcModemEvent,
    UrcPingRsp,
    InitModem,
    AttachStatus,
    OperatorSelect,
    RegistrationStatus,
    UrcEvent,
    DeviceInfo,
    SocketInfo,
    SocketDataBuffer,
    SocketRxData,
    SocketCnxStatus,
    SignalQuality,
    Reset,
    ActivatePdn,
    DeactivatePdn,
    DefinePdn,
    SetDefaultPdn,
    GetIpAddress,
    DnsReq,
    PingAddress,
    ModemEvent,
    ErrorReport,
    SocketHandle,
    SocketCnxInfo,
    IpAddressInfo,
    DnsResponse,
}

/// Declares a `u8` backed enum carried in payloads, with a checked
/// conversion from its wire value.
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident = $value:literal,)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        #[cfg_attr(feature = "defmt", derive(defmt::Format))]
        #[repr(u8)]
        pub enum $name {
            $($(#[$vmeta])* $variant = $value,)+
        }

        impl TryFrom<u8> for $name {
            type Error = DataPackError;

            fn try_from(v: u8) -> Result<Self, Self::Error> {
                match v {
                    $($value => Ok(Self::$variant),)+
                    _ => Err(DataPackError::Malformed),
                }
            }
        }
    };
}

macro_rules! tagged {
    ($($ty:ty => $tag:ident),+ $(,)?) => {
        $(impl Tagged for $ty {
            const TAG: u16 = MessageType::$tag as u16;
        })+
    };
}

wire_enum! {
    pub enum ModemInitMode {
        Minimum = 0,
        Full = 1,
        SimOnly = 2,
    }
}

wire_enum! {
    pub enum ResetKind {
        Software = 0,
        Hardware = 1,
        Auto = 2,
        FactoryReset = 3,
    }
}

wire_enum! {
    pub enum NetworkRegMode {
        Auto = 0,
        Manual = 1,
        Deregister = 2,
        ManualThenAuto = 4,
    }
}

wire_enum! {
    /// 3GPP `<stat>` of `+CREG`, `+CGREG` and `+CEREG`.
    pub enum RegState {
        NotRegistered = 0,
        RegisteredHome = 1,
        Searching = 2,
        Denied = 3,
        Unknown = 4,
        RegisteredRoaming = 5,
        SmsOnlyHome = 6,
        SmsOnlyRoaming = 7,
        EmergencyOnly = 8,
        CsfbNotPreferredHome = 9,
        CsfbNotPreferredRoaming = 10,
    }
}

impl RegState {
    pub fn is_registered(self) -> bool {
        matches!(
            self,
            Self::RegisteredHome
                | Self::RegisteredRoaming
                | Self::SmsOnlyHome
                | Self::SmsOnlyRoaming
                | Self::CsfbNotPreferredHome
                | Self::CsfbNotPreferredRoaming
        )
    }
}

wire_enum! {
    pub enum AccessTechnology {
        Gsm = 0,
        GsmCompact = 1,
        Utran = 2,
        GsmEdge = 3,
        UtranHsdpa = 4,
        UtranHsupa = 5,
        UtranHsdpaHsupa = 6,
        EUtran = 7,
        /// LTE Cat.M1
        EcGsmIot = 8,
        /// LTE Cat.NB1
        EUtranNbS1 = 9,
    }
}

wire_enum! {
    pub enum OperatorNameFormat {
        Long = 0,
        Short = 1,
        Numeric = 2,
        NotPresent = 9,
    }
}

wire_enum! {
    pub enum UrcEvent {
        None = 0,
        EpsNetworkRegStat = 1,
        EpsLocationInfo = 2,
        GprsNetworkRegStat = 3,
        GprsLocationInfo = 4,
        CsNetworkRegStat = 5,
        CsLocationInfo = 6,
        SignalQuality = 7,
        PingRsp = 8,
    }
}

wire_enum! {
    pub enum ModemEvent {
        Boot = 1,
        PowerDown = 2,
        FotaStart = 4,
        FotaEnd = 8,
    }
}

/// Set of [`ModemEvent`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ModemEvents(pub u8);

impl ModemEvents {
    pub const NONE: Self = Self(0);

    pub fn contains(self, event: ModemEvent) -> bool {
        self.0 & event as u8 != 0
    }

    pub fn with(self, event: ModemEvent) -> Self {
        Self(self.0 | event as u8)
    }
}

wire_enum! {
    pub enum Protocol {
        Tcp = 0,
        Udp = 1,
    }
}

wire_enum! {
    pub enum DeviceInfoField {
        Imei = 0x01,
        Manufacturer = 0x02,
        Model = 0x04,
        Revision = 0x08,
        SerialNumber = 0x10,
        Imsi = 0x20,
        PhoneNumber = 0x40,
    }
}

wire_enum! {
    pub enum PdpType {
        Ip = 0,
        Ipv6 = 1,
        Ipv4v6 = 2,
        Ppp = 3,
    }
}

wire_enum! {
    /// Caller facing PDN configuration id, distinct from the modem `cid`.
    pub enum ConfId {
        /// Pre-defined configuration, bound to modem cid 1.
        Predef = 0,
        User1 = 1,
        User2 = 2,
        User3 = 3,
        User4 = 4,
        User5 = 5,
        /// Whichever configuration was set with [`Sid::SetDefaultPdn`].
        Default = 11,
        NotDefined = 12,
        All = 13,
    }
}

impl ConfId {
    /// Index in the configuration table, for concrete configurations.
    pub fn index(self) -> Option<usize> {
        match self {
            Self::Predef => Some(0),
            Self::User1 => Some(1),
            Self::User2 => Some(2),
            Self::User3 => Some(3),
            Self::User4 => Some(4),
            Self::User5 => Some(5),
            Self::Default | Self::NotDefined | Self::All => None,
        }
    }
}

wire_enum! {
    pub enum PdnEvent {
        Other = 0,
        NwDetach = 1,
        NwDeact = 2,
        NwPdnDeact = 3,
    }
}

wire_enum! {
    pub enum ErrorKind {
        Unknown = 0,
        Sim = 1,
    }
}

wire_enum! {
    pub enum SimState {
        Unknown = 0,
        Ready = 1,
        NotInserted = 2,
        Busy = 3,
        Failure = 4,
        Wrong = 5,
        PinRequired = 6,
        Pin2Required = 7,
        PukRequired = 8,
        Puk2Required = 9,
        IncorrectPassword = 10,
    }
}

fn enum_u8<T: TryFrom<u8, Error = DataPackError>>(r: &mut Reader<'_>) -> Result<T, DataPackError> {
    T::try_from(r.u8()?)
}

fn opt_u8<T: TryFrom<u8, Error = DataPackError>>(
    r: &mut Reader<'_>,
) -> Result<Option<T>, DataPackError> {
    match r.u8()? {
        0xff => Ok(None),
        v => T::try_from(v).map(Some),
    }
}

// ---- requests and responses ----

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModemInit {
    pub init: ModemInitMode,
    pub reset: bool,
    pub pincode: String<PIN_MAX>,
}

impl Packable for ModemInit {
    const SIZE: usize = 2 + str_size(PIN_MAX);

    fn encode(&self, w: &mut Writer<'_>) -> Result<(), DataPackError> {
        w.u8(self.init as u8)?;
        w.bool(self.reset)?;
        w.str(&self.pincode)
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self, DataPackError> {
        Ok(Self {
            init: enum_u8(r)?,
            reset: r.bool()?,
            pincode: r.str()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetRequest {
    pub kind: ResetKind,
}

impl Packable for ResetRequest {
    const SIZE: usize = 1;

    fn encode(&self, w: &mut Writer<'_>) -> Result<(), DataPackError> {
        w.u8(self.kind as u8)
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self, DataPackError> {
        Ok(Self { kind: enum_u8(r)? })
    }
}

/// Request names the field; the response carries its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub field: DeviceInfoField,
    pub value: String<DEVICE_INFO_MAX>,
}

impl DeviceInfo {
    pub fn request(field: DeviceInfoField) -> Self {
        Self {
            field,
            value: String::new(),
        }
    }
}

impl Packable for DeviceInfo {
    const SIZE: usize = 1 + str_size(DEVICE_INFO_MAX);

    fn encode(&self, w: &mut Writer<'_>) -> Result<(), DataPackError> {
        w.u8(self.field as u8)?;
        w.str(&self.value)
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self, DataPackError> {
        Ok(Self {
            field: enum_u8(r)?,
            value: r.str()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorSelection {
    pub mode: NetworkRegMode,
    pub format: OperatorNameFormat,
    pub name: String<OPERATOR_NAME_MAX>,
}

impl Default for OperatorSelection {
    fn default() -> Self {
        Self {
            mode: NetworkRegMode::Auto,
            format: OperatorNameFormat::NotPresent,
            name: String::new(),
        }
    }
}

impl Packable for OperatorSelection {
    const SIZE: usize = 2 + str_size(OPERATOR_NAME_MAX);

    fn encode(&self, w: &mut Writer<'_>) -> Result<(), DataPackError> {
        w.u8(self.mode as u8)?;
        w.u8(self.format as u8)?;
        w.str(&self.name)
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self, DataPackError> {
        Ok(Self {
            mode: enum_u8(r)?,
            format: enum_u8(r)?,
            name: r.str()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationStatus {
    pub mode: NetworkRegMode,
    pub eps: RegState,
    pub gprs: RegState,
    pub cs: RegState,
    pub format: Option<OperatorNameFormat>,
    pub operator: String<OPERATOR_NAME_MAX>,
    pub act: Option<AccessTechnology>,
}

impl Default for RegistrationStatus {
    fn default() -> Self {
        Self {
            mode: NetworkRegMode::Auto,
            eps: RegState::Unknown,
            gprs: RegState::Unknown,
            cs: RegState::Unknown,
            format: None,
            operator: String::new(),
            act: None,
        }
    }
}

impl Packable for RegistrationStatus {
    const SIZE: usize = 6 + str_size(OPERATOR_NAME_MAX);

    fn encode(&self, w: &mut Writer<'_>) -> Result<(), DataPackError> {
        w.u8(self.mode as u8)?;
        w.u8(self.eps as u8)?;
        w.u8(self.gprs as u8)?;
        w.u8(self.cs as u8)?;
        w.u8(self.format.map_or(0xff, |f| f as u8))?;
        w.u8(self.act.map_or(0xff, |a| a as u8))?;
        w.str(&self.operator)
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self, DataPackError> {
        Ok(Self {
            mode: enum_u8(r)?,
            eps: enum_u8(r)?,
            gprs: enum_u8(r)?,
            cs: enum_u8(r)?,
            format: opt_u8(r)?,
            act: opt_u8(r)?,
            operator: r.str()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UrcEventRequest {
    pub event: UrcEvent,
}

impl Packable for UrcEventRequest {
    const SIZE: usize = 1;

    fn encode(&self, w: &mut Writer<'_>) -> Result<(), DataPackError> {
        w.u8(self.event as u8)
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self, DataPackError> {
        Ok(Self {
            event: enum_u8(r)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachStatus {
    pub attached: bool,
}

impl Packable for AttachStatus {
    const SIZE: usize = 1;

    fn encode(&self, w: &mut Writer<'_>) -> Result<(), DataPackError> {
        w.bool(self.attached)
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self, DataPackError> {
        Ok(Self {
            attached: r.bool()?,
        })
    }
}

/// `+CSQ` values: rssi 0..31 or 99, ber 0..7 or 99.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SignalQuality {
    pub rssi: u8,
    pub ber: u8,
}

impl Default for SignalQuality {
    fn default() -> Self {
        Self { rssi: 99, ber: 99 }
    }
}

impl Packable for SignalQuality {
    const SIZE: usize = 2;

    fn encode(&self, w: &mut Writer<'_>) -> Result<(), DataPackError> {
        w.u8(self.rssi)?;
        w.u8(self.ber)
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self, DataPackError> {
        Ok(Self {
            rssi: r.u8()?,
            ber: r.u8()?,
        })
    }
}

/// Request carrying only a PDN configuration id. `TAG` tells the SID apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdnRequest<const TAG: u16> {
    pub conf: ConfId,
}

impl<const TAG: u16> Tagged for PdnRequest<TAG> {
    const TAG: u16 = TAG;
}

impl<const TAG: u16> Packable for PdnRequest<TAG> {
    const SIZE: usize = 1;

    fn encode(&self, w: &mut Writer<'_>) -> Result<(), DataPackError> {
        w.u8(self.conf as u8)
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self, DataPackError> {
        Ok(Self { conf: enum_u8(r)? })
    }
}

pub type ActivatePdn = PdnRequest<{ MessageType::ActivatePdn as u16 }>;
pub type DeactivatePdn = PdnRequest<{ MessageType::DeactivatePdn as u16 }>;
pub type SetDefaultPdn = PdnRequest<{ MessageType::SetDefaultPdn as u16 }>;
pub type GetIpAddress = PdnRequest<{ MessageType::GetIpAddress as u16 }>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdnDefinition {
    pub conf: ConfId,
    pub apn: String<APN_MAX>,
    pub pdp_type: PdpType,
    pub username: String<CREDENTIAL_MAX>,
    pub password: String<CREDENTIAL_MAX>,
}

impl Packable for PdnDefinition {
    const SIZE: usize = 2 + str_size(APN_MAX) + 2 * str_size(CREDENTIAL_MAX);

    fn encode(&self, w: &mut Writer<'_>) -> Result<(), DataPackError> {
        w.u8(self.conf as u8)?;
        w.u8(self.pdp_type as u8)?;
        w.str(&self.apn)?;
        w.str(&self.username)?;
        w.str(&self.password)
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self, DataPackError> {
        Ok(Self {
            conf: enum_u8(r)?,
            pdp_type: enum_u8(r)?,
            apn: r.str()?,
            username: r.str()?,
            password: r.str()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpAddressInfo {
    pub conf: ConfId,
    pub ip: Option<IpAddr>,
}

impl Packable for IpAddressInfo {
    const SIZE: usize = 1 + IP_SIZE;

    fn encode(&self, w: &mut Writer<'_>) -> Result<(), DataPackError> {
        w.u8(self.conf as u8)?;
        w.ip(self.ip)
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self, DataPackError> {
        Ok(Self {
            conf: enum_u8(r)?,
            ip: r.ip()?,
        })
    }
}

/// Socket connect request (`AT+QIOPEN`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketConnect {
    pub socket: u8,
    pub conf: ConfId,
    pub protocol: Protocol,
    pub remote: IpAddr,
    pub remote_port: u16,
    pub local_port: u16,
}

impl Packable for SocketConnect {
    const SIZE: usize = 3 + IP_SIZE + 4;

    fn encode(&self, w: &mut Writer<'_>) -> Result<(), DataPackError> {
        w.u8(self.socket)?;
        w.u8(self.conf as u8)?;
        w.u8(self.protocol as u8)?;
        w.ip(Some(self.remote))?;
        w.u16(self.remote_port)?;
        w.u16(self.local_port)
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self, DataPackError> {
        Ok(Self {
            socket: r.u8()?,
            conf: enum_u8(r)?,
            protocol: enum_u8(r)?,
            remote: r.ip()?.ok_or(DataPackError::Malformed)?,
            remote_port: r.u16()?,
            local_port: r.u16()?,
        })
    }
}

/// Socket handle request, for close and connection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketHandle {
    pub socket: u8,
}

impl Packable for SocketHandle {
    const SIZE: usize = 1;

    fn encode(&self, w: &mut Writer<'_>) -> Result<(), DataPackError> {
        w.u8(self.socket)
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self, DataPackError> {
        Ok(Self { socket: r.u8()? })
    }
}

/// Socket payload, always lent by reference.
///
/// For [`Sid::SendData`] `data` holds the bytes to send. For
/// [`Sid::ReceiveData`] the engine fills `data` with at most `max_len` bytes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SocketDataBuffer {
    pub socket: u8,
    pub max_len: u16,
    pub data: Vec<u8, SOCKET_DATA_MAX>,
}

/// Number of bytes received by [`Sid::ReceiveData`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketRxData {
    pub socket: u8,
    pub len: u16,
}

impl Packable for SocketRxData {
    const SIZE: usize = 3;

    fn encode(&self, w: &mut Writer<'_>) -> Result<(), DataPackError> {
        w.u8(self.socket)?;
        w.u16(self.len)
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self, DataPackError> {
        Ok(Self {
            socket: r.u8()?,
            len: r.u16()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SocketCnxInfo {
    pub socket: u8,
    pub local_ip: Option<IpAddr>,
    pub local_port: u16,
    pub remote_ip: Option<IpAddr>,
    pub remote_port: u16,
}

impl Packable for SocketCnxInfo {
    const SIZE: usize = 1 + 2 * (IP_SIZE + 2);

    fn encode(&self, w: &mut Writer<'_>) -> Result<(), DataPackError> {
        w.u8(self.socket)?;
        w.ip(self.local_ip)?;
        w.u16(self.local_port)?;
        w.ip(self.remote_ip)?;
        w.u16(self.remote_port)
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self, DataPackError> {
        Ok(Self {
            socket: r.u8()?,
            local_ip: r.ip()?,
            local_port: r.u16()?,
            remote_ip: r.ip()?,
            remote_port: r.u16()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsRequest {
    pub conf: ConfId,
    pub primary_dns: Option<IpAddr>,
    pub host: String<HOST_NAME_MAX>,
}

impl Packable for DnsRequest {
    const SIZE: usize = 1 + IP_SIZE + str_size(HOST_NAME_MAX);

    fn encode(&self, w: &mut Writer<'_>) -> Result<(), DataPackError> {
        w.u8(self.conf as u8)?;
        w.ip(self.primary_dns)?;
        w.str(&self.host)
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self, DataPackError> {
        Ok(Self {
            conf: enum_u8(r)?,
            primary_dns: r.ip()?,
            host: r.str()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DnsResponse {
    pub host_addr: IpAddr,
}

impl Packable for DnsResponse {
    const SIZE: usize = IP_SIZE;

    fn encode(&self, w: &mut Writer<'_>) -> Result<(), DataPackError> {
        w.ip(Some(self.host_addr))
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self, DataPackError> {
        Ok(Self {
            host_addr: r.ip()?.ok_or(DataPackError::Malformed)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingRequest {
    pub conf: ConfId,
    pub host: String<HOST_NAME_MAX>,
    /// Seconds, 1..255.
    pub timeout: u8,
    /// Number of echo requests, 1..10.
    pub count: u8,
}

impl Packable for PingRequest {
    const SIZE: usize = 3 + str_size(HOST_NAME_MAX);

    fn encode(&self, w: &mut Writer<'_>) -> Result<(), DataPackError> {
        w.u8(self.conf as u8)?;
        w.u8(self.timeout)?;
        w.u8(self.count)?;
        w.str(&self.host)
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self, DataPackError> {
        Ok(Self {
            conf: enum_u8(r)?,
            timeout: r.u8()?,
            count: r.u8()?,
            host: r.str()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModemEventRequest {
    pub events: ModemEvents,
}

impl Packable for ModemEventRequest {
    const SIZE: usize = 1;

    fn encode(&self, w: &mut Writer<'_>) -> Result<(), DataPackError> {
        w.u8(self.events.0)
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self, DataPackError> {
        Ok(Self {
            events: ModemEvents(r.u8()?),
        })
    }
}

/// Structured failure detail, packed instead of a response when a SID fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub sim_state: SimState,
}

impl ErrorReport {
    pub const UNKNOWN: Self = Self {
        kind: ErrorKind::Unknown,
        sim_state: SimState::Unknown,
    };

    pub fn sim(state: SimState) -> Self {
        Self {
            kind: ErrorKind::Sim,
            sim_state: state,
        }
    }
}

impl Packable for ErrorReport {
    const SIZE: usize = 2;

    fn encode(&self, w: &mut Writer<'_>) -> Result<(), DataPackError> {
        w.u8(self.kind as u8)?;
        w.u8(self.sim_state as u8)
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self, DataPackError> {
        Ok(Self {
            kind: enum_u8(r)?,
            sim_state: enum_u8(r)?,
        })
    }
}

tagged! {
    ModemInit => InitModem,
    ResetRequest => Reset,
    DeviceInfo => DeviceInfo,
    OperatorSelection => OperatorSelect,
    RegistrationStatus => RegistrationStatus,
    UrcEventRequest => UrcEvent,
    AttachStatus => AttachStatus,
    SignalQuality => SignalQuality,
    PdnDefinition => DefinePdn,
    IpAddressInfo => IpAddressInfo,
    SocketConnect => SocketInfo,
    SocketHandle => SocketHandle,
    SocketDataBuffer => SocketDataBuffer,
    SocketRxData => SocketRxData,
    SocketCnxInfo => SocketCnxInfo,
    DnsRequest => DnsReq,
    DnsResponse => DnsResponse,
    PingRequest => PingAddress,
    ModemEventRequest => ModemEvent,
    ErrorReport => ErrorReport,
}

// ---- unsolicited payloads ----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Location {
    /// LAC, or TAC on EPS.
    pub lac: Option<u16>,
    pub ci: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationUrc<const TAG: u16> {
    pub state: RegState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocationUrc<const TAG: u16> {
    pub location: Location,
}

impl<const TAG: u16> Tagged for RegistrationUrc<TAG> {
    const TAG: u16 = TAG;
}

impl<const TAG: u16> Packable for RegistrationUrc<TAG> {
    const SIZE: usize = 1;

    fn encode(&self, w: &mut Writer<'_>) -> Result<(), DataPackError> {
        w.u8(self.state as u8)
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self, DataPackError> {
        Ok(Self {
            state: enum_u8(r)?,
        })
    }
}

impl<const TAG: u16> Tagged for LocationUrc<TAG> {
    const TAG: u16 = TAG;
}

impl<const TAG: u16> Packable for LocationUrc<TAG> {
    const SIZE: usize = 2 + 2 + 4;

    fn encode(&self, w: &mut Writer<'_>) -> Result<(), DataPackError> {
        w.bool(self.location.lac.is_some())?;
        w.bool(self.location.ci.is_some())?;
        w.u16(self.location.lac.unwrap_or(0))?;
        w.u32(self.location.ci.unwrap_or(0))
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self, DataPackError> {
        let has_lac = r.bool()?;
        let has_ci = r.bool()?;
        let lac = r.u16()?;
        let ci = r.u32()?;
        Ok(Self {
            location: Location {
                lac: has_lac.then_some(lac),
                ci: has_ci.then_some(ci),
            },
        })
    }
}

pub type EpsRegistrationUrc = RegistrationUrc<{ MessageType::UrcEpsNetworkRegistrationStatus as u16 }>;
pub type GprsRegistrationUrc =
    RegistrationUrc<{ MessageType::UrcGprsNetworkRegistrationStatus as u16 }>;
pub type CsRegistrationUrc = RegistrationUrc<{ MessageType::UrcCsNetworkRegistrationStatus as u16 }>;
pub type EpsLocationUrc = LocationUrc<{ MessageType::UrcEpsLocationInfo as u16 }>;
pub type GprsLocationUrc = LocationUrc<{ MessageType::UrcGprsLocationInfo as u16 }>;
pub type CsLocationUrc = LocationUrc<{ MessageType::UrcCsLocationInfo as u16 }>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PdnEventUrc {
    pub conf: ConfId,
    pub event: PdnEvent,
}

impl Packable for PdnEventUrc {
    const SIZE: usize = 2;

    fn encode(&self, w: &mut Writer<'_>) -> Result<(), DataPackError> {
        w.u8(self.conf as u8)?;
        w.u8(self.event as u8)
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self, DataPackError> {
        Ok(Self {
            conf: enum_u8(r)?,
            event: enum_u8(r)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketUrc<const TAG: u16> {
    pub socket: u8,
}

impl<const TAG: u16> Tagged for SocketUrc<TAG> {
    const TAG: u16 = TAG;
}

impl<const TAG: u16> Packable for SocketUrc<TAG> {
    const SIZE: usize = 1;

    fn encode(&self, w: &mut Writer<'_>) -> Result<(), DataPackError> {
        w.u8(self.socket)
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self, DataPackError> {
        Ok(Self { socket: r.u8()? })
    }
}

pub type SocketDataPendingUrc = SocketUrc<{ MessageType::UrcSocketDataPending as u16 }>;
pub type SocketClosedUrc = SocketUrc<{ MessageType::UrcSocketClosed as u16 }>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModemEventUrc {
    pub event: ModemEvent,
}

impl Packable for ModemEventUrc {
    const SIZE: usize = 1;

    fn encode(&self, w: &mut Writer<'_>) -> Result<(), DataPackError> {
        w.u8(self.event as u8)
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self, DataPackError> {
        Ok(Self {
            event: enum_u8(r)?,
        })
    }
}

/// One `+QPING` report: an echo reply, or the final statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PingResponse {
    pub index: u8,
    pub ok: bool,
    pub is_final: bool,
    pub addr: Option<IpAddr>,
    pub bytes: u16,
    pub time: u16,
    pub ttl: u16,
    pub sent: u8,
    pub received: u8,
    pub lost: u8,
    pub min_time: u16,
    pub max_time: u16,
    pub avg_time: u16,
}

impl Packable for PingResponse {
    const SIZE: usize = 3 + IP_SIZE + 6 + 3 + 6;

    fn encode(&self, w: &mut Writer<'_>) -> Result<(), DataPackError> {
        w.u8(self.index)?;
        w.bool(self.ok)?;
        w.bool(self.is_final)?;
        w.ip(self.addr)?;
        w.u16(self.bytes)?;
        w.u16(self.time)?;
        w.u16(self.ttl)?;
        w.u8(self.sent)?;
        w.u8(self.received)?;
        w.u8(self.lost)?;
        w.u16(self.min_time)?;
        w.u16(self.max_time)?;
        w.u16(self.avg_time)
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self, DataPackError> {
        Ok(Self {
            index: r.u8()?,
            ok: r.bool()?,
            is_final: r.bool()?,
            addr: r.ip()?,
            bytes: r.u16()?,
            time: r.u16()?,
            ttl: r.u16()?,
            sent: r.u8()?,
            received: r.u8()?,
            lost: r.u8()?,
            min_time: r.u16()?,
            max_time: r.u16()?,
            avg_time: r.u16()?,
        })
    }
}

tagged! {
    PdnEventUrc => UrcPacketDomainEvent,
    ModemEventUrc => UrcModemEvent,
    PingResponse => UrcPingRsp,
}

/// Unsolicited result queued for the service layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urc {
    EpsRegistration(RegState),
    EpsLocation(Location),
    GprsRegistration(RegState),
    GprsLocation(Location),
    CsRegistration(RegState),
    CsLocation(Location),
    SignalQuality(SignalQuality),
    PdnEvent(PdnEventUrc),
    SocketDataPending(u8),
    SocketClosed(u8),
    ModemEvent(ModemEvent),
    PingResponse(PingResponse),
}

impl Urc {
    pub fn pack(&self, buf: &mut PackBuf<'_>) -> Result<(), DataPackError> {
        match *self {
            Self::EpsRegistration(state) => buf.write_struct(&EpsRegistrationUrc { state }),
            Self::GprsRegistration(state) => buf.write_struct(&GprsRegistrationUrc { state }),
            Self::CsRegistration(state) => buf.write_struct(&CsRegistrationUrc { state }),
            Self::EpsLocation(location) => buf.write_struct(&EpsLocationUrc { location }),
            Self::GprsLocation(location) => buf.write_struct(&GprsLocationUrc { location }),
            Self::CsLocation(location) => buf.write_struct(&CsLocationUrc { location }),
            Self::SignalQuality(q) => buf.write_struct(&SignalQualityUrc(q)),
            Self::PdnEvent(e) => buf.write_struct(&e),
            Self::SocketDataPending(socket) => buf.write_struct(&SocketDataPendingUrc { socket }),
            Self::SocketClosed(socket) => buf.write_struct(&SocketClosedUrc { socket }),
            Self::ModemEvent(event) => buf.write_struct(&ModemEventUrc { event }),
            Self::PingResponse(p) => buf.write_struct(&p),
        }
    }
}

/// Signal quality pushed by `+QIND: "csq"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalQualityUrc(pub SignalQuality);

impl Tagged for SignalQualityUrc {
    const TAG: u16 = MessageType::UrcSignalQuality as u16;
}

impl Packable for SignalQualityUrc {
    const SIZE: usize = SignalQuality::SIZE;

    fn encode(&self, w: &mut Writer<'_>) -> Result<(), DataPackError> {
        self.0.encode(w)
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self, DataPackError> {
        SignalQuality::decode(r).map(Self)
    }
}

/// Service level status of a finished SID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ServiceStatus {
    Ok,
    Error,
    NotImplemented,
    SimBusy,
    SimNotInserted,
    SimPinOrPukLocked,
    SimIncorrectPassword,
    SimError,
}

impl ServiceStatus {
    /// Map the outcome of a SID to its service status.
    ///
    /// `report` is the error report packed by the engine, if any. SIM
    /// detail is taken from the report only.
    pub fn from_outcome(result: Result<(), Error>, report: Option<&ErrorReport>) -> Self {
        match result {
            Ok(()) => Self::Ok,
            Err(Error::Generic(GenericError::Unsupported)) => Self::NotImplemented,
            Err(_) => match report {
                Some(r) => Self::from(r),
                None => Self::Error,
            },
        }
    }
}

impl From<&ErrorReport> for ServiceStatus {
    fn from(report: &ErrorReport) -> Self {
        match report.kind {
            ErrorKind::Unknown => Self::Error,
            ErrorKind::Sim => match report.sim_state {
                SimState::Busy => Self::SimBusy,
                SimState::NotInserted => Self::SimNotInserted,
                SimState::PinRequired
                | SimState::Pin2Required
                | SimState::PukRequired
                | SimState::Puk2Required => Self::SimPinOrPukLocked,
                SimState::IncorrectPassword => Self::SimIncorrectPassword,
                SimState::Failure | SimState::Wrong | SimState::Unknown => Self::SimError,
                SimState::Ready => Self::Error,
            },
        }
    }
}
