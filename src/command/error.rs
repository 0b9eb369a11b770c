use core::str::FromStr;

use crate::service::SimState;

macro_rules! result_codes {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident = $code:literal, $text:literal,)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        #[cfg_attr(feature = "defmt", derive(defmt::Format))]
        pub enum $name {
            $($(#[$vmeta])* $variant,)+
            Unknown,
        }

        impl $name {
            const TABLE: &'static [(u16, &'static str, $name)] = &[
                $(($code, $text, $name::$variant),)+
            ];

            pub fn code(self) -> Option<u16> {
                Self::TABLE.iter().find(|(_, _, v)| *v == self).map(|(c, _, _)| *c)
            }

            pub fn text(self) -> &'static str {
                Self::TABLE
                    .iter()
                    .find(|(_, _, v)| *v == self)
                    .map(|(_, t, _)| *t)
                    .unwrap_or("unknown")
            }
        }

        impl FromStr for $name {
            type Err = core::convert::Infallible;

            /// Accepts the numeric (`AT+CMEE=1`) and the verbose (`AT+CMEE=2`)
            /// form. Verbose text matches without regard to case.
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let s = s.trim();
                let hit = match s.parse::<u16>() {
                    Ok(code) => Self::TABLE.iter().find(|(c, _, _)| *c == code),
                    Err(_) => Self::TABLE.iter().find(|(_, t, _)| t.eq_ignore_ascii_case(s)),
                };
                Ok(hit.map(|(_, _, v)| *v).unwrap_or(Self::Unknown))
            }
        }
    };
}

result_codes! {
    /// Mobile termination error result codes (3GPP TS 27.007 §9.2, plus the
    /// BG96 TCP/IP range).
    pub enum CmeError {
        PhoneFailure = 0, "phone failure",
        NoConnectionToPhone = 1, "no connection to phone",
        OperationNotAllowed = 3, "operation not allowed",
        OperationNotSupported = 4, "operation not supported",
        PhSimPinRequired = 5, "PH-SIM PIN required",
        SimNotInserted = 10, "SIM not inserted",
        SimPinRequired = 11, "SIM PIN required",
        SimPukRequired = 12, "SIM PUK required",
        SimFailure = 13, "SIM failure",
        SimBusy = 14, "SIM busy",
        SimWrong = 15, "SIM wrong",
        IncorrectPassword = 16, "incorrect password",
        SimPin2Required = 17, "SIM PIN2 required",
        SimPuk2Required = 18, "SIM PUK2 required",
        MemoryFull = 20, "memory full",
        InvalidIndex = 21, "invalid index",
        NotFound = 22, "not found",
        MemoryFailure = 23, "memory failure",
        TextStringTooLong = 24, "text string too long",
        InvalidCharactersInTextString = 25, "invalid characters in text string",
        DialStringTooLong = 26, "dial string too long",
        InvalidCharactersInDialString = 27, "invalid characters in dial string",
        NoNetworkService = 30, "no network service",
        NetworkTimeout = 31, "network timeout",
        NetworkNotAllowed = 32, "network not allowed - emergency calls only",
        NetworkPersonalizationPinRequired = 40, "network personalization PIN required",
        UnknownCause = 100, "unknown",
        IllegalMs = 103, "illegal MS",
        IllegalMe = 106, "illegal ME",
        GprsServicesNotAllowed = 107, "GPRS services not allowed",
        PlmnNotAllowed = 111, "PLMN not allowed",
        LocationAreaNotAllowed = 112, "location area not allowed",
        RoamingNotAllowed = 113, "roaming not allowed in this location area",
        ServiceOptionNotSupported = 132, "service option not supported",
        ServiceOptionNotSubscribed = 133, "requested service option not subscribed",
        ServiceOptionOutOfOrder = 134, "service option temporarily out of order",
        UnspecifiedGprsError = 148, "unspecified GPRS error",
        PdpAuthenticationFailure = 149, "PDP authentication failure",
        InvalidMobileClass = 150, "invalid mobile class",
        // BG96 TCP/IP errors
        TcpUnknownError = 550, "unknown error",
        TcpOperationBlocked = 551, "operation blocked",
        TcpInvalidParameters = 552, "invalid parameters",
        TcpMemoryNotEnough = 553, "memory not enough",
        TcpCreateSocketFailed = 554, "create socket failed",
        TcpOperationNotSupported = 555, "operation is not supported",
        TcpSocketBindFailed = 556, "socket bind failed",
        TcpSocketListenFailed = 557, "socket listen failed",
        TcpSocketWriteFailed = 558, "socket write failed",
        TcpSocketReadFailed = 559, "socket read failed",
        TcpSocketAcceptFailed = 560, "socket accept failed",
        TcpOpenPdpContextFailed = 561, "open PDP context failed",
        TcpClosePdpContextFailed = 562, "close PDP context failed",
        TcpSocketIdentityUsed = 563, "socket identity has been used",
        TcpDnsBusy = 564, "DNS busy",
        TcpDnsParseFailed = 565, "DNS parse failed",
        TcpSocketConnectFailed = 566, "socket connect failed",
        TcpSocketClosed = 567, "socket has been closed",
        TcpOperationBusy = 568, "operation busy",
        TcpOperationTimeout = 569, "operation timeout",
        TcpPdpContextBrokenDown = 570, "PDP context broken down",
        TcpCancelSend = 571, "cancel send",
        TcpOperationNotAllowed = 572, "operation not allowed",
        TcpApnNotConfigured = 573, "APN not configured",
        TcpPortBusy = 574, "port busy",
    }
}

impl CmeError {
    /// SIM state implied by the error, for the SIM related codes.
    pub fn sim_state(self) -> Option<SimState> {
        Some(match self {
            Self::SimNotInserted => SimState::NotInserted,
            Self::SimPinRequired | Self::PhSimPinRequired => SimState::PinRequired,
            Self::SimPukRequired => SimState::PukRequired,
            Self::SimFailure => SimState::Failure,
            Self::SimBusy => SimState::Busy,
            Self::SimWrong => SimState::Wrong,
            Self::IncorrectPassword => SimState::IncorrectPassword,
            Self::SimPin2Required => SimState::Pin2Required,
            Self::SimPuk2Required => SimState::Puk2Required,
            _ => return None,
        })
    }
}

result_codes! {
    /// Message service error result codes (3GPP TS 27.005 §3.2.5).
    pub enum CmsError {
        MeFailure = 300, "ME failure",
        SmsServiceReserved = 301, "SMS ME reserved",
        OperationNotAllowed = 302, "operation not allowed",
        OperationNotSupported = 303, "operation not supported",
        InvalidPduModeParameter = 304, "invalid PDU mode parameter",
        InvalidTextModeParameter = 305, "invalid text mode parameter",
        SimNotInserted = 310, "SIM not inserted",
        SimPinNecessary = 311, "SIM PIN necessary",
        PhSimPinNecessary = 312, "PH-SIM PIN necessary",
        SimFailure = 313, "SIM failure",
        SimBusy = 314, "SIM busy",
        SimWrong = 315, "SIM wrong",
        SimPukRequired = 316, "SIM PUK required",
        SimPin2Required = 317, "SIM PIN2 required",
        SimPuk2Required = 318, "SIM PUK2 required",
        MemoryFailure = 320, "memory failure",
        InvalidMemoryIndex = 321, "invalid memory index",
        MemoryFull = 322, "memory full",
        SmscAddressUnknown = 330, "SMSC address unknown",
        NoNetworkService = 331, "no network service",
        NetworkTimeout = 332, "network timeout",
        UnknownError = 500, "unknown error",
    }
}

impl CmsError {
    pub fn sim_state(self) -> Option<SimState> {
        Some(match self {
            Self::SimNotInserted => SimState::NotInserted,
            Self::SimPinNecessary | Self::PhSimPinNecessary => SimState::PinRequired,
            Self::SimPukRequired => SimState::PukRequired,
            Self::SimFailure => SimState::Failure,
            Self::SimBusy => SimState::Busy,
            Self::SimWrong => SimState::Wrong,
            Self::SimPin2Required => SimState::Pin2Required,
            Self::SimPuk2Required => SimState::Puk2Required,
            _ => return None,
        })
    }
}

/// Any final error result code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ModemError {
    Generic,
    Cme(CmeError),
    Cms(CmsError),
}

impl ModemError {
    pub fn sim_state(self) -> Option<SimState> {
        match self {
            Self::Generic => None,
            Self::Cme(e) => e.sim_state(),
            Self::Cms(e) => e.sim_state(),
        }
    }
}

impl FromStr for ModemError {
    type Err = core::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Ok(if let Some(rest) = strip_prefix_ignore_case(s, "+CME ERROR:") {
            Self::Cme(rest.parse()?)
        } else if let Some(rest) = strip_prefix_ignore_case(s, "+CMS ERROR:") {
            Self::Cms(rest.parse()?)
        } else {
            Self::Generic
        })
    }
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &s[prefix.len()..])
}
