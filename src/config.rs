use embassy_time::Duration;
use embedded_hal::digital::{ErrorType, InputPin, OutputPin};

pub struct NoPin;

impl ErrorType for NoPin {
    type Error = core::convert::Infallible;
}

impl InputPin for NoPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(true)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(false)
    }
}

impl OutputPin for NoPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Verbosity of `+CME ERROR` reports (`AT+CMEE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum CmeeLevel {
    Disabled = 0,
    Numeric = 1,
    Verbose = 2,
}

/// DTE/DCE flow control (`AT+IFC`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum FlowControl {
    None = 0,
    RtsCts = 2,
}

pub trait ModemConfig {
    type ResetPin: OutputPin;
    type PowerPin: OutputPin;
    type StatusPin: InputPin;

    const CMEE_LEVEL: CmeeLevel = CmeeLevel::Verbose;
    const BAUD_RATE: u32 = 115_200;
    const FLOW_CONTROL: FlowControl = FlowControl::None;

    /// Query `AT+CPIN?` while initialising the modem.
    const CHECK_SIM_PIN: bool = false;
    /// Turn PSM and eDRX off during power on.
    const DISABLE_PSM: bool = false;

    /// Upper bound applied to every command timeout.
    const MAX_COMMAND_TIMEOUT: Option<Duration> = None;

    fn reset_pin(&mut self) -> Option<&mut Self::ResetPin>;
    fn power_pin(&mut self) -> Option<&mut Self::PowerPin>;
    fn status_pin(&mut self) -> Option<&mut Self::StatusPin>;
}

/// Engine view of a [`ModemConfig`], detached from its pins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    pub cmee_level: CmeeLevel,
    pub baud_rate: u32,
    pub flow_control: FlowControl,
    pub check_sim_pin: bool,
    pub disable_psm: bool,
    pub max_command_timeout: Option<Duration>,
}

impl Settings {
    pub const fn of<C: ModemConfig>() -> Self {
        Self {
            cmee_level: C::CMEE_LEVEL,
            baud_rate: C::BAUD_RATE,
            flow_control: C::FLOW_CONTROL,
            check_sim_pin: C::CHECK_SIM_PIN,
            disable_psm: C::DISABLE_PSM,
            max_command_timeout: C::MAX_COMMAND_TIMEOUT,
        }
    }

    pub(crate) fn clamp(&self, timeout: Duration) -> Duration {
        match self.max_command_timeout {
            Some(max) if max < timeout => max,
            _ => timeout,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cmee_level: CmeeLevel::Verbose,
            baud_rate: 115_200,
            flow_control: FlowControl::None,
            check_sim_pin: false,
            disable_psm: false,
            max_command_timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Bench;

    impl ModemConfig for Bench {
        type ResetPin = NoPin;
        type PowerPin = NoPin;
        type StatusPin = NoPin;

        const CHECK_SIM_PIN: bool = true;
        const MAX_COMMAND_TIMEOUT: Option<Duration> = Some(Duration::from_millis(20));

        fn reset_pin(&mut self) -> Option<&mut Self::ResetPin> {
            None
        }
        fn power_pin(&mut self) -> Option<&mut Self::PowerPin> {
            None
        }
        fn status_pin(&mut self) -> Option<&mut Self::StatusPin> {
            None
        }
    }

    #[test]
    fn settings_follow_config_consts() {
        let settings = Settings::of::<Bench>();
        assert!(settings.check_sim_pin);
        assert_eq!(settings.cmee_level, CmeeLevel::Verbose);
        assert_eq!(
            settings.clamp(Duration::from_secs(150)),
            Duration::from_millis(20)
        );
        assert_eq!(
            settings.clamp(Duration::from_millis(5)),
            Duration::from_millis(5)
        );
    }
}
