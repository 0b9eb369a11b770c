use embassy_time::Timer;
use embedded_hal::digital::{InputPin as _, OutputPin as _};

use crate::config::ModemConfig;
use crate::error::Error;
use crate::module_timing::{boot_time, pwr_off_time, pwr_on_time, reset_time, shutdown_time};

/// Drives the `PWRKEY`, `RESET_N` and `STATUS` lines of the module.
///
/// Pins missing from the config are skipped with a warning. The AT side
/// follows with [`Sid::PowerOn`](crate::service::Sid::PowerOn) or
/// [`Sid::Reset`](crate::service::Sid::Reset), which wait for `RDY`.
pub struct PwrCtrl<'a, C> {
    config: &'a mut C,
}

impl<'a, C: ModemConfig> PwrCtrl<'a, C> {
    pub fn new(config: &'a mut C) -> Self {
        Self { config }
    }

    pub fn has_power(&mut self) -> Result<bool, Error> {
        if let Some(pin) = self.config.status_pin() {
            pin.is_high().map_err(|_| Error::IoPin)
        } else {
            info!("No status pin configured");
            Ok(true)
        }
    }

    pub async fn power_on(&mut self) -> Result<(), Error> {
        if self.has_power()? && self.config.status_pin().is_some() {
            return Ok(());
        }
        if let Some(pin) = self.config.power_pin() {
            debug!("Pulsing PWRKEY");
            pin.set_low().map_err(|_| Error::IoPin)?;
            Timer::after(pwr_on_time()).await;
            pin.set_high().map_err(|_| Error::IoPin)?;
            Timer::after(boot_time()).await;
            debug!("Powered up");
        } else {
            warn!("No power pin configured");
        }
        Ok(())
    }

    pub async fn power_off(&mut self) -> Result<(), Error> {
        if !self.has_power()? {
            return Ok(());
        }
        if let Some(pin) = self.config.power_pin() {
            pin.set_low().map_err(|_| Error::IoPin)?;
            Timer::after(pwr_off_time()).await;
            pin.set_high().map_err(|_| Error::IoPin)?;
            Timer::after(shutdown_time()).await;
            debug!("Powered down");
        } else {
            warn!("No power pin configured");
        }
        Ok(())
    }

    /// Hard reset through `RESET_N`.
    pub async fn reset(&mut self) -> Result<(), Error> {
        warn!("Hard resetting BG96");
        if let Some(pin) = self.config.reset_pin() {
            pin.set_low().map_err(|_| Error::IoPin)?;
            Timer::after(reset_time()).await;
            pin.set_high().map_err(|_| Error::IoPin)?;
            Timer::after(boot_time()).await;
        } else {
            warn!("No reset pin configured");
        }
        Ok(())
    }
}
