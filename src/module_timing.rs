use embassy_time::Duration;

/// Low time of `PWRKEY` to switch the module on
pub fn pwr_on_time() -> Duration {
    Duration::from_millis(500)
}

/// Low time of `PWRKEY` to trigger a graceful switch off
pub fn pwr_off_time() -> Duration {
    Duration::from_millis(650)
}

/// Low time of `RESET_N` to reboot the module
pub fn reset_time() -> Duration {
    Duration::from_millis(300)
}

/// Time for the UART to come up after `PWRKEY` is released
pub fn boot_time() -> Duration {
    Duration::from_millis(4900)
}

/// Time from `POWERED DOWN` until `STATUS` drops
pub fn shutdown_time() -> Duration {
    Duration::from_secs(1)
}

// Command timeouts, in milliseconds.
pub const MODEM_DEFAULT_TIMEOUT: u32 = 10_000;
pub const AT_CMD_DEFAULT_TIMEOUT: u32 = 3_000;

pub const BG96_DEFAULT_TIMEOUT: u32 = 15_000;
pub const BG96_RDY_TIMEOUT: u32 = 30_000;
pub const BG96_ESCAPE_TIMEOUT: u32 = 1_000;
pub const BG96_COPS_TIMEOUT: u32 = 180_000;
pub const BG96_CGATT_TIMEOUT: u32 = 140_000;
pub const BG96_AT_TIMEOUT: u32 = 3_000;
pub const BG96_SOCKET_PROMPT_TIMEOUT: u32 = 10_000;
pub const BG96_QIOPEN_TIMEOUT: u32 = 150_000;
pub const BG96_QICLOSE_TIMEOUT: u32 = 150_000;
pub const BG96_QIACT_TIMEOUT: u32 = 150_000;
pub const BG96_QIDEACT_TIMEOUT: u32 = 40_000;
pub const BG96_QNWINFO_TIMEOUT: u32 = 1_000;
pub const BG96_QIDNSGIP_TIMEOUT: u32 = 60_000;
pub const BG96_QPING_TIMEOUT: u32 = 150_000;

/// Guard time of silence required before and after `+++`
pub const ESCAPE_GUARD_TIME: u32 = 1_000;
