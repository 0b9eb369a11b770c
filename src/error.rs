use crate::datapack::DataPackError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GenericError {
    /// A transaction is already in flight on this handle.
    Busy,
    /// A received line could not be classified.
    Unclassified,
    /// The command for the current step could not be built.
    BuildRefused,
    /// The modem answered `ERROR`, `+CME ERROR`, `+CMS ERROR` or `SEND FAIL`.
    Rejected,
    Unsupported,
    /// The handle is in DATA mode and the request needs COMMAND mode,
    /// or the other way around.
    DataMode,
    /// The link collaborator refused to send or switch channel.
    Link,
    /// No free modem `connectID` or socket slot is left.
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    // Engine errors
    Generic(GenericError),
    Timeout,

    // Registry errors
    InvalidHandle,
    Exhausted,

    // Payload errors
    DataPack(DataPackError),

    IoPin,
}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter<'_>) {
        match self {
            Self::Generic(e) => defmt::write!(f, "Generic({:?})", e),
            Self::Timeout => defmt::write!(f, "Timeout"),
            Self::InvalidHandle => defmt::write!(f, "InvalidHandle"),
            Self::Exhausted => defmt::write!(f, "Exhausted"),
            Self::DataPack(e) => defmt::write!(f, "DataPack({:?})", e),
            Self::IoPin => defmt::write!(f, "IoPin"),
        }
    }
}

impl From<GenericError> for Error {
    fn from(e: GenericError) -> Self {
        Self::Generic(e)
    }
}

impl From<DataPackError> for Error {
    fn from(e: DataPackError) -> Self {
        Self::DataPack(e)
    }
}

/// Outcome of a multi-shot read such as draining pending URCs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UrcStatus {
    /// The last pending item was delivered.
    Ok,
    /// An item was delivered and more of the same are available.
    OkPendingMore,
}
