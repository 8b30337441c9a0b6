//! Error types shared across the controller.
//!
//! Every error here is recoverable: the controller shows it on the display,
//! logs it and returns to the main loop.

use core::fmt;

/// The modem answer did not contain a usable message record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReceiveError {
    /// `+CMGR:` marker absent from the refreshed buffer
    MissingRecord,
    /// Marker present but the header or body framing is incomplete
    MalformedRecord,
    /// Sender or body is not valid text
    InvalidText,
}

impl fmt::Display for ReceiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingRecord => write!(f, "message record missing"),
            Self::MalformedRecord => write!(f, "malformed message record"),
            Self::InvalidText => write!(f, "message is not valid text"),
        }
    }
}

impl core::error::Error for ReceiveError {}

/// Modem command failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GsmError {
    /// Bounded wait expired before the modem answered
    TimedOut,
    /// Modem answered `ERROR`
    Rejected,
    /// Writing to the UART failed
    Link,
    /// Outgoing command or payload does not fit its buffer
    TooLong,
    Receive(ReceiveError),
}

impl fmt::Display for GsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TimedOut => write!(f, "modem timed out"),
            Self::Rejected => write!(f, "modem rejected command"),
            Self::Link => write!(f, "modem link write failed"),
            Self::TooLong => write!(f, "command too long"),
            Self::Receive(e) => write!(f, "receive error: {}", e),
        }
    }
}

impl core::error::Error for GsmError {}

impl From<ReceiveError> for GsmError {
    fn from(e: ReceiveError) -> Self {
        Self::Receive(e)
    }
}

/// Byte-addressable storage accessor failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NvmError {
    OutOfRange,
    Hardware,
}

impl fmt::Display for NvmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfRange => write!(f, "address out of range"),
            Self::Hardware => write!(f, "storage hardware fault"),
        }
    }
}

impl core::error::Error for NvmError {}

/// Contact store failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StoreError {
    /// All contact slots are in use
    Full,
    /// Number does not carry the country prefix or has the wrong digit count
    InvalidNumber,
    /// Number already enrolled
    Duplicate,
    /// Confirmation code has the wrong length or characters
    InvalidCode,
    /// Checksum or marker mismatch at `address`
    Corrupted { address: u16 },
    Nvm(NvmError),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "contact store full"),
            Self::InvalidNumber => write!(f, "invalid phone number"),
            Self::Duplicate => write!(f, "phone number already stored"),
            Self::InvalidCode => write!(f, "invalid confirmation code"),
            Self::Corrupted { address } => write!(f, "corrupted record at {:#06x}", address),
            Self::Nvm(e) => write!(f, "storage error: {}", e),
        }
    }
}

impl core::error::Error for StoreError {}

impl From<NvmError> for StoreError {
    fn from(e: NvmError) -> Self {
        Self::Nvm(e)
    }
}

/// Outcome of a rejected SMS command, surfaced on the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandError {
    ReceiveError(ReceiveError),
    Unauthorized,
    AlreadyExists,
    WrongCode,
    InvalidCode,
    Storage(StoreError),
    Modem(GsmError),
}

impl CommandError {
    /// Text shown on the first display row.
    pub fn screen_text(&self) -> &'static str {
        match self {
            Self::ReceiveError(_) => "Msg Receiving Error !",
            Self::Unauthorized => "Unauthorized Access !",
            Self::AlreadyExists => "Phone No Already Exists !",
            Self::WrongCode => "Wrong Confirmation Code !",
            Self::InvalidCode => "Invalid New Code !",
            Self::Storage(StoreError::Full) => "Phone Book Full !",
            Self::Storage(StoreError::InvalidNumber) => "Invalid Phone No !",
            Self::Storage(_) => "Storage Error !",
            Self::Modem(_) => "GSM Error !",
        }
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReceiveError(e) => write!(f, "{}", e),
            Self::Unauthorized => write!(f, "unauthorized sender"),
            Self::AlreadyExists => write!(f, "sender already enrolled"),
            Self::WrongCode => write!(f, "wrong confirmation code"),
            Self::InvalidCode => write!(f, "invalid new confirmation code"),
            Self::Storage(e) => write!(f, "{}", e),
            Self::Modem(e) => write!(f, "{}", e),
        }
    }
}

impl core::error::Error for CommandError {}

impl From<StoreError> for CommandError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Duplicate => Self::AlreadyExists,
            StoreError::InvalidCode => Self::InvalidCode,
            other => Self::Storage(other),
        }
    }
}

impl From<GsmError> for CommandError {
    fn from(e: GsmError) -> Self {
        match e {
            GsmError::Receive(r) => Self::ReceiveError(r),
            other => Self::Modem(other),
        }
    }
}
