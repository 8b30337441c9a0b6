// /src/constants.rs

// --- Modem link ---
pub const MSG_BUFFER_SIZE: usize = 256;
pub const MAX_LOCATION_LENGTH: usize = 4;
/// Full dialed number as reported by the modem: prefix plus national digits.
pub const DIAL_NUMBER_LENGTH: usize = 13;
pub const COUNTRY_CODE_PREFIX: &str = "+01";
pub const NATIONAL_NUMBER_LENGTH: usize = DIAL_NUMBER_LENGTH - COUNTRY_CODE_PREFIX.len();
pub const MAX_BODY_LENGTH: usize = 32;
pub const OUTGOING_SMS_MAX_LENGTH: usize = 150;

pub const NO_ECHO_CMD: &str = "ATE0\r";
pub const TEXT_MODE_CMD: &str = "AT+CMGF=1\r";
pub const READ_MSG_CMD: &str = "AT+CMGR=";
pub const SEND_MSG_CMD: &str = "AT+CMGS=";
pub const DELETE_MSG_CMD: &str = "AT+CMGD=";
pub const DEL_ALL_MSGS_CMD: &str = "AT+CMGDA=\"DEL ALL\"\r";
pub const CTRL_Z: u8 = 0x1A;

pub const PURGE_INBOX_ON_BOOT: bool = true;

// --- Delays and bounded waits (milliseconds) ---
pub const COMMAND_RESPONSE_TIMEOUT_MS: u32 = 1_000;
pub const READ_SETTLE_DELAY_MS: u32 = 1_000;
pub const SEND_PROMPT_TIMEOUT_MS: u32 = 5_000;
pub const SEND_CONFIRM_TIMEOUT_MS: u32 = 10_000;
pub const MODEM_POLL_INTERVAL_MS: u32 = 50;
pub const GPS_LISTEN_WINDOW_MS: u32 = 2_000;
pub const GPS_POLL_INTERVAL_MS: u32 = 100;
pub const BUZZER_DURATION_MS: u32 = 6_000;
pub const CO_DEBOUNCE_MS: u32 = 3_000;
pub const CO_ALARM_POLL_INTERVAL_MS: u32 = 100;
pub const CO_CALIBRATION_INTERVAL_MS: u32 = 500;

// --- MQ-9 calibration ---
pub const CO_CALIBRATION_SAMPLES: u32 = 16;
/// Rs/R0 of the MQ-9 in clean air, times ten.
pub const MQ9_CLEAN_AIR_FACTOR_X10: u32 = 99;

// --- Contact store layout ---
pub const FACTORY_CONFIRMATION_CODE: &str = "VTS100";
pub const CONFIRM_CODE_LENGTH: usize = 6;
pub const STORE_CONFIGURED_MARKER: u8 = b'$';
pub const STORE_LAYOUT_VERSION: u8 = 1;

pub const MARKER_ADDR: u16 = 0x00;
pub const VERSION_ADDR: u16 = 0x01;
pub const CODE_ADDR: u16 = 0x02;
pub const CODE_CHECKSUM_ADDR: u16 = CODE_ADDR + CONFIRM_CODE_LENGTH as u16;
pub const COUNT_ADDR: u16 = 0x09;
pub const COUNT_CHECK_ADDR: u16 = 0x0A;
pub const NUM_BOOK_START_ADDR: u16 = 0x10;

pub const RECORD_VALID_MARKER: u8 = 0xA5;
/// Marker byte, national digits, checksum.
pub const RECORD_SIZE: usize = 1 + NATIONAL_NUMBER_LENGTH + 1;
pub const MAX_CONTACTS: usize = 16;
pub const STORE_SIZE: usize = NUM_BOOK_START_ADDR as usize + MAX_CONTACTS * RECORD_SIZE;

// --- Outgoing messages ---
pub const LOCATION_PREAMBLE: &str = "Location: ";
pub const ALERT_PREAMBLE: &str = "Fire Emergency: ";
pub const LOCATION_UNAVAILABLE: &str = "unavailable";
pub const MAPS_LINK_PREFIX: &str = "https://maps.google.com/?q=";
pub const LOCATION_LINK_LENGTH: usize = 100;

// --- Display ---
pub const LCD_COLUMNS: usize = 16;
