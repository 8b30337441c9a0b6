// /src/commands.rs
//! SMS command grammar. Dispatch is on the first character only:
//!
//! * `DISP <text>` show text on the display
//! * `ENT <code>` enroll the sender
//! * `LOC` reply with the current position
//! * `BUZ` sound the buzzer
//! * `CNFG <old> <new>` rotate the confirmation code

use crate::custom_strings::extract_after_delimiter;

const DISPLAY_PREFIX_LEN: usize = "DISP ".len();
const ENROLL_PREFIX_LEN: usize = "ENT ".len();

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command<'a> {
    Display(&'a str),
    Enroll { code: &'a str },
    Locate,
    Buzz,
    ChangeCode { old: &'a str, new: &'a str },
    Unknown,
}

impl Command<'_> {
    /// Display and enrollment must work for numbers that are not stored yet.
    pub fn requires_authorization(&self) -> bool {
        !matches!(self, Command::Display(_) | Command::Enroll { .. })
    }
}

pub fn decode(body: &str) -> Command<'_> {
    match body.as_bytes().first() {
        Some(b'D') => Command::Display(body.get(DISPLAY_PREFIX_LEN..).unwrap_or("")),
        Some(b'E') => Command::Enroll {
            code: body.get(ENROLL_PREFIX_LEN..).unwrap_or(""),
        },
        Some(b'L') => Command::Locate,
        Some(b'B') => Command::Buzz,
        Some(b'C') => {
            let args = extract_after_delimiter(body, " ").unwrap_or("");
            let (old, new) = args.split_once(' ').unwrap_or((args, ""));
            Command::ChangeCode { old, new }
        }
        _ => Command::Unknown,
    }
}
