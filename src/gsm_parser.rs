// /src/gsm_parser.rs
//! Parsers for the text the modem echoes into the inbox.
//!
//! All functions work on a snapshot of the inbox and report how many leading
//! bytes they handled, so the caller can drop exactly those.

use core::str::from_utf8;

use heapless::String;

use crate::constants::{DIAL_NUMBER_LENGTH, MAX_BODY_LENGTH, MAX_LOCATION_LENGTH};
use crate::custom_strings::{complete_lines_len, find_byte_from, find_subslice};
use crate::error::ReceiveError;

pub const NOTIFICATION_MARKER: &[u8] = b"+CMTI:";
pub const MESSAGE_RECORD_MARKER: &[u8] = b"+CMGR:";
pub const SEND_PROMPT: u8 = b'>';

/// Opaque key into the modem's message storage.
pub type LocationToken = String<MAX_LOCATION_LENGTH>;
pub type PhoneNumber = String<DIAL_NUMBER_LENGTH>;
pub type MessageBody = String<MAX_BODY_LENGTH>;

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InboundMessage {
    pub sender: PhoneNumber,
    pub body: MessageBody,
    pub location: LocationToken,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Notification {
    /// New message stored at `location`; bytes `..end` are handled.
    Found { location: LocationToken, end: usize },
    /// No complete notification yet; bytes `..settled` hold nothing of interest.
    NotYet { settled: usize },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FinalResult {
    Ok,
    Error,
}

/// Scans for an unsolicited `+CMTI: "<mem>",<index>` line.
pub fn parse_notification(buf: &[u8]) -> Notification {
    let mut from = 0;
    while let Some(rel) = find_subslice(&buf[from..], NOTIFICATION_MARKER) {
        let marker = from + rel;
        let after = marker + NOTIFICATION_MARKER.len();
        let Some(line_end) = find_byte_from(buf, after, b'\r') else {
            // still arriving: keep the marker, drop what precedes it
            return Notification::NotYet { settled: marker };
        };
        let end = if buf.get(line_end + 1) == Some(&b'\n') {
            line_end + 2
        } else {
            line_end + 1
        };
        if let Some(location) = location_token(&buf[after..line_end]) {
            return Notification::Found { location, end };
        }
        warn!("Skipping malformed message notification");
        from = end;
    }
    Notification::NotYet {
        settled: from.max(complete_lines_len(buf)),
    }
}

fn location_token(field: &[u8]) -> Option<LocationToken> {
    let comma = find_byte_from(field, 0, b',')?;
    let raw = from_utf8(&field[comma + 1..]).ok()?.trim();
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return None;
    }
    let mut token = LocationToken::new();
    token.push_str(raw).ok()?;
    Some(token)
}

/// Extracts sender and body from a `+CMGR:` answer.
///
/// The sender is the fixed-length run starting two characters after the
/// first comma following the marker (skipping the opening quote). The body
/// runs from the next line feed up to the following carriage return and is
/// truncated to [`MAX_BODY_LENGTH`].
pub fn parse_message_record(
    buf: &[u8],
    location: &LocationToken,
) -> Result<InboundMessage, ReceiveError> {
    let marker = find_subslice(buf, MESSAGE_RECORD_MARKER).ok_or(ReceiveError::MissingRecord)?;
    let comma = find_byte_from(buf, marker, b',').ok_or(ReceiveError::MalformedRecord)?;
    let start = comma + 2;
    let number_end = start + DIAL_NUMBER_LENGTH;
    let number_bytes = buf
        .get(start..number_end)
        .ok_or(ReceiveError::MalformedRecord)?;
    if !is_dial_number(number_bytes) {
        return Err(ReceiveError::MalformedRecord);
    }
    let mut sender = PhoneNumber::new();
    sender
        .push_str(from_utf8(number_bytes).map_err(|_| ReceiveError::InvalidText)?)
        .map_err(|_| ReceiveError::MalformedRecord)?;

    let newline = find_byte_from(buf, number_end, b'\n').ok_or(ReceiveError::MalformedRecord)?;
    let body_start = newline + 1;
    let body_end = find_byte_from(buf, body_start, b'\r').unwrap_or(buf.len());
    let text = from_utf8(&buf[body_start..body_end]).map_err(|_| ReceiveError::InvalidText)?;

    let mut body = MessageBody::new();
    for c in text.chars() {
        if body.push(c).is_err() {
            break;
        }
    }

    Ok(InboundMessage {
        sender,
        body,
        location: location.clone(),
    })
}

fn is_dial_number(bytes: &[u8]) -> bool {
    match bytes.split_first() {
        Some((&first, rest)) => {
            (first == b'+' || first.is_ascii_digit()) && rest.iter().all(u8::is_ascii_digit)
        }
        None => false,
    }
}

/// Position of the `>` send prompt, if the modem has emitted it.
pub fn find_send_prompt(buf: &[u8]) -> Option<usize> {
    find_byte_from(buf, 0, SEND_PROMPT)
}

/// Finds the first complete `OK` / `ERROR` line and the end of that line.
pub fn find_final_result(buf: &[u8]) -> Option<(FinalResult, usize)> {
    let mut start = 0;
    while let Some(nl) = find_byte_from(buf, start, b'\n') {
        let line = buf[start..nl].trim_ascii();
        let end = nl + 1;
        if line == b"OK" {
            return Some((FinalResult::Ok, end));
        }
        if line == b"ERROR" || line.starts_with(b"+CMS ERROR") || line.starts_with(b"+CME ERROR") {
            return Some((FinalResult::Error, end));
        }
        start = end;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(s: &str) -> LocationToken {
        let mut t = LocationToken::new();
        t.push_str(s).unwrap();
        t
    }

    #[test]
    fn notification_yields_location_token() {
        let buf = b"\r\n+CMTI: \"SM\",3\r\n";
        assert_eq!(
            parse_notification(buf),
            Notification::Found {
                location: token("3"),
                end: buf.len()
            }
        );
    }

    #[test]
    fn notification_after_other_responses() {
        let buf = b"\r\nOK\r\n\r\n+CMTI: \"SM\",12\r\n";
        match parse_notification(buf) {
            Notification::Found { location, .. } => assert_eq!(location.as_str(), "12"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn missing_marker_is_not_an_error() {
        assert_eq!(
            parse_notification(b"\r\nOK\r\n"),
            Notification::NotYet { settled: 6 }
        );
        assert_eq!(parse_notification(b""), Notification::NotYet { settled: 0 });
    }

    #[test]
    fn partial_notification_is_kept() {
        let buf = b"\r\nOK\r\n\r\n+CMTI: \"SM\",";
        assert_eq!(parse_notification(buf), Notification::NotYet { settled: 8 });
    }

    #[test]
    fn malformed_notification_is_skipped() {
        let buf = b"+CMTI: \"SM\"\r\n+CMTI: \"SM\",4\r\n";
        match parse_notification(buf) {
            Notification::Found { location, end } => {
                assert_eq!(location.as_str(), "4");
                assert_eq!(end, buf.len());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn over_long_token_is_skipped() {
        let buf = b"+CMTI: \"SM\",123456\r\n";
        assert_eq!(
            parse_notification(buf),
            Notification::NotYet { settled: buf.len() }
        );
    }

    #[test]
    fn message_record_extracts_sender_and_body() {
        let buf = b"\r\n+CMGR: \"REC UNREAD\",\"+011234567890\",\"\",\"23/12/02,10:00:00+08\"\r\nDISP hello\r\n\r\nOK\r\n";
        let msg = parse_message_record(buf, &token("3")).unwrap();
        assert_eq!(msg.sender.as_str(), "+011234567890");
        assert_eq!(msg.body.as_str(), "DISP hello");
        assert_eq!(msg.location.as_str(), "3");
    }

    #[test]
    fn message_body_is_truncated() {
        let buf = b"+CMGR: \"REC UNREAD\",\"+011234567890\",\"\",\"23/12/02\"\r\nDISP 0123456789012345678901234567890123456789\r\n";
        let msg = parse_message_record(buf, &token("1")).unwrap();
        assert_eq!(msg.body.len(), MAX_BODY_LENGTH);
        assert!(msg.body.starts_with("DISP 0123"));
    }

    #[test]
    fn missing_record_is_receive_error() {
        assert_eq!(
            parse_message_record(b"\r\nERROR\r\n", &token("3")),
            Err(ReceiveError::MissingRecord)
        );
    }

    #[test]
    fn truncated_header_is_malformed() {
        assert_eq!(
            parse_message_record(b"+CMGR: \"REC UNREAD\",\"+0112", &token("3")),
            Err(ReceiveError::MalformedRecord)
        );
    }

    #[test]
    fn prompt_and_final_results() {
        assert_eq!(find_send_prompt(b"\r\n> "), Some(2));
        assert_eq!(find_send_prompt(b"\r\n"), None);
        assert_eq!(
            find_final_result(b"\r\n+CMGS: 7\r\n\r\nOK\r\n"),
            Some((FinalResult::Ok, 18))
        );
        assert_eq!(
            find_final_result(b"\r\n+CMS ERROR: 500\r\n"),
            Some((FinalResult::Error, 19))
        );
        assert_eq!(find_final_result(b"\r\nO"), None);
    }
}
