// /src/gps.rs
//! Position fixes from the GPS receiver sharing the modem UART.

use core::fmt::Write as _;
use core::str::from_utf8;

use embedded_hal_async::delay::DelayNs;
use heapless::String;

use crate::constants::{
    GPS_LISTEN_WINDOW_MS, GPS_POLL_INTERVAL_MS, LOCATION_LINK_LENGTH, MAPS_LINK_PREFIX,
};
use crate::custom_strings::complete_lines_len;
use crate::inbox::Inbox;
use crate::peripherals::{UartRoute, UartSwitch};

pub type LocationLink = String<LOCATION_LINK_LENGTH>;

/// Position in millionths of a degree, positive north and east.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Fix {
    pub lat_micro: i32,
    pub lon_micro: i32,
}

impl Fix {
    pub fn link(&self) -> LocationLink {
        let mut link = LocationLink::new();
        // prefix plus two signed coordinates always fits
        let _ = write!(
            link,
            "{}{},{}",
            MAPS_LINK_PREFIX,
            Degrees(self.lat_micro),
            Degrees(self.lon_micro)
        );
        link
    }
}

struct Degrees(i32);

impl core::fmt::Display for Degrees {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:06}", sign, abs / 1_000_000, abs % 1_000_000)
    }
}

/// Parses a `$GPRMC`/`$GNRMC` sentence; only active (`A`) fixes count.
pub fn parse_rmc(sentence: &str) -> Option<Fix> {
    let sentence = sentence.trim();
    let body = sentence.strip_prefix('$')?;
    let (body, checksum) = match body.split_once('*') {
        Some((body, sum)) => (body, Some(sum)),
        None => (body, None),
    };
    if let Some(sum) = checksum {
        let expected = u8::from_str_radix(sum.get(..2)?, 16).ok()?;
        if body.bytes().fold(0u8, |acc, b| acc ^ b) != expected {
            return None;
        }
    }

    let mut fields = body.split(',');
    let talker = fields.next()?;
    if !(talker.ends_with("RMC") && talker.len() == 5) {
        return None;
    }
    let _time = fields.next()?;
    if fields.next()? != "A" {
        return None;
    }
    let lat = parse_coordinate(fields.next()?, fields.next()?, 'N', 'S')?;
    let lon = parse_coordinate(fields.next()?, fields.next()?, 'E', 'W')?;
    Some(Fix {
        lat_micro: lat,
        lon_micro: lon,
    })
}

/// Converts NMEA `(d)ddmm.mmmm` plus hemisphere to micro-degrees.
fn parse_coordinate(value: &str, hemisphere: &str, positive: char, negative: char) -> Option<i32> {
    let (whole, frac) = value.split_once('.').unwrap_or((value, ""));
    // (d)ddmm: at most three degree digits
    if !(3..=5).contains(&whole.len()) || !whole.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let whole: u32 = whole.parse().ok()?;
    let degrees = whole / 100;
    let minutes = whole % 100;
    if minutes >= 60 {
        return None;
    }

    let mut frac_micro = 0u32;
    let mut scale = 100_000u32;
    for b in frac.bytes().take(6) {
        if !b.is_ascii_digit() {
            return None;
        }
        frac_micro += (b - b'0') as u32 * scale;
        scale /= 10;
    }

    let minutes_micro = minutes * 1_000_000 + frac_micro;
    let micro = degrees
        .checked_mul(1_000_000)?
        .checked_add(minutes_micro / 60)?;
    let micro = i32::try_from(micro).ok()?;

    let mut chars = hemisphere.chars();
    match (chars.next(), chars.next()) {
        (Some(h), None) if h == positive => Some(micro),
        (Some(h), None) if h == negative => Some(-micro),
        _ => None,
    }
}

/// First valid fix among the complete lines of `buf`.
pub fn find_fix(buf: &[u8]) -> Option<Fix> {
    buf[..complete_lines_len(buf)]
        .split(|&b| b == b'\n')
        .filter_map(|line| from_utf8(line).ok())
        .find_map(parse_rmc)
}

pub struct GpsReceiver<'a, S, D> {
    switch: S,
    inbox: &'a Inbox,
    delay: D,
}

impl<'a, S: UartSwitch, D: DelayNs> GpsReceiver<'a, S, D> {
    pub fn new(switch: S, inbox: &'a Inbox, delay: D) -> Self {
        Self {
            switch,
            inbox,
            delay,
        }
    }

    /// Borrows the UART for a bounded window and returns the first valid fix.
    ///
    /// The UART is always routed back to the modem before returning.
    pub async fn locate(&mut self) -> Option<Fix> {
        self.inbox.flush();
        self.switch.route(UartRoute::Gps);

        let mut waited = 0;
        let fix = loop {
            let snap = self.inbox.snapshot();
            let found = find_fix(&snap);
            if found.is_some() || waited >= GPS_LISTEN_WINDOW_MS {
                break found;
            }
            // keep only the sentence still being received
            self.inbox.consume(complete_lines_len(&snap));
            self.delay.delay_ms(GPS_POLL_INTERVAL_MS).await;
            waited += GPS_POLL_INTERVAL_MS;
        };

        self.switch.route(UartRoute::Gsm);
        self.inbox.flush();

        match fix {
            Some(f) => debug!("GPS fix {}", f),
            None => warn!("No GPS fix within {} ms", GPS_LISTEN_WINDOW_MS),
        }
        fix
    }
}
