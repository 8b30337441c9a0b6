// /src/app.rs
//! Main-loop controller: SMS command handling behind the authorization gate,
//! CO level display and the CO alarm.
//!
//! The controller owns the single buzzer and lends it either to the `BUZ`
//! command or to the alarm sequence, never both at once.

use core::fmt::Write as _;

use embedded_hal_async::delay::DelayNs;
use embedded_io_async::Write;
use heapless::String;

use crate::co_alarm::{AlarmOutcome, AlertSink, CoAlarm};
use crate::commands::{decode, Command};
use crate::constants::*;
use crate::contact_store::ContactStore;
use crate::error::{CommandError, GsmError};
use crate::gps::GpsReceiver;
use crate::gsm_parser::LocationToken;
use crate::peripherals::{Buzzer, CoSensor, Display, Nvm, UartSwitch};
use crate::sim900::Sim900;

/// What a successfully handled command did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Dispatched {
    Displayed,
    Enrolled,
    LocationSent,
    Buzzed,
    CodeChanged,
    /// Authorized sender, unrecognized command
    Ignored,
}

pub struct Controller<'a, W, D, S, N, Dp, B, Co> {
    modem: Sim900<'a, W, D>,
    gps: GpsReceiver<'a, S, D>,
    store: ContactStore<N>,
    display: Dp,
    buzzer: B,
    sensor: Co,
    delay: D,
    co_alarm: CoAlarm,
}

impl<'a, W, D, S, N, Dp, B, Co> Controller<'a, W, D, S, N, Dp, B, Co>
where
    W: Write,
    D: DelayNs,
    S: UartSwitch,
    N: Nvm,
    Dp: Display,
    B: Buzzer,
    Co: CoSensor,
{
    pub fn new(
        modem: Sim900<'a, W, D>,
        gps: GpsReceiver<'a, S, D>,
        store: ContactStore<N>,
        display: Dp,
        buzzer: B,
        sensor: Co,
        delay: D,
    ) -> Self {
        Self {
            modem,
            gps,
            store,
            display,
            buzzer,
            sensor,
            delay,
            co_alarm: CoAlarm::new(),
        }
    }

    /// Brings the modem up, showing progress on the display.
    pub async fn start(&mut self) -> Result<(), GsmError> {
        self.display.clear();
        self.display.write_at(0, 0, " Detecting GSM");
        self.display.write_at(1, 0, "     Module");
        self.modem.init().await?;
        self.display.clear();
        self.display.write_at(0, 0, "GSM Mod Detected");
        Ok(())
    }

    /// One main-loop iteration.
    pub async fn run_once(&mut self) {
        let _ = self.poll_messages().await;
        self.show_co_level();
        let _ = self.poll_co_alarm().await;
    }

    /// Handles at most one inbound SMS.
    ///
    /// `None` when no message is pending. Failures have already been shown
    /// on the display when this returns.
    pub async fn poll_messages(&mut self) -> Option<Result<Dispatched, CommandError>> {
        let location = self.modem.poll_notification()?;
        let result = self.receive_and_dispatch(&location).await;
        if let Err(e) = &result {
            warn!("Command failed: {}", e);
            self.display.clear();
            self.display.write_at(0, 0, e.screen_text());
        }
        Some(result)
    }

    pub fn show_co_level(&mut self) {
        let ppm = self.sensor.read_ppm();
        let mut line: String<LCD_COLUMNS> = String::new();
        let _ = write!(line, "CO = {} PPM", ppm);
        self.display.write_at(0, 0, &line);
    }

    pub async fn poll_co_alarm(&mut self) -> AlarmOutcome {
        let mut sink = ContactBroadcast {
            modem: &mut self.modem,
            gps: &mut self.gps,
            store: &mut self.store,
        };
        self.co_alarm
            .run(&mut self.sensor, &mut self.buzzer, &mut self.delay, &mut sink)
            .await
    }

    async fn receive_and_dispatch(
        &mut self,
        location: &LocationToken,
    ) -> Result<Dispatched, CommandError> {
        let msg = self.modem.read_message(location).await?;

        self.display.clear();
        self.display.write_at(0, 0, "No.: ");
        self.display.write_at(0, 5, &msg.sender);
        self.display.write_at(1, 0, &msg.body);

        // free the modem slot
        if let Err(e) = self.modem.delete_message(&msg.location).await {
            warn!("Could not delete SMS at {}: {}", msg.location.as_str(), e);
        }

        self.dispatch(&msg.sender, &msg.body).await
    }

    /// Runs `body` as a command from `sender`.
    pub async fn dispatch(&mut self, sender: &str, body: &str) -> Result<Dispatched, CommandError> {
        let command = decode(body);
        if command.requires_authorization() && !self.store.contains(sender)? {
            warn!("Unauthorized access from {}", sender);
            return Err(CommandError::Unauthorized);
        }

        match command {
            Command::Display(text) => {
                self.display.clear();
                self.display.write_at(0, 0, text);
                Ok(Dispatched::Displayed)
            }
            Command::Enroll { code } => self.enroll(sender, code),
            Command::Locate => {
                send_coordinates(&mut self.modem, &mut self.gps, sender, LOCATION_PREAMBLE).await?;
                Ok(Dispatched::LocationSent)
            }
            Command::Buzz => {
                self.buzzer.on();
                self.delay.delay_ms(BUZZER_DURATION_MS).await;
                self.buzzer.off();
                Ok(Dispatched::Buzzed)
            }
            Command::ChangeCode { old, new } => {
                if !self.store.code_matches(old) {
                    return Err(CommandError::WrongCode);
                }
                self.store.change_code(new)?;
                self.display.clear();
                self.display.write_at(0, 0, "Code Changed !");
                Ok(Dispatched::CodeChanged)
            }
            Command::Unknown => {
                debug!("Ignoring unknown command from {}", sender);
                Ok(Dispatched::Ignored)
            }
        }
    }

    fn enroll(&mut self, sender: &str, code: &str) -> Result<Dispatched, CommandError> {
        // existence is checked before the code
        if self.store.contains(sender)? {
            return Err(CommandError::AlreadyExists);
        }
        if !self.store.code_matches(code) {
            return Err(CommandError::WrongCode);
        }
        self.store.add(sender)?;

        self.display.clear();
        self.display.write_at(0, 0, "No: ");
        self.display.write_at(0, 4, sender);
        self.display.write_at(1, 0, " Was Stored !");
        Ok(Dispatched::Enrolled)
    }
}

/// Sends `preamble` followed by a map link (or a fallback) to `number`.
async fn send_coordinates<W, S, D>(
    modem: &mut Sim900<'_, W, D>,
    gps: &mut GpsReceiver<'_, S, D>,
    number: &str,
    preamble: &str,
) -> Result<(), GsmError>
where
    W: Write,
    S: UartSwitch,
    D: DelayNs,
{
    let message = location_message(modem, gps, preamble).await;
    modem.send_sms(number, &message).await
}

async fn location_message<W, S, D>(
    modem: &mut Sim900<'_, W, D>,
    gps: &mut GpsReceiver<'_, S, D>,
    preamble: &str,
) -> String<OUTGOING_SMS_MAX_LENGTH>
where
    W: Write,
    S: UartSwitch,
    D: DelayNs,
{
    // the GPS window flushes the inbox
    modem.stash_notifications();

    let mut message = String::new();
    let _ = message.push_str(preamble);
    match gps.locate().await {
        Some(fix) => {
            let _ = message.push_str(&fix.link());
        }
        None => {
            let _ = message.push_str(LOCATION_UNAVAILABLE);
        }
    }
    message
}

/// Alert fan-out to every stored contact.
struct ContactBroadcast<'r, 'a, W, D, S, N> {
    modem: &'r mut Sim900<'a, W, D>,
    gps: &'r mut GpsReceiver<'a, S, D>,
    store: &'r mut ContactStore<N>,
}

impl<W, D, S, N> AlertSink for ContactBroadcast<'_, '_, W, D, S, N>
where
    W: Write,
    D: DelayNs,
    S: UartSwitch,
    N: Nvm,
{
    async fn broadcast_alert(&mut self) -> usize {
        let message = location_message(self.modem, self.gps, ALERT_PREAMBLE).await;
        let mut notified = 0;
        for index in 0..self.store.count() {
            let number = match self.store.number(index) {
                Ok(Some(number)) => number,
                Ok(None) => break,
                Err(e) => {
                    error!("Skipping contact {}: {}", index, e);
                    continue;
                }
            };
            match self.modem.send_sms(&number, &message).await {
                Ok(()) => notified += 1,
                Err(e) => error!("Alert to {} failed: {}", number.as_str(), e),
            }
        }
        info!("CO alert sent to {} contacts", notified);
        notified
    }
}
