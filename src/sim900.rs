// /src/sim900.rs
//! SIM900A driver: AT command side of the SMS protocol.
//!
//! Replies are never awaited on a hardware signal. Every wait polls the inbox
//! snapshot with a fixed interval and gives up after a fixed bound.

use core::fmt::Write as _;

use embedded_hal_async::delay::DelayNs;
use embedded_io_async::Write;
use heapless::{Deque, String};

use crate::constants::*;
use crate::custom_strings::complete_lines_len;
use crate::error::GsmError;
use crate::gsm_parser::{
    find_final_result, find_send_prompt, parse_message_record, parse_notification, FinalResult,
    InboundMessage, LocationToken, Notification,
};
use crate::inbox::Inbox;

const ESC: u8 = 0x1B;
const PENDING_NOTIFICATIONS: usize = 4;

pub struct Sim900<'a, W, D> {
    tx: W,
    inbox: &'a Inbox,
    delay: D,
    // notifications that arrived while a command reply was being consumed
    pending: Deque<LocationToken, PENDING_NOTIFICATIONS>,
}

impl<'a, W: Write, D: DelayNs> Sim900<'a, W, D> {
    pub fn new(tx: W, inbox: &'a Inbox, delay: D) -> Self {
        Self {
            tx,
            inbox,
            delay,
            pending: Deque::new(),
        }
    }

    // --- Initialization ---
    pub async fn init(&mut self) -> Result<(), GsmError> {
        info!("Initializing SIM900...");
        self.inbox.flush();

        // Disable Echo
        self.send_cmd_wait(NO_ECHO_CMD, COMMAND_RESPONSE_TIMEOUT_MS).await?;
        // SMS Text Mode
        self.send_cmd_wait(TEXT_MODE_CMD, COMMAND_RESPONSE_TIMEOUT_MS).await?;

        if PURGE_INBOX_ON_BOOT {
            self.delete_all_messages().await?;
        }

        info!("SIM900 Init Complete");
        Ok(())
    }

    /// Checks the inbox for a new-message notification.
    ///
    /// Returns `None` when nothing complete has arrived yet; that is the
    /// normal idle outcome, not an error.
    pub fn poll_notification(&mut self) -> Option<LocationToken> {
        if let Some(location) = self.pending.pop_front() {
            return Some(location);
        }
        if !self.inbox.take_ready() {
            return None;
        }
        if self.inbox.take_overflow() {
            error!("Modem inbox overflowed, flushing");
            self.inbox.flush();
            return None;
        }

        let snap = self.inbox.snapshot();
        match parse_notification(&snap) {
            Notification::Found { location, end } => {
                info!("New SMS at location {}", location.as_str());
                self.inbox.consume(end);
                Some(location)
            }
            Notification::NotYet { settled } => {
                self.inbox.consume(settled);
                None
            }
        }
    }

    /// Queues every complete notification in the inbox, ahead of the inbox
    /// being flushed for another device on the UART.
    pub fn stash_notifications(&mut self) {
        let snap = self.inbox.snapshot();
        self.consume_handled(&snap, complete_lines_len(&snap));
    }

    /// Reads the message stored at `location`.
    pub async fn read_message(
        &mut self,
        location: &LocationToken,
    ) -> Result<InboundMessage, GsmError> {
        let mut cmd: String<16> = String::new();
        write!(cmd, "{}{}\r", READ_MSG_CMD, location).map_err(|_| GsmError::TooLong)?;
        self.send_raw(cmd.as_bytes()).await?;

        // The modem gives no completion signal; the worst-case delay is what
        // makes the buffer complete.
        self.delay.delay_ms(READ_SETTLE_DELAY_MS).await;

        let snap = self.inbox.snapshot();
        let parsed = parse_message_record(&snap, location);
        self.consume_handled(&snap, snap.len());

        match parsed {
            Ok(msg) => {
                info!("SMS from {}: {}", msg.sender.as_str(), msg.body.as_str());
                Ok(msg)
            }
            Err(e) => {
                warn!("Failed to read SMS at {}: {}", location.as_str(), e);
                Err(e.into())
            }
        }
    }

    /// Frees the modem slot at `location`.
    pub async fn delete_message(&mut self, location: &LocationToken) -> Result<(), GsmError> {
        let mut cmd: String<16> = String::new();
        write!(cmd, "{}{}\r", DELETE_MSG_CMD, location).map_err(|_| GsmError::TooLong)?;
        self.send_cmd_wait(&cmd, COMMAND_RESPONSE_TIMEOUT_MS).await
    }

    pub async fn delete_all_messages(&mut self) -> Result<(), GsmError> {
        info!("Purging modem message storage");
        self.send_cmd_wait(DEL_ALL_MSGS_CMD, SEND_CONFIRM_TIMEOUT_MS).await
    }

    // --- Sending SMS ---
    pub async fn send_sms(&mut self, number: &str, message: &str) -> Result<(), GsmError> {
        if message.len() > OUTGOING_SMS_MAX_LENGTH {
            return Err(GsmError::TooLong);
        }
        info!("Sending SMS to {}", number);

        let mut cmd: String<32> = String::new();
        write!(cmd, "{}\"{}\"\r", SEND_MSG_CMD, number).map_err(|_| GsmError::TooLong)?;
        self.send_raw(cmd.as_bytes()).await?;

        if let Err(e) = self.wait_for_prompt(SEND_PROMPT_TIMEOUT_MS).await {
            error!("No send prompt from modem");
            // abort the pending CMGS so the modem leaves input mode
            let _ = self.send_raw(&[ESC]).await;
            return Err(e);
        }

        self.send_raw(message.as_bytes()).await?;
        self.send_raw(&[CTRL_Z]).await?;

        match self.wait_final(SEND_CONFIRM_TIMEOUT_MS).await {
            Ok(()) => {
                info!("SMS Sent Successfully");
                Ok(())
            }
            Err(e) => {
                error!("SMS Send Failed: {}", e);
                Err(e)
            }
        }
    }

    // --- Helpers ---

    async fn send_raw(&mut self, bytes: &[u8]) -> Result<(), GsmError> {
        debug!("TX: {=[u8]:a}", bytes);
        self.tx.write_all(bytes).await.map_err(|_| GsmError::Link)
    }

    async fn send_cmd_wait(&mut self, cmd: &str, timeout_ms: u32) -> Result<(), GsmError> {
        self.send_raw(cmd.as_bytes()).await?;
        self.wait_final(timeout_ms).await
    }

    async fn wait_final(&mut self, timeout_ms: u32) -> Result<(), GsmError> {
        let mut waited = 0;
        loop {
            let snap = self.inbox.snapshot();
            if let Some((result, end)) = find_final_result(&snap) {
                self.consume_handled(&snap, end);
                return match result {
                    FinalResult::Ok => Ok(()),
                    FinalResult::Error => Err(GsmError::Rejected),
                };
            }
            if waited >= timeout_ms {
                return Err(GsmError::TimedOut);
            }
            self.delay.delay_ms(MODEM_POLL_INTERVAL_MS).await;
            waited += MODEM_POLL_INTERVAL_MS;
        }
    }

    async fn wait_for_prompt(&mut self, timeout_ms: u32) -> Result<(), GsmError> {
        let mut waited = 0;
        loop {
            let snap = self.inbox.snapshot();
            if let Some(pos) = find_send_prompt(&snap) {
                self.consume_handled(&snap, pos + 1);
                return Ok(());
            }
            if waited >= timeout_ms {
                return Err(GsmError::TimedOut);
            }
            self.delay.delay_ms(MODEM_POLL_INTERVAL_MS).await;
            waited += MODEM_POLL_INTERVAL_MS;
        }
    }

    /// Drops `snap[..end]` from the inbox, keeping any notification in it.
    fn consume_handled(&mut self, snap: &[u8], end: usize) {
        let mut rest = &snap[..end];
        while let Notification::Found { location, end } = parse_notification(rest) {
            if self.pending.push_back(location).is_err() {
                warn!("Notification queue full, dropping notification");
            }
            rest = &rest[end..];
        }
        self.inbox.consume(end);
    }
}
