//! In-memory stand-ins for the board, used by the unit tests.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::string::String;
use std::vec::Vec;

use embedded_hal_async::delay::DelayNs;

use crate::constants::{CTRL_Z, STORE_SIZE};
use crate::error::NvmError;
use crate::inbox::Inbox;
use crate::peripherals::{Buzzer, CoSensor, Display, Nvm, UartRoute, UartSwitch};

// --- Time ---

#[derive(Clone, Default)]
pub struct VirtualClock {
    now_ns: Rc<Cell<u64>>,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ns.get() / 1_000_000
    }

    pub fn delay(&self) -> VirtualDelay {
        VirtualDelay {
            clock: self.clone(),
        }
    }
}

/// Delay that advances the virtual clock instead of sleeping.
#[derive(Clone)]
pub struct VirtualDelay {
    clock: VirtualClock,
}

impl DelayNs for VirtualDelay {
    async fn delay_ns(&mut self, ns: u32) {
        let now = &self.clock.now_ns;
        now.set(now.get() + ns as u64);
    }

    async fn delay_ms(&mut self, ms: u32) {
        let now = &self.clock.now_ns;
        now.set(now.get() + ms as u64 * 1_000_000);
    }
}

// --- Storage ---

#[derive(Clone)]
pub struct RamNvm {
    bytes: Rc<RefCell<Vec<u8>>>,
    writes_left: Rc<Cell<Option<usize>>>,
}

impl RamNvm {
    /// Fresh storage, erased to `0xFF`.
    pub fn new() -> Self {
        Self {
            bytes: Rc::new(RefCell::new(vec![0xFF; STORE_SIZE])),
            writes_left: Rc::new(Cell::new(None)),
        }
    }

    /// Simulates power loss: writes after the next `n` are silently lost.
    pub fn lose_power_after(&self, n: usize) {
        self.writes_left.set(Some(n));
    }

    pub fn restore_power(&self) {
        self.writes_left.set(None);
    }

    pub fn peek(&self, address: u16) -> u8 {
        self.bytes.borrow()[address as usize]
    }

    pub fn poke(&self, address: u16, byte: u8) {
        self.bytes.borrow_mut()[address as usize] = byte;
    }
}

impl Nvm for RamNvm {
    fn read_byte(&mut self, address: u16) -> Result<u8, NvmError> {
        self.bytes
            .borrow()
            .get(address as usize)
            .copied()
            .ok_or(NvmError::OutOfRange)
    }

    fn write_byte(&mut self, address: u16, byte: u8) -> Result<(), NvmError> {
        match self.writes_left.get() {
            Some(0) => return Ok(()),
            Some(n) => self.writes_left.set(Some(n - 1)),
            None => {}
        }
        let mut bytes = self.bytes.borrow_mut();
        let slot = bytes.get_mut(address as usize).ok_or(NvmError::OutOfRange)?;
        *slot = byte;
        Ok(())
    }
}

// --- Display and buzzer ---

#[derive(Clone, Default)]
pub struct RecordingDisplay {
    writes: Rc<RefCell<Vec<(u8, u8, String)>>>,
    clears: Rc<Cell<usize>>,
}

impl RecordingDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shows(&self, text: &str) -> bool {
        self.writes.borrow().iter().any(|(_, _, t)| t == text)
    }

    pub fn last_text(&self) -> Option<String> {
        self.writes.borrow().last().map(|(_, _, t)| t.clone())
    }
}

impl Display for RecordingDisplay {
    fn clear(&mut self) {
        self.clears.set(self.clears.get() + 1);
    }

    fn write_at(&mut self, row: u8, col: u8, text: &str) {
        self.writes.borrow_mut().push((row, col, text.into()));
    }
}

#[derive(Clone, Default)]
pub struct RecordingBuzzer {
    on: Rc<Cell<bool>>,
    on_calls: Rc<Cell<usize>>,
    off_calls: Rc<Cell<usize>>,
}

impl RecordingBuzzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_on(&self) -> bool {
        self.on.get()
    }

    pub fn on_calls(&self) -> usize {
        self.on_calls.get()
    }

    pub fn off_calls(&self) -> usize {
        self.off_calls.get()
    }
}

impl Buzzer for RecordingBuzzer {
    fn on(&mut self) {
        self.on.set(true);
        self.on_calls.set(self.on_calls.get() + 1);
    }

    fn off(&mut self) {
        self.on.set(false);
        self.off_calls.set(self.off_calls.get() + 1);
    }
}

// --- Sensor ---

/// Comparator asserted while the virtual clock is inside `[from, until)`.
#[derive(Clone)]
pub struct ScriptedSensor {
    clock: VirtualClock,
    window: Option<(u64, u64)>,
    ppm: u16,
}

impl ScriptedSensor {
    pub fn quiet(clock: &VirtualClock) -> Self {
        Self {
            clock: clock.clone(),
            window: None,
            ppm: 12,
        }
    }

    pub fn asserted_between(clock: &VirtualClock, from_ms: u64, until_ms: u64) -> Self {
        Self {
            clock: clock.clone(),
            window: Some((from_ms, until_ms)),
            ppm: 420,
        }
    }
}

impl CoSensor for ScriptedSensor {
    fn threshold_exceeded(&mut self) -> bool {
        let now = self.clock.now_ms();
        self.window
            .is_some_and(|(from, until)| now >= from && now < until)
    }

    fn read_ppm(&mut self) -> u16 {
        self.ppm
    }
}

// --- GPS relay ---

#[derive(Clone)]
pub struct FakeSwitch<'a> {
    inbox: &'a Inbox,
    nmea: Option<&'static [u8]>,
    routes: Rc<RefCell<Vec<UartRoute>>>,
}

impl<'a> FakeSwitch<'a> {
    pub fn new(inbox: &'a Inbox, nmea: Option<&'static [u8]>) -> Self {
        Self {
            inbox,
            nmea,
            routes: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn routes(&self) -> Vec<UartRoute> {
        self.routes.borrow().clone()
    }
}

impl UartSwitch for FakeSwitch<'_> {
    fn route(&mut self, route: UartRoute) {
        self.routes.borrow_mut().push(route);
        if route == UartRoute::Gps {
            if let Some(nmea) = self.nmea {
                self.inbox.push_bytes(nmea);
            }
        }
    }
}

// --- Modem ---

#[derive(Default)]
struct ScriptState {
    silent: bool,
    no_prompt: bool,
    reject_sends: bool,
    messages: Vec<(String, Vec<u8>)>,
    commands: Vec<String>,
    sent: Vec<(String, String)>,
    line: Vec<u8>,
    payload_for: Option<String>,
}

/// Shared handle describing how the fake modem answers.
#[derive(Clone, Default)]
pub struct ModemScript {
    state: Rc<RefCell<ScriptState>>,
}

impl ModemScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_silent(&self, silent: bool) {
        self.state.borrow_mut().silent = silent;
    }

    pub fn set_prompt(&self, prompt: bool) {
        self.state.borrow_mut().no_prompt = !prompt;
    }

    pub fn reject_sends(&self) {
        self.state.borrow_mut().reject_sends = true;
    }

    /// Answer returned for `AT+CMGR=<location>`.
    pub fn store_message(&self, location: &str, reply: &[u8]) {
        self.state
            .borrow_mut()
            .messages
            .push((location.into(), reply.to_vec()));
    }

    pub fn commands(&self) -> Vec<String> {
        self.state.borrow().commands.clone()
    }

    pub fn sent_sms(&self) -> Vec<(String, String)> {
        self.state.borrow().sent.clone()
    }
}

/// UART TX end of a fake modem; replies land in the inbox immediately.
pub struct ScriptedModem<'a> {
    inbox: &'a Inbox,
    script: ModemScript,
}

impl<'a> ScriptedModem<'a> {
    pub fn new(inbox: &'a Inbox, script: &ModemScript) -> Self {
        Self {
            inbox,
            script: script.clone(),
        }
    }

    fn feed(&mut self, byte: u8) {
        let mut state = self.script.state.borrow_mut();
        if state.payload_for.is_some() {
            if byte == CTRL_Z {
                let number = state.payload_for.take().unwrap_or_default();
                let text = String::from_utf8_lossy(&state.line).into_owned();
                state.line.clear();
                if state.reject_sends {
                    self.inbox.push_bytes(b"\r\n+CMS ERROR: 500\r\n");
                } else {
                    state.sent.push((number, text));
                    self.inbox.push_bytes(b"\r\n+CMGS: 1\r\n\r\nOK\r\n");
                }
            } else {
                state.line.push(byte);
            }
            return;
        }

        if byte == 0x1B {
            // ESC cancels whatever was being typed
            state.line.clear();
            return;
        }
        if byte != b'\r' {
            state.line.push(byte);
            return;
        }
        let command = String::from_utf8_lossy(&state.line).trim().to_owned();
        state.line.clear();
        state.commands.push(command.clone());
        if state.silent {
            return;
        }

        if let Some(location) = command.strip_prefix("AT+CMGR=") {
            let reply = state
                .messages
                .iter()
                .find(|(l, _)| l == location)
                .map(|(_, r)| r.clone());
            match reply {
                Some(reply) => self.inbox.push_bytes(&reply),
                None => self.inbox.push_bytes(b"\r\nOK\r\n"),
            }
        } else if let Some(quoted) = command.strip_prefix("AT+CMGS=") {
            if !state.no_prompt {
                state.payload_for = Some(quoted.trim_matches('"').to_owned());
                self.inbox.push_bytes(b"\r\n> ");
            }
        } else {
            self.inbox.push_bytes(b"\r\nOK\r\n");
        }
    }
}

impl embedded_io_async::ErrorType for ScriptedModem<'_> {
    type Error = core::convert::Infallible;
}

impl embedded_io_async::Write for ScriptedModem<'_> {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        for &b in buf {
            self.feed(b);
        }
        Ok(buf.len())
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}
