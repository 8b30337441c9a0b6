// /src/contact_store.rs
//! Authorized phone numbers and the confirmation code, persisted in NVM.
//!
//! Layout (see `constants.rs` for addresses):
//!
//! | addr   | len | field                                 |
//! |--------|-----|---------------------------------------|
//! | `0x00` | 1   | configured marker `'$'`               |
//! | `0x01` | 1   | layout version                        |
//! | `0x02` | 6   | confirmation code                     |
//! | `0x08` | 1   | code checksum                         |
//! | `0x09` | 1   | contact count                         |
//! | `0x0A` | 1   | count check byte (`!count`)           |
//! | `0x10` | 12n | records: marker, national digits, sum |
//!
//! Records are written marker-last and the count is written after the
//! record, so a torn write leaves at most an orphan slot that the next
//! enrollment reuses.

use heapless::String;

use crate::constants::*;
use crate::error::StoreError;
use crate::gsm_parser::PhoneNumber;
use crate::peripherals::Nvm;

pub type ConfirmationCode = String<CONFIRM_CODE_LENGTH>;

pub struct ContactStore<N> {
    nvm: N,
    code: ConfirmationCode,
    count: usize,
}

impl<N: Nvm> ContactStore<N> {
    /// Loads the store, writing factory defaults on first boot.
    pub fn open(mut nvm: N) -> Result<Self, StoreError> {
        if nvm.read_byte(MARKER_ADDR)? != STORE_CONFIGURED_MARKER {
            info!("Contact store unconfigured, writing factory defaults");
            return Self::factory_reset(nvm);
        }
        if nvm.read_byte(VERSION_ADDR)? != STORE_LAYOUT_VERSION {
            return Err(StoreError::Corrupted {
                address: VERSION_ADDR,
            });
        }

        let code = match read_code(&mut nvm)? {
            Some(code) => code,
            None => {
                warn!("Confirmation code corrupted, restoring factory code");
                write_code(&mut nvm, FACTORY_CONFIRMATION_CODE)?;
                factory_code()
            }
        };

        let mut store = Self {
            nvm,
            code,
            count: 0,
        };
        let count = store.nvm.read_byte(COUNT_ADDR)?;
        let check = store.nvm.read_byte(COUNT_CHECK_ADDR)?;
        if check == !count && (count as usize) <= MAX_CONTACTS {
            store.count = count as usize;
        } else {
            warn!("Contact count unreadable, rebuilding from records");
            store.count = store.scan_valid_records()?;
            store.write_count(store.count)?;
        }

        info!("Contact store loaded with {} contacts", store.count);
        Ok(store)
    }

    /// Erases the contact list and restores the factory confirmation code.
    pub fn factory_reset(mut nvm: N) -> Result<Self, StoreError> {
        nvm.write_byte(MARKER_ADDR, 0xFF)?;
        nvm.write_byte(VERSION_ADDR, STORE_LAYOUT_VERSION)?;
        write_code(&mut nvm, FACTORY_CONFIRMATION_CODE)?;
        nvm.write_byte(COUNT_ADDR, 0)?;
        nvm.write_byte(COUNT_CHECK_ADDR, !0)?;
        // marker last: an interrupted format is redone on the next boot
        nvm.write_byte(MARKER_ADDR, STORE_CONFIGURED_MARKER)?;
        Ok(Self {
            nvm,
            code: factory_code(),
            count: 0,
        })
    }

    /// Like [`open`](Self::open), but formats a store left by another layout
    /// version instead of refusing it.
    pub fn open_or_reset(mut nvm: N) -> Result<Self, StoreError> {
        if nvm.read_byte(MARKER_ADDR)? == STORE_CONFIGURED_MARKER
            && nvm.read_byte(VERSION_ADDR)? != STORE_LAYOUT_VERSION
        {
            warn!("Contact store layout changed, formatting");
            return Self::factory_reset(nvm);
        }
        Self::open(nvm)
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Linear scan for an exact match on the full dialed number.
    ///
    /// A corrupted slot is skipped, so it cannot lock out the contacts after it.
    pub fn contains(&mut self, number: &str) -> Result<bool, StoreError> {
        for index in 0..self.count {
            match self.number(index) {
                Ok(Some(stored)) if stored.as_str() == number => return Ok(true),
                Ok(_) => {}
                Err(StoreError::Corrupted { address }) => {
                    warn!("Skipping corrupted contact record at {=u16:#x}", address);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(false)
    }

    /// Reconstructs record `index` as prefix plus stored digits.
    pub fn number(&mut self, index: usize) -> Result<Option<PhoneNumber>, StoreError> {
        if index >= self.count {
            return Ok(None);
        }
        let digits = self.read_record(index)?.ok_or(StoreError::Corrupted {
            address: record_addr(index),
        })?;

        let mut number = PhoneNumber::new();
        number
            .push_str(COUNTRY_CODE_PREFIX)
            .map_err(|_| StoreError::InvalidNumber)?;
        for &d in &digits {
            number.push(d as char).map_err(|_| StoreError::InvalidNumber)?;
        }
        Ok(Some(number))
    }

    /// Appends `number` to the next free slot.
    pub fn add(&mut self, number: &str) -> Result<(), StoreError> {
        let digits = national_digits(number).ok_or(StoreError::InvalidNumber)?;
        if self.contains(number)? {
            return Err(StoreError::Duplicate);
        }
        if self.count >= MAX_CONTACTS {
            return Err(StoreError::Full);
        }

        let base = record_addr(self.count);
        self.nvm.write_byte(base, 0x00)?;
        for (i, &d) in digits.iter().enumerate() {
            self.nvm.write_byte(base + 1 + i as u16, d)?;
        }
        self.nvm
            .write_byte(base + 1 + NATIONAL_NUMBER_LENGTH as u16, checksum(digits))?;
        self.nvm.write_byte(base, RECORD_VALID_MARKER)?;

        self.write_count(self.count + 1)?;
        self.count += 1;
        info!("Stored contact {} in slot {}", number, self.count - 1);
        Ok(())
    }

    /// Exact, case-sensitive comparison against the active code.
    pub fn code_matches(&self, candidate: &str) -> bool {
        self.code.as_str() == candidate
    }

    pub fn change_code(&mut self, new_code: &str) -> Result<(), StoreError> {
        if new_code.len() != CONFIRM_CODE_LENGTH
            || !new_code.bytes().all(|b| b.is_ascii_alphanumeric())
        {
            return Err(StoreError::InvalidCode);
        }
        write_code(&mut self.nvm, new_code)?;
        self.code.clear();
        self.code
            .push_str(new_code)
            .map_err(|_| StoreError::InvalidCode)?;
        info!("Confirmation code changed");
        Ok(())
    }

    fn read_record(
        &mut self,
        index: usize,
    ) -> Result<Option<[u8; NATIONAL_NUMBER_LENGTH]>, StoreError> {
        let base = record_addr(index);
        if self.nvm.read_byte(base)? != RECORD_VALID_MARKER {
            return Ok(None);
        }
        let mut digits = [0u8; NATIONAL_NUMBER_LENGTH];
        for (i, d) in digits.iter_mut().enumerate() {
            *d = self.nvm.read_byte(base + 1 + i as u16)?;
        }
        let sum = self
            .nvm
            .read_byte(base + 1 + NATIONAL_NUMBER_LENGTH as u16)?;
        if sum != checksum(&digits) || !digits.iter().all(u8::is_ascii_digit) {
            return Ok(None);
        }
        Ok(Some(digits))
    }

    fn scan_valid_records(&mut self) -> Result<usize, StoreError> {
        let mut valid = 0;
        while valid < MAX_CONTACTS && self.read_record(valid)?.is_some() {
            valid += 1;
        }
        Ok(valid)
    }

    fn write_count(&mut self, count: usize) -> Result<(), StoreError> {
        let count = count as u8;
        self.nvm.write_byte(COUNT_ADDR, count)?;
        self.nvm.write_byte(COUNT_CHECK_ADDR, !count)?;
        Ok(())
    }
}

fn record_addr(index: usize) -> u16 {
    NUM_BOOK_START_ADDR + (index * RECORD_SIZE) as u16
}

/// Digits after the country prefix, if `number` has the expected shape.
fn national_digits(number: &str) -> Option<&[u8]> {
    let digits = number.strip_prefix(COUNTRY_CODE_PREFIX)?.as_bytes();
    (digits.len() == NATIONAL_NUMBER_LENGTH && digits.iter().all(u8::is_ascii_digit))
        .then_some(digits)
}

fn checksum(bytes: &[u8]) -> u8 {
    bytes
        .iter()
        .fold(0x5A, |acc: u8, &b| acc.rotate_left(1) ^ b)
}

fn factory_code() -> ConfirmationCode {
    let mut code = ConfirmationCode::new();
    // FACTORY_CONFIRMATION_CODE is CONFIRM_CODE_LENGTH bytes
    let _ = code.push_str(FACTORY_CONFIRMATION_CODE);
    code
}

fn write_code<N: Nvm>(nvm: &mut N, code: &str) -> Result<(), StoreError> {
    let bytes = code.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        nvm.write_byte(CODE_ADDR + i as u16, b)?;
    }
    nvm.write_byte(CODE_CHECKSUM_ADDR, checksum(bytes))?;
    Ok(())
}

fn read_code<N: Nvm>(nvm: &mut N) -> Result<Option<ConfirmationCode>, StoreError> {
    let mut bytes = [0u8; CONFIRM_CODE_LENGTH];
    for (i, b) in bytes.iter_mut().enumerate() {
        *b = nvm.read_byte(CODE_ADDR + i as u16)?;
    }
    if nvm.read_byte(CODE_CHECKSUM_ADDR)? != checksum(&bytes) {
        return Ok(None);
    }
    let Ok(text) = core::str::from_utf8(&bytes) else {
        return Ok(None);
    };
    let mut code = ConfirmationCode::new();
    if code.push_str(text).is_err() {
        return Ok(None);
    }
    Ok(Some(code))
}
