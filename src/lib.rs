// /src/lib.rs
//! Vehicle tracking and CO alarm controller logic.
//!
//! Everything that decides what the board does lives here, generic over the
//! traits in [`peripherals`] so it runs the same on the STM32 and on the host.
#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod app;
pub mod co_alarm;
pub mod commands;
pub mod constants;
pub mod contact_store;
pub mod custom_strings;
pub mod error;
pub mod gps;
pub mod gsm_parser;
pub mod inbox;
pub mod peripherals;
pub mod sim900;

#[cfg(test)]
mod testing;

// host implementation of the critical section used by the inbox mutex
#[cfg(test)]
use critical_section as _;
