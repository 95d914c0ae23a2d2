#![deny(unsafe_code)]
#![cfg_attr(not(test), no_std)]

#[macro_use]
mod logging;

pub mod battery;
pub mod button;
pub mod command;
pub mod config;
pub mod consumption;
pub mod fix;
pub mod geo;
pub mod gps;
pub mod mode;
pub mod navigation;
pub mod power;
pub mod registry;
pub mod route;
pub mod selector;
pub mod storage;
pub mod target;
pub mod time;

#[cfg(feature = "esp32c3")]
pub mod pins;
