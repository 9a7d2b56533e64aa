#![no_std]

pub(crate) mod fmt;

pub mod ble_pawr_advertiser;
