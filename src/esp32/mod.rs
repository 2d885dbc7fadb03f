//! ESP-IDF implementation of the [`Radio`](crate::radio::Radio) trait.
//!
//! Everything in here talks to the ESP32 WiFi driver through `esp-idf-svc`,
//! dropping to raw `esp-idf-sys` calls where the safe wrapper has no
//! equivalent (station lists, WPS, storage selection).

mod radio;

pub use radio::EspRadio;
