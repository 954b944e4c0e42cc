//! ESP Flasher core — device-operation orchestration for ESP8266/ESP32
//! family microcontrollers.
//!
//! This crate contains all business logic with zero UI dependencies.
//! It is designed to be reusable across different frontends (GUI, CLI, TUI).
//!
//! Every long-running operation follows one contract: it runs on a named
//! background thread, owns exactly one OS resource (a supervised subprocess
//! or an open serial port), streams events over a bounded channel, and ends
//! with exactly one terminal outcome — success, failure, or an explicit
//! cancellation — after which the resource is guaranteed released.
//!
//! # Modules
//!
//! - [`ports`] — serial port enumeration (poll-based refresh).
//! - [`probe`] — board detection via the flashing backend's `flash_id` probe.
//! - [`supervisor`] — supervised external process with a merged line stream.
//! - [`flash`] — firmware flashing with progress and throughput extraction.
//! - [`backup`] — flash-image backups to timestamped files.
//! - [`serial`] — live bidirectional serial session.
//! - [`coordinator`] — multi-stage plans (backup, then flash).
//! - [`model`] / [`events`] / [`error`] / [`config`] — shared data types.

pub mod backup;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod flash;
pub mod model;
mod parse;
pub mod ports;
pub mod probe;
pub mod serial;
pub mod supervisor;
