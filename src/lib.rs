//! Headless music streaming player: queue engine, catalog client, audio
//! output binding and the best-effort side channels (presence, history,
//! offline cache) around them.
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

#[macro_use]
extern crate log;

pub mod audio;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod events;
pub mod history;
pub mod http;
pub mod player;
pub mod presence;
pub mod protocol;
pub mod track;
