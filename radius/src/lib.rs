#[macro_use]
extern crate log;

pub mod accounting;
pub mod client;
pub mod config;
pub mod core;
pub mod handler;
pub mod server;
pub mod storage;
