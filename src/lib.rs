//! recret - share passphrase-locked secret messages by link

#![forbid(unsafe_code)]

pub mod config;
pub mod encryption;
pub mod error;
pub mod form;
pub mod passphrase;
pub mod secretcrypt;
pub mod service;
pub mod store;
pub mod varmor;
pub mod web;
