#![cfg_attr(doc, doc = include_str!("../README.md"))]

pub mod client;
pub mod endpoint;
pub mod error;
pub mod ws;

pub use client::Client;

use crate::error::Error;

pub type Result<T> = std::result::Result<T, Error>;
