#![doc = include_str!("../README.md")]

mod client;
mod config;
mod types;
mod webhook;

pub use client::NowPaymentsClient;
pub use config::NowPaymentsOptions;
pub use types::{map_payment_status, IpnPayload};
pub use webhook::{parse_ipn, verify_ipn_signature};
