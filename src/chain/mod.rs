pub mod abi;
pub mod client;
pub mod units;

pub use client::{ChainClient, Registration};
