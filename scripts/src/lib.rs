//! Scripts for deploying, upgrading and configuring proxied Vesper strategies, and for
//! publishing the resulting addresses as versioned releases.

#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]

pub mod artifacts;
pub mod chain;
pub mod cli;
mod commands;
pub mod constants;
pub mod context;
pub mod deploy;
pub mod deployments;
pub mod errors;
pub mod governance;
pub mod initializer;
pub mod release;
pub mod safe;
mod solidity;
pub mod storage_layout;
pub mod strategy;
pub mod types;
pub mod utils;
pub mod verify;

#[cfg(test)]
mod test_helpers;
