//! Scripts for deploying and verifying the Raffle contract, along with the
//! VRF coordinator mock it depends on in local development.

pub mod artifacts;
pub mod chain;
pub mod cli;
pub mod commands;
pub mod config;
pub mod constants;
pub mod deployments;
pub mod errors;
mod solidity;
pub mod traits;
pub mod types;
pub mod verify;
