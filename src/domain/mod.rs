//! Deployment domain logic
//!
//! File installation, config checks, the ownership table, and the step list the
//! `Deployer` walks through.

pub mod files;
pub mod monitor_config;
pub mod permissions;
pub mod steps;
