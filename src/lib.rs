#![allow(unused_assignments)] // thiserror/miette proc macros trigger false positives

pub mod cache;
pub mod cli;
pub mod error;
pub mod logging;
pub mod paths;
pub mod receiver;
pub mod sender;
pub mod wire;
