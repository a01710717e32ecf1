//! Integration tests for slotswap
//!
//! These tests verify that multiple components work together correctly.

#[path = "../common/mod.rs"]
pub mod common;

pub mod automation_run;
pub mod cli;
pub mod exclusivity;
pub mod swap_roundtrip;
