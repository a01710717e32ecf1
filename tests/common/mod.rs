//! Shared test utilities for slotswap
//!
//! This module provides common helpers for integration tests:
//! - A fake device filesystem driven through a plain `sh` session

pub mod device;
