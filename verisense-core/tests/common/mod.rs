//! Common test utilities for integration tests
//!
//! This module provides:
//! - Synthetic fall-curve samplers and current sources
//! - A small harness that records per-case timing and failures

#![allow(dead_code)]

pub mod generators;
pub mod harness;

/// Flash region base used by the persistence tests
pub const FLASH_BASE: u32 = 0x0800_0000;
