//! Integration tests for kq-bot.
//!
//! These tests drive the application the way a gateway adapter would:
//! - Book, wallet and connectivity events in
//! - Order commands out, acknowledged by a mock gateway
//! - Topic snapshots on the broadcast channel

pub mod common;
