//! Test module for roomhub-core
//!
//! Covers configuration loading and the register/command/alarm paths as the
//! hub strings them together, without any networking.

mod room_tests;
