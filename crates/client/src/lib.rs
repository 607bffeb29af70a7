//! Page-side update controller for the qbank offline engine.
//!
//! Each open page holds one controller: a small state machine that tracks
//! whether a new cache generation is waiting, exposes apply/dismiss to the
//! UI layer, and guards against duplicate reloads during the hand-off.

pub mod controller;

pub use controller::{UpdateController, UpdateStatus};
