//! The daemon/page wire protocol.
//!
//! A small closed set of message types is all the cross-process surface the
//! update hand-off has; the hand-off state machine stays verifiable because
//! nothing else travels between the daemon and the pages.

use serde::{Deserialize, Serialize};

/// Messages posted by the daemon to every attached page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DaemonMessage {
    /// A new generation is installed and waiting behind the current one.
    #[serde(rename = "UPDATE_READY")]
    UpdateReady { version: String },

    /// The new generation finished cleanup and took control.
    #[serde(rename = "UPDATED")]
    Updated { version: String },
}

/// Messages posted by a page to a daemon instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PageMessage {
    /// Ask the waiting instance to activate and take control now.
    #[serde(rename = "SKIP_WAITING")]
    SkipWaiting,

    /// The user signed out; drop their cached API responses.
    #[serde(rename = "LOGOUT")]
    Logout,
}
