// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! swiofrog - Target Response

use swiofrog_bin::{Event, Reply};

/// The Target's answer to a [`crate::target::Request`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// A reply line for the host
    Reply(Reply),

    /// An event line for the host, such as upload progress
    Event(Event),

    /// Handled, nothing to send
    Done,
}
