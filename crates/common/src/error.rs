// SDB - Snapshot Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Error taxonomy shared by the transport contract and the sync engine.

use thiserror::Error;

/// Result type used across the remote debugger boundary.
pub type DebuggerResult<T> = Result<T, DebuggerError>;

/// Errors that can occur while talking to the remote debugger or while
/// reconciling local state against it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DebuggerError {
    /// A long-poll request expired without any change. Expected, never surfaced.
    #[error("request timed out")]
    Timeout,

    /// The wait token was stale because a change raced the poll.
    #[error("wait token is stale, the breakpoint list changed")]
    Conflict,

    /// The breakpoint no longer exists remotely.
    #[error("breakpoint {id} was not found")]
    NotFound {
        /// Id that was asked for
        id: String,
    },

    /// Authentication, network or service failure.
    #[error("{0}")]
    Remote(String),

    /// The local view is inconsistent, e.g. the engine was never initialized.
    #[error("inconsistent local state: {0}")]
    LocalState(String),

    /// The request was cancelled because its session went away.
    #[error("request was cancelled")]
    Cancelled,
}

impl DebuggerError {
    /// Creates a [`DebuggerError::Remote`] from anything printable.
    pub fn remote(message: impl ToString) -> Self {
        Self::Remote(message.to_string())
    }

    /// Creates a [`DebuggerError::NotFound`].
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Outcomes of a long-poll that are part of normal operation.
    pub fn is_expected_poll_outcome(&self) -> bool {
        matches!(self, Self::Timeout | Self::Conflict)
    }

    /// Whether the error should stay silent towards the user and the log.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// The text to show on a local breakpoint for this error.
    pub fn user_message(&self) -> String {
        match self {
            Self::Remote(message) => message.clone(),
            other => other.to_string(),
        }
    }
}
