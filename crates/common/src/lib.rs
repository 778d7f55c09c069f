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

//! SDB Common - Shared functionality for SDB components
//!
//! This crate provides the data model of the snapshot debugger service, the
//! transport contract the sync engine talks through, and the logging setup
//! shared by the engine and the command line binary.

/// Transport contract towards the remote debugger service
pub mod client;
/// Environment variables understood by SDB components
pub mod env;
/// Error taxonomy of remote operations
pub mod error;
/// Logging setup and utilities for consistent logging across SDB components
pub mod logging;
/// Scripted client and fixtures for tests
pub mod test_utils;
/// Breakpoint and snapshot types exchanged with the service
pub mod types;

pub use client::*;
pub use error::*;
pub use logging::*;
