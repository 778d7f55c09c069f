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

//! Envelopes of the Cloud Debugger v2 REST responses.

use serde::{Deserialize, Serialize};

use super::RemoteBreakpoint;
use crate::client::BreakpointList;

/// Body of `GET debuggees/{id}/breakpoints`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ListBreakpointsResponse {
    /// Listed breakpoints. The service omits the field when there are none.
    #[serde(default)]
    pub breakpoints: Vec<RemoteBreakpoint>,
    /// Token to pass with the next list call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_wait_token: Option<String>,
}

impl From<ListBreakpointsResponse> for BreakpointList {
    fn from(response: ListBreakpointsResponse) -> Self {
        Self { breakpoints: response.breakpoints, next_wait_token: response.next_wait_token }
    }
}

/// Body of `POST debuggees/{id}/breakpoints/set`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SetBreakpointResponse {
    /// The breakpoint as stored by the service, carrying the assigned id
    #[serde(default)]
    pub breakpoint: Option<RemoteBreakpoint>,
}

/// Body of `GET debuggees/{id}/breakpoints/{breakpointId}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GetBreakpointResponse {
    /// The fully hydrated breakpoint
    #[serde(default)]
    pub breakpoint: Option<RemoteBreakpoint>,
}
