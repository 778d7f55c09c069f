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

//! HTTP transport against the Cloud Debugger v2 REST API.

use std::{env, time::Duration};

use eyre::Result;
use reqwest::{RequestBuilder, Response, StatusCode};
use sdb_common::{
    client::{BreakpointList, RemoteDebuggerClient},
    env::SDB_ACCESS_TOKEN,
    error::{DebuggerError, DebuggerResult},
    types::{GetBreakpointResponse, ListBreakpointsResponse, RemoteBreakpoint, SetBreakpointResponse},
};
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use crate::config::SyncConfig;

/// [`RemoteDebuggerClient`] speaking the Cloud Debugger v2 REST API.
#[derive(Debug, Clone)]
pub struct HttpDebuggerClient {
    http: reqwest::Client,
    api_root: String,
    client_version: String,
    access_token: Option<String>,
    long_timeout: Duration,
    short_timeout: Duration,
}

impl HttpDebuggerClient {
    /// Creates a client from the engine configuration. The bearer token is
    /// read from `SDB_ACCESS_TOKEN` when set.
    pub fn new(config: &SyncConfig) -> Result<Self> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            api_root: config.api_root.trim_end_matches('/').to_string(),
            client_version: config.client_version.clone(),
            access_token: env::var(SDB_ACCESS_TOKEN).ok().filter(|t| !t.is_empty()),
            long_timeout: config.long_timeout(),
            short_timeout: config.short_timeout(),
        })
    }

    /// Overrides the bearer token.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Root URL requests are sent to.
    pub fn api_root(&self) -> &str {
        &self.api_root
    }

    fn breakpoints_url(&self, debuggee_id: &str) -> String {
        format!("{}/v2/debugger/debuggees/{}/breakpoints", self.api_root, debuggee_id)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> DebuggerResult<Response> {
        let response = self.authorize(request).send().await.map_err(map_transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        trace!("Request failed with {}: {}", status, body);
        Err(map_status(status, &body))
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> DebuggerResult<T> {
    response.json::<T>().await.map_err(map_transport_error)
}

fn map_transport_error(err: reqwest::Error) -> DebuggerError {
    if err.is_timeout() {
        DebuggerError::Timeout
    } else {
        DebuggerError::remote(err)
    }
}

fn map_status(status: StatusCode, body: &str) -> DebuggerError {
    match status {
        StatusCode::CONFLICT => DebuggerError::Conflict,
        StatusCode::NOT_FOUND => DebuggerError::NotFound { id: String::new() },
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => DebuggerError::Timeout,
        _ => {
            let message = error_message(body).unwrap_or_else(|| status.to_string());
            DebuggerError::Remote(message)
        }
    }
}

/// Extracts `error.message` from a Google API error body.
fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value.pointer("/error/message")?.as_str().map(str::to_string)
}

fn with_id(err: DebuggerError, id: &str) -> DebuggerError {
    match err {
        DebuggerError::NotFound { .. } => DebuggerError::not_found(id),
        other => other,
    }
}

impl RemoteDebuggerClient for HttpDebuggerClient {
    async fn list_breakpoints(
        &self,
        debuggee_id: &str,
        wait_token: Option<&str>,
    ) -> DebuggerResult<BreakpointList> {
        let mut query: Vec<(&str, &str)> = vec![
            ("includeInactive", "true"),
            ("action.value", "CAPTURE"),
            ("stripResults", "true"),
            ("clientVersion", &self.client_version),
        ];
        if let Some(token) = wait_token {
            query.push(("waitToken", token));
        }

        trace!("Listing breakpoints of {} (token {:?})", debuggee_id, wait_token);
        let request =
            self.http.get(self.breakpoints_url(debuggee_id)).query(&query).timeout(self.long_timeout);
        let response = self.send(request).await.map_err(|e| with_id(e, debuggee_id))?;
        let list: ListBreakpointsResponse = decode(response).await?;
        debug!("Listed {} breakpoints of {}", list.breakpoints.len(), debuggee_id);
        Ok(list.into())
    }

    async fn set_breakpoint(
        &self,
        debuggee_id: &str,
        breakpoint: RemoteBreakpoint,
    ) -> DebuggerResult<RemoteBreakpoint> {
        let url = format!("{}/set", self.breakpoints_url(debuggee_id));
        let request = self
            .http
            .post(url)
            .query(&[("clientVersion", self.client_version.as_str())])
            .json(&breakpoint)
            .timeout(self.short_timeout);
        let response = self.send(request).await.map_err(|e| with_id(e, debuggee_id))?;
        let body: SetBreakpointResponse = decode(response).await?;
        // An absent breakpoint surfaces as an empty id
        Ok(body.breakpoint.unwrap_or_default())
    }

    async fn delete_breakpoint(&self, debuggee_id: &str, breakpoint_id: &str) -> DebuggerResult<()> {
        let url = format!("{}/{}", self.breakpoints_url(debuggee_id), breakpoint_id);
        let request = self
            .http
            .delete(url)
            .query(&[("clientVersion", self.client_version.as_str())])
            .timeout(self.short_timeout);
        self.send(request).await.map_err(|e| with_id(e, breakpoint_id))?;
        Ok(())
    }

    async fn get_breakpoint(
        &self,
        debuggee_id: &str,
        breakpoint_id: &str,
    ) -> DebuggerResult<RemoteBreakpoint> {
        let url = format!("{}/{}", self.breakpoints_url(debuggee_id), breakpoint_id);
        let request = self
            .http
            .get(url)
            .query(&[("clientVersion", self.client_version.as_str())])
            .timeout(self.short_timeout);
        let response = self.send(request).await.map_err(|e| with_id(e, breakpoint_id))?;
        let body: GetBreakpointResponse = decode(response).await?;
        body.breakpoint.ok_or_else(|| DebuggerError::not_found(breakpoint_id))
    }
}
