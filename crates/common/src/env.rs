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

/// Path of the engine configuration file, overriding `~/.sdb.toml`.
pub const SDB_CONFIG: &str = "SDB_CONFIG";

/// OAuth access token sent as a bearer token by the HTTP transport.
pub const SDB_ACCESS_TOKEN: &str = "SDB_ACCESS_TOKEN";

/// Root URL of the remote debugger service.
pub const SDB_API_ROOT: &str = "SDB_API_ROOT";

/// Debuggee the command line binary attaches to when `--debuggee` is absent.
pub const SDB_DEBUGGEE: &str = "SDB_DEBUGGEE";
