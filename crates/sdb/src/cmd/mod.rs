//! Command modules for the SDB CLI

pub mod breakpoints;
pub mod show;
pub mod watch;

pub use breakpoints::{delete_breakpoint, list_breakpoints, set_breakpoint};
pub use show::show_snapshot;
pub use watch::watch;
