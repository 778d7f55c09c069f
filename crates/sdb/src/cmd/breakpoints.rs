//! One-shot breakpoint commands: list, set and delete

use eyre::Result;
use sdb_common::types::{RemoteBreakpoint, SourceLocation};
use sdb_engine::{SyncConfig, SyncController};

use crate::{render, Cli};

/// Print the current breakpoint list of the debuggee
pub async fn list_breakpoints(cli: &Cli, config: SyncConfig) -> Result<()> {
    let debuggee = cli.debuggee()?;
    let controller = SyncController::new(cli.client(&config)?, config);

    let state = controller.initialize(debuggee).await?;
    tracing::info!("Debuggee {} has {} breakpoints", debuggee, state.len());

    if state.is_empty() {
        println!("No breakpoints");
    }
    for breakpoint in state.breakpoints() {
        println!("{}", render::breakpoint_line(breakpoint));
    }

    controller.shutdown();
    Ok(())
}

/// Set a capture breakpoint and print the id the service assigned
pub async fn set_breakpoint(
    cli: &Cli,
    config: SyncConfig,
    location: SourceLocation,
    condition: Option<String>,
    watches: Vec<String>,
) -> Result<()> {
    let debuggee = cli.debuggee()?;
    let controller = SyncController::new(cli.client(&config)?, config);
    controller.initialize(debuggee).await?;

    let request = RemoteBreakpoint::capture_request(location, condition, watches);
    tracing::info!("Setting breakpoint {}", request);
    let created = controller.set_breakpoint(request).await?;
    controller.shutdown();

    if created.id.is_empty() {
        eyre::bail!("The service accepted the breakpoint but returned no id");
    }
    println!("{}", render::breakpoint_line(&created));
    Ok(())
}

/// Delete a breakpoint by id
pub async fn delete_breakpoint(cli: &Cli, config: SyncConfig, id: &str) -> Result<()> {
    let debuggee = cli.debuggee()?;
    let controller = SyncController::new(cli.client(&config)?, config);
    controller.initialize(debuggee).await?;

    controller.delete_breakpoint(id).await?;
    controller.shutdown();

    println!("Deleted {id}");
    Ok(())
}
