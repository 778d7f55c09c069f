//! Show command - print the captured stack of one snapshot

use eyre::Result;
use sdb_engine::{ExecutionStack, SnapshotResolver, SyncConfig, SyncController};

use crate::{render, Cli};

/// Resolve a snapshot and print its execution stack
pub async fn show_snapshot(cli: &Cli, config: SyncConfig, id: &str) -> Result<()> {
    let debuggee = cli.debuggee()?;
    let controller = SyncController::new(cli.client(&config)?, config);
    controller.initialize(debuggee).await?;

    let resolver = SnapshotResolver::new(controller.clone());
    let breakpoint = resolver.resolve(id).await?;
    controller.shutdown();

    if !breakpoint.is_final_state {
        println!("{}", render::breakpoint_line(&breakpoint));
        println!("No snapshot has been captured yet");
        return Ok(());
    }
    if let Some(message) = breakpoint.error_message() {
        eyre::bail!("Breakpoint {id} finished with an error: {message}");
    }

    print!("{}", render::stack(&ExecutionStack::new(breakpoint)));
    Ok(())
}
