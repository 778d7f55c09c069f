//! Watch command - keep local breakpoints in sync until interrupted

use std::{sync::Arc, time::Duration};

use eyre::Result;
use sdb_common::{
    error::DebuggerError,
    types::{RemoteBreakpoint, SourceLocation},
};
use sdb_engine::{
    DebugSession, ExecutionStack, InMemoryBreakpointStore, QueuedExecutor, SnapshotObserver,
    SyncConfig, SyncState,
};

use crate::{render, Cli};

/// How often queued store updates and snapshot callbacks are run.
const DRAIN_INTERVAL: Duration = Duration::from_millis(100);

/// Prints snapshots as they are selected.
#[derive(Debug, Default)]
struct PrintingObserver;

impl SnapshotObserver for PrintingObserver {
    fn on_snapshot_ready(&self, breakpoint: RemoteBreakpoint) {
        println!("Snapshot {} captured", breakpoint.id);
        print!("{}", render::stack(&ExecutionStack::new(breakpoint)));
    }

    fn on_snapshot_error(&self, breakpoint_id: &str, error: &DebuggerError) {
        eprintln!("Could not load snapshot {breakpoint_id}: {}", error.user_message());
    }

    fn on_navigate_to_breakpoint(&self, breakpoint: RemoteBreakpoint) {
        println!("{}", render::breakpoint_line(&breakpoint));
    }
}

/// Attach to the debuggee, register `locations` and report changes until Ctrl+C
pub async fn watch(cli: &Cli, config: SyncConfig, locations: &[SourceLocation]) -> Result<()> {
    let debuggee = cli.debuggee()?;
    let client = cli.client(&config)?;
    let store = Arc::new(InMemoryBreakpointStore::new());
    let executor = Arc::new(QueuedExecutor::new());

    let session = DebugSession::new(
        client,
        config,
        store.clone(),
        executor.clone(),
        Arc::new(PrintingObserver),
    );
    let printer = session.controller().add_listener(Arc::new(|state: &Arc<SyncState>| {
        println!("Breakpoint list changed ({} breakpoints)", state.len());
        for breakpoint in state.breakpoints() {
            println!("  {}", render::breakpoint_line(breakpoint));
        }
    }));

    let state = session.attach(debuggee).await?;
    println!("Attached to {debuggee} ({} breakpoints)", state.len());

    for location in locations {
        let breakpoint = store.add(location.clone(), None, Vec::new());
        session.handler().register_breakpoint(&breakpoint);
    }

    tracing::info!("Watching {}. Press Ctrl+C to exit.", debuggee);
    let mut ticker = tokio::time::interval(DRAIN_INTERVAL);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("Received Ctrl+C, shutting down...");
                break;
            }
            _ = ticker.tick() => {
                executor.drain();
            }
        }
    }

    session.controller().remove_listener(printer);
    session.shutdown();
    executor.drain();

    for view in session.handler().bindings() {
        tracing::debug!(?view, "Final binding");
    }
    Ok(())
}
