//! Fan-out/fan-in resolution of the latest build per (configuration, branch).
//!
//! ```text
//! configurations ──► expand (branch lookups) ──filters──► resolve ──builds──► aggregate
//! ```
//!
//! Stages run as separate tasks joined by bounded channels, so a slow
//! consumer throttles everything upstream. HTTP concurrency across both
//! lookup stages is bounded by the client's gate.

mod aggregate;
mod expand;
mod resolve;

use std::sync::Arc;

use log::info;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::client::locator::BuildLocator;
use super::client::TeamCityClient;
use super::types::{Build, BuildTypeId};
use crate::error::{Result, TcLensError};

/// Units dropped along the way, by reason.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropCounts {
    /// Configurations whose branch lookup failed.
    pub configurations: usize,
    /// Filters no build matched.
    pub missing: usize,
    /// Filters matching more than one build.
    pub ambiguous: usize,
    /// Filters whose lookup failed.
    pub failed: usize,
}

#[derive(Debug, Default)]
pub struct PipelineOutput {
    pub filters: usize,
    pub builds: Vec<Build>,
    pub dropped: DropCounts,
}

/// Runs the expand → resolve → aggregate stages over `configurations`.
///
/// With an explicit `branch`, branch discovery is skipped and every
/// configuration is queried for that branch. `template` supplies the
/// status/running/canceled/count settings of every emitted filter.
///
/// # Errors
///
/// Returns `Cancelled` if `cancel` fires before the run completes. Failures of
/// individual configurations or filters are logged and counted instead.
pub async fn resolve_latest_builds(
    client: Arc<TeamCityClient>,
    configurations: Vec<BuildTypeId>,
    branch: Option<String>,
    template: BuildLocator,
    cancel: CancellationToken,
) -> Result<PipelineOutput> {
    let width = client.gate().ceiling();
    let (filter_tx, filter_rx) = mpsc::channel(width);
    let (build_tx, build_rx) = mpsc::channel(width);

    let expander = tokio::spawn(expand::expand(
        Arc::clone(&client),
        configurations,
        branch,
        template,
        filter_tx,
        cancel.clone(),
    ));
    let resolver = tokio::spawn(resolve::resolve(
        Arc::clone(&client),
        filter_rx,
        build_tx,
        width,
        cancel.clone(),
    ));

    let builds = aggregate::collect(build_rx).await;
    let skipped = expander.await?;
    let tally = resolver.await?;

    if cancel.is_cancelled() {
        return Err(TcLensError::Cancelled);
    }

    info!(
        "Resolved {} builds from {} filters ({} missing, {} ambiguous, {} failed)",
        builds.len(),
        tally.filters,
        tally.missing,
        tally.ambiguous,
        tally.failed
    );

    Ok(PipelineOutput {
        filters: tally.filters,
        builds,
        dropped: DropCounts {
            configurations: skipped,
            missing: tally.missing,
            ambiguous: tally.ambiguous,
            failed: tally.failed,
        },
    })
}

/// Sends `item` downstream unless the run is cancelled first. Returns `false`
/// when the item could not be delivered.
async fn emit<T>(tx: &mpsc::Sender<T>, item: T, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        () = cancel.cancelled() => false,
        sent = tx.send(item) => sent.is_ok(),
    }
}
