use log::debug;
use tokio::sync::mpsc;

use crate::providers::teamcity::types::Build;

/// Drains resolved builds until every sender is gone.
///
/// Each build comes from a distinct (configuration, branch) filter, so no
/// deduplication happens here. Arrival order is not meaningful.
pub(super) async fn collect(mut builds: mpsc::Receiver<Build>) -> Vec<Build> {
    let mut collected = Vec::new();
    while let Some(build) = builds.recv().await {
        debug!(
            "Latest build of {} on {}: #{} ({})",
            build.build_type_id, build.branch_name, build.number, build.status
        );
        collected.push(build);
    }
    collected
}
