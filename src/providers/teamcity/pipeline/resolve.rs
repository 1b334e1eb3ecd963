use std::pin::pin;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use log::{info, warn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::emit;
use crate::error::TcLensError;
use crate::providers::teamcity::client::locator::BuildLocator;
use crate::providers::teamcity::client::{Resolution, TeamCityClient};
use crate::providers::teamcity::types::Build;

#[derive(Debug, Default, Clone, Copy)]
pub(super) struct Tally {
    pub filters: usize,
    pub missing: usize,
    pub ambiguous: usize,
    pub failed: usize,
}

/// Resolves every incoming filter, at most `width` at a time, and forwards
/// each uniquely matched build. Ends once the filter channel is closed and
/// all lookups are done; `builds` is dropped on return.
pub(super) async fn resolve(
    client: Arc<TeamCityClient>,
    filters: mpsc::Receiver<BuildLocator>,
    builds: mpsc::Sender<Build>,
    width: usize,
    cancel: CancellationToken,
) -> Tally {
    let incoming = stream::unfold(filters, |mut rx| async move {
        rx.recv().await.map(|filter| (filter, rx))
    });
    let mut lookups = pin!(incoming
        .map(move |filter| {
            let client = Arc::clone(&client);
            async move {
                let resolution = client.resolve_latest(&filter).await;
                (filter, resolution)
            }
        })
        .buffer_unordered(width.max(1)));

    let mut tally = Tally::default();
    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            next = lookups.next() => next,
        };
        let Some((filter, resolution)) = next else {
            break;
        };
        tally.filters += 1;

        match resolution {
            Ok(Resolution::Found(build)) => {
                if !emit(&builds, build, &cancel).await {
                    break;
                }
            }
            Ok(Resolution::Missing) => {
                info!("No build matches {filter}, skipping");
                tally.missing += 1;
            }
            Ok(Resolution::Ambiguous(count)) => {
                warn!("Expected one build for {filter} but found {count}, skipping");
                tally.ambiguous += 1;
            }
            Err(TcLensError::Cancelled) => break,
            Err(e) => {
                warn!("Failed to resolve {filter}: {e}");
                tally.failed += 1;
            }
        }
    }

    tally
}
