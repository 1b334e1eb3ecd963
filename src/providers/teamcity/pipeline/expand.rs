use std::pin::pin;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use log::{debug, warn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::emit;
use crate::error::TcLensError;
use crate::providers::teamcity::client::locator::BuildLocator;
use crate::providers::teamcity::client::TeamCityClient;
use crate::providers::teamcity::types::{Branch, BuildTypeId};

/// Filters for one configuration given its branch list.
///
/// With at most one branch the filter carries no branch qualifier, which
/// lets the server pick the configuration's default branch. Otherwise there
/// is one filter per branch.
pub fn filters_for(
    build_type: &BuildTypeId,
    branches: &[Branch],
    template: &BuildLocator,
) -> Vec<BuildLocator> {
    if branches.len() <= 1 {
        return vec![template.for_target(build_type.clone(), None)];
    }

    branches
        .iter()
        .map(|branch| template.for_target(build_type.clone(), Some(branch.name.clone())))
        .collect()
}

/// Emits every filter onto `filters` and returns the number of configurations
/// skipped because their branches could not be listed.
///
/// `filters` is dropped on return, after every branch lookup has finished,
/// which tells the resolve stage no more filters are coming.
pub(super) async fn expand(
    client: Arc<TeamCityClient>,
    configurations: Vec<BuildTypeId>,
    branch: Option<String>,
    template: BuildLocator,
    filters: mpsc::Sender<BuildLocator>,
    cancel: CancellationToken,
) -> usize {
    if let Some(branch) = branch {
        debug!("Branch {branch} requested, skipping branch discovery");
        for build_type in configurations {
            let filter = template.for_target(build_type, Some(branch.clone()));
            if !emit(&filters, filter, &cancel).await {
                break;
            }
        }
        return 0;
    }

    let width = client.gate().ceiling();
    let mut lookups = pin!(stream::iter(configurations)
        .map(move |build_type| {
            let client = Arc::clone(&client);
            async move {
                let branches = client.branches(&build_type).await;
                (build_type, branches)
            }
        })
        .buffer_unordered(width));

    let mut skipped = 0;
    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            next = lookups.next() => next,
        };
        let Some((build_type, branches)) = next else {
            break;
        };

        match branches {
            Ok(branches) => {
                debug!("{build_type} tracks {} branches", branches.len());
                for filter in filters_for(&build_type, &branches, &template) {
                    if !emit(&filters, filter, &cancel).await {
                        return skipped;
                    }
                }
            }
            Err(TcLensError::Cancelled) => break,
            Err(e) => {
                warn!("Skipping {build_type}: failed to list branches: {e}");
                skipped += 1;
            }
        }
    }

    skipped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Credentials;
    use crate::providers::teamcity::client::ClientSettings;

    fn branch(name: &str) -> Branch {
        Branch {
            name: name.to_string(),
            default: false,
        }
    }

    fn encoded(filters: &[BuildLocator]) -> Vec<String> {
        filters.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_single_branch_has_no_qualifier() {
        let template = BuildLocator::latest(BuildTypeId::default());
        let filters = filters_for(&BuildTypeId::from("A"), &[branch("main")], &template);
        assert_eq!(filters.len(), 1);
        assert_eq!(filters[0].branch, None);
    }

    #[test]
    fn test_no_branches_behaves_like_single_branch() {
        let template = BuildLocator::latest(BuildTypeId::default());
        let filters = filters_for(&BuildTypeId::from("A"), &[], &template);
        assert_eq!(encoded(&filters), ["buildType:A,count:1"]);
    }

    #[test]
    fn test_one_filter_per_branch() {
        let template = BuildLocator::latest(BuildTypeId::default());
        let filters = filters_for(
            &BuildTypeId::from("B"),
            &[branch("main"), branch("dev"), branch("feature/x")],
            &template,
        );
        assert_eq!(
            encoded(&filters),
            [
                "buildType:B,branch:main,count:1",
                "buildType:B,branch:dev,count:1",
                "buildType:B,branch:feature/x,count:1",
            ]
        );
    }

    #[tokio::test]
    async fn test_expand_emits_cross_product_and_closes() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/app/rest/buildTypes/id:A/branches")
            .with_body(r#"{"branch":[{"name":"refs/heads/main","default":true}]}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/app/rest/buildTypes/id:B/branches")
            .with_body(r#"{"branch":[{"name":"refs/heads/main","default":true},{"name":"refs/heads/dev"}]}"#)
            .create_async()
            .await;

        let client = Arc::new(
            TeamCityClient::new(&server.url(), Credentials::Anonymous, &ClientSettings::default())
                .unwrap(),
        );
        let (tx, mut rx) = mpsc::channel(1);
        let expansion = tokio::spawn(expand(
            client,
            vec![BuildTypeId::from("A"), BuildTypeId::from("B")],
            None,
            BuildLocator::latest(BuildTypeId::default()),
            tx,
            CancellationToken::new(),
        ));

        let mut targets = Vec::new();
        while let Some(filter) = rx.recv().await {
            targets.push((filter.build_type.to_string(), filter.branch.unwrap_or_default()));
        }
        targets.sort();

        assert_eq!(expansion.await.unwrap(), 0);
        assert_eq!(
            targets,
            [
                ("A".to_string(), String::new()),
                ("B".to_string(), "dev".to_string()),
                ("B".to_string(), "main".to_string()),
            ]
        );
    }
}
