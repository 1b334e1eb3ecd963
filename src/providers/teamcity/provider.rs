use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use log::{info, warn};
use tokio_util::sync::CancellationToken;

use super::client::locator::{BuildLocator, BuildTypeLocator};
use super::client::{ClientSettings, TeamCityClient};
use super::pipeline;
use super::types::{Build, DEFAULT_BRANCH};
use crate::auth::Credentials;
use crate::error::{Result, TcLensError};
use crate::output::PhaseProgress;
use crate::report::LatestBuildsReport;

/// Resulting property holding the branch a build actually ran on.
const BRANCH_PROPERTY: &str = "teamcity.build.branch";

/// What to resolve: which configurations, which branch, and which builds
/// count as "latest".
#[derive(Debug, Clone, Default)]
pub struct LatestBuildsQuery {
    pub configurations: BuildTypeLocator,
    /// Skips branch discovery and queries this branch for every configuration.
    pub branch: Option<String>,
    /// Status/running/canceled/count settings applied to every filter.
    pub template: BuildLocator,
    /// Looks up the real branch name of builds labelled `<default>`.
    pub name_default_branches: bool,
}

/// TeamCity latest-build provider.
///
/// Discovers every build configuration of a server, expands it into
/// (configuration, branch) filters, and resolves one latest build per filter.
pub struct TeamCityProvider {
    client: Arc<TeamCityClient>,
}

impl TeamCityProvider {
    /// Creates a provider for the server at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the HTTP client cannot be
    /// built.
    pub fn new(base_url: &str, credentials: Credentials, settings: &ClientSettings) -> Result<Self> {
        let client = TeamCityClient::new(base_url, credentials, settings)?;
        Ok(Self {
            client: Arc::new(client),
        })
    }

    pub fn client(&self) -> &TeamCityClient {
        &self.client
    }

    /// Resolves the latest build for every (configuration, branch) pair.
    ///
    /// Progress is displayed in three phases:
    /// 1. Listing build configurations
    /// 2. Resolving branches and builds
    /// 3. Assembling the report
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration listing fails or the run is
    /// cancelled. Failures of single configurations or filters are logged and
    /// counted in the report instead. Any error trips `cancel`.
    pub async fn collect_latest_builds(
        &self,
        query: &LatestBuildsQuery,
        cancel: CancellationToken,
    ) -> Result<LatestBuildsReport> {
        let result = self.run(query, &cancel).await;
        if result.is_err() {
            cancel.cancel();
        }
        result
    }

    async fn run(
        &self,
        query: &LatestBuildsQuery,
        cancel: &CancellationToken,
    ) -> Result<LatestBuildsReport> {
        info!("Resolving latest builds on {}", self.client.base_url());

        let progress = PhaseProgress::start_phase_1();

        let build_types = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(TcLensError::Cancelled),
            listed = self.client.list_build_types(Some(&query.configurations)) => listed?,
        };

        if build_types.is_empty() {
            warn!("No build configurations found on {}", self.client.base_url());
        }

        let progress = progress.finish_phase_1_start_phase_2(build_types.len());

        let total_configurations = build_types.len();
        let configurations = build_types.into_iter().map(|b| b.id).collect();
        let mut output = pipeline::resolve_latest_builds(
            Arc::clone(&self.client),
            configurations,
            query.branch.clone(),
            query.template.clone(),
            cancel.clone(),
        )
        .await?;

        let progress = progress.finish_phase_2_start_phase_3(output.builds.len());

        if query.name_default_branches {
            self.name_default_branches(&mut output.builds, cancel).await?;
        }

        let report = LatestBuildsReport {
            server: self.client.base_url().to_string(),
            collected_at: Utc::now(),
            total_configurations,
            total_filters: output.filters,
            total_builds: output.builds.len(),
            dropped: output.dropped,
            builds: output.builds,
        };

        progress.finish_phase_3();

        Ok(report)
    }

    /// Returns the branch a build ran on, consulting its resulting properties
    /// when the summary carries only the `<default>` label.
    ///
    /// # Errors
    ///
    /// Returns an error if the properties cannot be fetched.
    pub async fn branch_of(&self, build: &Build) -> Result<String> {
        if build.branch_name != DEFAULT_BRANCH {
            return Ok(build.branch_name.clone());
        }

        let properties = self.client.resulting_properties(build.id).await?;
        Ok(properties
            .get(BRANCH_PROPERTY)
            .map_or_else(|| DEFAULT_BRANCH.to_string(), ToString::to_string))
    }

    async fn name_default_branches(
        &self,
        builds: &mut [Build],
        cancel: &CancellationToken,
    ) -> Result<()> {
        let lookups = builds
            .iter()
            .filter(|b| b.branch_name == DEFAULT_BRANCH)
            .map(|b| async move { (b.id, self.branch_of(b).await) });

        let named: Vec<_> = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(TcLensError::Cancelled),
            named = join_all(lookups) => named,
        };

        for (id, branch) in named {
            match branch {
                Ok(name) => {
                    if let Some(build) = builds.iter_mut().find(|b| b.id == id) {
                        build.branch_name = name;
                    }
                }
                Err(e) => warn!("Keeping {DEFAULT_BRANCH} label for build {id}: {e}"),
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use mockito::{Matcher, Server};

    use super::*;
    use crate::providers::teamcity::types::BuildTypeId;

    fn provider(server: &Server) -> TeamCityProvider {
        TeamCityProvider::new(&server.url(), Credentials::Anonymous, &ClientSettings::default())
            .unwrap()
    }

    fn query() -> LatestBuildsQuery {
        LatestBuildsQuery {
            configurations: BuildTypeLocator::active_only(),
            template: BuildLocator::latest(BuildTypeId::default()),
            ..LatestBuildsQuery::default()
        }
    }

    #[tokio::test]
    async fn test_collect_latest_builds_report() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/app/rest/buildTypes")
            .match_query(Matcher::UrlEncoded("locator".into(), "paused:false".into()))
            .with_body(r#"{"count":1,"buildType":[{"id":"App_Build","name":"Build"}]}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/app/rest/buildTypes/id:App_Build/branches")
            .with_body(r#"{"branch":[{"name":"refs/heads/main"},{"name":"refs/heads/dev"}]}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/app/rest/builds/")
            .match_query(Matcher::UrlEncoded("locator".into(), "buildType:App_Build,branch:main,count:1".into()))
            .with_body(r#"{"count":1,"build":[{"id":10,"buildTypeId":"App_Build","branchName":"main","status":"SUCCESS"}]}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/app/rest/builds/")
            .match_query(Matcher::UrlEncoded("locator".into(), "buildType:App_Build,branch:dev,count:1".into()))
            .with_body(r#"{"count":0}"#)
            .create_async()
            .await;

        let report = provider(&server)
            .collect_latest_builds(&query(), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.total_configurations, 1);
        assert_eq!(report.total_filters, 2);
        assert_eq!(report.total_builds, 1);
        assert_eq!(report.builds[0].id, 10);
        assert_eq!(report.dropped.missing, 1);
    }

    #[tokio::test]
    async fn test_listing_failure_is_fatal_and_cancels() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/app/rest/buildTypes")
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let cancel = CancellationToken::new();
        let result = provider(&server)
            .collect_latest_builds(&query(), cancel.clone())
            .await;

        assert!(matches!(result, Err(TcLensError::Api { status: 500, .. })));
        assert!(cancel.is_cancelled());
    }

    fn default_build(id: u64) -> Build {
        Build {
            id,
            build_type_id: BuildTypeId::from("A"),
            number: "1".to_string(),
            status: "SUCCESS".to_string(),
            state: "finished".to_string(),
            branch_name: DEFAULT_BRANCH.to_string(),
            href: String::new(),
            web_url: String::new(),
        }
    }

    #[tokio::test]
    async fn test_naming_default_branches() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/app/rest/builds/id:5/resulting-properties")
            .with_body(r#"{"count":1,"property":[{"name":"teamcity.build.branch","value":"trunk"}]}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/app/rest/builds/id:6/resulting-properties")
            .with_status(500)
            .create_async()
            .await;

        let mut builds = vec![default_build(5), default_build(6)];
        provider(&server)
            .name_default_branches(&mut builds, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(builds[0].branch_name, "trunk");
        assert_eq!(builds[1].branch_name, DEFAULT_BRANCH);
    }

    #[tokio::test]
    async fn test_naming_default_branches_stops_when_cancelled() {
        let mut server = Server::new_async().await;
        let lookup = server
            .mock("GET", "/app/rest/builds/id:5/resulting-properties")
            .expect(0)
            .create_async()
            .await;

        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut builds = vec![default_build(5)];
        let result = provider(&server)
            .name_default_branches(&mut builds, &cancel)
            .await;

        assert!(matches!(result, Err(TcLensError::Cancelled)));
        assert_eq!(builds[0].branch_name, DEFAULT_BRANCH);
        lookup.assert_async().await;
    }

    #[tokio::test]
    async fn test_branch_of_default_build_uses_resulting_properties() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/app/rest/builds/id:5/resulting-properties")
            .with_body(r#"{"count":1,"property":[{"name":"teamcity.build.branch","value":"trunk"}]}"#)
            .create_async()
            .await;

        let build = default_build(5);

        let provider = provider(&server);
        assert_eq!(provider.branch_of(&build).await.unwrap(), "trunk");

        let named = Build {
            branch_name: "main".to_string(),
            ..build
        };
        assert_eq!(provider.branch_of(&named).await.unwrap(), "main");
    }
}
