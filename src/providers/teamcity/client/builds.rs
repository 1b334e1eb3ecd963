use log::debug;

use super::core::TeamCityClient;
use super::locator::{BuildLocator, Locator};
use crate::error::Result;
use crate::providers::teamcity::types::{Build, BuildStatistics, Builds, Properties, DEFAULT_BRANCH};

/// Outcome of looking up the single latest build for one filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found(Build),
    Missing,
    /// More than one build matched where exactly one was expected.
    Ambiguous(usize),
}

impl TeamCityClient {
    /// Lists builds matching `filter`.
    ///
    /// An uncapped filter (`count == 0`) follows `nextHref` until the last
    /// page; a capped one keeps at most `count` builds of the first page. Builds without a branch
    /// name are labelled with [`DEFAULT_BRANCH`].
    pub async fn list_builds(&self, filter: &BuildLocator) -> Result<Vec<Build>> {
        let mut url = self.rest_url("builds/")?;
        url.query_pairs_mut()
            .append_pair("locator", &filter.encode());

        let mut builds = Vec::new();
        loop {
            let Some(page) = self.get_json::<Builds>(url).await? else {
                break;
            };

            builds.extend(page.build.into_iter().map(label_default_branch));

            if !filter.is_uncapped() {
                builds.truncate(filter.count as usize);
                break;
            }

            match page.next_href.filter(|href| !href.is_empty()) {
                Some(href) => url = self.link_url(&href)?,
                None => break,
            }
        }

        debug!("Locator {filter} matched {} builds", builds.len());

        Ok(builds)
    }

    /// Resolves the one build matching `filter`.
    pub async fn resolve_latest(&self, filter: &BuildLocator) -> Result<Resolution> {
        let mut builds = self.list_builds(filter).await?;

        Ok(match builds.len() {
            0 => Resolution::Missing,
            1 => Resolution::Found(builds.remove(0)),
            n => Resolution::Ambiguous(n),
        })
    }

    /// Fetches the statistic values of a finished build. A missing build
    /// yields empty statistics.
    pub async fn build_statistics(&self, build_id: u64) -> Result<BuildStatistics> {
        let url = self.rest_url(&format!("builds/id:{build_id}/statistics"))?;
        Ok(self.get_json(url).await?.unwrap_or_default())
    }

    /// Fetches the parameters a build finished with. Used to recover the
    /// branch of builds whose summary carries none.
    pub async fn resulting_properties(&self, build_id: u64) -> Result<Properties> {
        let url = self.rest_url(&format!("builds/id:{build_id}/resulting-properties"))?;
        Ok(self.get_json(url).await?.unwrap_or_default())
    }
}

fn label_default_branch(mut build: Build) -> Build {
    if build.branch_name.is_empty() {
        build.branch_name = DEFAULT_BRANCH.to_string();
    }
    build
}

#[cfg(test)]
mod tests {
    use mockito::{Matcher, Server};

    use super::*;
    use crate::auth::Credentials;
    use crate::error::TcLensError;
    use crate::providers::teamcity::client::ClientSettings;
    use crate::providers::teamcity::types::BuildTypeId;

    fn client(server: &Server) -> TeamCityClient {
        TeamCityClient::new(&server.url(), Credentials::Anonymous, &ClientSettings::default())
            .unwrap()
    }

    fn build_json(id: u64, branch: Option<&str>) -> String {
        match branch {
            Some(branch) => format!(
                r#"{{"id":{id},"buildTypeId":"App_Build","status":"SUCCESS","state":"finished","branchName":"{branch}"}}"#
            ),
            None => format!(
                r#"{{"id":{id},"buildTypeId":"App_Build","status":"SUCCESS","state":"finished"}}"#
            ),
        }
    }

    fn page(ids: &[u64], next: Option<&str>) -> String {
        let builds: Vec<_> = ids.iter().map(|id| build_json(*id, Some("main"))).collect();
        match next {
            Some(next) => format!(
                r#"{{"count":{},"nextHref":"{next}","build":[{}]}}"#,
                ids.len(),
                builds.join(",")
            ),
            None => format!(r#"{{"count":{},"build":[{}]}}"#, ids.len(), builds.join(",")),
        }
    }

    async fn mock_page(server: &mut Server, locator: &str, body: String, hits: usize) -> mockito::Mock {
        server
            .mock("GET", "/app/rest/builds/")
            .match_query(Matcher::UrlEncoded("locator".into(), locator.into()))
            .with_status(200)
            .with_body(body)
            .expect(hits)
            .create_async()
            .await
    }

    #[tokio::test]
    async fn test_uncapped_filter_follows_every_page_in_order() {
        let mut server = Server::new_async().await;
        let first = mock_page(
            &mut server,
            "buildType:App_Build",
            page(&[1, 2], Some("/app/rest/builds/?locator=buildType:App_Build,start:2")),
            1,
        )
        .await;
        let second = mock_page(
            &mut server,
            "buildType:App_Build,start:2",
            page(&[3, 4], Some("/app/rest/builds/?locator=buildType:App_Build,start:4")),
            1,
        )
        .await;
        let third = mock_page(&mut server, "buildType:App_Build,start:4", page(&[5], None), 1).await;

        let filter = BuildLocator {
            build_type: BuildTypeId::from("App_Build"),
            count: 0,
            ..BuildLocator::default()
        };
        let builds = client(&server).list_builds(&filter).await.unwrap();

        let ids: Vec<_> = builds.iter().map(|b| b.id).collect();
        assert_eq!(ids, [1, 2, 3, 4, 5]);
        first.assert_async().await;
        second.assert_async().await;
        third.assert_async().await;
    }

    #[tokio::test]
    async fn test_capped_filter_keeps_first_item_of_first_page() {
        let mut server = Server::new_async().await;
        let first = mock_page(
            &mut server,
            "buildType:App_Build,count:1",
            page(&[1, 2], Some("/app/rest/builds/?locator=buildType:App_Build,count:1,start:2")),
            2,
        )
        .await;
        let second = mock_page(
            &mut server,
            "buildType:App_Build,count:1,start:2",
            page(&[3, 4], Some("/app/rest/builds/?locator=buildType:App_Build,count:1,start:4")),
            0,
        )
        .await;
        let third = mock_page(
            &mut server,
            "buildType:App_Build,count:1,start:4",
            page(&[5], None),
            0,
        )
        .await;

        let client = client(&server);
        let filter = BuildLocator::latest(BuildTypeId::from("App_Build"));
        let builds = client.list_builds(&filter).await.unwrap();

        let ids: Vec<_> = builds.iter().map(|b| b.id).collect();
        assert_eq!(ids, [1]);
        assert!(matches!(
            client.resolve_latest(&filter).await.unwrap(),
            Resolution::Found(build) if build.id == 1
        ));
        first.assert_async().await;
        second.assert_async().await;
        third.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_branch_name_gets_default_label() {
        let mut server = Server::new_async().await;
        mock_page(
            &mut server,
            "buildType:App_Build,count:1",
            format!(r#"{{"count":1,"build":[{}]}}"#, build_json(7, None)),
            1,
        )
        .await;

        let filter = BuildLocator::latest(BuildTypeId::from("App_Build"));
        let resolution = client(&server).resolve_latest(&filter).await.unwrap();

        match resolution {
            Resolution::Found(build) => assert_eq!(build.branch_name, DEFAULT_BRANCH),
            other => panic!("unexpected resolution: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_resolution_outcomes() {
        let mut server = Server::new_async().await;
        mock_page(
            &mut server,
            "buildType:Empty,count:1",
            r#"{"count":0}"#.to_string(),
            1,
        )
        .await;
        mock_page(
            &mut server,
            "buildType:App_Build,count:2",
            page(&[1, 2], None),
            1,
        )
        .await;

        let client = client(&server);
        let missing = client
            .resolve_latest(&BuildLocator::latest(BuildTypeId::from("Empty")))
            .await
            .unwrap();
        let ambiguous = client
            .resolve_latest(&BuildLocator {
                build_type: BuildTypeId::from("App_Build"),
                count: 2,
                ..BuildLocator::default()
            })
            .await
            .unwrap();

        assert_eq!(missing, Resolution::Missing);
        assert_eq!(ambiguous, Resolution::Ambiguous(2));
    }

    #[tokio::test]
    async fn test_resolving_twice_yields_same_build() {
        let mut server = Server::new_async().await;
        mock_page(
            &mut server,
            "buildType:App_Build,branch:main,count:1",
            page(&[99], None),
            2,
        )
        .await;

        let client = client(&server);
        let filter = BuildLocator::latest(BuildTypeId::from("App_Build"))
            .for_target(BuildTypeId::from("App_Build"), Some("main".to_string()));

        let first = client.resolve_latest(&filter).await.unwrap();
        let second = client.resolve_latest(&filter).await.unwrap();

        assert!(matches!(&first, Resolution::Found(b) if b.id == 99));
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_statistics_and_properties() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/app/rest/builds/id:42/statistics")
            .with_status(200)
            .with_body(r#"{"count":1,"property":[{"name":"BuildDuration","value":"61000"}]}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/app/rest/builds/id:42/resulting-properties")
            .with_status(200)
            .with_body(r#"{"count":1,"property":[{"name":"teamcity.build.branch","value":"main"}]}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/app/rest/builds/id:43/statistics")
            .with_status(404)
            .create_async()
            .await;

        let client = client(&server);

        let stats = client.build_statistics(42).await.unwrap();
        assert_eq!(stats.get("BuildDuration"), Some("61000"));

        let props = client.resulting_properties(42).await.unwrap();
        assert_eq!(props.get("teamcity.build.branch"), Some("main"));

        assert!(client.build_statistics(43).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_statistics_errors_propagate() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/app/rest/builds/id:42/statistics")
            .with_status(403)
            .with_body("Forbidden")
            .create_async()
            .await;

        let result = client(&server).build_statistics(42).await;
        assert!(matches!(result, Err(TcLensError::Api { status: 403, .. })));
    }
}
