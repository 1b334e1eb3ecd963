use super::core::TeamCityClient;
use crate::error::Result;
use crate::providers::teamcity::types::{strip_vcs_prefix, Branch, BuildTypeId, Branches};

impl TeamCityClient {
    /// Lists the branches tracked by a build configuration, with VCS ref
    /// prefixes removed. An unknown configuration yields no branches.
    pub async fn branches(&self, build_type: &BuildTypeId) -> Result<Vec<Branch>> {
        let url = self.rest_url(&format!("buildTypes/id:{build_type}/branches"))?;

        let branches = self
            .get_json::<Branches>(url)
            .await?
            .unwrap_or_default()
            .branch
            .into_iter()
            .map(|branch| Branch {
                name: strip_vcs_prefix(&branch.name).to_owned(),
                ..branch
            })
            .collect();

        Ok(branches)
    }
}
