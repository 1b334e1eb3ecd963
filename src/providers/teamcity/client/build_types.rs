use log::debug;

use super::core::TeamCityClient;
use super::locator::{BuildTypeLocator, Locator};
use crate::error::Result;
use crate::providers::teamcity::types::{BuildType, BuildTypes};

impl TeamCityClient {
    /// Lists build configurations, optionally narrowed by a server-side
    /// filter.
    pub async fn list_build_types(
        &self,
        filter: Option<&BuildTypeLocator>,
    ) -> Result<Vec<BuildType>> {
        let mut url = self.rest_url("buildTypes")?;
        if let Some(locator) = filter.map(Locator::encode).filter(|l| !l.is_empty()) {
            url.query_pairs_mut().append_pair("locator", &locator);
        }

        let build_types = self
            .get_json::<BuildTypes>(url)
            .await?
            .unwrap_or_default()
            .build_types;

        debug!("Found {} build configurations", build_types.len());

        Ok(build_types)
    }
}
