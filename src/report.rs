use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::providers::teamcity::pipeline::DropCounts;
use crate::providers::teamcity::types::Build;

#[derive(Debug, Serialize, Deserialize)]
pub struct LatestBuildsReport {
    pub server: String,
    pub collected_at: DateTime<Utc>,
    pub total_configurations: usize,
    pub total_filters: usize,
    pub total_builds: usize,
    pub dropped: DropCounts,
    pub builds: Vec<Build>,
}
