pub mod client;
pub mod pipeline;
mod provider;
pub mod types;

pub use provider::{LatestBuildsQuery, TeamCityProvider};
