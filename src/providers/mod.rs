pub mod teamcity;

pub use teamcity::TeamCityProvider;
