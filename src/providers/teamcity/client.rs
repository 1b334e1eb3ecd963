mod branches;
mod build_types;
mod builds;
mod core;
mod dispatcher;
mod gate;
pub mod locator;
mod transport;

pub use builds::Resolution;
pub use self::core::{ClientSettings, TeamCityClient};
pub use dispatcher::DispatchSettings;
pub use gate::DEFAULT_CONCURRENCY;
pub use transport::{RetryPolicy, Timeouts};
