mod listing;
mod progress;
mod styling;
mod summary;
mod tables;

pub use listing::{print_branches, print_build_types, print_properties};
pub use progress::PhaseProgress;
pub use styling::{dim, magenta_bold};
pub use summary::print_summary;

/// Prints the `tclens` banner to stderr.
///
/// Displays the tool name, version, and description at the start of execution.
pub fn print_banner() {
    eprintln!(
        r"
{} {}
  {}
",
        magenta_bold("🔭 tclens"),
        dim(env!("CARGO_PKG_VERSION")),
        dim("Latest TeamCity builds per configuration and branch")
    );
}
