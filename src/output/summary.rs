use std::fmt::Write;

use comfy_table::Cell;
use indexmap::IndexMap;

use crate::providers::teamcity::types::Build;
use crate::report::LatestBuildsReport;

use super::styling::{bright, bright_green, bright_red, bright_yellow, cyan, dim};
use super::tables::{color_coded_count_cell, color_coded_status_cell, create_table, cyan_header};

/// Prints a human-readable summary of the latest builds to stdout.
///
/// Displays:
/// - Overview: server, configuration/filter/build counts, dropped units
/// - Latest Builds: one table row per (configuration, branch), grouped by
///   configuration in the order they were resolved
pub fn print_summary(report: &LatestBuildsReport) {
    println!("{}", render_summary(report));
}

fn add_section_header(output: &mut String, emoji: &str, title: &str) {
    let _ = writeln!(output, "{} {}", bright(emoji), bright(title).underlined());
}

fn group_by_configuration(builds: &[Build]) -> IndexMap<&str, Vec<&Build>> {
    let mut groups: IndexMap<&str, Vec<&Build>> = IndexMap::new();
    for build in builds {
        groups
            .entry(build.build_type_id.as_str())
            .or_default()
            .push(build);
    }
    for group in groups.values_mut() {
        group.sort_by(|a, b| a.branch_name.cmp(&b.branch_name));
    }
    groups
}

fn render_overview(output: &mut String, report: &LatestBuildsReport) {
    add_section_header(output, "📊", "Overview");

    let mut table = create_table();
    table.set_header(cyan_header(&["Metric", "Value"]));
    table.add_row(vec![Cell::new("Server"), Cell::new(&report.server)]);
    table.add_row(vec![
        Cell::new("Collected at"),
        Cell::new(report.collected_at.format("%Y-%m-%d %H:%M:%S UTC")),
    ]);
    table.add_row(vec![
        Cell::new("Build configurations"),
        Cell::new(report.total_configurations),
    ]);
    table.add_row(vec![Cell::new("Filters resolved"), Cell::new(report.total_filters)]);
    table.add_row(vec![Cell::new("Latest builds"), Cell::new(report.total_builds)]);
    table.add_row(vec![
        Cell::new("Skipped configurations"),
        color_coded_count_cell(report.dropped.configurations),
    ]);
    table.add_row(vec![
        Cell::new("No matching build"),
        color_coded_count_cell(report.dropped.missing),
    ]);
    table.add_row(vec![
        Cell::new("Ambiguous matches"),
        color_coded_count_cell(report.dropped.ambiguous),
    ]);
    table.add_row(vec![
        Cell::new("Failed lookups"),
        color_coded_count_cell(report.dropped.failed),
    ]);

    let _ = writeln!(output, "{table}\n");
}

fn render_builds(output: &mut String, report: &LatestBuildsReport) {
    add_section_header(output, "🏗️", "Latest Builds");

    if report.builds.is_empty() {
        let _ = writeln!(output, "{}\n", dim("No builds resolved"));
        return;
    }

    let mut table = create_table();
    table.set_header(cyan_header(&["Configuration", "Branch", "Build", "Status", "State", "Link"]));

    for (configuration, builds) in group_by_configuration(&report.builds) {
        for build in builds {
            table.add_row(vec![
                Cell::new(configuration),
                Cell::new(&build.branch_name),
                Cell::new(format!("#{}", build.number)),
                color_coded_status_cell(&build.status),
                Cell::new(&build.state),
                Cell::new(&build.web_url),
            ]);
        }
    }

    let _ = writeln!(output, "{table}\n");
}

fn render_status_line(output: &mut String, report: &LatestBuildsReport) {
    let failing = report
        .builds
        .iter()
        .filter(|b| b.status == "FAILURE" || b.status == "ERROR")
        .count();
    let dropped = report.dropped.missing + report.dropped.ambiguous + report.dropped.failed;

    let verdict = if failing > 0 {
        bright_red(format!("{failing} configuration branches are failing"))
    } else {
        bright_green("All resolved builds are green".to_string())
    };
    let _ = writeln!(output, "{verdict}");

    if dropped > 0 {
        let _ = writeln!(
            output,
            "{} {}",
            bright_yellow(format!("{dropped} filters produced no build.")),
            cyan("Run with RUST_LOG=info for details.")
        );
    }
}

/// Renders the summary as a string (exposed for tests).
pub fn render_summary(report: &LatestBuildsReport) -> String {
    let mut output = String::new();
    render_overview(&mut output, report);
    render_builds(&mut output, report);
    render_status_line(&mut output, report);
    output
}
