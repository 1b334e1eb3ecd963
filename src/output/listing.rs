use crate::providers::teamcity::types::{Branch, BuildType, Properties};

use super::styling::dim;
use super::tables::{create_table, cyan_header};

/// Prints build configurations as a table.
pub fn print_build_types(build_types: &[BuildType]) {
    if build_types.is_empty() {
        println!("{}", dim("No build configurations found"));
        return;
    }

    let mut table = create_table();
    table.set_header(cyan_header(&["ID", "Name", "Project", "Paused"]));
    for build_type in build_types {
        table.add_row(vec![
            build_type.id.as_str(),
            build_type.name.as_str(),
            build_type.project_name.as_str(),
            if build_type.paused { "yes" } else { "no" },
        ]);
    }
    println!("{table}");
}

pub fn print_branches(branches: &[Branch]) {
    if branches.is_empty() {
        println!("{}", dim("No branches tracked"));
        return;
    }

    let mut table = create_table();
    table.set_header(cyan_header(&["Branch", "Default"]));
    for branch in branches {
        table.add_row(vec![branch.name.as_str(), if branch.default { "yes" } else { "" }]);
    }
    println!("{table}");
}

pub fn print_properties(properties: &Properties) {
    if properties.is_empty() {
        println!("{}", dim("No properties"));
        return;
    }

    let mut table = create_table();
    table.set_header(cyan_header(&["Name", "Value"]));
    for property in &properties.property {
        table.add_row(vec![property.name.as_str(), property.value.as_str()]);
    }
    println!("{table}");
}
