//! Table formatting utilities using comfy-table.

use comfy_table::{Cell, Table};
use owo_colors::OwoColorize;

fn styled_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .set_header(
            headers
                .iter()
                .map(|h| Cell::new(*h).add_attribute(comfy_table::Attribute::Bold))
                .collect::<Vec<_>>(),
        )
        .load_preset(comfy_table::presets::UTF8_FULL)
        .apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS)
        .set_content_arrangement(comfy_table::ContentArrangement::Dynamic);
    table
}

/// Prints registered tasks with the references they run.
pub fn print_task_table(tasks: &[(String, Vec<String>)]) {
    let mut table = styled_table(&["Task", "Runs"]);

    for (name, subtasks) in tasks {
        let runs = if subtasks.is_empty() {
            "(nothing)".bright_black().to_string()
        } else {
            subtasks.join(", ")
        };
        table.add_row(vec![
            Cell::new(name).fg(comfy_table::Color::White),
            Cell::new(runs),
        ]);
    }

    println!("{}", table);
}

/// Prints plugins as (name, kind, description) rows.
pub fn print_plugin_table(plugins: &[(String, String, String)]) {
    let mut table = styled_table(&["Plugin", "Kind", "Description"]);

    for (name, kind, description) in plugins {
        table.add_row(vec![
            Cell::new(name).fg(comfy_table::Color::White),
            Cell::new(kind).fg(comfy_table::Color::DarkGrey),
            Cell::new(description),
        ]);
    }

    println!("{}", table);
}

/// Prints watch bindings as (name, files, tasks, live reload) rows.
pub fn print_binding_table(bindings: &[(String, String, String, bool)]) {
    let mut table = styled_table(&["Binding", "Files", "Tasks", "Live reload"]);

    for (name, files, tasks, livereload) in bindings {
        let reload = if *livereload {
            Cell::new("yes").fg(comfy_table::Color::Green)
        } else {
            Cell::new("no").fg(comfy_table::Color::DarkGrey)
        };
        table.add_row(vec![
            Cell::new(name).fg(comfy_table::Color::White),
            Cell::new(files),
            Cell::new(tasks),
            reload,
        ]);
    }

    println!("{}", table);
}
