//! Terminal output formatting.
//!
//! Colors, headers, tables and progress bars shared by every command.

mod headers;
mod output;
mod progress;
mod status;
mod tables;

pub use headers::{print_section_header, SectionStyle};
pub use output::{format_duration, print_key_value, print_summary_box};
pub use progress::create_progress_bar;
pub use status::{print_error, print_success, print_warning, Status};
pub use tables::{print_binding_table, print_plugin_table, print_task_table};
