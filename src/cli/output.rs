//! CLI output formatting utilities

use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};

use crate::auth::models::UserInfo;

/// Print a success message
pub fn success(message: &str) {
    println!("{} {}", "✓".green(), message);
}

/// Print an error message
pub fn error(message: &str) {
    eprintln!("{} {}", "✗".red(), message);
}

/// Print a warning message
pub fn warn(message: &str) {
    println!("{} {}", "⚠".yellow(), message);
}

/// Print an info message
pub fn info(message: &str) {
    println!("{} {}", "ℹ".blue(), message);
}

/// Print a table of user accounts
pub fn print_user_table(users: &[UserInfo]) {
    if users.is_empty() {
        info("No users configured. Add [[users]] entries to schoolgate.toml");
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("ID").fg(Color::Cyan),
            Cell::new("Email").fg(Color::Cyan),
            Cell::new("Name").fg(Color::Cyan),
            Cell::new("Role").fg(Color::Cyan),
            Cell::new("Status").fg(Color::Cyan),
        ]);

    for user in users {
        let (status, status_color) = if user.active {
            ("active", Color::Green)
        } else {
            ("inactive", Color::Red)
        };

        table.add_row(vec![
            Cell::new(user.id),
            Cell::new(&user.email),
            Cell::new(&user.name),
            Cell::new(user.role),
            Cell::new(status).fg(status_color),
        ]);
    }

    println!("{table}");
}
