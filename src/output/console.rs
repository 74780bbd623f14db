//! Console output utilities.

use std::path::Path;

use console::style;

use crate::config::ContentType;
use crate::course::CourseInfo;

/// Print an info message.
pub fn print_info(message: &str) {
    println!("{} {}", style("INFO").cyan().bold(), message);
}

/// Print a success message.
pub fn print_success(message: &str) {
    println!("{} {}", style("OK").green().bold(), message);
}

/// Print a warning message.
pub fn print_warning(message: &str) {
    println!("{} {}", style("WARN").yellow().bold(), message);
}

/// Print an error message.
pub fn print_error(message: &str) {
    eprintln!("{} {}", style("ERROR").red().bold(), message);
}

/// Print the application banner.
pub fn print_banner() {
    let banner = r#"
╔═══════════════════════════════════════════════════════╗
║     canvas-sync                                       ║
║     Canvas LMS course content synchronizer            ║
╚═══════════════════════════════════════════════════════╝
"#;
    println!("{}", style(banner).cyan());
}

/// Print configuration summary.
pub fn print_config_summary(course_ids: &[String], content_types: &[ContentType], download_dir: &Path) {
    let types: Vec<&str> = content_types.iter().map(|c| c.as_str()).collect();

    println!();
    println!("{}", style("Configuration:").bold());
    if course_ids.is_empty() {
        println!("  Courses: all active");
    } else {
        println!("  Courses: {}", course_ids.join(", "));
    }
    println!("  Content: {}", types.join(", "));
    println!("  Directory: {}", download_dir.display());
    println!();
}

/// Print the courses available to the current user.
pub fn print_course_list(courses: &[CourseInfo]) {
    println!();
    println!(
        "{}",
        style(format!("Available courses ({}):", courses.len())).bold()
    );
    for course in courses {
        println!(
            "  {:>8}  {}  {}",
            style(&course.id).cyan(),
            course.name,
            style(course.folder_path.display()).dim()
        );
    }
    println!();
}
