//! Run summary reporting.

use console::style;

use crate::orchestrator::{CourseResult, DownloadResults};

/// Print one line per content type for a finished course.
pub fn print_course_result(result: &CourseResult) {
    println!();
    println!("{}", style(format!("{}:", result.course_name)).bold());
    for (content_type, stats) in &result.content_results {
        println!(
            "  {:<14} {} items, {} downloaded, {} skipped, {} failed, {} files",
            content_type.as_str(),
            stats.total_items,
            stats.downloaded_items,
            stats.skipped_items,
            stats.failed_items,
            stats.files_downloaded
        );
    }
    for error in &result.errors {
        let label = error.content_type.map(|c| c.as_str()).unwrap_or("course");
        println!("  {:<14} {}", style(label).red(), error.error_message);
    }
}

/// Print totals for the whole run.
pub fn print_run_summary(results: &DownloadResults) {
    for result in results.course_results.values() {
        print_course_result(result);
    }

    println!();
    println!("{}", style("═".repeat(50)).dim());
    println!("{}", style("Run Summary:").bold());
    println!(
        "  Courses:  {}/{} processed, {} succeeded",
        results.processed_courses, results.total_courses, results.successful_courses
    );
    if results.failed_courses > 0 {
        println!("  Failed:   {}", style(results.failed_courses).red());
    }
    println!(
        "  Items:    {} total, {} downloaded, {} skipped, {} failed",
        results.total_content_items,
        style(results.downloaded_items).green(),
        style(results.skipped_items).yellow(),
        results.failed_items
    );
    println!(
        "  Files:    {} ({})",
        results.total_files_downloaded,
        indicatif::HumanBytes(results.total_bytes_downloaded)
    );
    println!(
        "  Duration: {} ({}/s)",
        results.formatted_duration(),
        indicatif::HumanBytes(results.average_speed() as u64)
    );
    if !results.warnings.is_empty() {
        println!("  Warnings: {}", style(results.warnings.len()).yellow());
    }
    if results.cancelled {
        println!("  {}", style("Run was cancelled").yellow());
    }
    println!("{}", style("═".repeat(50)).dim());
}
