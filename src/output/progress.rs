//! Progress bars fed by tracker events.

use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::progress::{ProgressEventKind, ProgressStatus, ProgressTracker};

fn course_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} Courses [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
}

fn content_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("  {spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn download_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("  {spinner:.green} [{bar:30.cyan/blue}] {bytes}/{total_bytes} ({eta}) {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
}

/// Bars owned by the console while a run is active.
pub struct ProgressDisplay {
    _multi: MultiProgress,
    courses: ProgressBar,
    content: ProgressBar,
    download: ProgressBar,
}

impl ProgressDisplay {
    /// Clear every bar.
    pub fn finish(&self) {
        self.download.finish_and_clear();
        self.content.finish_and_clear();
        self.courses.finish_and_clear();
    }
}

/// Subscribe a set of bars to `tracker` events.
pub fn attach_progress_bars(tracker: &ProgressTracker) -> ProgressDisplay {
    let multi = MultiProgress::new();

    let courses = multi.add(ProgressBar::new(0));
    courses.set_style(course_style());

    let content = multi.add(ProgressBar::new_spinner());
    content.set_style(content_style());
    content.enable_steady_tick(Duration::from_millis(100));

    let download = multi.add(ProgressBar::new(0));
    download.set_style(download_style());

    let bar = courses.clone();
    tracker.subscribe(ProgressEventKind::Application, move |event| {
        bar.set_length(event.state.total);
        bar.set_position(event.state.current);
    });

    let bar = courses.clone();
    tracker.subscribe(ProgressEventKind::Course, move |event| {
        if event.state.status == ProgressStatus::Active {
            bar.set_message(event.state.name.clone());
        }
    });

    let bar = content.clone();
    tracker.subscribe(ProgressEventKind::ContentType, move |event| {
        let state = &event.state;
        match state.status {
            ProgressStatus::Completed => bar.set_message(format!(
                "{} done ({} ok, {} skipped, {} failed)",
                state.name, state.success_count, state.skip_count, state.error_count
            )),
            _ => bar.set_message(format!("{} {}/{}", state.name, state.current, state.total)),
        }
    });

    let bar = download.clone();
    tracker.subscribe(ProgressEventKind::Download, move |event| {
        let state = &event.state;
        if state.status.is_terminal() {
            bar.set_position(0);
            bar.set_length(0);
            bar.set_message(String::new());
            return;
        }
        bar.set_length(state.total_bytes.max(state.bytes_downloaded));
        bar.set_position(state.bytes_downloaded);
        bar.set_message(state.name.clone());
    });

    let bar = courses.clone();
    tracker.subscribe(ProgressEventKind::Warning, move |event| {
        if let Some(message) = &event.message {
            bar.println(format!("{} {}", console::style("WARN").yellow().bold(), message));
        }
    });

    let bar = courses.clone();
    tracker.subscribe(ProgressEventKind::Error, move |event| {
        if let Some(message) = &event.message {
            bar.println(format!("{} {}", console::style("ERROR").red().bold(), message));
        }
    });

    ProgressDisplay {
        _multi: multi,
        courses,
        content,
        download,
    }
}
