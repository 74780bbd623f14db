//! canvas-sync - CLI entry point.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use canvas_sync::{
    cli::Args,
    config::{validate_config, Config},
    download::DownloaderRegistry,
    error::{exit_codes, Error, Result},
    orchestrator::Orchestrator,
    output::{
        attach_progress_bars, print_banner, print_config_summary, print_course_list, print_error,
        print_info, print_run_summary, print_success, print_warning,
    },
    progress::ProgressTracker,
};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => ExitCode::from(code as u8),
        Err(e) => {
            print_error(&format!("{}", e));
            let code = match e {
                Error::Config(_)
                | Error::ConfigValidation { .. }
                | Error::MissingConfig(_)
                | Error::TomlParse(_) => exit_codes::CONFIG_ERROR,
                Error::Authentication(_)
                | Error::Forbidden(_)
                | Error::InvalidBaseUrl(_)
                | Error::SessionNotInitialized
                | Error::Api(_)
                | Error::Status { .. }
                | Error::NotFound(_)
                | Error::RateLimited(_)
                | Error::Timeout(_)
                | Error::Http(_) => exit_codes::API_ERROR,
                Error::Download(_) | Error::Scrape(_) => exit_codes::DOWNLOAD_ERROR,
                _ => exit_codes::UNEXPECTED_ERROR,
            };
            ExitCode::from(code as u8)
        }
    }
}

async fn run() -> Result<i32> {
    // Parse CLI arguments
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    fmt().with_env_filter(filter).with_target(false).init();

    print_banner();

    // Load configuration
    let config_path = args.config.clone();
    let mut config = if config_path.exists() {
        Config::load(&config_path)?
    } else {
        print_warning(&format!(
            "Configuration file not found: {}",
            config_path.display()
        ));
        print_info("Using default configuration with CLI arguments");
        Config::default()
    };

    args.merge_into_config(&mut config);
    validate_config(&config)?;

    print_config_summary(
        &args.courses,
        &config.content_types.enabled(),
        &config.download_directory(),
    );

    let registry = DownloaderRegistry::with_defaults(&config.modules);
    let tracker = Arc::new(ProgressTracker::new());
    let mut orchestrator = Orchestrator::new(config, &registry, tracker.clone());

    print_info("Connecting to Canvas...");
    let user = orchestrator.initialize_session().await?;
    print_info(&format!("Logged in as: {}", user.name));

    if args.list {
        let courses = orchestrator.available_courses().await?;
        print_course_list(&courses);
        return Ok(exit_codes::SUCCESS);
    }

    let course_ids: Vec<String> = if args.all {
        orchestrator
            .available_courses()
            .await?
            .into_iter()
            .map(|course| course.id)
            .collect()
    } else {
        args.courses.clone()
    };

    if course_ids.is_empty() {
        return Err(Error::MissingConfig(
            "no courses selected, pass --course <id> or --all".into(),
        ));
    }

    let token = orchestrator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            print_warning("Interrupted, finishing the current content type...");
            token.cancel();
        }
    });

    let display = (!args.quiet).then(|| attach_progress_bars(&tracker));
    let outcome = orchestrator.download_courses(&course_ids).await;
    if let Some(display) = &display {
        display.finish();
    }
    let results = outcome?;

    print_run_summary(&results);

    if results.cancelled {
        print_warning("Download cancelled");
        return Ok(exit_codes::ABORT);
    }

    if results.has_failures() {
        print_warning(&format!("{} course(s) failed", results.failed_courses));
        return Ok(exit_codes::SOME_COURSES_FAILED);
    }

    print_success(&format!(
        "Saved {} course(s) to {}",
        results.successful_courses,
        orchestrator.config().download_directory().display()
    ));
    Ok(exit_codes::SUCCESS)
}
