use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};

use crate::ticker_logic::config::Settings;

// Dependencies that log every frame or handshake at debug.
const NOISY_TARGETS: [&str; 4] = ["tungstenite", "tokio_tungstenite", "hyper", "rustls"];

pub fn setup_logging(settings: &Settings) -> Result<()> {
    let log_dir = settings.log_dir.as_path();
    if !log_dir.exists() {
        fs::create_dir_all(log_dir)?;
    }

    // Keep only the most recent log file of this service
    cleanup_old_logs(log_dir, &settings.log_prefix)?;

    let log_path = log_file_path(log_dir, &settings.log_prefix);
    let level = parse_level(&settings.log_level);

    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%Y-%m-%d %H:%M:%S]"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(level);
    for target in NOISY_TARGETS {
        dispatch = dispatch.level_for(target, dependency_level(level));
    }

    dispatch
        .chain(std::io::stdout())
        .chain(fern::log_file(&log_path)?)
        .apply()?;

    log::debug!("Logging to {:?}", log_path);
    Ok(())
}

fn log_file_path(log_dir: &Path, prefix: &str) -> PathBuf {
    log_dir.join(format!("{}_{}.log", prefix, chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")))
}

fn parse_level(log_level: &str) -> log::LevelFilter {
    match log_level.trim().to_lowercase().as_str() {
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "warn" => log::LevelFilter::Warn,
        "error" => log::LevelFilter::Error,
        _ => log::LevelFilter::Info,
    }
}

/// Transport crates only follow the service level at trace; otherwise warn at most.
fn dependency_level(level: log::LevelFilter) -> log::LevelFilter {
    if level == log::LevelFilter::Trace {
        level
    } else {
        level.min(log::LevelFilter::Warn)
    }
}

fn cleanup_old_logs(log_dir: &Path, prefix: &str) -> Result<()> {
    let own_prefix = format!("{}_", prefix);
    let mut entries: Vec<_> = fs::read_dir(log_dir)?
        .filter_map(|res| res.ok())
        .filter(|e| {
            let path = e.path();
            path.extension().is_some_and(|ext| ext == "log")
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(&own_prefix))
        })
        .filter_map(|e| {
            let modified = e.metadata().and_then(|m| m.modified()).ok()?;
            Some((modified, e.path()))
        })
        .collect();

    // Sort by modification time, newest first
    entries.sort_by_key(|(modified, _)| std::cmp::Reverse(*modified));

    for (_, path) in entries.iter().skip(1) {
        if let Err(e) = fs::remove_file(path) {
            eprintln!("Failed to delete old log file {:?}: {}", path, e);
        }
    }

    Ok(())
}
