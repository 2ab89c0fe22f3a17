// Logging utilities
// Structured logging with JSON and human-readable formats

use anyhow::Result;
use log::Level;
use serde_json::json;
use std::path::Path;

/// Parse phase and step from log message
/// Extracts [PHASE: ...] and [STEP: ...] patterns
pub fn parse_log_metadata(message: &str) -> (Option<String>, Option<String>, String) {
    let mut phase = None;
    let mut step = None;
    let mut cleaned_message = message.to_string();

    if let Some((value, rest)) = extract_tag(&cleaned_message, "[PHASE:") {
        phase = Some(value);
        cleaned_message = rest;
    }

    if let Some((value, rest)) = extract_tag(&cleaned_message, "[STEP:") {
        step = Some(value);
        cleaned_message = rest;
    }

    (phase, step, cleaned_message)
}

fn extract_tag(message: &str, tag: &str) -> Option<(String, String)> {
    let start = message.find(tag)?;
    let end = message[start..].find(']')?;
    let value = message[start + tag.len()..start + end].trim().to_string();
    let rest = format!("{} {}", &message[..start], &message[start + end + 1..])
        .trim()
        .to_string();
    Some((value, rest))
}

/// Format log entry as JSON for structured logging
pub fn format_json_log(
    timestamp: &str,
    level: Level,
    target: &str,
    message: &str,
    phase: Option<&str>,
    step: Option<&str>,
) -> String {
    let mut log_entry = json!({
        "timestamp": timestamp,
        "level": level.as_str(),
        "target": target,
        "message": message,
    });

    if let Some(phase) = phase {
        log_entry["phase"] = json!(phase);
    }

    if let Some(step) = step {
        log_entry["step"] = json!(step);
    }

    serde_json::to_string(&log_entry).unwrap_or_else(|_| "{}".to_string())
}

/// Format log entry as human-readable text
pub fn format_human_readable_log(
    timestamp: &str,
    level: Level,
    target: &str,
    message: &str,
    phase: Option<&str>,
    step: Option<&str>,
) -> String {
    let mut log_line = format!("[{}] [{}]", timestamp, level.as_str());

    if let Some(phase) = phase {
        log_line.push_str(&format!(" [PHASE: {}]", phase));
    }

    if let Some(step) = step {
        log_line.push_str(&format!(" [STEP: {}]", step));
    }

    log_line.push_str(&format!(" [{}] {}", target, message));
    log_line
}

fn human_readable_line(message: &std::fmt::Arguments<'_>, record: &log::Record<'_>) -> String {
    let timestamp_local = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
    let message_str = format!("{}", message);
    let (phase, step, cleaned_message) = parse_log_metadata(&message_str);
    format_human_readable_log(
        &timestamp_local.to_string(),
        record.level(),
        record.target(),
        &cleaned_message,
        phase.as_deref(),
        step.as_deref(),
    )
}

/// Initialize logging with dual format (JSON + human-readable) under `log_dir`.
///
/// Stdout output is optional: the terminal wizard disables it so log lines do not corrupt the UI.
pub fn init_logging(log_dir: &Path, with_stdout: bool) -> Result<()> {
    std::fs::create_dir_all(log_dir)?;

    let timestamp = chrono::Utc::now().format("%Y-%m-%d-%H%M%S");
    let json_log_file = log_dir.join(format!("installer-{}.log", timestamp));
    let txt_log_file = log_dir.join(format!("installer-{}.txt", timestamp));

    let mut dispatch = fern::Dispatch::new()
        .level(log::LevelFilter::Debug)
        // Dependency chatter (hyper, reqwest internals) stays out of the install log.
        .level_for("hyper", log::LevelFilter::Info)
        .level_for("hyper_util", log::LevelFilter::Info)
        .level_for("reqwest", log::LevelFilter::Info);

    if with_stdout {
        dispatch = dispatch.chain(
            fern::Dispatch::new()
                .level(log::LevelFilter::Info)
                .format(move |out, message, record| {
                    out.finish(format_args!("{}", human_readable_line(message, record)));
                })
                .chain(std::io::stdout()),
        );
    }

    dispatch = dispatch
        .chain(
            fern::Dispatch::new()
                .format(move |out, message, record| {
                    let timestamp_utc = chrono::Utc::now().to_rfc3339();
                    let message_str = format!("{}", message);
                    let (phase, step, cleaned_message) = parse_log_metadata(&message_str);
                    let json_line = format_json_log(
                        &timestamp_utc,
                        record.level(),
                        record.target(),
                        &cleaned_message,
                        phase.as_deref(),
                        step.as_deref(),
                    );
                    out.finish(format_args!("{}\n", json_line));
                })
                .chain(fern::log_file(json_log_file)?),
        )
        .chain(
            fern::Dispatch::new()
                .format(move |out, message, record| {
                    out.finish(format_args!("{}\n", human_readable_line(message, record)));
                })
                .chain(fern::log_file(txt_log_file)?),
        );

    dispatch.apply()?;

    log::info!(
        "[PHASE: initialization] Logging initialized, log directory: {:?}",
        log_dir
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_log_metadata_extracts_phase_and_step() {
        let (phase, step, msg) =
            parse_log_metadata("[PHASE: install] [STEP: fetch] Downloading artifact");
        assert_eq!(phase.as_deref(), Some("install"));
        assert_eq!(step.as_deref(), Some("fetch"));
        assert_eq!(msg, "Downloading artifact");
    }

    #[test]
    fn parse_log_metadata_without_tags_keeps_message() {
        let (phase, step, msg) = parse_log_metadata("plain message");
        assert!(phase.is_none());
        assert!(step.is_none());
        assert_eq!(msg, "plain message");
    }

    #[test]
    fn parse_log_metadata_phase_only() {
        let (phase, step, msg) = parse_log_metadata("[PHASE: lifecycle] Stopping wire-pod");
        assert_eq!(phase.as_deref(), Some("lifecycle"));
        assert!(step.is_none());
        assert_eq!(msg, "Stopping wire-pod");
    }

    #[test]
    fn format_json_log_includes_optional_fields() {
        let line = format_json_log(
            "2026-01-01T00:00:00Z",
            Level::Info,
            "wirepod_installer",
            "hello",
            Some("install"),
            None,
        );
        let v: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(v["level"], "INFO");
        assert_eq!(v["phase"], "install");
        assert!(v.get("step").is_none());
    }

    #[test]
    fn format_human_readable_log_layout() {
        let line = format_human_readable_log(
            "2026-01-01 00:00:00.000",
            Level::Warn,
            "t",
            "msg",
            Some("p"),
            Some("s"),
        );
        assert_eq!(
            line,
            "[2026-01-01 00:00:00.000] [WARN] [PHASE: p] [STEP: s] [t] msg"
        );
    }
}
