use env_logger::{Builder, WriteStyle};
use log::{info, warn, LevelFilter};
use std::fs::OpenOptions;
use std::path::Path;

/// Initialize the logging system, appending to `log_file` at the given level
pub fn initialize_logging(log_file: &Path, level: LevelFilter) -> Result<(), Box<dyn std::error::Error>> {
    let file = OpenOptions::new().create(true).append(true).open(log_file)?;

    Builder::new()
        .filter_level(level)
        .format_timestamp_secs()
        .format_module_path(true)
        .write_style(WriteStyle::Never)
        .target(env_logger::Target::Pipe(Box::new(file)))
        .try_init()?;

    info!("Logging system initialized");
    Ok(())
}

/// Mask all but the edges of an identifier before it reaches the log
pub fn format_sensitive(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{}***{}", head, tail)
}

fn timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Structured logging for account events
pub fn log_auth_event(event_type: &str, username: &str, success: bool, details: Option<&str>) {
    if success {
        info!(
            "Auth event: type={}, user={}, success=true, timestamp={}, details={:?}",
            event_type,
            format_sensitive(username),
            timestamp(),
            details
        );
    } else {
        warn!(
            "Auth event: type={}, user={}, success=false, timestamp={}, details={:?}",
            event_type,
            format_sensitive(username),
            timestamp(),
            details
        );
    }
}

/// Structured logging for invitation code events
pub fn log_invitation_event(event_type: &str, code: &str, success: bool, details: Option<&str>) {
    if success {
        info!(
            "Invitation event: type={}, code={}, success=true, timestamp={}, details={:?}",
            event_type,
            format_sensitive(code),
            timestamp(),
            details
        );
    } else {
        warn!(
            "Invitation event: type={}, code={}, success=false, timestamp={}, details={:?}",
            event_type,
            format_sensitive(code),
            timestamp(),
            details
        );
    }
}

/// Structured logging for record store operations
pub fn log_data_operation(
    operation: &str,
    user: &str,
    resource: &str,
    success: bool,
    details: Option<&str>,
) {
    if success {
        info!(
            "Data operation: op={}, user={}, resource={}, success=true, timestamp={}, details={:?}",
            operation,
            format_sensitive(user),
            resource,
            timestamp(),
            details
        );
    } else {
        log::error!(
            "Data operation: op={}, user={}, resource={}, success=false, timestamp={}, details={:?}",
            operation,
            format_sensitive(user),
            resource,
            timestamp(),
            details
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_sensitive_data_formatting() {
        assert_eq!(format_sensitive("password"), "pa***rd");
        assert_eq!(format_sensitive("ab12"), "****");
        assert_eq!(format_sensitive("Alice01"), "Al***01");
        assert_eq!(format_sensitive("héllo"), "hé***lo");
        assert_eq!(format_sensitive(""), "");
    }

    #[test]
    fn test_logging_initialization() {
        let log_file = NamedTempFile::new().unwrap();

        // Another test may already have installed a logger
        let result = initialize_logging(log_file.path(), LevelFilter::Info);
        assert!(
            result.is_ok()
                || result
                    .unwrap_err()
                    .to_string()
                    .contains("already")
        );
    }
}
