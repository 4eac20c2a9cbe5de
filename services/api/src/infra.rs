use chrono::NaiveDate;
use mbkm_registration::config::DirectoryConfig;
use mbkm_registration::error::AppError;
use mbkm_registration::workflows::registration::{DirectoryFixtures, MemoryDirectory};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Seeds the in-process directory from the configured fixtures file, if any.
pub(crate) fn load_directory(config: &DirectoryConfig) -> Result<MemoryDirectory, AppError> {
    let Some(path) = config.fixtures.as_ref() else {
        warn!("no directory fixtures configured; activity and user lookups start empty");
        return Ok(MemoryDirectory::default());
    };

    let raw = std::fs::read(path)?;
    let fixtures: DirectoryFixtures = serde_json::from_slice(&raw)?;
    info!(
        path = %path.display(),
        activities = fixtures.activities.len(),
        users = fixtures.users.len(),
        "directory fixtures loaded"
    );
    Ok(MemoryDirectory::from_fixtures(fixtures))
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mbkm_registration::workflows::registration::{AccessToken, UserLookup};
    use std::path::PathBuf;

    #[test]
    fn missing_fixture_path_yields_empty_directory() {
        let directory = load_directory(&DirectoryConfig::default()).expect("empty directory");
        let user = directory
            .current_user(&AccessToken::new("anyone"))
            .expect("lookup runs");
        assert!(user.is_none());
    }

    #[test]
    fn unreadable_fixture_path_is_an_io_error() {
        let config = DirectoryConfig {
            fixtures: Some(PathBuf::from("/nonexistent/mbkm-fixtures.json")),
        };
        assert!(matches!(load_directory(&config), Err(AppError::Io(_))));
    }

    #[test]
    fn parse_date_reports_bad_input() {
        assert_eq!(
            parse_date("2024-01-31"),
            Ok(NaiveDate::from_ymd_opt(2024, 1, 31).expect("valid date"))
        );
        assert!(parse_date("31/01/2024").is_err());
    }
}
