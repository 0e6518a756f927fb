//! Implementation of the `clusterlock config` commands.

use crate::cli::ConfigArgs;
use clusterlock::config::Config;
use clusterlock::error::{LockError, Result};
use std::path::Path;

fn load_or_default(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path),
        None => Ok(Config::default()),
    }
}

/// Execute `clusterlock config show`.
pub fn cmd_config_show(args: ConfigArgs) -> Result<()> {
    let config = load_or_default(args.path.as_deref())?;
    print!("{}", config.to_yaml()?);
    Ok(())
}

/// Execute `clusterlock config validate`.
///
/// Loading already validates; on success a one-line summary is printed.
pub fn cmd_config_validate(args: ConfigArgs) -> Result<()> {
    let Some(path) = args.path else {
        return Err(LockError::InvalidArgument(
            "config validate needs the path of a config file".to_string(),
        ));
    };

    let config = Config::load(&path)?;
    println!(
        "{}: ok (service {}, method call timeout {} ms, release policy {:?})",
        path.display(),
        config.service(),
        config.method_call_timeout_ms,
        config.release_policy
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clusterlock::exit_codes;
    use std::fs;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, content: &str) -> std::path::PathBuf {
        let path = dir.path().join("clusterlock.yaml");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn show_defaults_without_path() {
        cmd_config_show(ConfigArgs { path: None }).unwrap();
    }

    #[test]
    fn validate_accepts_good_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(
            &temp_dir,
            "cluster_name: orders\nmethod_call_timeout_ms: 5000\nrelease_policy: retain\n",
        );

        cmd_config_validate(ConfigArgs {
            path: Some(path.clone()),
        })
        .unwrap();
        cmd_config_show(ConfigArgs { path: Some(path) }).unwrap();
    }

    #[test]
    fn validate_reports_bad_values() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(&temp_dir, "retry_backoff_min_ms: 0\n");

        let err = cmd_config_validate(ConfigArgs { path: Some(path) }).unwrap_err();
        assert!(matches!(err, LockError::Config(_)));
        assert!(err.to_string().contains("retry_backoff_min_ms"));
        assert_eq!(err.exit_code(), exit_codes::USER_ERROR);
    }

    #[test]
    fn validate_requires_path() {
        let err = cmd_config_validate(ConfigArgs { path: None }).unwrap_err();
        assert!(err.is_illegal_argument());
    }

    #[test]
    fn show_reports_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let err = cmd_config_show(ConfigArgs {
            path: Some(temp_dir.path().join("missing.yaml")),
        })
        .unwrap_err();
        assert!(err.to_string().contains("failed to read config file"));
    }
}
