use std::fs;
use std::path::{Path, PathBuf};

use crate::config::value::{ConfigValue, INCLUDE_EXT};
use crate::error::ConfigError;

/// Read and parse one JSON config document.
pub(crate) fn read_config_file(path: &Path) -> Result<ConfigValue, ConfigError> {
    if !path.is_file() {
        return Err(ConfigError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    ConfigValue::from_json_str(&text).map_err(|source| ConfigError::InvalidJson {
        path: path.to_path_buf(),
        source,
    })
}

/// `*.config` members of `dir`, ascending by file name.
pub(crate) fn list_config_files(dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let entries = fs::read_dir(dir).map_err(|source| ConfigError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files: Vec<PathBuf> = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        let is_config = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(INCLUDE_EXT));
        if path.is_file() && is_config {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigManager, Tier};
    use serde_json::json;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn missing_file_reports_path() {
        let err = read_config_file(Path::new("/nonexistent/app.config")).unwrap_err();
        match err {
            ConfigError::FileNotFound { path } => {
                assert!(path.ends_with("app.config"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn invalid_json_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "bad.config", "{not json");
        assert!(matches!(
            read_config_file(&path),
            Err(ConfigError::InvalidJson { .. })
        ));
    }

    #[test]
    fn add_file_loads_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "app.config", r#"{"a": 1}"#);

        let mgr = ConfigManager::new();
        let id = mgr.add_file(&path, Tier::Default).unwrap().unwrap();
        assert_eq!(
            mgr.get(id).unwrap(),
            ConfigValue::from_json(&json!({"a": 1}))
        );
    }

    #[test]
    fn includes_load_before_including_document() {
        let dir = tempfile::tempdir().unwrap();
        let base = write_file(dir.path(), "base.config", r#"{"a": 1, "b": 2}"#);
        let main = write_file(
            dir.path(),
            "main.config",
            &format!(r#"{{"__include__": ["{}"], "b": 20}}"#, base.display()),
        );

        let mgr = ConfigManager::new();
        mgr.add_file(&main, Tier::User).unwrap();

        let merged = mgr.get_merged();
        assert_eq!(merged.get("a"), Some(&ConfigValue::Int32(1)));
        // the including document wins over its include
        assert_eq!(merged.get("b"), Some(&ConfigValue::Int32(20)));
    }

    #[test]
    fn directory_includes_expand_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("conf.d");
        fs::create_dir(&sub).unwrap();
        write_file(&sub, "20-second.config", r#"{"x": "second", "b": 2}"#);
        write_file(&sub, "10-first.config", r#"{"x": "first", "a": 1}"#);
        write_file(&sub, "notes.txt", "ignored");

        let mgr = ConfigManager::new();
        assert_eq!(mgr.add_file(&sub, Tier::Default).unwrap(), None);

        let merged = mgr.get_merged();
        assert_eq!(merged.get("a"), Some(&ConfigValue::Int32(1)));
        assert_eq!(merged.get("b"), Some(&ConfigValue::Int32(2)));
        // 20-second.config merged last
        assert_eq!(merged.get("x"), Some(&ConfigValue::String("second".into())));
    }

    #[test]
    fn include_cycle_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let a_path = dir.path().join("a.config");
        let b_path = dir.path().join("b.config");
        write_file(
            dir.path(),
            "a.config",
            &format!(r#"{{"__include__": ["{}"]}}"#, b_path.display()),
        );
        write_file(
            dir.path(),
            "b.config",
            &format!(r#"{{"__include__": ["{}"]}}"#, a_path.display()),
        );

        let mgr = ConfigManager::new();
        assert!(matches!(
            mgr.add_file(&a_path, Tier::Default),
            Err(ConfigError::IncludeCycle { .. })
        ));
    }

    #[test]
    fn diamond_include_is_not_a_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let common = write_file(dir.path(), "common.config", r#"{"shared": 1}"#);
        let b = write_file(
            dir.path(),
            "b.config",
            &format!(r#"{{"__include__": ["{}"], "b": 2}}"#, common.display()),
        );
        let a = write_file(
            dir.path(),
            "a.config",
            &format!(
                r#"{{"__include__": ["{}", "{}"], "a": 3}}"#,
                common.display(),
                b.display()
            ),
        );

        // common is reached on two branches; that is a shared
        // dependency, not a cycle
        let mgr = ConfigManager::new();
        mgr.add_file(&a, Tier::Default).unwrap();

        let merged = mgr.get_merged();
        assert_eq!(merged.get("shared"), Some(&ConfigValue::Int32(1)));
        assert_eq!(merged.get("b"), Some(&ConfigValue::Int32(2)));
        assert_eq!(merged.get("a"), Some(&ConfigValue::Int32(3)));
    }

    #[test]
    fn self_include_is_a_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("selfie.config");
        write_file(
            dir.path(),
            "selfie.config",
            &format!(r#"{{"__include__": ["{}"]}}"#, path.display()),
        );

        let mgr = ConfigManager::new();
        assert!(matches!(
            mgr.add_file(&path, Tier::Default),
            Err(ConfigError::IncludeCycle { .. })
        ));
    }

    #[test]
    fn non_string_include_entry_is_invalid() {
        let mgr = ConfigManager::new();
        let err = mgr
            .add(
                ConfigValue::from_json(&json!({"__include__": [42]})),
                Tier::Default,
            )
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidInclude { .. }));
    }

    #[test]
    fn included_defaults_stay_below_user_overlay() {
        let dir = tempfile::tempdir().unwrap();
        let defaults = write_file(
            dir.path(),
            "defaults.config",
            r#"{"pool": {"maxThreads": 10, "idleExpiryMillis": 120000}}"#,
        );
        let user = write_file(
            dir.path(),
            "user.config",
            &format!(
                r#"{{"__include__": ["{}"], "pool": {{"maxThreads": 2}}}}"#,
                defaults.display()
            ),
        );

        let mgr = ConfigManager::new();
        mgr.add_file(&user, Tier::User).unwrap();

        let merged = mgr.get_merged();
        let pool = merged.get("pool").unwrap();
        assert_eq!(pool.get("maxThreads"), Some(&ConfigValue::Int32(2)));
        assert_eq!(pool.get("idleExpiryMillis"), Some(&ConfigValue::Int32(120_000)));

        // changes relative to the Default tier are just the user overlay
        let changes = mgr.get_changes(Tier::Default).unwrap();
        assert_eq!(
            changes.get("pool").and_then(|p| p.get("maxThreads")),
            Some(&ConfigValue::Int32(2))
        );
    }
}
