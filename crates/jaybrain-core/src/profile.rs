//! User Profile
//!
//! `data/profile.yaml` holds user preferences as nested YAML. Updates take
//! dotted keys (`job_search.target_role`) and create intermediate maps on
//! the way down.

use std::path::Path;

use serde_yaml::Value;

use crate::storage::StoreError;

/// Profile result type
pub type Result<T> = std::result::Result<T, StoreError>;

/// Load the profile; a missing file is an empty mapping.
pub fn load_profile(path: &Path) -> Result<Value> {
    if !path.exists() {
        return Ok(Value::Mapping(serde_yaml::Mapping::new()));
    }
    let contents = std::fs::read_to_string(path)?;
    serde_yaml::from_str(&contents)
        .map_err(|e| StoreError::Validation(format!("profile parse error: {e}")))
}

/// Set a dotted key, creating intermediate mappings. Fails when a path
/// segment runs through a non-mapping value.
pub fn set_profile_key(profile: &mut Value, dotted_key: &str, value: Value) -> Result<()> {
    if dotted_key.trim().is_empty() {
        return Err(StoreError::Validation("profile key is empty".into()));
    }

    let segments: Vec<&str> = dotted_key.split('.').collect();
    let mut current = profile;
    for (i, segment) in segments.iter().enumerate() {
        if segment.is_empty() {
            return Err(StoreError::Validation(format!(
                "profile key '{dotted_key}' has an empty segment"
            )));
        }
        let Value::Mapping(map) = current else {
            return Err(StoreError::Validation(format!(
                "profile key '{dotted_key}' crosses a non-mapping value"
            )));
        };
        let key = Value::String(segment.to_string());
        if i == segments.len() - 1 {
            map.insert(key, value);
            return Ok(());
        }
        current = map
            .entry(key)
            .or_insert_with(|| Value::Mapping(serde_yaml::Mapping::new()));
    }
    Ok(())
}

/// Read a dotted key.
pub fn get_profile_key<'a>(profile: &'a Value, dotted_key: &str) -> Option<&'a Value> {
    let mut current = profile;
    for segment in dotted_key.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

/// Apply a dotted-key update and persist.
pub fn update_profile(path: &Path, dotted_key: &str, value: Value) -> Result<Value> {
    let mut profile = load_profile(path)?;
    set_profile_key(&mut profile, dotted_key, value)?;
    save_profile(path, &profile)?;
    Ok(profile)
}

/// Persist the profile.
pub fn save_profile(path: &Path, profile: &Value) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let rendered = serde_yaml::to_string(profile)
        .map_err(|e| StoreError::Validation(format!("profile render error: {e}")))?;
    std::fs::write(path, rendered)?;
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_empty_mapping() {
        let dir = TempDir::new().unwrap();
        let profile = load_profile(&dir.path().join("profile.yaml")).unwrap();
        assert!(matches!(profile, Value::Mapping(_)));
    }

    #[test]
    fn test_dotted_update_creates_intermediates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("profile.yaml");

        let profile = update_profile(
            &path,
            "job_search.target_role",
            Value::String("Platform Engineer".into()),
        )
        .unwrap();

        let role = get_profile_key(&profile, "job_search.target_role").unwrap();
        assert_eq!(role.as_str(), Some("Platform Engineer"));

        // Round-trips through the file
        let reloaded = load_profile(&path).unwrap();
        assert_eq!(
            get_profile_key(&reloaded, "job_search.target_role")
                .and_then(|v| v.as_str()),
            Some("Platform Engineer")
        );
    }

    #[test]
    fn test_update_preserves_siblings() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("profile.yaml");
        update_profile(&path, "job_search.target_role", Value::String("SRE".into())).unwrap();
        let profile =
            update_profile(&path, "job_search.min_salary", Value::Number(120_000.into())).unwrap();

        assert_eq!(
            get_profile_key(&profile, "job_search.target_role").and_then(|v| v.as_str()),
            Some("SRE")
        );
        assert_eq!(
            get_profile_key(&profile, "job_search.min_salary").and_then(|v| v.as_i64()),
            Some(120_000)
        );
    }

    #[test]
    fn test_path_through_scalar_fails() {
        let mut profile = Value::Mapping(serde_yaml::Mapping::new());
        set_profile_key(&mut profile, "name", Value::String("Jay".into())).unwrap();
        let err = set_profile_key(&mut profile, "name.first", Value::String("J".into()))
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn test_empty_key_rejected() {
        let mut profile = Value::Mapping(serde_yaml::Mapping::new());
        assert!(set_profile_key(&mut profile, "", Value::Null).is_err());
        assert!(set_profile_key(&mut profile, "a..b", Value::Null).is_err());
    }
}
