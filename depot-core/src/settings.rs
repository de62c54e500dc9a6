//! Runtime settings consumed at planning and validation time.
//!
//! Read from `<home>/.depot/settings.yaml`. Every key is optional; a missing
//! file or key falls back to the defaults below. Settings are passed into the
//! planners and the registration manager explicitly, never read from globals.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{io_err, StoreError};
use crate::store::{depot_root, home};

/// Hardware identifiers that are never unique and therefore never used for
/// duplicate-host detection.
pub const DMI_UUID_ALLOWED_DUPS: &[&str] = &["", "Not Settable", "Not Present"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Number of repositories synced concurrently per capsule batch.
    pub batch_size: usize,
    /// Only allow re-registration of hosts that are in build mode.
    pub re_register_build_only: bool,
    /// A host's profile may change between registrations (DMI UUID changes allowed).
    pub host_profile_assume: bool,
    /// A host in build mode may change its profile.
    pub host_profile_assume_build_can_change: bool,
    /// Hardware uuids reported by many hosts; replaced by a random uuid on registration.
    pub host_dmi_uuid_duplicates: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            batch_size: 100,
            re_register_build_only: false,
            host_profile_assume: true,
            host_profile_assume_build_can_change: false,
            host_dmi_uuid_duplicates: Vec::new(),
        }
    }
}

impl Settings {
    /// Reject values the planners cannot work with.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.batch_size == 0 {
            return Err(StoreError::InvalidSetting {
                name: "batch_size",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Whether a reported hardware uuid must be replaced before use.
    pub fn override_dmi_uuid(&self, dmi_uuid: Option<&str>) -> bool {
        dmi_uuid.is_some_and(|uuid| self.host_dmi_uuid_duplicates.iter().any(|d| d == uuid))
    }

    /// Whether a hardware uuid is excluded from duplicate detection.
    pub fn dmi_uuid_allowed_dup(dmi_uuid: &str) -> bool {
        DMI_UUID_ALLOWED_DUPS.contains(&dmi_uuid)
    }
}

/// `<home>/.depot/settings.yaml`: pure, no I/O.
pub fn settings_path_at(home: &Path) -> PathBuf {
    depot_root(home).join("settings.yaml")
}

/// Load and validate settings. A missing file yields [`Settings::default`].
pub fn load_at(home: &Path) -> Result<Settings, StoreError> {
    let path = settings_path_at(home);
    if !path.exists() {
        return Ok(Settings::default());
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    let settings: Settings =
        serde_yaml::from_str(&contents).map_err(|e| StoreError::Parse { path, source: e })?;
    settings.validate()?;
    Ok(settings)
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<Settings, StoreError> {
    load_at(&home()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_settings(home: &Path, yaml: &str) {
        let path = settings_path_at(home);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, yaml).unwrap();
    }

    #[test]
    fn missing_file_yields_defaults() {
        let home = TempDir::new().unwrap();
        let settings = load_at(home.path()).expect("load");
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.batch_size, 100);
        assert!(settings.host_profile_assume);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let home = TempDir::new().unwrap();
        write_settings(home.path(), "batch_size: 5\nre_register_build_only: true\n");
        let settings = load_at(home.path()).expect("load");
        assert_eq!(settings.batch_size, 5);
        assert!(settings.re_register_build_only);
        assert!(!settings.host_profile_assume_build_can_change);
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let home = TempDir::new().unwrap();
        write_settings(home.path(), "batch_size: 0\n");
        let err = load_at(home.path()).unwrap_err();
        assert!(matches!(err, StoreError::InvalidSetting { name: "batch_size", .. }));
    }

    #[test]
    fn malformed_file_reports_path() {
        let home = TempDir::new().unwrap();
        write_settings(home.path(), "batch_size: [not a number");
        let err = load_at(home.path()).unwrap_err();
        assert!(err.to_string().contains("settings.yaml"));
    }

    #[test]
    fn dmi_uuid_override_list() {
        let settings = Settings {
            host_dmi_uuid_duplicates: vec!["00000000-0000-0000-0000-000000000000".into()],
            ..Settings::default()
        };
        assert!(settings.override_dmi_uuid(Some("00000000-0000-0000-0000-000000000000")));
        assert!(!settings.override_dmi_uuid(Some("abc")));
        assert!(!settings.override_dmi_uuid(None));
        assert!(Settings::dmi_uuid_allowed_dup("Not Settable"));
        assert!(!Settings::dmi_uuid_allowed_dup("abc"));
    }
}
