use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::{AppError, AppResult};
use crate::map::MapView;
use crate::search::{PlaceRecord, SearchResult};

pub const MIN_RADIUS_KM: u32 = 1;
pub const MAX_RADIUS_KM: u32 = 50;
const DEFAULT_RADIUS_KM: u32 = 50;
const SALT_BYTES: usize = 32;

/// Everything restored across restarts: the last search, the map view, both
/// result orderings as plain provider-shaped JSON, and the table selection.
/// The API key lives in the keyring, never here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub search_query: String,
    pub radius_km: u32,
    pub map_view: MapView,
    #[serde(default)]
    pub original_order: Vec<PlaceRecord>,
    #[serde(default)]
    pub ranked_order: Vec<PlaceRecord>,
    #[serde(default)]
    pub selected_row: Option<usize>,
    pub telemetry_salt: String,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            search_query: String::new(),
            radius_km: DEFAULT_RADIUS_KM,
            map_view: MapView::default(),
            original_order: Vec::new(),
            ranked_order: Vec::new(),
            selected_row: None,
            telemetry_salt: generate_salt(),
        }
    }
}

impl SessionState {
    /// Loads persisted state, regenerating defaults when the file is missing
    /// or unreadable as JSON. A malformed file is never fatal.
    pub fn load(path: &Path) -> AppResult<Self> {
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<Self>(&contents) {
                Ok(state) => Ok(state),
                Err(err) => {
                    warn!(
                        target: "settings",
                        error = ?err,
                        "failed to parse session file; regenerating defaults"
                    );
                    let defaults = Self::default();
                    defaults.persist(path)?;
                    Ok(defaults)
                }
            },
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                let defaults = Self::default();
                defaults.persist(path)?;
                Ok(defaults)
            }
            Err(err) => Err(AppError::Io(err)),
        }
    }

    pub fn persist(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let serialized = serde_json::to_string_pretty(self)?;
        fs::write(path, serialized)?;
        Ok(())
    }

    pub fn set_radius_km(&mut self, radius_km: u32) -> u32 {
        self.radius_km = clamp_radius_km(radius_km);
        self.radius_km
    }

    pub fn radius_meters(&self) -> f64 {
        f64::from(self.radius_km) * 1_000.0
    }

    pub fn remember_result(&mut self, query: &str, result: &SearchResult) {
        self.search_query = query.to_string();
        self.original_order = result.original_order.clone();
        self.ranked_order = result.ranked_order.clone();
        self.selected_row = None;
    }

    pub fn select_row(&mut self, row: Option<usize>) {
        self.selected_row = row.filter(|&r| r < self.ranked_order.len());
    }
}

pub fn clamp_radius_km(value: u32) -> u32 {
    value.clamp(MIN_RADIUS_KM, MAX_RADIUS_KM)
}

fn generate_salt() -> String {
    let mut bytes = vec![0_u8; SALT_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

pub fn settings_path(data_dir: &Path, file_name: &str) -> PathBuf {
    data_dir.join(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{LocalizedText, Location};
    use tempfile::tempdir;

    fn sample_result() -> SearchResult {
        let record = PlaceRecord {
            id: Some("ChIJ123".into()),
            display_name: Some(LocalizedText {
                text: Some("Test Spot".into()),
            }),
            formatted_address: Some("1 Test Street".into()),
            rating: Some(4.4),
            user_rating_count: 120,
            location: Some(Location {
                latitude: Some(48.86),
                longitude: Some(2.29),
            }),
            plus_code: None,
        };
        SearchResult {
            original_order: vec![record.clone()],
            ranked_order: vec![record],
        }
    }

    #[test]
    fn creates_defaults_when_file_missing() {
        let dir = tempdir().unwrap();
        let path = settings_path(dir.path(), "settings.json");

        let state = SessionState::load(&path).unwrap();

        assert!(path.exists());
        assert_eq!(state.radius_km, DEFAULT_RADIUS_KM);
        assert!(!state.telemetry_salt.is_empty());
        assert!(state.original_order.is_empty());
    }

    #[test]
    fn round_trips_session_with_results() {
        let dir = tempdir().unwrap();
        let path = settings_path(dir.path(), "settings.json");

        let mut state = SessionState::load(&path).unwrap();
        state.remember_result("coffee", &sample_result());
        state.set_radius_km(25);
        state.map_view = MapView {
            latitude: 40.7128,
            longitude: -74.006,
            zoom: 11,
        };
        state.select_row(Some(0));
        state.persist(&path).unwrap();

        let restored = SessionState::load(&path).unwrap();
        assert_eq!(restored.search_query, "coffee");
        assert_eq!(restored.radius_km, 25);
        assert_eq!(restored.map_view.zoom, 11);
        assert_eq!(restored.selected_row, Some(0));
        assert_eq!(restored.ranked_order[0].id.as_deref(), Some("ChIJ123"));
        assert_eq!(restored.telemetry_salt, state.telemetry_salt);
    }

    #[test]
    fn persisted_places_keep_provider_field_names() {
        let dir = tempdir().unwrap();
        let path = settings_path(dir.path(), "settings.json");

        let mut state = SessionState::default();
        state.remember_result("coffee", &sample_result());
        state.persist(&path).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"formattedAddress\""));
        assert!(raw.contains("\"userRatingCount\""));
    }

    #[test]
    fn malformed_file_regenerates_defaults() {
        let dir = tempdir().unwrap();
        let path = settings_path(dir.path(), "settings.json");
        fs::write(&path, "{ not json").unwrap();

        let state = SessionState::load(&path).unwrap();

        assert_eq!(state.search_query, "");
        assert_eq!(state.radius_km, DEFAULT_RADIUS_KM);
        // The broken file was replaced with something loadable.
        let reloaded = SessionState::load(&path).unwrap();
        assert_eq!(reloaded.radius_km, DEFAULT_RADIUS_KM);
    }

    #[test]
    fn clamps_radius_to_spinner_range() {
        let mut state = SessionState::default();
        assert_eq!(state.set_radius_km(0), MIN_RADIUS_KM);
        assert_eq!(state.set_radius_km(500), MAX_RADIUS_KM);
        assert_eq!(state.set_radius_km(25), 25);
    }

    #[test]
    fn selection_outside_results_is_cleared() {
        let mut state = SessionState::default();
        state.remember_result("coffee", &sample_result());
        state.select_row(Some(5));
        assert_eq!(state.selected_row, None);
        state.select_row(Some(0));
        assert_eq!(state.selected_row, Some(0));
    }
}
