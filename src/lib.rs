pub mod commands;
pub mod config;
pub mod errors;
pub mod geo;
pub mod map;
pub mod presenter;
pub mod search;
pub mod secrets;
pub mod settings;
pub mod telemetry;

use std::path::PathBuf;
use std::time::Instant;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use secrecy::SecretString;
use serde_json::json;
use tauri::Manager;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::commands::{SearchResponse, SessionSnapshot};
use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};
use crate::map::{MapBridge, MapCommand, MapView};
use crate::presenter::table_rows;
use crate::search::{PlaceSearchPipeline, SearchRequest};
use crate::secrets::{SecretVault, API_KEY_ALIAS};
use crate::settings::{settings_path, SessionState};
use crate::telemetry::{hash_query, TelemetryClient};

const VAULT_SERVICE_NAME: &str = "SearchMaps";

pub struct AppState {
    config: AppConfig,
    vault: SecretVault,
    telemetry: TelemetryClient,
    session_path: PathBuf,
    session: Mutex<SessionState>,
    map: MapBridge,
    pipeline: PlaceSearchPipeline,
    // One search at a time; a second request waits for the first to finish.
    search_guard: AsyncMutex<()>,
}

impl AppState {
    fn initialize(app: &tauri::AppHandle) -> AppResult<Self> {
        init_tracing();
        let config = AppConfig::from_env();
        let vault = SecretVault::new(VAULT_SERVICE_NAME);
        let data_dir = app.path().app_data_dir()?;
        std::fs::create_dir_all(&data_dir)?;

        let session_path = settings_path(&data_dir, &config.settings_file_name);
        let session = SessionState::load(&session_path)?;
        let telemetry = TelemetryClient::new(&data_dir, &config)?;
        let pipeline = PlaceSearchPipeline::new(&config)?;

        let map = MapBridge::new(session.map_view);
        map.push_command(MapCommand::SetView {
            latitude: session.map_view.latitude,
            longitude: session.map_view.longitude,
            zoom: session.map_view.zoom,
        });
        map.push_command(MapCommand::SetRadius {
            meters: session.radius_meters(),
        });

        if let Err(err) = telemetry.record(
            "app_start",
            json!({
                "version": env!("CARGO_PKG_VERSION"),
                "restored_results": session.ranked_order.len(),
            }),
        ) {
            warn!(?err, "failed to queue telemetry bootstrap event");
        }
        if let Err(err) = telemetry.flush() {
            warn!(?err, "failed to flush telemetry queue");
        }

        Ok(Self {
            config,
            vault,
            telemetry,
            session_path,
            session: Mutex::new(session),
            map,
            pipeline,
            search_guard: AsyncMutex::new(()),
        })
    }

    pub async fn run_search(&self, query: String, min_reviews: u64) -> AppResult<SearchResponse> {
        let _lock = self.search_guard.lock().await;

        let api_key = self.api_key()?.ok_or_else(|| {
            AppError::Config("API key is not set. Please set it in Settings.".into())
        })?;

        let (radius_meters, salt) = {
            let session = self.session.lock();
            (session.radius_meters(), session.telemetry_salt.clone())
        };
        let view = self.map.current_view();
        let request = SearchRequest::new(
            query.clone(),
            view.latitude,
            view.longitude,
            radius_meters,
            min_reviews,
        )?;

        let _ = self.telemetry.record(
            "search_started",
            json!({
                "query_hash": hash_query(&salt, &request.query),
                "radius_m": request.radius_meters,
                "min_reviews": min_reviews,
            }),
        );
        info!(radius_m = request.radius_meters, "running place search");

        let started = Instant::now();
        let result = match self.pipeline.execute(&request, &api_key).await {
            Ok(result) => result,
            Err(err) => {
                let message = err.to_string();
                let _ = self.telemetry.record(
                    "api_error",
                    json!({ "reason": sanitize_error_copy(&message) }),
                );
                let _ = self.telemetry.flush();
                return Err(err);
            }
        };

        let _ = self.telemetry.record(
            "search_completed",
            json!({
                "fetched": result.original_order.len(),
                "ranked": result.ranked_order.len(),
                "duration_ms": started.elapsed().as_millis() as u64,
            }),
        );

        let rows = table_rows(&result.ranked_order, &result.original_order);
        let response = SearchResponse {
            fetched_count: result.original_order.len(),
            ranked_count: result.ranked_order.len(),
            rows,
        };

        {
            let mut session = self.session.lock();
            session.remember_result(&request.query, &result);
        }
        self.persist_session()?;

        Ok(response)
    }

    pub fn map_view_changed(&self, view: MapView) {
        self.map.view_changed(view);
    }

    pub fn drain_map_commands(&self) -> Vec<MapCommand> {
        self.map.drain_commands()
    }

    pub fn set_radius_km(&self, radius_km: u32) -> u32 {
        let clamped = self.session.lock().set_radius_km(radius_km);
        self.map.push_command(MapCommand::SetRadius {
            meters: f64::from(clamped) * 1_000.0,
        });
        clamped
    }

    pub fn select_row(&self, row: Option<usize>) {
        self.session.lock().select_row(row);
    }

    pub fn session_snapshot(&self) -> AppResult<SessionSnapshot> {
        let has_api_key = self.api_key()?.is_some();
        let session = self.session.lock();
        Ok(SessionSnapshot {
            search_query: session.search_query.clone(),
            radius_km: session.radius_km,
            map_view: session.map_view,
            rows: table_rows(&session.ranked_order, &session.original_order),
            selected_row: session.selected_row,
            has_api_key,
            config: self.config.public_profile(),
        })
    }

    pub fn save_api_key(&self, key: &str) -> AppResult<()> {
        let trimmed = key.trim();
        if trimmed.is_empty() {
            return self.vault.delete(API_KEY_ALIAS);
        }
        self.vault
            .write_secret(API_KEY_ALIAS, &SecretString::from(trimmed.to_string()))
    }

    pub fn api_key_present(&self) -> AppResult<bool> {
        Ok(self.api_key()?.is_some())
    }

    pub fn place_url(&self, row: usize) -> AppResult<String> {
        let session = self.session.lock();
        let place = session
            .ranked_order
            .get(row)
            .ok_or_else(|| AppError::Config(format!("no result at row {row}")))?;
        if let Some(id) = place.id.as_deref().filter(|id| !id.is_empty()) {
            return Ok(format!("https://www.google.com/maps/place/?q=place_id:{id}"));
        }
        if let Some((lat, lon)) = place.coordinates() {
            return Ok(format!(
                "https://www.google.com/maps/search/?api=1&query={lat},{lon}"
            ));
        }
        Err(AppError::Config(
            "selected place has neither an id nor coordinates".into(),
        ))
    }

    pub fn persist_session(&self) -> AppResult<()> {
        let mut session = self.session.lock();
        session.map_view = self.map.current_view();
        session.persist(&self.session_path)
    }

    fn shutdown(&self) {
        if let Err(err) = self.persist_session() {
            warn!(?err, "failed to persist session on exit");
        }
        let _ = self.telemetry.record("session_persisted", json!({}));
        if let Err(err) = self.telemetry.flush() {
            warn!(?err, "failed to flush telemetry on exit");
        }
    }

    fn api_key(&self) -> AppResult<Option<SecretString>> {
        if let Some(key) = self.vault.read_secret(API_KEY_ALIAS)? {
            return Ok(Some(key));
        }
        Ok(self.config.google_places_api_key.clone())
    }
}

/// Strips provider API keys from error text before it reaches logs or the
/// telemetry buffer, and keeps oversized response bodies short.
pub fn sanitize_error_copy(message: &str) -> String {
    const KEY_PREFIX: &str = "AIza";
    const KEY_LEN: usize = 39;
    const MAX_COPY: usize = 512;

    let mut sanitized = String::with_capacity(message.len());
    let mut rest = message;
    while let Some(pos) = rest.find(KEY_PREFIX) {
        sanitized.push_str(&rest[..pos]);
        sanitized.push_str("[redacted-key]");
        let after = &rest[pos..];
        let skip = after
            .char_indices()
            .nth(KEY_LEN)
            .map(|(i, _)| pos + i)
            .unwrap_or(rest.len());
        rest = &rest[skip..];
    }
    sanitized.push_str(rest);

    if sanitized.chars().count() > MAX_COPY {
        sanitized = sanitized.chars().take(MAX_COPY).collect();
        sanitized.push('…');
    }
    sanitized
}

fn init_tracing() {
    static INIT: OnceCell<()> = OnceCell::new();
    let _ = INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,search_maps_lib=debug"));
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    });
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .setup(|app| {
            let handle = app.handle();
            let state = AppState::initialize(handle)
                .map_err(|err| -> Box<dyn std::error::Error> { Box::new(err) })?;
            app.manage(state);
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            commands::run_search,
            commands::map_view_changed,
            commands::drain_map_commands,
            commands::set_radius,
            commands::select_row,
            commands::session_snapshot,
            commands::save_api_key,
            commands::api_key_status,
            commands::open_place,
            commands::persist_session
        ])
        .build(tauri::generate_context!())
        .expect("error while building tauri application")
        .run(|app, event| {
            if let tauri::RunEvent::Exit = event {
                let state: tauri::State<'_, AppState> = app.state();
                state.shutdown();
            }
        });
}
