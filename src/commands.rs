use serde::Serialize;
use tauri_plugin_opener::OpenerExt;

use crate::config::PublicAppConfig;
use crate::map::{MapCommand, MapView};
use crate::presenter::ResultRow;
use crate::AppState;

/// Outcome of a completed search, ready for the results table.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub rows: Vec<ResultRow>,
    pub fetched_count: usize,
    pub ranked_count: usize,
}

/// Restored state handed to the frontend on startup.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub search_query: String,
    pub radius_km: u32,
    pub map_view: MapView,
    pub rows: Vec<ResultRow>,
    pub selected_row: Option<usize>,
    pub has_api_key: bool,
    pub config: PublicAppConfig,
}

#[tauri::command]
pub async fn run_search(
    state: tauri::State<'_, AppState>,
    query: String,
    min_reviews: Option<u64>,
) -> Result<SearchResponse, String> {
    state
        .run_search(query, min_reviews.unwrap_or(0))
        .await
        .map_err(|err| err.to_string())
}

#[tauri::command]
pub fn map_view_changed(
    state: tauri::State<'_, AppState>,
    latitude: f64,
    longitude: f64,
    zoom: u32,
) -> Result<(), String> {
    state.map_view_changed(MapView {
        latitude,
        longitude,
        zoom,
    });
    Ok(())
}

#[tauri::command]
pub fn drain_map_commands(state: tauri::State<'_, AppState>) -> Result<Vec<MapCommand>, String> {
    Ok(state.drain_map_commands())
}

#[tauri::command]
pub fn set_radius(state: tauri::State<'_, AppState>, radius_km: u32) -> Result<u32, String> {
    Ok(state.set_radius_km(radius_km))
}

#[tauri::command]
pub fn select_row(state: tauri::State<'_, AppState>, row: Option<usize>) -> Result<(), String> {
    state.select_row(row);
    Ok(())
}

#[tauri::command]
pub fn session_snapshot(state: tauri::State<'_, AppState>) -> Result<SessionSnapshot, String> {
    state.session_snapshot().map_err(|err| err.to_string())
}

#[tauri::command]
pub fn save_api_key(state: tauri::State<'_, AppState>, key: String) -> Result<(), String> {
    state.save_api_key(&key).map_err(|err| err.to_string())
}

#[tauri::command]
pub fn api_key_status(state: tauri::State<'_, AppState>) -> Result<bool, String> {
    state.api_key_present().map_err(|err| err.to_string())
}

#[tauri::command]
pub fn open_place(
    app: tauri::AppHandle,
    state: tauri::State<'_, AppState>,
    row: usize,
) -> Result<(), String> {
    let url = state.place_url(row).map_err(|err| err.to_string())?;
    app.opener()
        .open_url(url, None::<&str>)
        .map_err(|err| err.to_string())
}

#[tauri::command]
pub fn persist_session(state: tauri::State<'_, AppState>) -> Result<(), String> {
    state.persist_session().map_err(|err| err.to_string())
}
