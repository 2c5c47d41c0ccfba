use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Center and zoom reported by the map view. Zoom is a Leaflet level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapView {
    pub latitude: f64,
    pub longitude: f64,
    pub zoom: u32,
}

impl Default for MapView {
    fn default() -> Self {
        // Eiffel Tower, the same first-launch view as the map HTML.
        Self {
            latitude: 48.8584,
            longitude: 2.2945,
            zoom: 5,
        }
    }
}

/// One-way commands from the host to the map view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MapCommand {
    #[serde(rename_all = "camelCase")]
    SetView {
        latitude: f64,
        longitude: f64,
        zoom: u32,
    },
    #[serde(rename_all = "camelCase")]
    SetRadius { meters: f64 },
}

/// Decouples the map view from the host: `view_changed` events land here,
/// commands queue here until the view drains them. Replaces the original
/// bidirectional JS bridge object with two one-way channels.
pub struct MapBridge {
    view: Mutex<MapView>,
    pending: Mutex<Vec<MapCommand>>,
}

impl MapBridge {
    pub fn new(initial: MapView) -> Self {
        Self {
            view: Mutex::new(initial),
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn view_changed(&self, view: MapView) {
        *self.view.lock() = view;
    }

    pub fn current_view(&self) -> MapView {
        *self.view.lock()
    }

    pub fn push_command(&self, command: MapCommand) {
        self.pending.lock().push(command);
    }

    pub fn drain_commands(&self) -> Vec<MapCommand> {
        std::mem::take(&mut *self.pending.lock())
    }
}
