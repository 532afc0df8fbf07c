use gorp_detect::Detector;

/// Shared state handed to every handler.
pub struct AppState {
    pub detector: Detector,
}

impl AppState {
    pub fn new(detector: Detector) -> Self {
        Self { detector }
    }
}
