/// Startup options for the renderer: how many frames may be in flight, the
/// presentation mode preference, and the initial window shape.
pub struct RenderConfig {
    pub frames_in_flight: u32,
    pub vsync: bool,
    pub window_title: String,
    pub window_width: u32,
    pub window_height: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            vsync: false,
            window_title: "ember".to_string(),
            window_width: 1280,
            window_height: 720,
        }
    }
}
