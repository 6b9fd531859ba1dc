//! Level-of-detail selection from projected screen size
//!
//! Selection is stateless per object and per frame. There is no hysteresis, so
//! an object sitting right at a threshold can switch LOD every frame.

use crate::config::LodSettings;

/// How LODs are chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LodMode {
    /// From projected size against the thresholds
    Auto,
    /// Every object uses this LOD (clamped to what it has)
    Fixed(usize),
}

/// Projected diameter-ish size of a sphere in pixels
///
/// `(radius / view_z) * (screen_height / (2 * tan(fov_y / 2)))`. Anything at
/// or behind the eye plane projects to infinity.
pub fn projected_size(radius: f32, view_z: f32, screen_height: f32, fov_y: f32) -> f32 {
    if view_z <= 0.0 {
        return f32::INFINITY;
    }
    (radius / view_z) * (screen_height / (2.0 * (fov_y * 0.5).tan()))
}

/// Maps projected sizes to LOD indices
#[derive(Debug, Clone)]
pub struct LodSelector {
    thresholds: Vec<f32>,
    mode: LodMode,
}

impl LodSelector {
    /// Selector from settings; a pinned LOD selects [`LodMode::Fixed`]
    pub fn new(settings: &LodSettings) -> Self {
        Self {
            thresholds: settings.thresholds.clone(),
            mode: settings.pinned.map_or(LodMode::Auto, LodMode::Fixed),
        }
    }

    /// Current mode
    pub fn mode(&self) -> LodMode {
        self.mode
    }

    /// Switch between automatic and pinned selection
    pub fn set_mode(&mut self, mode: LodMode) {
        self.mode = mode;
    }

    /// LOD index for a projected size, before clamping to an object's LOD count
    ///
    /// Sizes above `thresholds[0]` give LOD 0, above `thresholds[1]` LOD 1,
    /// and so on; anything below the last threshold gets `thresholds.len()`.
    pub fn lod_for_size(&self, size: f32) -> usize {
        self.thresholds
            .iter()
            .position(|threshold| size > *threshold)
            .unwrap_or(self.thresholds.len())
    }

    /// LOD for an object with `lod_count` levels
    pub fn select(
        &self,
        radius: f32,
        view_z: f32,
        screen_height: f32,
        fov_y: f32,
        lod_count: usize,
    ) -> usize {
        let last = lod_count.saturating_sub(1);
        match self.mode {
            LodMode::Fixed(lod) => lod.min(last),
            LodMode::Auto => {
                let size = projected_size(radius, view_z, screen_height, fov_y);
                self.lod_for_size(size).min(last)
            }
        }
    }
}
