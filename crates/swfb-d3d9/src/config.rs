use crate::device::{Format, PresentParams};

/// Real geometry of a fullscreen display mode whose logical size differs from what the
/// display scans out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayMode {
    /// Physical height; anything above the logical height becomes letterbox bars.
    pub true_height: u32,
    /// Left shift applied to both axes (1 = pixel doubled).
    pub pixel_doubling: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramebufferConfig {
    pub adapter: u32,
    pub width: u32,
    pub height: u32,
    /// Direct-color (BGRA) canvas instead of 8-bit palette indices.
    pub bgra: bool,
    pub fullscreen: bool,
    pub vsync: bool,
    /// Fullscreen refresh rate in Hz; 0 keeps the driver default.
    pub refresh_rate: u32,
    /// Drain the GPU queue once per frame to bound input latency.
    pub antilag: bool,
    /// Request antialiased lines for 2D line lists.
    pub hw_aa_lines: bool,
    pub display_mode: Option<DisplayMode>,
}

impl Default for FramebufferConfig {
    fn default() -> Self {
        Self {
            adapter: 0,
            width: 640,
            height: 480,
            bgra: false,
            fullscreen: false,
            vsync: false,
            refresh_rate: 0,
            antilag: true,
            hw_aa_lines: true,
            display_mode: None,
        }
    }
}

impl FramebufferConfig {
    pub fn true_height(&self) -> u32 {
        match self.display_mode {
            Some(mode) if self.fullscreen => mode.true_height.max(self.height),
            _ => self.height,
        }
    }

    pub fn pixel_doubling(&self) -> u32 {
        match self.display_mode {
            Some(mode) if self.fullscreen => mode.pixel_doubling,
            _ => 0,
        }
    }
}

/// Window/mode geometry that present parameters are derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PresentGeometry {
    pub width: u32,
    pub true_height: u32,
    pub pixel_doubling: u32,
    pub windowed: bool,
    pub vsync: bool,
    pub refresh_rate: u32,
}

impl PresentGeometry {
    pub fn present_params(&self) -> PresentParams {
        PresentParams {
            windowed: self.windowed,
            back_buffer_width: self.width << self.pixel_doubling,
            back_buffer_height: self.true_height << self.pixel_doubling,
            back_buffer_format: (!self.windowed).then_some(Format::A8R8G8B8),
            back_buffer_count: 1,
            vsync: self.vsync,
            refresh_rate: if self.windowed { 0 } else { self.refresh_rate },
        }
    }
}
