//! Palette, flash and gamma math.
//!
//! Everything here is pure so the byte layouts the GPU receives can be tested without a
//! device.

use crate::device::{Color, GammaRamp};

pub const PALETTE_SIZE: usize = 256;

/// Width of the windowed-gamma lookup texture. Only texels `0..=GAMMA_TEXTURE_USED` are
/// written so sampling imprecision never reaches the border.
pub const GAMMA_TEXTURE_WIDTH: u32 = 256;
pub const GAMMA_TEXTURE_USED: usize = 128;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PalEntry {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl PalEntry {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 0 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_argb(self) -> Color {
        Color::argb(self.a, self.r, self.g, self.b)
    }

    pub fn to_xrgb(self) -> Color {
        Color::xrgb(self.r, self.g, self.b)
    }
}

/// Blends `count` entries of `from` toward `(r, g, b)` by `amount / 256`.
pub fn blend_toward(palette: &mut [PalEntry], r: u8, g: u8, b: u8, amount: u32) {
    match amount {
        0 => {}
        a if a >= 256 => {
            for entry in palette.iter_mut() {
                *entry = PalEntry::rgba(r, g, b, entry.a);
            }
        }
        a => {
            let inv = 256 - a;
            let (dr, dg, db) = (r as u32 * a, g as u32 * a, b as u32 * a);
            for entry in palette.iter_mut() {
                entry.r = ((entry.r as u32 * inv + dr) >> 8) as u8;
                entry.g = ((entry.g as u32 * inv + dg) >> 8) as u8;
                entry.b = ((entry.b as u32 * inv + db) >> 8) as u8;
            }
        }
    }
}

/// Texel bytes (B, G, R, A order) for the 256x1 global palette texture.
///
/// Entry 0 is fully transparent so masked indexed images can alpha-test it away; every
/// other entry is opaque.
pub fn palette_texels(palette: &[PalEntry; PALETTE_SIZE]) -> [u8; PALETTE_SIZE * 4] {
    let mut out = [0u8; PALETTE_SIZE * 4];
    for (i, (entry, texel)) in palette.iter().zip(out.chunks_exact_mut(4)).enumerate() {
        texel[0] = entry.b;
        texel[1] = entry.g;
        texel[2] = entry.r;
        texel[3] = if i == 0 { 0 } else { 255 };
    }
    out
}

/// Border color for the global palette texture: the last entry, opaque.
pub fn palette_border_color(palette: &[PalEntry; PALETTE_SIZE]) -> Color {
    palette[PALETTE_SIZE - 1].to_xrgb()
}

/// Smallest power of two that is `>= len` (and at least 1).
pub fn round_up_pow2(len: usize) -> usize {
    len.max(1).next_power_of_two()
}

/// Vertex colors that make the composite shader compute `tex * color1 + color0`, i.e. a
/// linear interpolation from the palette color toward the flash color.
pub fn flash_colors(color: PalEntry, amount: u32) -> (Color, Color) {
    let a = amount.min(256) as f32 / 256.0;
    let (r, g, b) = (
        color.r as f32 / 255.0,
        color.g as f32 / 255.0,
        color.b as f32 / 255.0,
    );
    let color0 = Color::from_unit(r * a, g * a, b * a, 0.0);
    let keep = 1.0 - a;
    let color1 = Color::from_unit(keep, keep, keep, 1.0);
    (color0, color1)
}

/// Hardware gamma ramp for the fullscreen path.
pub fn gamma_ramp(inverse_gamma: f32) -> GammaRamp {
    let mut channel = [0u16; 256];
    for (i, value) in channel.iter_mut().enumerate() {
        *value = (65535.0 * (i as f32 / 255.0).powf(inverse_gamma)) as u16;
    }
    GammaRamp {
        red: channel,
        green: channel,
        blue: channel,
    }
}

/// Writes the windowed-gamma lookup into a locked B8G8R8A8 row.
pub fn write_gamma_texels(row: &mut [u8], inverse_gamma: f32) {
    for (i, texel) in row
        .chunks_exact_mut(4)
        .take(GAMMA_TEXTURE_USED + 1)
        .enumerate()
    {
        let v = (255.0 * (i as f32 / GAMMA_TEXTURE_USED as f32).powf(inverse_gamma)) as u8;
        texel[0] = v;
        texel[1] = v;
        texel[2] = v;
        texel[3] = 255;
    }
}
