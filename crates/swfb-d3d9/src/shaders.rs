//! Fixed pixel shader set.
//!
//! The presenter never compiles shaders; it loads precompiled bytecode from the engine's
//! resource container under `shaders/<api>/sm<tier>/<name>` and picks variants from a fixed
//! decision table.

use std::fmt;

use tracing::{debug, warn};

use crate::device::{Device, Format, ShaderId};
use crate::error::InitError;

/// Asset directory for this backend's shader bytecode.
pub const SHADER_API_DIR: &str = "d3d";

/// Shader model tiers, most preferred first.
pub const SHADER_MODEL_TIERS: [&str; 2] = ["30", "20"];

/// Resolves named assets from the engine's resource container.
pub trait ShaderSource {
    fn read(&self, path: &str) -> Option<Vec<u8>>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderVariant {
    NormalColor,
    NormalColorPal,
    NormalColorDesaturated,
    NormalColorPalDesaturated,
    NormalColorInverse,
    NormalColorPalInverse,
    NormalColorOpaque,
    NormalColorPalOpaque,
    NormalColorInverseOpaque,
    NormalColorPalInverseOpaque,
    AlphaTex,
    PalAlphaTex,
    Stencil,
    PalStencil,
    VertexColor,
    SpecialColormap,
    SpecialColormapPal,
    BurnWipe,
    GammaCorrection,
}

impl ShaderVariant {
    pub const COUNT: usize = 19;

    pub const ALL: [ShaderVariant; Self::COUNT] = [
        ShaderVariant::NormalColor,
        ShaderVariant::NormalColorPal,
        ShaderVariant::NormalColorDesaturated,
        ShaderVariant::NormalColorPalDesaturated,
        ShaderVariant::NormalColorInverse,
        ShaderVariant::NormalColorPalInverse,
        ShaderVariant::NormalColorOpaque,
        ShaderVariant::NormalColorPalOpaque,
        ShaderVariant::NormalColorInverseOpaque,
        ShaderVariant::NormalColorPalInverseOpaque,
        ShaderVariant::AlphaTex,
        ShaderVariant::PalAlphaTex,
        ShaderVariant::Stencil,
        ShaderVariant::PalStencil,
        ShaderVariant::VertexColor,
        ShaderVariant::SpecialColormap,
        ShaderVariant::SpecialColormapPal,
        ShaderVariant::BurnWipe,
        ShaderVariant::GammaCorrection,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn file_name(self) -> &'static str {
        match self {
            ShaderVariant::NormalColor => "NormalColor.pso",
            ShaderVariant::NormalColorPal => "NormalColorPal.pso",
            ShaderVariant::NormalColorDesaturated => "NormalColorD.pso",
            ShaderVariant::NormalColorPalDesaturated => "NormalColorPalD.pso",
            ShaderVariant::NormalColorInverse => "NormalColorInv.pso",
            ShaderVariant::NormalColorPalInverse => "NormalColorPalInv.pso",
            ShaderVariant::NormalColorOpaque => "NormalColorOpaq.pso",
            ShaderVariant::NormalColorPalOpaque => "NormalColorPalOpaq.pso",
            ShaderVariant::NormalColorInverseOpaque => "NormalColorInvOpaq.pso",
            ShaderVariant::NormalColorPalInverseOpaque => "NormalColorPalInvOpaq.pso",
            ShaderVariant::AlphaTex => "AlphaTex.pso",
            ShaderVariant::PalAlphaTex => "PalAlphaTex.pso",
            ShaderVariant::Stencil => "Stencil.pso",
            ShaderVariant::PalStencil => "PalStencil.pso",
            ShaderVariant::VertexColor => "VertexColor.pso",
            ShaderVariant::SpecialColormap => "SpecialColormap.pso",
            ShaderVariant::SpecialColormapPal => "SpecialColorMapPal.pso",
            ShaderVariant::BurnWipe => "BurnWipe.pso",
            ShaderVariant::GammaCorrection => "GammaCorrection.pso",
        }
    }

    /// Gamma correction and the burn wipe are optional; their absence only disables the
    /// windowed gamma path and the burn transition.
    pub fn is_required(self) -> bool {
        !matches!(self, ShaderVariant::BurnWipe | ShaderVariant::GammaCorrection)
    }
}

impl fmt::Display for ShaderVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

/// How texels are interpreted by the shader.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureKind {
    /// 8-bit indices looked up through a palette texture.
    Paletted,
    /// Direct BGRA color.
    Color,
}

impl TextureKind {
    /// Texture format used for native copies of images of this kind.
    pub fn format(self) -> Format {
        match self {
            TextureKind::Paletted => Format::L8,
            TextureKind::Color => Format::A8R8G8B8,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DrawMode {
    #[default]
    Normal,
    Desaturate,
    Invert,
    InvertOpaque,
    AlphaTexture,
    Opaque,
    Stencil,
}

/// Picks the pixel shader for a 2D draw. `None` texture means untextured vertex color.
pub fn select_shader(
    texture: Option<TextureKind>,
    mode: DrawMode,
    special_colormap: bool,
) -> ShaderVariant {
    use ShaderVariant as S;

    let Some(kind) = texture else {
        return S::VertexColor;
    };
    let pal = kind == TextureKind::Paletted;
    let pick = |paletted: ShaderVariant, color: ShaderVariant| if pal { paletted } else { color };

    if special_colormap {
        return pick(S::SpecialColormapPal, S::SpecialColormap);
    }
    match mode {
        DrawMode::Normal => pick(S::NormalColorPal, S::NormalColor),
        DrawMode::Desaturate => pick(S::NormalColorPalDesaturated, S::NormalColorDesaturated),
        DrawMode::Invert => pick(S::NormalColorPalInverse, S::NormalColorInverse),
        DrawMode::InvertOpaque => pick(S::NormalColorPalInverseOpaque, S::NormalColorInverseOpaque),
        DrawMode::AlphaTexture => pick(S::PalAlphaTex, S::AlphaTex),
        DrawMode::Opaque => pick(S::NormalColorPalOpaque, S::NormalColorOpaque),
        DrawMode::Stencil => pick(S::PalStencil, S::Stencil),
    }
}

pub fn shader_path(tier: &str, variant: ShaderVariant) -> String {
    format!("shaders/{SHADER_API_DIR}/sm{tier}/{}", variant.file_name())
}

/// Loaded shader programs for one device lifetime.
#[derive(Debug, Default)]
pub struct ShaderSet {
    shaders: [Option<ShaderId>; ShaderVariant::COUNT],
    tier: Option<&'static str>,
}

impl ShaderSet {
    pub fn get(&self, variant: ShaderVariant) -> Option<ShaderId> {
        self.shaders[variant.index()]
    }

    /// Selected shader model tier, e.g. `"30"`.
    pub fn tier(&self) -> Option<&'static str> {
        self.tier
    }

    pub fn is_loaded(&self) -> bool {
        self.tier.is_some()
    }

    /// Tries each tier in order of preference and keeps the first one where every required
    /// shader is present and accepted by the device.
    pub fn load<D: Device + ?Sized>(
        &mut self,
        device: &mut D,
        source: &dyn ShaderSource,
    ) -> Result<(), InitError> {
        self.release(device);
        for tier in SHADER_MODEL_TIERS {
            if self.load_tier(device, source, tier) {
                debug!(tier, "loaded pixel shaders");
                self.tier = Some(tier);
                return Ok(());
            }
            self.release(device);
        }
        warn!("no shader model tier could be loaded");
        Err(InitError::NoShaderModel)
    }

    fn load_tier<D: Device + ?Sized>(
        &mut self,
        device: &mut D,
        source: &dyn ShaderSource,
        tier: &'static str,
    ) -> bool {
        for variant in ShaderVariant::ALL {
            let path = shader_path(tier, variant);
            let loaded = source
                .read(&path)
                .and_then(|bytecode| device.create_pixel_shader(&bytecode).ok());
            match loaded {
                Some(shader) => self.shaders[variant.index()] = Some(shader),
                None if variant.is_required() => {
                    debug!(%path, "required shader unavailable");
                    return false;
                }
                None => debug!(%path, "optional shader unavailable"),
            }
        }
        true
    }

    pub fn release<D: Device + ?Sized>(&mut self, device: &mut D) {
        for slot in self.shaders.iter_mut() {
            if let Some(shader) = slot.take() {
                device.release_pixel_shader(shader);
            }
        }
        self.tier = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_table_is_consistent() {
        for (i, variant) in ShaderVariant::ALL.iter().enumerate() {
            assert_eq!(variant.index(), i);
        }
        let optional: Vec<_> = ShaderVariant::ALL
            .iter()
            .filter(|v| !v.is_required())
            .collect();
        assert_eq!(
            optional,
            [&ShaderVariant::BurnWipe, &ShaderVariant::GammaCorrection]
        );
    }

    #[test]
    fn untextured_draws_use_vertex_color() {
        for mode in [DrawMode::Normal, DrawMode::Stencil, DrawMode::Invert] {
            assert_eq!(select_shader(None, mode, true), ShaderVariant::VertexColor);
        }
    }

    #[test]
    fn special_colormap_overrides_mode() {
        assert_eq!(
            select_shader(Some(TextureKind::Paletted), DrawMode::Stencil, true),
            ShaderVariant::SpecialColormapPal
        );
        assert_eq!(
            select_shader(Some(TextureKind::Color), DrawMode::Invert, true),
            ShaderVariant::SpecialColormap
        );
    }

    #[test]
    fn decision_table() {
        use DrawMode as M;
        use ShaderVariant as S;
        use TextureKind::{Color, Paletted};

        let table = [
            (Paletted, M::Normal, S::NormalColorPal),
            (Color, M::Normal, S::NormalColor),
            (Paletted, M::Desaturate, S::NormalColorPalDesaturated),
            (Color, M::Desaturate, S::NormalColorDesaturated),
            (Paletted, M::Invert, S::NormalColorPalInverse),
            (Color, M::Invert, S::NormalColorInverse),
            (Paletted, M::InvertOpaque, S::NormalColorPalInverseOpaque),
            (Color, M::InvertOpaque, S::NormalColorInverseOpaque),
            (Paletted, M::AlphaTexture, S::PalAlphaTex),
            (Color, M::AlphaTexture, S::AlphaTex),
            (Paletted, M::Opaque, S::NormalColorPalOpaque),
            (Color, M::Opaque, S::NormalColorOpaque),
            (Paletted, M::Stencil, S::PalStencil),
            (Color, M::Stencil, S::Stencil),
        ];
        for (kind, mode, expected) in table {
            assert_eq!(select_shader(Some(kind), mode, false), expected, "{kind:?} {mode:?}");
        }
    }

    #[test]
    fn shader_paths_use_tier_directories() {
        assert_eq!(
            shader_path("30", ShaderVariant::GammaCorrection),
            "shaders/d3d/sm30/GammaCorrection.pso"
        );
    }
}
