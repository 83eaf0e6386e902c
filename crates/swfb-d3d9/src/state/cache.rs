use crate::device::{
    Blend, BlendOp, Color, Device, RenderState, SamplerState, ShaderId, TextureId,
};

use super::style::BlendState;

pub const TEXTURE_SLOTS: usize = 4;
pub const PS_CONSTANT_REGISTERS: usize = 8;

/// Pixel shader constant registers shared by every shader in the set.
pub mod ps_const {
    /// `(amount, 1 - amount, 0, 0)`
    pub const DESATURATION: u32 = 1;
    /// `(255 / count, 0.5 / count, 0, 0)`: maps an index in `[0, 1]` to a texel center.
    pub const PALETTE_MOD: u32 = 2;
    pub const COLOR1: u32 = 3;
    pub const COLOR2: u32 = 4;
    /// Grayscale weights in `.xyz`, inversion constant in `.w`.
    pub const WEIGHTS: u32 = 6;
    /// Inverse gamma in `.xyz`.
    pub const GAMMA: u32 = 7;
}

/// Shadow of the last state handed to the device.
///
/// Every setter compares against the shadow and only forwards changes, using the exact
/// value the device call takes as the comparison key. `None` means "unknown", which always
/// forces the next call through.
#[derive(Debug)]
pub struct StateCache {
    pixel_shader: Option<Option<ShaderId>>,
    textures: [Option<Option<TextureId>>; TEXTURE_SLOTS],
    blend_enabled: Option<bool>,
    blend_op: Option<BlendOp>,
    src_blend: Option<Blend>,
    dst_blend: Option<Blend>,
    alpha_test: Option<bool>,
    border_colors: [Option<Color>; TEXTURE_SLOTS],
    constants: [Option<[f32; 4]>; PS_CONSTANT_REGISTERS],
    elided: u64,
}

impl Default for StateCache {
    fn default() -> Self {
        Self::new()
    }
}

impl StateCache {
    pub fn new() -> Self {
        Self {
            pixel_shader: None,
            textures: [None; TEXTURE_SLOTS],
            blend_enabled: None,
            blend_op: None,
            src_blend: None,
            dst_blend: None,
            alpha_test: None,
            border_colors: [None; TEXTURE_SLOTS],
            constants: [None; PS_CONSTANT_REGISTERS],
            elided: 0,
        }
    }

    /// Matches the shadow to a freshly created or reset device. Constants become unknown.
    pub fn reset_to_device_defaults(&mut self) {
        let elided = self.elided;
        *self = Self::new();
        self.elided = elided;
        self.pixel_shader = Some(None);
        self.textures = [Some(None); TEXTURE_SLOTS];
        self.blend_enabled = Some(false);
        self.alpha_test = Some(false);
        self.border_colors = [Some(Color::TRANSPARENT); TEXTURE_SLOTS];
    }

    /// Number of calls skipped because the device already had the requested value.
    pub fn elided(&self) -> u64 {
        self.elided
    }

    fn update<T: PartialEq + Copy>(slot: &mut Option<T>, value: T, elided: &mut u64) -> bool {
        if *slot == Some(value) {
            *elided += 1;
            return false;
        }
        *slot = Some(value);
        true
    }

    pub fn set_pixel_shader<D: Device + ?Sized>(&mut self, device: &mut D, shader: Option<ShaderId>) {
        if Self::update(&mut self.pixel_shader, shader, &mut self.elided) {
            device.set_pixel_shader(shader);
        }
    }

    pub fn current_pixel_shader(&self) -> Option<ShaderId> {
        self.pixel_shader.flatten()
    }

    pub fn set_texture<D: Device + ?Sized>(
        &mut self,
        device: &mut D,
        slot: u32,
        texture: Option<TextureId>,
    ) {
        let Some(shadow) = self.textures.get_mut(slot as usize) else {
            debug_assert!(false, "texture slot {slot} out of range");
            return;
        };
        if Self::update(shadow, texture, &mut self.elided) {
            device.set_texture(slot, texture);
        }
    }

    pub fn texture(&self, slot: u32) -> Option<TextureId> {
        self.textures.get(slot as usize).copied().flatten().flatten()
    }

    /// `None` disables blending; the op and factors are left as they were.
    pub fn set_alpha_blend<D: Device + ?Sized>(&mut self, device: &mut D, blend: Option<BlendState>) {
        let Some(blend) = blend else {
            if Self::update(&mut self.blend_enabled, false, &mut self.elided) {
                device.set_render_state(RenderState::AlphaBlendEnable(false));
            }
            return;
        };
        if Self::update(&mut self.blend_enabled, true, &mut self.elided) {
            device.set_render_state(RenderState::AlphaBlendEnable(true));
        }
        if Self::update(&mut self.blend_op, blend.op, &mut self.elided) {
            device.set_render_state(RenderState::BlendOp(blend.op));
        }
        if Self::update(&mut self.src_blend, blend.src, &mut self.elided) {
            device.set_render_state(RenderState::SrcBlend(blend.src));
        }
        if Self::update(&mut self.dst_blend, blend.dst, &mut self.elided) {
            device.set_render_state(RenderState::DestBlend(blend.dst));
        }
    }

    pub fn enable_alpha_test<D: Device + ?Sized>(&mut self, device: &mut D, enabled: bool) {
        if Self::update(&mut self.alpha_test, enabled, &mut self.elided) {
            device.set_render_state(RenderState::AlphaTestEnable(enabled));
        }
    }

    pub fn set_border_color<D: Device + ?Sized>(&mut self, device: &mut D, slot: u32, color: Color) {
        let Some(shadow) = self.border_colors.get_mut(slot as usize) else {
            debug_assert!(false, "sampler slot {slot} out of range");
            return;
        };
        if Self::update(shadow, color, &mut self.elided) {
            device.set_sampler_state(slot, SamplerState::BorderColor(color));
        }
    }

    pub fn set_constant<D: Device + ?Sized>(&mut self, device: &mut D, register: u32, value: [f32; 4]) {
        let Some(shadow) = self.constants.get_mut(register as usize) else {
            debug_assert!(false, "constant register {register} out of range");
            return;
        };
        if Self::update(shadow, value, &mut self.elided) {
            device.set_pixel_shader_constant(register, value);
        }
    }

    pub fn constant(&self, register: u32) -> Option<[f32; 4]> {
        self.constants.get(register as usize).copied().flatten()
    }

    /// Binds a palette texture to slot 1 along with the scale/bias that centers palette
    /// indices on texels of a `count`-wide palette.
    pub fn set_palette_texture<D: Device + ?Sized>(
        &mut self,
        device: &mut D,
        texture: TextureId,
        count: u32,
        border: Color,
    ) {
        let inv = 1.0 / count.max(1) as f32;
        self.set_constant(device, ps_const::PALETTE_MOD, [255.0 * inv, 0.5 * inv, 0.0, 0.0]);
        self.set_texture(device, 1, Some(texture));
        self.set_border_color(device, 1, border);
    }
}
