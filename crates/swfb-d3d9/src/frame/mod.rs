//! Per-frame composition and presentation.
//!
//! A frame is driven by the 2D mode:
//!
//! * [`Mode2D::Idle`]: composite the software frame and present.
//! * [`Mode2D::HeldNoPresent`]: composite, then leave the scene open for 2D drawing.
//! * [`Mode2D::SetupOnly`]: open the scene for 2D drawing without compositing.
//! * [`Mode2D::FinishAndPresent`]: flush pending 2D work, present, return to idle.
//!
//! [`Framebuffer::begin_2d`] moves out of idle, [`Framebuffer::end_frame`] finishes; the
//! pipeline never changes mode on its own except for the return to idle after a present.

pub mod draw2d;
pub mod quad_batch;

use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::canvas::Canvas;
use crate::config::{FramebufferConfig, PresentGeometry};
use crate::device::{
    Color, Device, DeviceCaps, DeviceFactory, FbVertex, Filter, LineCaps, Pool, PrimitiveType,
    Rect, RenderState, SamplerState, AddressMode, SurfaceRef, TextureDesc, TextureId,
    TextureUsage,
};
use crate::error::{InitError, ResourceError};
use crate::palette::{
    blend_toward, flash_colors, gamma_ramp, palette_border_color, palette_texels,
    write_gamma_texels, PalEntry, PALETTE_SIZE,
};
use crate::platform::Platform;
use crate::recovery::{DeviceRecovery, FrameGate};
use crate::resources::creation::{apply_vendor_caps, create_device};
use crate::resources::native::{NativeHandle, NativeRegistry, NativeSlot, RemapTable, SourceImage};
use crate::resources::{DeviceResources, FbLayout, NUM_INDEXES, NUM_VERTS};
use crate::shaders::{ShaderSet, ShaderSource, ShaderVariant, TextureKind};
use crate::state::{ps_const, StateCache, TEXTURE_SLOTS};
use crate::stats::{FrameStats, FrameStatsSnapshot};

use quad_batch::QuadBatch;

const GRAYSCALE_WEIGHTS: [f32; 4] = [77.0 / 256.0, 143.0 / 256.0, 37.0 / 256.0, 1.0];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Mode2D {
    #[default]
    Idle = 0,
    HeldNoPresent = 1,
    SetupOnly = 2,
    FinishAndPresent = 3,
}

/// Colorization applied to the software frame, e.g. for the invulnerability effect.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpecialColormap {
    pub colorize_start: [f32; 3],
    pub colorize_end: [f32; 3],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenshotFormat {
    Bgra,
}

/// Copy of the pixels currently on screen.
#[derive(Debug, Clone, PartialEq)]
pub struct ScreenshotBuffer {
    pub pixels: Vec<u8>,
    /// Bytes per row.
    pub pitch: usize,
    pub width: u32,
    pub height: u32,
    pub format: ScreenshotFormat,
    pub gamma: f32,
}

#[derive(Debug)]
struct Screenshot {
    texture: TextureId,
    buffer: ScreenshotBuffer,
}

/// Presents a software-rendered frame through a [`Device`].
pub struct Framebuffer<D: Device, P: Platform> {
    device: D,
    platform: P,
    config: FramebufferConfig,
    caps: DeviceCaps,
    hw_aa_lines: bool,

    windowed: bool,
    true_height: u32,
    pixel_doubling: u32,
    lb_offset: u32,

    shaders: ShaderSet,
    state: StateCache,
    resources: DeviceResources,
    natives: NativeRegistry,
    recovery: DeviceRecovery,
    stats: Arc<FrameStats>,

    canvas: Canvas,
    palette: [PalEntry; PALETTE_SIZE],
    border_color: Color,
    need_pal_update: bool,
    gamma: f32,
    need_gamma_update: bool,
    gamma_shader: Option<crate::device::ShaderId>,

    flash_color: PalEntry,
    flash_amount: u32,
    flash_color0: Color,
    flash_color1: Color,
    blending_rect: Rect,
    shader_colormap: Option<SpecialColormap>,

    mode: Mode2D,
    in_scene: bool,
    old_render_target: Option<SurfaceRef>,
    front_copy: Option<SurfaceRef>,
    gathering_wipe: bool,
    quad_batch: QuadBatch,
    screenshot: Option<Screenshot>,
}

impl<D: Device, P: Platform> Framebuffer<D, P> {
    /// Creates the device and every resource the pipeline needs. Nothing is presented when
    /// this fails.
    pub fn new<F>(
        factory: &mut F,
        platform: P,
        shader_source: &dyn ShaderSource,
        config: FramebufferConfig,
    ) -> Result<Self, InitError>
    where
        F: DeviceFactory<Device = D>,
    {
        let windowed = !config.fullscreen;
        let true_height = config.true_height();
        let pixel_doubling = config.pixel_doubling();
        let geometry = PresentGeometry {
            width: config.width,
            true_height,
            pixel_doubling,
            windowed,
            vsync: config.vsync,
            refresh_rate: config.refresh_rate,
        };
        let device = create_device(factory, config.adapter, &geometry.present_params())?;
        let caps = device.caps().unwrap_or_else(|error| {
            debug!(%error, "device caps unavailable");
            DeviceCaps::default()
        });
        let caps = apply_vendor_caps(caps, factory.vendor_id(device.adapter()));

        let mut fb = Self {
            device,
            platform,
            config,
            caps,
            hw_aa_lines: config.hw_aa_lines && caps.line_caps.contains(LineCaps::ANTIALIAS),
            windowed,
            true_height,
            pixel_doubling,
            lb_offset: (true_height - config.height) / 2,
            shaders: ShaderSet::default(),
            state: StateCache::new(),
            resources: DeviceResources::new(),
            natives: NativeRegistry::new(),
            recovery: DeviceRecovery::new(),
            stats: Arc::new(FrameStats::new()),
            canvas: Canvas::new(config.width, config.height, config.bgra),
            palette: [PalEntry::default(); PALETTE_SIZE],
            border_color: Color::BLACK,
            need_pal_update: false,
            gamma: 1.0,
            need_gamma_update: false,
            gamma_shader: None,
            flash_color: PalEntry::default(),
            flash_amount: 0,
            flash_color0: Color::TRANSPARENT,
            flash_color1: Color::WHITE,
            blending_rect: Rect::new(0, 0, config.width as i32, config.height as i32),
            shader_colormap: None,
            mode: Mode2D::Idle,
            in_scene: false,
            old_render_target: None,
            front_copy: None,
            gathering_wipe: false,
            quad_batch: QuadBatch::new(),
            screenshot: None,
        };
        // Partially built resources are released when `fb` drops.
        fb.create_resources(shader_source)?;
        fb.set_initial_state();
        debug!(
            width = config.width,
            height = config.height,
            windowed,
            tier = fb.shaders.tier(),
            "framebuffer ready"
        );
        Ok(fb)
    }

    fn geometry(&self) -> PresentGeometry {
        PresentGeometry {
            width: self.config.width,
            true_height: self.true_height,
            pixel_doubling: self.pixel_doubling,
            windowed: self.windowed,
            vsync: self.config.vsync,
            refresh_rate: self.config.refresh_rate,
        }
    }

    fn fb_layout(&self) -> FbLayout {
        FbLayout {
            width: self.config.width,
            height: self.config.height,
            bgra: self.config.bgra,
            double_buffered: self.windowed || self.pixel_doubling > 0,
        }
    }

    fn create_resources(&mut self, shader_source: &dyn ShaderSource) -> Result<(), InitError> {
        self.shaders.load(&mut self.device, shader_source)?;
        let layout = self.fb_layout();
        self.resources.create_fb_texture(&mut self.device, layout)?;
        self.resources.create_palette_texture(&mut self.device)?;
        self.resources
            .create_vertexes(&mut self.device, NUM_VERTS, NUM_INDEXES)
            .map_err(ResourceError::of("vertex buffers"))?;
        self.resources.create_block_surfaces(&mut self.device);
        self.resources.create_gamma_texture(&mut self.device);
        Ok(())
    }

    /// Puts the device and the state cache into the known baseline every frame builds on.
    fn set_initial_state(&mut self) {
        self.state.reset_to_device_defaults();
        for slot in 0..TEXTURE_SLOTS as u32 {
            self.device
                .set_sampler_state(slot, SamplerState::AddressU(AddressMode::Clamp));
            self.device
                .set_sampler_state(slot, SamplerState::AddressV(AddressMode::Clamp));
            if slot > 1 {
                // Gamma lookup is sampled with linear filtering.
                self.device
                    .set_sampler_state(slot, SamplerState::MagFilter(Filter::Linear));
            }
        }
        self.need_gamma_update = true;
        self.need_pal_update = true;
        self.old_render_target = None;
        self.state
            .set_constant(&mut self.device, ps_const::WEIGHTS, GRAYSCALE_WEIGHTS);
        self.device
            .set_render_state(RenderState::AlphaFunc(crate::device::CompareFunc::NotEqual));
        self.device.clear(&[], Color::BLACK);
    }

    /// Frees native mirrors and every device resource. Called before dropping.
    pub fn release_resources(&mut self) {
        self.quad_batch.close();
        self.natives.clear(&mut self.device);
        self.release_screenshot_buffer();
        self.resources.release_all(&mut self.device);
        self.shaders.release(&mut self.device);
        self.gamma_shader = None;
        self.front_copy = None;
        self.gathering_wipe = false;
    }

    fn reset_device(&mut self) -> bool {
        self.quad_batch.close();
        self.natives.clear(&mut self.device);
        self.resources.release_default_pool(&mut self.device);
        self.old_render_target = None;
        self.front_copy = None;
        self.in_scene = false;

        let mut params = self.geometry().present_params();
        if let Err(error) = self.device.reset(&params) {
            if params.refresh_rate == 0 {
                warn!(%error, "device reset failed");
                return false;
            }
            debug!(%error, refresh_rate = params.refresh_rate, "reset failed; retrying at default refresh rate");
            params.refresh_rate = 0;
            if let Err(error) = self.device.reset(&params) {
                warn!(%error, "device reset failed");
                return false;
            }
        }
        debug!("device was reset");

        let layout = self.fb_layout();
        if let Err(error) = self.resources.create_fb_texture(&mut self.device, layout) {
            warn!(%error, "frame buffer recreation failed after reset");
            return false;
        }
        if let Err(error) = self
            .resources
            .create_vertexes(&mut self.device, NUM_VERTS, NUM_INDEXES)
        {
            warn!(%error, "vertex buffer recreation failed after reset");
            return false;
        }
        self.resources.create_block_surfaces(&mut self.device);
        self.set_initial_state();
        true
    }

    /// Releases volatile resources, resets the device with the current present parameters
    /// and rebuilds them.
    pub fn reset(&mut self) -> bool {
        self.stats.inc_resets_attempted();
        let ok = self.reset_device();
        if ok {
            self.stats.inc_resets_succeeded();
        }
        ok
    }

    /// Runs one step of the frame state machine. See the module docs.
    pub fn update(&mut self) {
        if self.mode == Mode2D::FinishAndPresent {
            if self.in_scene {
                self.end_quad_batch();
                self.mode = Mode2D::Idle;
                self.flip();
            }
            self.mode = Mode2D::Idle;
            return;
        }

        self.refresh_gamma_and_palette();

        let level = self.device.test_cooperative_level();
        let stats = Arc::clone(&self.stats);
        let mut recovery = self.recovery;
        let gate = recovery.poll(level, &stats, || self.reset_device());
        self.recovery = recovery;
        match gate {
            FrameGate::Skip => {
                trace!(?level, "frame skipped");
                self.platform.yield_now();
                return;
            }
            FrameGate::ProceedAfterReset => self.refresh_gamma_and_palette(),
            FrameGate::Proceed => {}
        }

        self.draw_3d_part(self.mode <= Mode2D::HeldNoPresent);
        if self.mode == Mode2D::Idle {
            self.flip();
        }
    }

    /// Finishes the frame started by [`Framebuffer::begin_2d`] (or a plain frame when idle).
    pub fn end_frame(&mut self) {
        self.update();
    }

    /// Starts 2D overlay drawing. With `copy3d` the software frame is composited first.
    /// Returns `true` once 2D drawing is (or already was) active.
    pub fn begin_2d(&mut self, copy3d: bool) -> bool {
        if self.mode != Mode2D::Idle {
            return true;
        }
        self.mode = if copy3d {
            Mode2D::HeldNoPresent
        } else {
            Mode2D::SetupOnly
        };
        self.update();
        self.mode = Mode2D::FinishAndPresent;
        true
    }

    fn refresh_gamma_and_palette(&mut self) {
        if self.need_gamma_update {
            self.apply_gamma();
        }
        if self.need_pal_update {
            self.upload_palette();
        }
    }

    fn apply_gamma(&mut self) {
        self.need_gamma_update = false;
        let igamma = 1.0 / self.gamma;
        if !self.windowed {
            self.device.set_gamma_ramp(&gamma_ramp(igamma));
        } else if igamma != 1.0 {
            self.update_gamma_texture(igamma);
            self.gamma_shader = self.shaders.get(ShaderVariant::GammaCorrection);
        } else {
            self.gamma_shader = None;
        }
        self.state.set_constant(
            &mut self.device,
            ps_const::GAMMA,
            [igamma, igamma, igamma, 0.5],
        );
    }

    fn update_gamma_texture(&mut self, igamma: f32) {
        let Some(texture) = self.resources.gamma_texture() else {
            return;
        };
        if let Err(error) = self
            .device
            .lock_texture(texture, None, false, &mut |row, _| write_gamma_texels(row, igamma))
        {
            trace!(%error, "gamma texture lock failed");
        }
    }

    fn upload_palette(&mut self) {
        let Some(texture) = self.resources.palette_texture() else {
            return;
        };
        let texels = palette_texels(&self.palette);
        let uploaded = self.device.lock_texture(texture, None, false, &mut |bytes, _| {
            bytes[..texels.len()].copy_from_slice(&texels);
        });
        match uploaded {
            Ok(()) => {
                self.border_color = palette_border_color(&self.palette);
                self.need_pal_update = false;
            }
            Err(error) => trace!(%error, "palette upload failed"),
        }
    }

    fn normal_shader(&self) -> Option<crate::device::ShaderId> {
        self.shaders.get(if self.config.bgra {
            ShaderVariant::NormalColor
        } else {
            ShaderVariant::NormalColorPal
        })
    }

    fn copy_canvas(&mut self) {
        let Some(fb) = self.resources.fb_texture() else {
            return;
        };
        let canvas = &self.canvas;
        let mut write = |bytes: &mut [u8], pitch: usize| canvas.copy_into(fb.format, bytes, pitch);
        let exact = fb.width == canvas.width() && fb.height == canvas.height();
        let area = Rect::new(0, 0, canvas.width() as i32, canvas.height() as i32);
        let locked = (exact && self.device.lock_texture(fb.texture, None, true, &mut write).is_ok())
            || self
                .device
                .lock_texture(fb.texture, Some(area), false, &mut write)
                .is_ok();
        if !locked {
            trace!("frame buffer texture lock failed");
        }
    }

    fn draw_3d_part(&mut self, copy3d: bool) {
        if copy3d {
            self.copy_canvas();
        }
        self.in_scene = true;
        self.device.begin_scene();
        self.device
            .set_render_state(RenderState::AntialiasedLineEnable(self.hw_aa_lines));

        debug_assert!(self.old_render_target.is_none());
        let redirect = self.windowed || self.gathering_wipe || self.pixel_doubling > 0;
        if let Some(temp) = self.resources.temp_render_texture().filter(|_| redirect) {
            let old = self.device.render_target();
            match self.device.set_render_target(SurfaceRef::Texture(temp)) {
                Ok(()) => self.old_render_target = Some(old),
                Err(error) => debug!(%error, "render texture redirect failed"),
            }
        }

        if let Some(fb) = self.resources.fb_texture() {
            self.state.set_texture(&mut self.device, 0, Some(fb.texture));
        }
        if let Some(palette) = self.resources.palette_texture() {
            self.state.set_palette_texture(
                &mut self.device,
                palette,
                PALETTE_SIZE as u32,
                self.border_color,
            );
        }
        self.state.set_alpha_blend(&mut self.device, None);
        self.state.enable_alpha_test(&mut self.device, false);
        let normal = self.normal_shader();
        self.state.set_pixel_shader(&mut self.device, normal);

        if copy3d {
            let (color0, color1, shader) = match self.shader_colormap {
                None => (self.flash_color0, self.flash_color1, normal),
                Some(map) => {
                    let [sr, sg, sb] = map.colorize_start;
                    let [er, eg, eb] = map.colorize_end;
                    let variant = if self.config.bgra {
                        ShaderVariant::SpecialColormap
                    } else {
                        ShaderVariant::SpecialColormapPal
                    };
                    (
                        Color::from_unit(sr / 2.0, sg / 2.0, sb / 2.0, 0.0),
                        Color::from_unit(er / 2.0, eg / 2.0, eb / 2.0, 1.0),
                        self.shaders.get(variant),
                    )
                }
            };
            self.state.set_pixel_shader(&mut self.device, shader);
            let verts = self.fullscreen_quad(true, false, color0, color1);
            self.device
                .draw_primitive_up(PrimitiveType::TriangleFan, &verts);
            self.stats.inc_draw_calls();
        }
        self.state.set_pixel_shader(&mut self.device, normal);
    }

    /// Corner vertices for a screen-covering quad (or just the blending rect when
    /// `viewarea_only`), with texture coordinates scaled to the used part of a padded frame
    /// texture. The letterbox offset is omitted while rendering into a render texture.
    pub fn fullscreen_quad(
        &self,
        viewarea_only: bool,
        can_double: bool,
        color0: Color,
        color1: Color,
    ) -> [FbVertex; 4] {
        let (width, height) = (self.config.width as f32, self.config.height as f32);
        let (fb_width, fb_height) = self
            .resources
            .fb_texture()
            .map_or((width, height), |fb| (fb.width as f32, fb.height as f32));
        let offset = if self.old_render_target.is_some() {
            0.0
        } else {
            self.lb_offset as f32
        };
        let top = offset - 0.5;
        let texright = width / fb_width;
        let texbot = height / fb_height;

        let (mxl, mxr, myt, myb, tmxl, tmxr, tmyt, tmyb) = if viewarea_only {
            let r = self.blending_rect;
            (
                r.left as f32 - 0.5,
                r.right as f32 - 0.5,
                r.top as f32 + top,
                r.bottom as f32 + top,
                r.left as f32 / width * texright,
                r.right as f32 / width * texright,
                r.top as f32 / height * texbot,
                r.bottom as f32 / height * texbot,
            )
        } else {
            let shift = if can_double { self.pixel_doubling } else { 0 };
            (
                -0.5,
                (self.config.width << shift) as f32 - 0.5,
                top,
                (self.config.height << shift) as f32 + top,
                0.0,
                texright,
                0.0,
                texbot,
            )
        };

        let vertex = |x: f32, y: f32, tu: f32, tv: f32| FbVertex {
            x,
            y,
            z: 0.0,
            rhw: 1.0,
            color0,
            color1,
            tu,
            tv,
        };
        [
            vertex(mxl, myt, tmxl, tmyt),
            vertex(mxr, myt, tmxr, tmyt),
            vertex(mxr, myb, tmxr, tmyb),
            vertex(mxl, myb, tmxl, tmyb),
        ]
    }

    fn draw_letterbox(&mut self) {
        if self.lb_offset == 0 {
            return;
        }
        let (width, height, lb) = (
            self.config.width as i32,
            self.config.height as i32,
            self.lb_offset as i32,
        );
        self.device.clear(
            &[
                Rect::new(0, 0, width, lb),
                Rect::new(0, height + lb, width, self.true_height as i32),
            ],
            Color::BLACK,
        );
    }

    /// Copies the render texture to the back buffer, gamma corrected when windowed.
    fn do_windowed_gamma(&mut self) {
        if self.old_render_target.is_none() {
            return;
        }
        let verts = self.fullscreen_quad(false, true, Color::TRANSPARENT, Color::WHITE);
        let Some(old) = self.old_render_target.take() else {
            return;
        };
        if let Err(error) = self.device.set_render_target(old) {
            debug!(%error, "restoring the back buffer failed");
        }
        if let Some(temp) = self.resources.temp_render_texture() {
            self.state.set_texture(&mut self.device, 0, Some(temp));
        }
        let shader = match self.gamma_shader.filter(|_| self.windowed) {
            Some(gamma) => {
                if let Some(lookup) = self.resources.gamma_texture() {
                    self.state.set_texture(&mut self.device, 2, Some(lookup));
                }
                Some(gamma)
            }
            None => self.shaders.get(ShaderVariant::NormalColor),
        };
        self.state.set_pixel_shader(&mut self.device, shader);
        self.state.set_alpha_blend(&mut self.device, None);
        self.state.enable_alpha_test(&mut self.device, false);
        self.device
            .draw_primitive_up(PrimitiveType::TriangleFan, &verts);
        self.stats.inc_draw_calls();
    }

    /// Records what will be on screen after the next present, for screenshots.
    fn copy_next_front_buffer(&mut self) {
        if self.windowed || self.pixel_doubling > 0 {
            self.front_copy = self.resources.temp_render_texture().map(SurfaceRef::Texture);
            return;
        }
        let Some(surface) = self.resources.front_copy_surface() else {
            return;
        };
        let lb = self.lb_offset as i32;
        let src = Rect::new(0, lb, self.config.width as i32, lb + self.config.height as i32);
        if let Err(error) = self.device.stretch_rect(
            SurfaceRef::BackBuffer,
            Some(src),
            SurfaceRef::Plain(surface),
            None,
            Filter::Point,
        ) {
            trace!(%error, "front buffer copy failed");
        }
        self.front_copy = Some(SurfaceRef::Plain(surface));
    }

    fn flip(&mut self) {
        debug_assert!(self.in_scene);
        self.draw_letterbox();
        self.do_windowed_gamma();
        self.device.end_scene();
        self.copy_next_front_buffer();

        if self.config.antilag {
            self.resources.drain_gpu(&mut self.device);
        }
        self.platform.limit_frame_rate();
        self.stats.inc_presents_attempted();
        let presented = self.device.present();
        self.in_scene = false;
        match presented {
            Ok(()) => {
                self.stats.inc_presents_succeeded();
                self.resources.advance_render_target();
            }
            Err(error) => debug!(%error, "present failed"),
        }

        if self.windowed {
            self.track_client_size();
        }
    }

    fn track_client_size(&mut self) {
        let Some((width, height)) = self.platform.client_size() else {
            return;
        };
        if width == 0
            || height == 0
            || (width == self.config.width && height == self.config.height)
        {
            return;
        }
        debug!(width, height, "client area resized");
        self.canvas.resize(width, height);
        self.config.width = width;
        self.config.height = height;
        self.true_height = height;
        self.pixel_doubling = 0;
        self.lb_offset = 0;
        self.reset();
        self.platform.output_resized(width, height);
    }

    pub fn set_gamma(&mut self, gamma: f32) {
        if gamma == self.gamma {
            return;
        }
        debug!(gamma, "set gamma");
        self.gamma = gamma;
        self.need_gamma_update = true;
    }

    pub fn gamma(&self) -> f32 {
        self.gamma
    }

    pub fn set_flash(&mut self, color: PalEntry, amount: u32) {
        self.flash_color = color;
        self.flash_amount = amount;
        (self.flash_color0, self.flash_color1) = flash_colors(color, amount);
    }

    pub fn flash(&self) -> (PalEntry, u32) {
        (self.flash_color, self.flash_amount)
    }

    /// Vertex colors the flash currently applies to the software frame.
    pub fn flash_vertex_colors(&self) -> (Color, Color) {
        (self.flash_color0, self.flash_color1)
    }

    /// The source palette blended toward the current flash color.
    pub fn flashed_palette(&self) -> [PalEntry; PALETTE_SIZE] {
        let mut palette = self.palette;
        let c = self.flash_color;
        blend_toward(&mut palette, c.r, c.g, c.b, self.flash_amount);
        palette
    }

    pub fn palette(&self) -> &[PalEntry; PALETTE_SIZE] {
        &self.palette
    }

    /// Mutable source palette; call [`Framebuffer::update_palette`] after changing it.
    pub fn palette_mut(&mut self) -> &mut [PalEntry; PALETTE_SIZE] {
        &mut self.palette
    }

    /// Schedules a palette texture upload for the next frame.
    pub fn update_palette(&mut self) {
        self.need_pal_update = true;
    }

    pub fn border_color(&self) -> Color {
        self.border_color
    }

    pub fn set_vsync(&mut self, vsync: bool) {
        if self.config.vsync != vsync {
            self.config.vsync = vsync;
            self.reset();
        }
    }

    /// Applies a new fullscreen refresh rate. Windowed output keeps the desktop rate.
    pub fn new_refresh_rate(&mut self, refresh_rate: u32) {
        self.config.refresh_rate = refresh_rate;
        if !self.windowed {
            self.reset();
        }
    }

    pub fn set_blending_rect(&mut self, x1: i32, y1: i32, x2: i32, y2: i32) {
        self.blending_rect = Rect::new(x1, y1, x2, y2);
    }

    pub fn set_shader_colormap(&mut self, colormap: Option<SpecialColormap>) {
        self.shader_colormap = colormap;
    }

    /// While set, frames are always composited into a render texture and 2D vertices get no
    /// letterbox compensation, so the captured image is in untranslated coordinates.
    pub fn set_gathering_wipe_screen(&mut self, gathering: bool) {
        self.gathering_wipe = gathering;
    }

    fn front_copy_source(&self) -> Option<SurfaceRef> {
        if self.windowed || self.pixel_doubling > 0 {
            self.front_copy
        } else {
            self.resources.front_copy_surface().map(SurfaceRef::Plain)
        }
    }

    /// Reads back what is currently on screen. The buffer stays valid until
    /// [`Framebuffer::release_screenshot_buffer`] or the next capture.
    pub fn capture_screenshot_buffer(&mut self) -> Option<&ScreenshotBuffer> {
        self.release_screenshot_buffer();
        let source = self.front_copy_source()?;
        let desc = self.device.surface_desc(source)?;
        let texture = match self.device.create_texture(&TextureDesc {
            width: desc.width,
            height: desc.height,
            format: desc.format,
            usage: TextureUsage::empty(),
            pool: Pool::SystemMem,
        }) {
            Ok(texture) => texture,
            Err(error) => {
                debug!(%error, "screenshot texture creation failed");
                return None;
            }
        };
        let target = SurfaceRef::Texture(texture);
        let mut pixels = Vec::new();
        let mut pitch = 0;
        let copied = self
            .device
            .get_render_target_data(source, target)
            .and_then(|()| {
                self.device.lock_surface_read(target, &mut |bytes, p| {
                    pixels.extend_from_slice(bytes);
                    pitch = p;
                })
            });
        if let Err(error) = copied {
            debug!(%error, "screenshot read-back failed");
            self.device.release_texture(texture);
            return None;
        }
        self.screenshot = Some(Screenshot {
            texture,
            buffer: ScreenshotBuffer {
                pixels,
                pitch,
                width: desc.width,
                height: desc.height,
                format: ScreenshotFormat::Bgra,
                gamma: self.gamma,
            },
        });
        self.screenshot.as_ref().map(|s| &s.buffer)
    }

    pub fn release_screenshot_buffer(&mut self) {
        if let Some(screenshot) = self.screenshot.take() {
            self.device.release_texture(screenshot.texture);
        }
    }

    pub fn create_native_texture(
        &mut self,
        image: &dyn SourceImage,
        kind: TextureKind,
    ) -> Option<NativeHandle> {
        self.natives.create_texture(&mut self.device, image, kind)
    }

    pub fn update_native_texture(&mut self, image: &dyn SourceImage, kind: TextureKind) -> bool {
        self.natives.update_texture(&mut self.device, image, kind)
    }

    pub fn destroy_native_texture(&mut self, slot: &NativeSlot) {
        self.natives.destroy_texture(&mut self.device, slot);
    }

    pub fn create_native_palette(&mut self, remap: &RemapTable) -> Option<NativeHandle> {
        self.natives.create_palette(&mut self.device, remap)
    }

    pub fn update_native_palette(&mut self, remap: &RemapTable) -> bool {
        self.natives.update_palette(&mut self.device, remap)
    }

    pub fn destroy_native_palette(&mut self, remap: &RemapTable) {
        self.natives.destroy_palette(&mut self.device, remap);
    }

    pub fn natives(&self) -> &NativeRegistry {
        &self.natives
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    /// The software renderer's target for the next frame.
    pub fn canvas_mut(&mut self) -> &mut Canvas {
        &mut self.canvas
    }

    pub fn config(&self) -> &FramebufferConfig {
        &self.config
    }

    pub fn caps(&self) -> DeviceCaps {
        self.caps
    }

    pub fn hw_aa_lines(&self) -> bool {
        self.hw_aa_lines
    }

    pub fn is_fullscreen(&self) -> bool {
        !self.windowed
    }

    pub fn mode(&self) -> Mode2D {
        self.mode
    }

    pub fn in_scene(&self) -> bool {
        self.in_scene
    }

    pub fn letterbox_offset(&self) -> u32 {
        self.lb_offset
    }

    pub fn shader_tier(&self) -> Option<&'static str> {
        self.shaders.tier()
    }

    pub fn active_render_target_index(&self) -> usize {
        self.resources.active_render_target_index()
    }

    pub fn is_double_buffered(&self) -> bool {
        self.resources.is_double_buffered()
    }

    pub fn stats(&self) -> FrameStatsSnapshot {
        let mut snapshot = self.stats.snapshot();
        snapshot.state_calls_elided = self.state.elided();
        snapshot
    }

    /// Shared counters, readable from other threads.
    pub fn stats_handle(&self) -> Arc<FrameStats> {
        Arc::clone(&self.stats)
    }
}

impl<D: Device, P: Platform> Drop for Framebuffer<D, P> {
    fn drop(&mut self) {
        self.release_resources();
    }
}
