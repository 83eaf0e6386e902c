//! D3D9-shaped device abstraction.
//!
//! The presenter never talks to a concrete graphics API. Everything it needs from the
//! device goes through [`Device`], and device construction goes through [`DeviceFactory`].
//! The vocabulary is D3D9's: pools, plain surfaces, cooperative level.
//!
//! Locks are scoped callbacks. A failed lock never runs the callback.

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};
use std::fmt;

use crate::error::DeviceError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SurfaceId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ShaderId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferId(pub u32);

/// Anything that can be a render target, a copy source or a copy destination.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SurfaceRef {
    /// The swap chain's back buffer.
    BackBuffer,
    /// Level 0 of a texture.
    Texture(TextureId),
    /// An offscreen plain surface or a standalone render-target surface.
    Plain(SurfaceId),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Format {
    A8R8G8B8,
    X8R8G8B8,
    /// 8-bit luminance; used for palette indices.
    L8,
}

impl Format {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Format::A8R8G8B8 | Format::X8R8G8B8 => 4,
            Format::L8 => 1,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Format::A8R8G8B8 => "a8r8g8b8",
            Format::X8R8G8B8 => "x8r8g8b8",
            Format::L8 => "l8",
        };
        f.write_str(s)
    }
}

/// Memory pool a resource lives in. Only `Default` pool resources are lost on reset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Pool {
    Default,
    Managed,
    SystemMem,
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        const DYNAMIC = 1 << 0;
        const RENDER_TARGET = 1 << 1;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub format: Format,
    pub usage: TextureUsage,
    pub pool: Pool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfaceDesc {
    pub width: u32,
    pub height: u32,
    pub format: Format,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }
}

/// Packed `0xAARRGGBB` color, the layout D3D9 uses for vertex colors and clears.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
#[repr(transparent)]
pub struct Color(pub u32);

impl Color {
    pub const BLACK: Color = Color::xrgb(0, 0, 0);
    pub const WHITE: Color = Color(0xFFFF_FFFF);
    pub const TRANSPARENT: Color = Color(0);

    pub const fn argb(a: u8, r: u8, g: u8, b: u8) -> Self {
        Color(((a as u32) << 24) | ((r as u32) << 16) | ((g as u32) << 8) | b as u32)
    }

    pub const fn xrgb(r: u8, g: u8, b: u8) -> Self {
        Self::argb(0xFF, r, g, b)
    }

    /// Builds a color from normalized components, truncating like `D3DCOLOR_COLORVALUE`.
    pub fn from_unit(r: f32, g: f32, b: f32, a: f32) -> Self {
        fn channel(v: f32) -> u8 {
            (v.clamp(0.0, 1.0) * 255.0) as u8
        }
        Self::argb(channel(a), channel(r), channel(g), channel(b))
    }

    pub fn a(self) -> u8 {
        (self.0 >> 24) as u8
    }

    pub fn r(self) -> u8 {
        (self.0 >> 16) as u8
    }

    pub fn g(self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub fn b(self) -> u8 {
        self.0 as u8
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CooperativeLevel {
    Ok,
    /// Lost and not yet resettable (e.g. the fullscreen window lost focus).
    Lost,
    /// Lost but ready for `reset`.
    NotReset,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VertexProcessing {
    Hardware,
    Software,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PresentParams {
    pub windowed: bool,
    pub back_buffer_width: u32,
    pub back_buffer_height: u32,
    /// `None` lets the device pick the desktop format (windowed mode).
    pub back_buffer_format: Option<Format>,
    pub back_buffer_count: u32,
    pub vsync: bool,
    /// Fullscreen refresh rate in Hz; 0 is the driver default.
    pub refresh_rate: u32,
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct LineCaps: u32 {
        const TEXTURE = 1 << 0;
        const ALPHA_CMP = 1 << 1;
        const BLEND = 1 << 2;
        const ANTIALIAS = 1 << 3;
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeviceCaps {
    pub line_caps: LineCaps,
    pub max_texture_width: u32,
    pub max_texture_height: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    TriangleList,
    TriangleFan,
    LineList,
    PointList,
}

impl PrimitiveType {
    /// Number of primitives described by `vertex_count` vertices.
    pub fn primitive_count(self, vertex_count: u32) -> u32 {
        match self {
            PrimitiveType::TriangleList => vertex_count / 3,
            PrimitiveType::TriangleFan => vertex_count.saturating_sub(2),
            PrimitiveType::LineList => vertex_count / 2,
            PrimitiveType::PointList => vertex_count,
        }
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PrimitiveType::TriangleList => "triangle_list",
            PrimitiveType::TriangleFan => "triangle_fan",
            PrimitiveType::LineList => "line_list",
            PrimitiveType::PointList => "point_list",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlendOp {
    Add,
    Subtract,
    RevSubtract,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Blend {
    Zero,
    One,
    SrcAlpha,
    InvSrcAlpha,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompareFunc {
    Always,
    NotEqual,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AddressMode {
    Clamp,
    Wrap,
    Border,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Filter {
    Point,
    Linear,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RenderState {
    AlphaBlendEnable(bool),
    BlendOp(BlendOp),
    SrcBlend(Blend),
    DestBlend(Blend),
    AlphaTestEnable(bool),
    AlphaFunc(CompareFunc),
    ScissorTestEnable(bool),
    AntialiasedLineEnable(bool),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SamplerState {
    AddressU(AddressMode),
    AddressV(AddressMode),
    MagFilter(Filter),
    BorderColor(Color),
}

/// Hardware gamma ramp, one 16-bit entry per input level and channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GammaRamp {
    pub red: [u16; 256],
    pub green: [u16; 256],
    pub blue: [u16; 256],
}

/// Pre-transformed vertex (`XYZRHW | DIFFUSE | SPECULAR | TEX1`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct FbVertex {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub rhw: f32,
    pub color0: Color,
    pub color1: Color,
    pub tu: f32,
    pub tv: f32,
}

pub const FB_VERTEX_STRIDE: u32 = std::mem::size_of::<FbVertex>() as u32;

/// Scoped write access to a locked resource: `(bytes, pitch_in_bytes)`.
pub type LockWriter<'a> = &'a mut dyn FnMut(&mut [u8], usize);

/// Scoped read access to a locked resource: `(bytes, pitch_in_bytes)`.
pub type LockReader<'a> = &'a mut dyn FnMut(&[u8], usize);

/// The graphics device as seen by the presenter.
///
/// All calls are synchronous and happen on the frame thread.
pub trait Device {
    fn caps(&self) -> Result<DeviceCaps, DeviceError>;
    fn adapter(&self) -> u32;

    fn test_cooperative_level(&mut self) -> CooperativeLevel;
    fn reset(&mut self, params: &PresentParams) -> Result<(), DeviceError>;

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureId, DeviceError>;
    fn release_texture(&mut self, texture: TextureId);
    fn texture_desc(&self, texture: TextureId) -> Option<TextureDesc>;

    fn create_offscreen_surface(
        &mut self,
        width: u32,
        height: u32,
        format: Format,
        pool: Pool,
    ) -> Result<SurfaceId, DeviceError>;
    fn create_render_target(
        &mut self,
        width: u32,
        height: u32,
        format: Format,
    ) -> Result<SurfaceId, DeviceError>;
    fn release_surface(&mut self, surface: SurfaceId);
    fn surface_desc(&self, surface: SurfaceRef) -> Option<SurfaceDesc>;

    /// Locks `rect` (whole level when `None`) of texture level 0 for writing.
    fn lock_texture(
        &mut self,
        texture: TextureId,
        rect: Option<Rect>,
        discard: bool,
        write: LockWriter<'_>,
    ) -> Result<(), DeviceError>;
    /// Read-only lock; stalls until the GPU is done with the surface.
    fn lock_surface_read(
        &mut self,
        surface: SurfaceRef,
        read: LockReader<'_>,
    ) -> Result<(), DeviceError>;

    fn color_fill(&mut self, surface: SurfaceRef, color: Color) -> Result<(), DeviceError>;
    fn stretch_rect(
        &mut self,
        src: SurfaceRef,
        src_rect: Option<Rect>,
        dst: SurfaceRef,
        dst_rect: Option<Rect>,
        filter: Filter,
    ) -> Result<(), DeviceError>;
    /// Copies a video-memory render target into a system-memory surface.
    fn get_render_target_data(
        &mut self,
        src: SurfaceRef,
        dst: SurfaceRef,
    ) -> Result<(), DeviceError>;

    fn create_pixel_shader(&mut self, bytecode: &[u8]) -> Result<ShaderId, DeviceError>;
    fn release_pixel_shader(&mut self, shader: ShaderId);

    fn create_vertex_buffer(&mut self, size_bytes: usize) -> Result<BufferId, DeviceError>;
    fn create_index_buffer(&mut self, size_bytes: usize) -> Result<BufferId, DeviceError>;
    fn release_buffer(&mut self, buffer: BufferId);
    /// Discards the buffer's previous contents and writes `data` at offset 0.
    fn write_buffer(&mut self, buffer: BufferId, data: &[u8]) -> Result<(), DeviceError>;

    fn set_pixel_shader(&mut self, shader: Option<ShaderId>);
    fn set_texture(&mut self, slot: u32, texture: Option<TextureId>);
    fn set_render_state(&mut self, state: RenderState);
    fn set_sampler_state(&mut self, slot: u32, state: SamplerState);
    fn set_pixel_shader_constant(&mut self, register: u32, value: [f32; 4]);
    fn set_scissor_rect(&mut self, rect: Rect);
    fn set_gamma_ramp(&mut self, ramp: &GammaRamp);

    fn render_target(&self) -> SurfaceRef;
    fn set_render_target(&mut self, target: SurfaceRef) -> Result<(), DeviceError>;

    fn set_stream_source(&mut self, buffer: BufferId, stride: u32);
    fn set_indices(&mut self, buffer: BufferId);

    fn begin_scene(&mut self);
    fn end_scene(&mut self);
    /// Clears `rects` of the current render target (the whole target when empty).
    fn clear(&mut self, rects: &[Rect], color: Color);

    fn draw_primitive(&mut self, primitive: PrimitiveType, start_vertex: u32, primitive_count: u32);
    fn draw_indexed_primitive(
        &mut self,
        primitive: PrimitiveType,
        min_index: u32,
        num_vertices: u32,
        start_index: u32,
        primitive_count: u32,
    );
    /// Draws from caller memory instead of a vertex buffer.
    fn draw_primitive_up(&mut self, primitive: PrimitiveType, vertices: &[FbVertex]);

    fn present(&mut self) -> Result<(), DeviceError>;
}

/// Creates devices for an adapter.
pub trait DeviceFactory {
    type Device: Device;

    fn create_device(
        &mut self,
        adapter: u32,
        vertex_processing: VertexProcessing,
        params: &PresentParams,
    ) -> Result<Self::Device, DeviceError>;

    /// PCI vendor id of the adapter, when the driver reports it.
    fn vendor_id(&self, adapter: u32) -> Option<u32>;
}
