//! Deterministic in-memory device for tests and tooling.
//!
//! Resources are plain byte vectors, state and draw calls are appended to a [`DeviceCall`]
//! log, and every failure path the presenter has to survive can be injected through
//! [`FailureInjection`]. Draws are recorded but not rasterized; clears, color fills and
//! copies do touch pixel memory.

use hashbrown::HashMap;

use crate::device::{
    BufferId, Color, CooperativeLevel, Device, DeviceCaps, DeviceFactory, FbVertex, Filter,
    Format, GammaRamp, LineCaps, LockReader, LockWriter, Pool, PresentParams, PrimitiveType,
    Rect, RenderState, SamplerState, ShaderId, SurfaceDesc, SurfaceId, SurfaceRef, TextureDesc,
    TextureId, TextureUsage, VertexProcessing,
};
use crate::error::DeviceError;
use crate::platform::Platform;
use crate::shaders::{shader_path, ShaderSource, ShaderVariant, SHADER_MODEL_TIERS};

/// One observable call made against a [`HeadlessDevice`].
#[derive(Clone, Debug, PartialEq)]
pub enum DeviceCall {
    SetPixelShader(Option<ShaderId>),
    SetTexture {
        slot: u32,
        texture: Option<TextureId>,
    },
    RenderState(RenderState),
    SamplerState {
        slot: u32,
        state: SamplerState,
    },
    PixelShaderConstant {
        register: u32,
        value: [f32; 4],
    },
    ScissorRect(Rect),
    GammaRamp,
    SetRenderTarget(SurfaceRef),
    StreamSource {
        buffer: BufferId,
        stride: u32,
    },
    Indices(BufferId),
    WriteBuffer {
        buffer: BufferId,
        len: usize,
    },
    BeginScene,
    EndScene,
    Clear {
        rects: Vec<Rect>,
        color: Color,
    },
    ColorFill {
        surface: SurfaceRef,
        color: Color,
    },
    StretchRect {
        src: SurfaceRef,
        dst: SurfaceRef,
    },
    GetRenderTargetData {
        src: SurfaceRef,
        dst: SurfaceRef,
    },
    LockTexture(TextureId),
    LockSurfaceRead(SurfaceRef),
    DrawPrimitive {
        primitive: PrimitiveType,
        start_vertex: u32,
        primitive_count: u32,
    },
    DrawIndexedPrimitive {
        primitive: PrimitiveType,
        min_index: u32,
        num_vertices: u32,
        start_index: u32,
        primitive_count: u32,
    },
    DrawPrimitiveUp {
        primitive: PrimitiveType,
        vertices: Vec<FbVertex>,
    },
    Present,
    Reset(PresentParams),
}

impl DeviceCall {
    pub fn is_draw(&self) -> bool {
        matches!(
            self,
            DeviceCall::DrawPrimitive { .. }
                | DeviceCall::DrawIndexedPrimitive { .. }
                | DeviceCall::DrawPrimitiveUp { .. }
        )
    }

    pub fn is_present(&self) -> bool {
        matches!(self, DeviceCall::Present)
    }
}

/// Switches that make specific device operations fail.
#[derive(Clone, Debug, Default)]
pub struct FailureInjection {
    pub texture_creation: bool,
    /// Refuse dynamic textures whose dimensions are not powers of two.
    pub reject_npot_dynamic: bool,
    pub render_targets: bool,
    pub offscreen_surfaces: bool,
    pub buffers: bool,
    /// Refuse buffers larger than this many bytes.
    pub max_buffer_bytes: Option<usize>,
    pub locks: bool,
    pub shaders: bool,
    pub caps: bool,
    pub present: bool,
    /// Number of upcoming `reset` calls that fail.
    pub reset_failures: u32,
    /// Fail `reset` whenever a nonzero refresh rate is requested.
    pub reset_rejects_refresh: bool,
}

#[derive(Debug)]
struct TextureEntry {
    desc: TextureDesc,
    data: Vec<u8>,
}

#[derive(Debug)]
struct SurfaceEntry {
    desc: SurfaceDesc,
    pool: Pool,
    render_target: bool,
    data: Vec<u8>,
}

#[derive(Debug)]
pub struct HeadlessDevice {
    adapter: u32,
    caps: DeviceCaps,
    params: PresentParams,
    level: CooperativeLevel,
    next_id: u32,
    back_buffer: Vec<u8>,
    textures: HashMap<u32, TextureEntry>,
    surfaces: HashMap<u32, SurfaceEntry>,
    buffers: HashMap<u32, Vec<u8>>,
    shaders: HashMap<u32, Vec<u8>>,
    constants: HashMap<u32, [f32; 4]>,
    render_target: SurfaceRef,
    in_scene: bool,
    gamma_ramp: Option<GammaRamp>,
    calls: Vec<DeviceCall>,
    pub inject: FailureInjection,
}

fn back_buffer_format(params: &PresentParams) -> Format {
    params.back_buffer_format.unwrap_or(Format::X8R8G8B8)
}

fn fill_pixels(data: &mut [u8], color: Color) {
    let bytes = color.0.to_le_bytes();
    for px in data.chunks_exact_mut(4) {
        px.copy_from_slice(&bytes);
    }
}

impl HeadlessDevice {
    pub fn new(adapter: u32) -> Self {
        let params = PresentParams {
            windowed: true,
            back_buffer_width: 640,
            back_buffer_height: 480,
            back_buffer_format: None,
            back_buffer_count: 1,
            vsync: false,
            refresh_rate: 0,
        };
        Self::with_params(adapter, &params)
    }

    pub fn with_params(adapter: u32, params: &PresentParams) -> Self {
        let mut device = Self {
            adapter,
            caps: DeviceCaps {
                line_caps: LineCaps::TEXTURE | LineCaps::ALPHA_CMP | LineCaps::BLEND,
                max_texture_width: 4096,
                max_texture_height: 4096,
            },
            params: *params,
            level: CooperativeLevel::Ok,
            next_id: 1,
            back_buffer: Vec::new(),
            textures: HashMap::new(),
            surfaces: HashMap::new(),
            buffers: HashMap::new(),
            shaders: HashMap::new(),
            constants: HashMap::new(),
            render_target: SurfaceRef::BackBuffer,
            in_scene: false,
            gamma_ramp: None,
            calls: Vec::new(),
            inject: FailureInjection::default(),
        };
        device.allocate_back_buffer();
        device
    }

    fn allocate_back_buffer(&mut self) {
        let len = self.params.back_buffer_width as usize * self.params.back_buffer_height as usize * 4;
        self.back_buffer = vec![0; len];
    }

    fn alloc_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn set_caps(&mut self, caps: DeviceCaps) {
        self.caps = caps;
    }

    pub fn set_cooperative_level(&mut self, level: CooperativeLevel) {
        self.level = level;
    }

    pub fn present_params(&self) -> &PresentParams {
        &self.params
    }

    pub fn calls(&self) -> &[DeviceCall] {
        &self.calls
    }

    pub fn take_calls(&mut self) -> Vec<DeviceCall> {
        std::mem::take(&mut self.calls)
    }

    pub fn gamma_ramp(&self) -> Option<&GammaRamp> {
        self.gamma_ramp.as_ref()
    }

    /// Value last written to a pixel shader constant register.
    pub fn pixel_shader_constant(&self, register: u32) -> Option<[f32; 4]> {
        self.constants.get(&register).copied()
    }

    pub fn texture_data(&self, texture: TextureId) -> Option<&[u8]> {
        self.textures.get(&texture.0).map(|t| t.data.as_slice())
    }

    pub fn buffer_data(&self, buffer: BufferId) -> Option<&[u8]> {
        self.buffers.get(&buffer.0).map(Vec::as_slice)
    }

    pub fn surface_data(&self, surface: SurfaceRef) -> Option<&[u8]> {
        match surface {
            SurfaceRef::BackBuffer => Some(&self.back_buffer),
            SurfaceRef::Texture(id) => self.texture_data(id),
            SurfaceRef::Plain(id) => self.surfaces.get(&id.0).map(|s| s.data.as_slice()),
        }
    }

    /// Bytecode a live shader was created from.
    pub fn shader_bytecode(&self, shader: ShaderId) -> Option<&[u8]> {
        self.shaders.get(&shader.0).map(Vec::as_slice)
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn live_surfaces(&self) -> usize {
        self.surfaces.len()
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_shaders(&self) -> usize {
        self.shaders.len()
    }

    fn default_pool_outstanding(&self) -> bool {
        self.textures.values().any(|t| t.desc.pool == Pool::Default)
            || self.surfaces.values().any(|s| s.pool == Pool::Default)
            || !self.buffers.is_empty()
    }

    fn surface_bytes_mut(&mut self, surface: SurfaceRef) -> Option<(&mut Vec<u8>, SurfaceDesc)> {
        let desc = self.surface_desc(surface)?;
        let data = match surface {
            SurfaceRef::BackBuffer => &mut self.back_buffer,
            SurfaceRef::Texture(id) => &mut self.textures.get_mut(&id.0)?.data,
            SurfaceRef::Plain(id) => &mut self.surfaces.get_mut(&id.0)?.data,
        };
        Some((data, desc))
    }

    fn read_pixels(&self, surface: SurfaceRef) -> Option<(Vec<u8>, SurfaceDesc)> {
        let desc = self.surface_desc(surface)?;
        Some((self.surface_data(surface)?.to_vec(), desc))
    }
}

impl Device for HeadlessDevice {
    fn caps(&self) -> Result<DeviceCaps, DeviceError> {
        if self.inject.caps {
            return Err(DeviceError::InvalidCall("caps unavailable"));
        }
        Ok(self.caps)
    }

    fn adapter(&self) -> u32 {
        self.adapter
    }

    fn test_cooperative_level(&mut self) -> CooperativeLevel {
        self.level
    }

    fn reset(&mut self, params: &PresentParams) -> Result<(), DeviceError> {
        self.calls.push(DeviceCall::Reset(*params));
        if self.level == CooperativeLevel::Lost {
            return Err(DeviceError::Lost);
        }
        if self.default_pool_outstanding() {
            return Err(DeviceError::InvalidCall("default pool resources outstanding"));
        }
        if self.inject.reset_failures > 0 {
            self.inject.reset_failures -= 1;
            return Err(DeviceError::NotReset);
        }
        if self.inject.reset_rejects_refresh && params.refresh_rate != 0 {
            return Err(DeviceError::NotReset);
        }
        self.params = *params;
        self.level = CooperativeLevel::Ok;
        self.constants.clear();
        self.render_target = SurfaceRef::BackBuffer;
        self.in_scene = false;
        self.allocate_back_buffer();
        Ok(())
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureId, DeviceError> {
        if self.inject.texture_creation {
            return Err(DeviceError::OutOfVideoMemory);
        }
        if self.inject.render_targets && desc.usage.contains(TextureUsage::RENDER_TARGET) {
            return Err(DeviceError::OutOfVideoMemory);
        }
        if self.inject.reject_npot_dynamic
            && desc.usage.contains(TextureUsage::DYNAMIC)
            && !(desc.width.is_power_of_two() && desc.height.is_power_of_two())
        {
            return Err(DeviceError::UnsupportedFormat(desc.format));
        }
        if desc.width == 0
            || desc.height == 0
            || desc.width > self.caps.max_texture_width
            || desc.height > self.caps.max_texture_height
        {
            return Err(DeviceError::InvalidCall("texture dimensions out of range"));
        }
        let len = desc.width as usize * desc.height as usize * desc.format.bytes_per_pixel();
        let id = self.alloc_id();
        self.textures.insert(
            id,
            TextureEntry {
                desc: *desc,
                data: vec![0; len],
            },
        );
        Ok(TextureId(id))
    }

    fn release_texture(&mut self, texture: TextureId) {
        self.textures.remove(&texture.0);
    }

    fn texture_desc(&self, texture: TextureId) -> Option<TextureDesc> {
        self.textures.get(&texture.0).map(|t| t.desc)
    }

    fn create_offscreen_surface(
        &mut self,
        width: u32,
        height: u32,
        format: Format,
        pool: Pool,
    ) -> Result<SurfaceId, DeviceError> {
        if self.inject.offscreen_surfaces {
            return Err(DeviceError::OutOfVideoMemory);
        }
        let id = self.alloc_id();
        self.surfaces.insert(
            id,
            SurfaceEntry {
                desc: SurfaceDesc {
                    width,
                    height,
                    format,
                },
                pool,
                render_target: false,
                data: vec![0; width as usize * height as usize * format.bytes_per_pixel()],
            },
        );
        Ok(SurfaceId(id))
    }

    fn create_render_target(
        &mut self,
        width: u32,
        height: u32,
        format: Format,
    ) -> Result<SurfaceId, DeviceError> {
        if self.inject.render_targets {
            return Err(DeviceError::OutOfVideoMemory);
        }
        let id = self.alloc_id();
        self.surfaces.insert(
            id,
            SurfaceEntry {
                desc: SurfaceDesc {
                    width,
                    height,
                    format,
                },
                pool: Pool::Default,
                render_target: true,
                data: vec![0; width as usize * height as usize * format.bytes_per_pixel()],
            },
        );
        Ok(SurfaceId(id))
    }

    fn release_surface(&mut self, surface: SurfaceId) {
        self.surfaces.remove(&surface.0);
    }

    fn surface_desc(&self, surface: SurfaceRef) -> Option<SurfaceDesc> {
        match surface {
            SurfaceRef::BackBuffer => Some(SurfaceDesc {
                width: self.params.back_buffer_width,
                height: self.params.back_buffer_height,
                format: back_buffer_format(&self.params),
            }),
            SurfaceRef::Texture(id) => self.textures.get(&id.0).map(|t| SurfaceDesc {
                width: t.desc.width,
                height: t.desc.height,
                format: t.desc.format,
            }),
            SurfaceRef::Plain(id) => self.surfaces.get(&id.0).map(|s| s.desc),
        }
    }

    fn lock_texture(
        &mut self,
        texture: TextureId,
        rect: Option<Rect>,
        _discard: bool,
        write: LockWriter<'_>,
    ) -> Result<(), DeviceError> {
        if self.inject.locks {
            return Err(DeviceError::InvalidCall("lock failed"));
        }
        let entry = self
            .textures
            .get_mut(&texture.0)
            .ok_or(DeviceError::InvalidCall("unknown texture"))?;
        let bpp = entry.desc.format.bytes_per_pixel();
        let pitch = entry.desc.width as usize * bpp;
        let offset = match rect {
            Some(r) => {
                if r.left < 0
                    || r.top < 0
                    || r.right as u32 > entry.desc.width
                    || r.bottom as u32 > entry.desc.height
                {
                    return Err(DeviceError::InvalidCall("lock rect out of bounds"));
                }
                r.top as usize * pitch + r.left as usize * bpp
            }
            None => 0,
        };
        write(&mut entry.data[offset..], pitch);
        self.calls.push(DeviceCall::LockTexture(texture));
        Ok(())
    }

    fn lock_surface_read(
        &mut self,
        surface: SurfaceRef,
        read: LockReader<'_>,
    ) -> Result<(), DeviceError> {
        self.calls.push(DeviceCall::LockSurfaceRead(surface));
        if self.inject.locks {
            return Err(DeviceError::InvalidCall("lock failed"));
        }
        let desc = self
            .surface_desc(surface)
            .ok_or(DeviceError::InvalidCall("unknown surface"))?;
        let pitch = desc.width as usize * desc.format.bytes_per_pixel();
        let data = self
            .surface_data(surface)
            .ok_or(DeviceError::InvalidCall("unknown surface"))?;
        read(data, pitch);
        Ok(())
    }

    fn color_fill(&mut self, surface: SurfaceRef, color: Color) -> Result<(), DeviceError> {
        self.calls.push(DeviceCall::ColorFill { surface, color });
        let (data, desc) = self
            .surface_bytes_mut(surface)
            .ok_or(DeviceError::InvalidCall("unknown surface"))?;
        if desc.format.bytes_per_pixel() != 4 {
            return Err(DeviceError::UnsupportedFormat(desc.format));
        }
        fill_pixels(data, color);
        Ok(())
    }

    fn stretch_rect(
        &mut self,
        src: SurfaceRef,
        src_rect: Option<Rect>,
        dst: SurfaceRef,
        dst_rect: Option<Rect>,
        _filter: Filter,
    ) -> Result<(), DeviceError> {
        self.calls.push(DeviceCall::StretchRect { src, dst });
        let (pixels, src_desc) = self
            .read_pixels(src)
            .ok_or(DeviceError::InvalidCall("unknown source surface"))?;
        let (data, dst_desc) = self
            .surface_bytes_mut(dst)
            .ok_or(DeviceError::InvalidCall("unknown destination surface"))?;
        if src_desc.format.bytes_per_pixel() != 4 || dst_desc.format.bytes_per_pixel() != 4 {
            return Err(DeviceError::InvalidCall("stretch between non-32-bit surfaces"));
        }
        let full = |d: SurfaceDesc| Rect::new(0, 0, d.width as i32, d.height as i32);
        let s = src_rect.unwrap_or_else(|| full(src_desc));
        let d = dst_rect.unwrap_or_else(|| full(dst_desc));
        if s.is_empty()
            || d.is_empty()
            || s.right as u32 > src_desc.width
            || s.bottom as u32 > src_desc.height
            || d.right as u32 > dst_desc.width
            || d.bottom as u32 > dst_desc.height
        {
            return Err(DeviceError::InvalidCall("stretch rect out of bounds"));
        }
        let (src_pitch, dst_pitch) = (src_desc.width as usize * 4, dst_desc.width as usize * 4);
        for y in 0..d.height() {
            let sy = (s.top + y * s.height() / d.height()) as usize;
            for x in 0..d.width() {
                let sx = (s.left + x * s.width() / d.width()) as usize;
                let from = sy * src_pitch + sx * 4;
                let to = (d.top + y) as usize * dst_pitch + (d.left + x) as usize * 4;
                data[to..to + 4].copy_from_slice(&pixels[from..from + 4]);
            }
        }
        Ok(())
    }

    fn get_render_target_data(
        &mut self,
        src: SurfaceRef,
        dst: SurfaceRef,
    ) -> Result<(), DeviceError> {
        self.calls.push(DeviceCall::GetRenderTargetData { src, dst });
        let (pixels, src_desc) = self
            .read_pixels(src)
            .ok_or(DeviceError::InvalidCall("unknown source surface"))?;
        let (data, dst_desc) = self
            .surface_bytes_mut(dst)
            .ok_or(DeviceError::InvalidCall("unknown destination surface"))?;
        if src_desc != dst_desc {
            return Err(DeviceError::InvalidCall("render target data size mismatch"));
        }
        data.copy_from_slice(&pixels);
        Ok(())
    }

    fn create_pixel_shader(&mut self, bytecode: &[u8]) -> Result<ShaderId, DeviceError> {
        if self.inject.shaders || bytecode.is_empty() {
            return Err(DeviceError::InvalidCall("bad shader bytecode"));
        }
        let id = self.alloc_id();
        self.shaders.insert(id, bytecode.to_vec());
        Ok(ShaderId(id))
    }

    fn release_pixel_shader(&mut self, shader: ShaderId) {
        self.shaders.remove(&shader.0);
    }

    fn create_vertex_buffer(&mut self, size_bytes: usize) -> Result<BufferId, DeviceError> {
        self.create_index_buffer(size_bytes)
    }

    fn create_index_buffer(&mut self, size_bytes: usize) -> Result<BufferId, DeviceError> {
        let too_big = self.inject.max_buffer_bytes.is_some_and(|max| size_bytes > max);
        if self.inject.buffers || too_big {
            return Err(DeviceError::OutOfVideoMemory);
        }
        let id = self.alloc_id();
        self.buffers.insert(id, vec![0; size_bytes]);
        Ok(BufferId(id))
    }

    fn release_buffer(&mut self, buffer: BufferId) {
        self.buffers.remove(&buffer.0);
    }

    fn write_buffer(&mut self, buffer: BufferId, data: &[u8]) -> Result<(), DeviceError> {
        self.calls.push(DeviceCall::WriteBuffer {
            buffer,
            len: data.len(),
        });
        let storage = self
            .buffers
            .get_mut(&buffer.0)
            .ok_or(DeviceError::InvalidCall("unknown buffer"))?;
        if data.len() > storage.len() {
            return Err(DeviceError::InvalidCall("write exceeds buffer size"));
        }
        storage.fill(0);
        storage[..data.len()].copy_from_slice(data);
        Ok(())
    }

    fn set_pixel_shader(&mut self, shader: Option<ShaderId>) {
        self.calls.push(DeviceCall::SetPixelShader(shader));
    }

    fn set_texture(&mut self, slot: u32, texture: Option<TextureId>) {
        self.calls.push(DeviceCall::SetTexture { slot, texture });
    }

    fn set_render_state(&mut self, state: RenderState) {
        self.calls.push(DeviceCall::RenderState(state));
    }

    fn set_sampler_state(&mut self, slot: u32, state: SamplerState) {
        self.calls.push(DeviceCall::SamplerState { slot, state });
    }

    fn set_pixel_shader_constant(&mut self, register: u32, value: [f32; 4]) {
        self.constants.insert(register, value);
        self.calls
            .push(DeviceCall::PixelShaderConstant { register, value });
    }

    fn set_scissor_rect(&mut self, rect: Rect) {
        self.calls.push(DeviceCall::ScissorRect(rect));
    }

    fn set_gamma_ramp(&mut self, ramp: &GammaRamp) {
        self.gamma_ramp = Some(ramp.clone());
        self.calls.push(DeviceCall::GammaRamp);
    }

    fn render_target(&self) -> SurfaceRef {
        self.render_target
    }

    fn set_render_target(&mut self, target: SurfaceRef) -> Result<(), DeviceError> {
        self.calls.push(DeviceCall::SetRenderTarget(target));
        let valid = match target {
            SurfaceRef::BackBuffer => true,
            SurfaceRef::Texture(id) => self
                .textures
                .get(&id.0)
                .is_some_and(|t| t.desc.usage.contains(TextureUsage::RENDER_TARGET)),
            SurfaceRef::Plain(id) => self.surfaces.get(&id.0).is_some_and(|s| s.render_target),
        };
        if !valid {
            return Err(DeviceError::InvalidCall("not a render target"));
        }
        self.render_target = target;
        Ok(())
    }

    fn set_stream_source(&mut self, buffer: BufferId, stride: u32) {
        self.calls.push(DeviceCall::StreamSource { buffer, stride });
    }

    fn set_indices(&mut self, buffer: BufferId) {
        self.calls.push(DeviceCall::Indices(buffer));
    }

    fn begin_scene(&mut self) {
        self.in_scene = true;
        self.calls.push(DeviceCall::BeginScene);
    }

    fn end_scene(&mut self) {
        self.in_scene = false;
        self.calls.push(DeviceCall::EndScene);
    }

    fn clear(&mut self, rects: &[Rect], color: Color) {
        self.calls.push(DeviceCall::Clear {
            rects: rects.to_vec(),
            color,
        });
        let target = self.render_target;
        let Some((data, desc)) = self.surface_bytes_mut(target) else {
            return;
        };
        if desc.format.bytes_per_pixel() != 4 {
            return;
        }
        if rects.is_empty() {
            fill_pixels(data, color);
            return;
        }
        let pitch = desc.width as usize * 4;
        for r in rects {
            let right = (r.right.max(0) as u32).min(desc.width) as usize;
            let bottom = (r.bottom.max(0) as u32).min(desc.height) as usize;
            let (left, top) = (r.left.max(0) as usize, r.top.max(0) as usize);
            for y in top..bottom {
                if left < right {
                    fill_pixels(&mut data[y * pitch + left * 4..y * pitch + right * 4], color);
                }
            }
        }
    }

    fn draw_primitive(&mut self, primitive: PrimitiveType, start_vertex: u32, primitive_count: u32) {
        self.calls.push(DeviceCall::DrawPrimitive {
            primitive,
            start_vertex,
            primitive_count,
        });
    }

    fn draw_indexed_primitive(
        &mut self,
        primitive: PrimitiveType,
        min_index: u32,
        num_vertices: u32,
        start_index: u32,
        primitive_count: u32,
    ) {
        self.calls.push(DeviceCall::DrawIndexedPrimitive {
            primitive,
            min_index,
            num_vertices,
            start_index,
            primitive_count,
        });
    }

    fn draw_primitive_up(&mut self, primitive: PrimitiveType, vertices: &[FbVertex]) {
        self.calls.push(DeviceCall::DrawPrimitiveUp {
            primitive,
            vertices: vertices.to_vec(),
        });
    }

    fn present(&mut self) -> Result<(), DeviceError> {
        self.calls.push(DeviceCall::Present);
        if self.inject.present {
            return Err(DeviceError::InvalidCall("present failed"));
        }
        match self.level {
            CooperativeLevel::Ok => Ok(()),
            CooperativeLevel::Lost => Err(DeviceError::Lost),
            CooperativeLevel::NotReset => Err(DeviceError::NotReset),
        }
    }
}

/// Creates [`HeadlessDevice`]s and records every creation attempt.
#[derive(Debug, Default)]
pub struct HeadlessFactory {
    pub vendor_id: Option<u32>,
    pub caps: Option<DeviceCaps>,
    /// Copied into each device the factory creates.
    pub inject: FailureInjection,
    pub reject_hardware_vp: bool,
    pub reject_software_vp: bool,
    pub reject_nonzero_refresh: bool,
    pub(crate) attempts: Vec<(VertexProcessing, u32)>,
}

impl HeadlessFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(vertex processing, refresh rate)` for every `create_device` call, in order.
    pub fn attempts(&self) -> &[(VertexProcessing, u32)] {
        &self.attempts
    }
}

impl DeviceFactory for HeadlessFactory {
    type Device = HeadlessDevice;

    fn create_device(
        &mut self,
        adapter: u32,
        vertex_processing: VertexProcessing,
        params: &PresentParams,
    ) -> Result<HeadlessDevice, DeviceError> {
        self.attempts.push((vertex_processing, params.refresh_rate));
        let rejected = match vertex_processing {
            VertexProcessing::Hardware => self.reject_hardware_vp,
            VertexProcessing::Software => self.reject_software_vp,
        } || (self.reject_nonzero_refresh && params.refresh_rate != 0);
        if rejected {
            return Err(DeviceError::CreationFailed(format!(
                "{vertex_processing:?} vertex processing at {} Hz",
                params.refresh_rate
            )));
        }
        let mut device = HeadlessDevice::with_params(adapter, params);
        if let Some(caps) = self.caps {
            device.set_caps(caps);
        }
        device.inject = self.inject.clone();
        Ok(device)
    }

    fn vendor_id(&self, _adapter: u32) -> Option<u32> {
        self.vendor_id
    }
}

/// Shader assets held in memory, keyed by full asset path.
#[derive(Debug, Default, Clone)]
pub struct MemoryShaderSource {
    files: HashMap<String, Vec<u8>>,
}

impl MemoryShaderSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every shader for every tier.
    pub fn complete() -> Self {
        let mut source = Self::new();
        for tier in SHADER_MODEL_TIERS {
            source.add_tier(tier);
        }
        source
    }

    /// Adds every variant of `tier`, using the asset path as placeholder bytecode.
    pub fn add_tier(&mut self, tier: &str) {
        for variant in ShaderVariant::ALL {
            let path = shader_path(tier, variant);
            let bytes = path.clone().into_bytes();
            self.files.insert(path, bytes);
        }
    }

    pub fn insert(&mut self, path: impl Into<String>, bytecode: Vec<u8>) {
        self.files.insert(path.into(), bytecode);
    }

    pub fn remove(&mut self, path: &str) -> Option<Vec<u8>> {
        self.files.remove(path)
    }
}

impl ShaderSource for MemoryShaderSource {
    fn read(&self, path: &str) -> Option<Vec<u8>> {
        self.files.get(path).cloned()
    }
}

/// Window-system stand-in that never sleeps.
#[derive(Debug, Default, Clone)]
pub struct HeadlessPlatform {
    pub client_size: Option<(u32, u32)>,
    pub frame_waits: u32,
    pub yields: u32,
    pub resizes: Vec<(u32, u32)>,
}

impl Platform for HeadlessPlatform {
    fn client_size(&self) -> Option<(u32, u32)> {
        self.client_size
    }

    fn limit_frame_rate(&mut self) {
        self.frame_waits += 1;
    }

    fn yield_now(&mut self) {
        self.yields += 1;
    }

    fn output_resized(&mut self, width: u32, height: u32) {
        self.resizes.push((width, height));
    }
}
