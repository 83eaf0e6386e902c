//! GPU resources owned by the presenter for one device lifetime.
//!
//! Everything in the `Default` pool is lost on reset and rebuilt by the frame pipeline; the
//! palette and gamma textures are managed and survive resets.

pub mod creation;
pub mod native;

use tracing::{debug, trace};

use crate::device::{
    BufferId, Color, Device, Format, Pool, SurfaceId, SurfaceRef, TextureDesc, TextureId,
    TextureUsage, FB_VERTEX_STRIDE,
};
use crate::error::{DeviceError, ResourceError};
use crate::palette::{round_up_pow2, GAMMA_TEXTURE_WIDTH, PALETTE_SIZE};

pub const NUM_VERTS: usize = 10240;
pub const NUM_INDEXES: usize = NUM_VERTS * 6 / 4;
pub const MAX_QUAD_BATCH: usize = NUM_INDEXES / 6;
pub const INDEX_SIZE: usize = std::mem::size_of::<u32>();

const BLOCK_SURFACE_SIZE: u32 = 16;
const BLOCK_FILL: Color = Color::argb(0xFF, 0x00, 0x20, 0x50);

/// Logical frame size and the presentation path it is shown through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FbLayout {
    pub width: u32,
    pub height: u32,
    pub bgra: bool,
    /// Windowed or pixel doubled: frames are composited into a pair of render textures.
    pub double_buffered: bool,
}

/// The texture the software frame is uploaded into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FbTexture {
    pub texture: TextureId,
    pub format: Format,
    /// Allocated size; larger than the logical size when padded to powers of two.
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Default)]
pub struct DeviceResources {
    fb_texture: Option<FbTexture>,
    render_textures: [Option<TextureId>; 2],
    toggle: usize,
    current: usize,
    front_copy_surface: Option<SurfaceId>,
    palette_texture: Option<TextureId>,
    gamma_texture: Option<TextureId>,
    vertex_buffer: Option<BufferId>,
    index_buffer: Option<BufferId>,
    num_vertices: usize,
    num_indices: usize,
    block_surfaces: Option<[SurfaceId; 2]>,
    block_num: usize,
}

impl DeviceResources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fb_texture(&self) -> Option<FbTexture> {
        self.fb_texture
    }

    /// Render texture frames are currently composited into.
    pub fn temp_render_texture(&self) -> Option<TextureId> {
        self.render_textures[self.current]
    }

    pub fn active_render_target_index(&self) -> usize {
        self.current
    }

    pub fn is_double_buffered(&self) -> bool {
        self.toggle != 0
    }

    /// Switches to the other render texture. A no-op with a single render texture.
    pub fn advance_render_target(&mut self) {
        self.current ^= self.toggle;
    }

    pub fn front_copy_surface(&self) -> Option<SurfaceId> {
        self.front_copy_surface
    }

    pub fn palette_texture(&self) -> Option<TextureId> {
        self.palette_texture
    }

    pub fn gamma_texture(&self) -> Option<TextureId> {
        self.gamma_texture
    }

    pub fn vertex_buffer(&self) -> Option<BufferId> {
        self.vertex_buffer
    }

    pub fn index_buffer(&self) -> Option<BufferId> {
        self.index_buffer
    }

    /// `(vertices, indices)` the current buffers can hold.
    pub fn capacity(&self) -> (usize, usize) {
        (self.num_vertices, self.num_indices)
    }

    pub fn has_block_surfaces(&self) -> bool {
        self.block_surfaces.is_some()
    }

    /// Creates the frame-buffer texture, falling back to power-of-two dimensions, plus the
    /// render textures (double buffered) or the front-copy render target (single).
    pub fn create_fb_texture<D: Device + ?Sized>(
        &mut self,
        device: &mut D,
        layout: FbLayout,
    ) -> Result<(), ResourceError> {
        let format = if layout.bgra { Format::A8R8G8B8 } else { Format::L8 };
        let mut desc = TextureDesc {
            width: layout.width,
            height: layout.height,
            format,
            usage: TextureUsage::DYNAMIC,
            pool: Pool::Default,
        };
        let texture = match device.create_texture(&desc) {
            Ok(texture) => texture,
            Err(error) => {
                desc.width = round_up_pow2(layout.width as usize) as u32;
                desc.height = round_up_pow2(layout.height as usize) as u32;
                debug!(
                    %error,
                    width = desc.width,
                    height = desc.height,
                    "retrying frame buffer texture at power-of-two size"
                );
                device
                    .create_texture(&desc)
                    .map_err(ResourceError::of("frame buffer texture"))?
            }
        };
        self.fb_texture = Some(FbTexture {
            texture,
            format,
            width: desc.width,
            height: desc.height,
        });

        let rt_desc = TextureDesc {
            format: Format::X8R8G8B8,
            usage: TextureUsage::RENDER_TARGET,
            ..desc
        };
        self.current = 0;
        self.toggle = 0;
        self.render_textures = [None; 2];
        self.render_textures[0] = Some(
            device
                .create_texture(&rt_desc)
                .map_err(ResourceError::of("render texture"))?,
        );
        if layout.double_buffered {
            self.toggle = 1;
            self.render_textures[1] = Some(
                device
                    .create_texture(&rt_desc)
                    .map_err(ResourceError::of("second render texture"))?,
            );
        } else {
            self.front_copy_surface = Some(
                device
                    .create_render_target(layout.width, layout.height, Format::X8R8G8B8)
                    .map_err(ResourceError::of("front copy surface"))?,
            );
        }
        for texture in self.render_textures.iter().flatten() {
            if let Err(error) = device.color_fill(SurfaceRef::Texture(*texture), Color::BLACK) {
                trace!(%error, "render texture clear failed");
            }
        }
        Ok(())
    }

    pub fn create_palette_texture<D: Device + ?Sized>(
        &mut self,
        device: &mut D,
    ) -> Result<(), ResourceError> {
        let texture = device
            .create_texture(&TextureDesc {
                width: PALETTE_SIZE as u32,
                height: 1,
                format: Format::A8R8G8B8,
                usage: TextureUsage::empty(),
                pool: Pool::Managed,
            })
            .map_err(ResourceError::of("palette texture"))?;
        self.palette_texture = Some(texture);
        Ok(())
    }

    /// Lookup texture for windowed gamma correction. Without it the gamma shader still runs
    /// from its constant register.
    pub fn create_gamma_texture<D: Device + ?Sized>(&mut self, device: &mut D) {
        let desc = TextureDesc {
            width: GAMMA_TEXTURE_WIDTH,
            height: 1,
            format: Format::A8R8G8B8,
            usage: TextureUsage::empty(),
            pool: Pool::Managed,
        };
        match device.create_texture(&desc) {
            Ok(texture) => self.gamma_texture = Some(texture),
            Err(error) => debug!(%error, "gamma texture unavailable"),
        }
    }

    /// (Re)creates the 2D vertex and index buffers with room for the given counts.
    pub fn create_vertexes<D: Device + ?Sized>(
        &mut self,
        device: &mut D,
        num_vertices: usize,
        num_indices: usize,
    ) -> Result<(), DeviceError> {
        self.release_vertexes(device);
        self.num_vertices = num_vertices;
        self.num_indices = num_indices;
        self.vertex_buffer =
            Some(device.create_vertex_buffer(num_vertices * FB_VERTEX_STRIDE as usize)?);
        self.index_buffer = Some(device.create_index_buffer(num_indices * INDEX_SIZE)?);
        Ok(())
    }

    fn release_vertexes<D: Device + ?Sized>(&mut self, device: &mut D) {
        if let Some(buffer) = self.vertex_buffer.take() {
            device.release_buffer(buffer);
        }
        if let Some(buffer) = self.index_buffer.take() {
            device.release_buffer(buffer);
        }
    }

    /// Two tiny surfaces for the anti-lag stall. Without them anti-lag is disabled.
    pub fn create_block_surfaces<D: Device + ?Sized>(&mut self, device: &mut D) {
        self.block_num = 0;
        let mut create = || {
            device.create_offscreen_surface(
                BLOCK_SURFACE_SIZE,
                BLOCK_SURFACE_SIZE,
                Format::A8R8G8B8,
                Pool::Default,
            )
        };
        let first = create();
        let second = create();
        match (first, second) {
            (Ok(a), Ok(b)) => self.block_surfaces = Some([a, b]),
            (first, second) => {
                debug!("anti-lag surfaces unavailable; anti-lag disabled");
                for surface in [first, second].into_iter().flatten() {
                    device.release_surface(surface);
                }
            }
        }
    }

    /// Fills one block surface and read-locks the other, which stalls until the GPU has
    /// caught up with everything queued before it. `false` when anti-lag is unavailable.
    pub fn drain_gpu<D: Device + ?Sized>(&mut self, device: &mut D) -> bool {
        let Some(blocks) = self.block_surfaces else {
            return false;
        };
        if let Err(error) = device.color_fill(SurfaceRef::Plain(blocks[self.block_num]), BLOCK_FILL)
        {
            trace!(%error, "anti-lag fill failed");
        }
        self.block_num ^= 1;
        device
            .lock_surface_read(SurfaceRef::Plain(blocks[self.block_num]), &mut |bytes, _| {
                std::hint::black_box(bytes.first().copied());
            })
            .is_ok()
    }

    /// Releases everything in the `Default` pool so the device can be reset.
    pub fn release_default_pool<D: Device + ?Sized>(&mut self, device: &mut D) {
        if let Some(fb) = self.fb_texture.take() {
            device.release_texture(fb.texture);
        }
        for texture in self.render_textures.iter_mut().filter_map(Option::take) {
            device.release_texture(texture);
        }
        self.toggle = 0;
        self.current = 0;
        self.release_vertexes(device);
        if let Some(blocks) = self.block_surfaces.take() {
            for surface in blocks {
                device.release_surface(surface);
            }
        }
        if let Some(surface) = self.front_copy_surface.take() {
            device.release_surface(surface);
        }
    }

    pub fn release_all<D: Device + ?Sized>(&mut self, device: &mut D) {
        self.release_default_pool(device);
        if let Some(texture) = self.palette_texture.take() {
            device.release_texture(texture);
        }
        if let Some(texture) = self.gamma_texture.take() {
            device.release_texture(texture);
        }
    }
}
