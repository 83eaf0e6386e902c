//! GPU mirrors of engine-owned images and remap tables.
//!
//! The registry owns every native texture and palette. Engine objects only keep a
//! [`NativeSlot`] holding a [`NativeHandle`]; handles carry the registry epoch, so clearing
//! the registry on device reset invalidates every outstanding handle at once and the slot
//! is emptied the next time it is resolved.

use std::cell::Cell;

use hashbrown::HashMap;
use tracing::{debug, trace};

use crate::device::{Color, Device, Format, Rect, TextureDesc, TextureId, TextureUsage, Pool};
use crate::palette::{round_up_pow2, PalEntry, PALETTE_SIZE};
use crate::shaders::TextureKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeHandle {
    index: u32,
    epoch: u32,
}

/// Back-reference slot an engine object holds to its native mirror.
#[derive(Debug, Default)]
pub struct NativeSlot(Cell<Option<NativeHandle>>);

impl NativeSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<NativeHandle> {
        self.0.get()
    }

    pub fn set(&self, handle: Option<NativeHandle>) {
        self.0.set(handle);
    }

    pub fn is_bound(&self) -> bool {
        self.0.get().is_some()
    }
}

/// One slot per texture kind an image can be requested in.
#[derive(Debug, Default)]
pub struct NativeTextureSlots {
    paletted: NativeSlot,
    color: NativeSlot,
}

impl NativeTextureSlots {
    pub fn slot(&self, kind: TextureKind) -> &NativeSlot {
        match kind {
            TextureKind::Paletted => &self.paletted,
            TextureKind::Color => &self.color,
        }
    }
}

/// Engine-side image that can be mirrored into a GPU texture.
pub trait SourceImage {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    /// Preferred kind when no translation forces paletted sampling.
    fn kind(&self) -> TextureKind;
    /// Writes the image row-major into `dest` in `kind`'s layout, `pitch` bytes per row.
    fn fill_buffer(&self, dest: &mut [u8], pitch: usize, kind: TextureKind);
    fn native_slots(&self) -> &NativeTextureSlots;
}

/// Engine-side translation table.
#[derive(Debug, Default)]
pub struct RemapTable {
    pub palette: Vec<PalEntry>,
    native: NativeSlot,
}

impl RemapTable {
    pub fn new(palette: Vec<PalEntry>) -> Self {
        Self {
            palette,
            native: NativeSlot::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.palette.len()
    }

    pub fn is_empty(&self) -> bool {
        self.palette.is_empty()
    }

    pub fn native_slot(&self) -> &NativeSlot {
        &self.native
    }
}

#[derive(Debug, Clone, Copy)]
struct NativeTexture {
    texture: TextureId,
}

/// Palette texture binding for a translated draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaletteBinding {
    pub texture: TextureId,
    /// Texture width: the table length rounded up to a power of two.
    pub size: u32,
    pub border: Color,
}

/// Texel bytes (B, G, R, A) for a `size`-wide remap texture and its border color.
///
/// At most [`PALETTE_SIZE`] entries are copied. The border repeats the last copied entry
/// so edge sampling never reads past the table.
pub fn remap_texels(palette: &[PalEntry], size: usize) -> (Vec<u8>, Color) {
    let mut texels = vec![0u8; size * 4];
    let copied = palette.len().min(PALETTE_SIZE).min(size);
    for (entry, texel) in palette[..copied].iter().zip(texels.chunks_exact_mut(4)) {
        texel.copy_from_slice(&entry.to_argb().0.to_le_bytes());
    }
    let border = copied
        .checked_sub(1)
        .map_or(Color::TRANSPARENT, |last| palette[last].to_argb());
    (texels, border)
}

#[derive(Debug, Default)]
pub struct NativeRegistry {
    epoch: u32,
    next_index: u32,
    textures: HashMap<u32, NativeTexture>,
    palettes: HashMap<u32, PaletteBinding>,
}

impl NativeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc_handle(&mut self) -> NativeHandle {
        let handle = NativeHandle {
            index: self.next_index,
            epoch: self.epoch,
        };
        self.next_index = self.next_index.wrapping_add(1);
        handle
    }

    fn live(&self, handle: NativeHandle) -> Option<u32> {
        (handle.epoch == self.epoch).then_some(handle.index)
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn palette_count(&self) -> usize {
        self.palettes.len()
    }

    pub fn texture(&self, handle: NativeHandle) -> Option<TextureId> {
        let index = self.live(handle)?;
        self.textures.get(&index).map(|t| t.texture)
    }

    pub fn palette(&self, handle: NativeHandle) -> Option<PaletteBinding> {
        let index = self.live(handle)?;
        self.palettes.get(&index).copied()
    }

    /// Creates a managed texture sized exactly to `image` and uploads it. Returns `None`
    /// when the texture cannot be created or filled; the draw using it should be skipped.
    ///
    /// An image has at most one native texture per kind: one it already owns is freed first.
    pub fn create_texture<D: Device + ?Sized>(
        &mut self,
        device: &mut D,
        image: &dyn SourceImage,
        kind: TextureKind,
    ) -> Option<NativeHandle> {
        self.destroy_texture(device, image.native_slots().slot(kind));
        let desc = TextureDesc {
            width: image.width(),
            height: image.height(),
            format: kind.format(),
            usage: TextureUsage::empty(),
            pool: Pool::Managed,
        };
        let texture = match device.create_texture(&desc) {
            Ok(texture) => texture,
            Err(error) => {
                debug!(width = desc.width, height = desc.height, %error, "native texture creation failed");
                return None;
            }
        };
        if !upload_image(device, texture, image, kind) {
            device.release_texture(texture);
            return None;
        }
        let handle = self.alloc_handle();
        self.textures.insert(handle.index, NativeTexture { texture });
        image.native_slots().slot(kind).set(Some(handle));
        Some(handle)
    }

    /// Re-uploads an image whose pixels changed. `false` when it has no live native texture
    /// or the upload failed.
    pub fn update_texture<D: Device + ?Sized>(
        &mut self,
        device: &mut D,
        image: &dyn SourceImage,
        kind: TextureKind,
    ) -> bool {
        let Some(texture) = image.native_slots().slot(kind).get().and_then(|h| self.texture(h))
        else {
            return false;
        };
        upload_image(device, texture, image, kind)
    }

    /// Returns the image's native texture, creating it on first use.
    pub fn resolve_texture<D: Device + ?Sized>(
        &mut self,
        device: &mut D,
        image: &dyn SourceImage,
        kind: TextureKind,
    ) -> Option<TextureId> {
        let slot = image.native_slots().slot(kind);
        if let Some(handle) = slot.get() {
            if let Some(texture) = self.texture(handle) {
                return Some(texture);
            }
            slot.set(None);
        }
        let handle = self.create_texture(device, image, kind)?;
        self.texture(handle)
    }

    /// Frees the native texture behind `slot` and empties the slot.
    pub fn destroy_texture<D: Device + ?Sized>(&mut self, device: &mut D, slot: &NativeSlot) {
        if let Some(index) = slot.get().and_then(|h| self.live(h)) {
            if let Some(native) = self.textures.remove(&index) {
                device.release_texture(native.texture);
            }
        }
        slot.set(None);
    }

    /// Creates a `round_up_pow2(len)` x 1 palette texture for `remap`, replacing the one it
    /// already owns.
    pub fn create_palette<D: Device + ?Sized>(
        &mut self,
        device: &mut D,
        remap: &RemapTable,
    ) -> Option<NativeHandle> {
        self.destroy_palette(device, remap);
        let size = round_up_pow2(remap.len());
        let desc = TextureDesc {
            width: size as u32,
            height: 1,
            format: Format::A8R8G8B8,
            usage: TextureUsage::empty(),
            pool: Pool::Managed,
        };
        let texture = match device.create_texture(&desc) {
            Ok(texture) => texture,
            Err(error) => {
                debug!(size, %error, "native palette creation failed");
                return None;
            }
        };
        let Some(border) = upload_remap(device, texture, remap, size) else {
            device.release_texture(texture);
            return None;
        };
        let handle = self.alloc_handle();
        self.palettes.insert(
            handle.index,
            PaletteBinding {
                texture,
                size: size as u32,
                border,
            },
        );
        remap.native_slot().set(Some(handle));
        Some(handle)
    }

    /// Re-uploads a remap table whose colors changed.
    pub fn update_palette<D: Device + ?Sized>(&mut self, device: &mut D, remap: &RemapTable) -> bool {
        let Some(index) = remap.native_slot().get().and_then(|h| self.live(h)) else {
            return false;
        };
        let Some(binding) = self.palettes.get_mut(&index) else {
            return false;
        };
        match upload_remap(device, binding.texture, remap, binding.size as usize) {
            Some(border) => {
                binding.border = border;
                true
            }
            None => false,
        }
    }

    pub fn resolve_palette<D: Device + ?Sized>(
        &mut self,
        device: &mut D,
        remap: &RemapTable,
    ) -> Option<PaletteBinding> {
        let slot = remap.native_slot();
        if let Some(handle) = slot.get() {
            if let Some(binding) = self.palette(handle) {
                return Some(binding);
            }
            slot.set(None);
        }
        let handle = self.create_palette(device, remap)?;
        self.palette(handle)
    }

    pub fn destroy_palette<D: Device + ?Sized>(&mut self, device: &mut D, remap: &RemapTable) {
        let slot = remap.native_slot();
        if let Some(index) = slot.get().and_then(|h| self.live(h)) {
            if let Some(binding) = self.palettes.remove(&index) {
                device.release_texture(binding.texture);
            }
        }
        slot.set(None);
    }

    /// Frees every native texture and palette and invalidates all outstanding handles.
    pub fn clear<D: Device + ?Sized>(&mut self, device: &mut D) {
        let (textures, palettes) = (self.textures.len(), self.palettes.len());
        for (_, native) in self.textures.drain() {
            device.release_texture(native.texture);
        }
        for (_, binding) in self.palettes.drain() {
            device.release_texture(binding.texture);
        }
        self.epoch = self.epoch.wrapping_add(1);
        if textures + palettes > 0 {
            debug!(textures, palettes, "released native resources");
        }
    }
}

fn upload_image<D: Device + ?Sized>(
    device: &mut D,
    texture: TextureId,
    image: &dyn SourceImage,
    kind: TextureKind,
) -> bool {
    let Some(desc) = device.texture_desc(texture) else {
        return false;
    };
    let rect = Rect::new(0, 0, desc.width as i32, desc.height as i32);
    let result = device.lock_texture(texture, Some(rect), false, &mut |bytes, pitch| {
        image.fill_buffer(bytes, pitch, kind);
    });
    if let Err(error) = &result {
        trace!(%error, "native texture upload failed");
    }
    result.is_ok()
}

fn upload_remap<D: Device + ?Sized>(
    device: &mut D,
    texture: TextureId,
    remap: &RemapTable,
    size: usize,
) -> Option<Color> {
    let (texels, border) = remap_texels(&remap.palette, size);
    device
        .lock_texture(texture, None, false, &mut |bytes, _pitch| {
            bytes[..texels.len()].copy_from_slice(&texels);
        })
        .ok()
        .map(|()| border)
}
