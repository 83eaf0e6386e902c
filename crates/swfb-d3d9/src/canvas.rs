//! The software renderer's target buffer.

use crate::device::Format;

#[derive(Debug, Clone)]
pub struct Canvas {
    width: u32,
    height: u32,
    bgra: bool,
    pixels: Vec<u8>,
}

impl Canvas {
    pub fn new(width: u32, height: u32, bgra: bool) -> Self {
        let mut canvas = Self {
            width: 0,
            height: 0,
            bgra,
            pixels: Vec::new(),
        };
        canvas.resize(width, height);
        canvas
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Row stride in pixels.
    pub fn pitch(&self) -> u32 {
        self.width
    }

    pub fn is_bgra(&self) -> bool {
        self.bgra
    }

    pub fn bytes_per_pixel(&self) -> usize {
        if self.bgra {
            4
        } else {
            1
        }
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    /// Reallocates the buffer; previous contents are discarded.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.pixels = vec![0; width as usize * height as usize * self.bytes_per_pixel()];
    }

    /// Copies the visible area into a locked texture of `format` whose rows are `dest_pitch`
    /// bytes apart. A format that does not match the canvas gets zeros instead of stale data.
    pub(crate) fn copy_into(&self, format: Format, dest: &mut [u8], dest_pitch: usize) {
        let height = self.height as usize;
        let matches = match format {
            Format::A8R8G8B8 => self.bgra,
            Format::L8 => !self.bgra,
            Format::X8R8G8B8 => false,
        };
        if !matches {
            let len = (dest_pitch * height).min(dest.len());
            dest[..len].fill(0);
            return;
        }

        let row_bytes = self.width as usize * self.bytes_per_pixel();
        let src_pitch = self.pitch() as usize * self.bytes_per_pixel();
        if dest_pitch == src_pitch && src_pitch == row_bytes {
            let len = row_bytes * height;
            dest[..len].copy_from_slice(&self.pixels[..len]);
            return;
        }
        for (src, dst) in self
            .pixels
            .chunks(src_pitch)
            .zip(dest.chunks_mut(dest_pitch))
            .take(height)
        {
            dst[..row_bytes].copy_from_slice(&src[..row_bytes]);
        }
    }
}
