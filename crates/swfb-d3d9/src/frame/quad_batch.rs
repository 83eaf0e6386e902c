//! Batching of textured quads (screen wipes) into as few indexed draws as possible.

use tracing::{debug, trace, warn};

use crate::device::{Device, FbVertex, PrimitiveType, TextureId, FB_VERTEX_STRIDE};
use crate::platform::Platform;
use crate::resources::{MAX_QUAD_BATCH, NUM_INDEXES, NUM_VERTS};
use crate::shaders::ShaderVariant;
use crate::state::BlendState;

use super::{Framebuffer, Mode2D};

/// A quad queued for batched drawing. Quads only merge with neighbours that share the same
/// texture, palette and group.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchedQuad {
    pub vertices: [FbVertex; 4],
    pub texture: Option<TextureId>,
    pub palette: Option<TextureId>,
    pub group: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuadEntry {
    pub texture: Option<TextureId>,
    pub palette: Option<TextureId>,
    pub group: u32,
    pub num_tris: u32,
    pub num_verts: u32,
}

/// One indexed draw covering a run of compatible entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawRun {
    pub texture: Option<TextureId>,
    pub start_vertex: u32,
    pub num_vertices: u32,
    pub start_index: u32,
    pub primitive_count: u32,
}

/// Folds consecutive entries with identical binding keys into single runs. Vertices and
/// indices are laid out back to back in entry order.
pub fn merge_runs(entries: &[QuadEntry]) -> Vec<DrawRun> {
    let mut runs: Vec<DrawRun> = Vec::new();
    let mut last: Option<&QuadEntry> = None;
    let (mut vertex, mut index) = (0u32, 0u32);
    for entry in entries {
        let same_key = last.is_some_and(|prev| {
            prev.texture == entry.texture && prev.palette == entry.palette && prev.group == entry.group
        });
        match runs.last_mut() {
            Some(run) if same_key => {
                run.num_vertices += entry.num_verts;
                run.primitive_count += entry.num_tris;
            }
            _ => runs.push(DrawRun {
                texture: entry.texture,
                start_vertex: vertex,
                num_vertices: entry.num_verts,
                start_index: index,
                primitive_count: entry.num_tris,
            }),
        }
        vertex += entry.num_verts;
        index += entry.num_tris * 3;
        last = Some(entry);
    }
    runs
}

/// Staging area for an open quad batch.
#[derive(Debug)]
pub struct QuadBatch {
    /// Queued quads, or `-1` while no batch is open.
    pos: i32,
    entries: Vec<QuadEntry>,
    vertices: Vec<FbVertex>,
    indices: Vec<u32>,
}

impl Default for QuadBatch {
    fn default() -> Self {
        Self::new()
    }
}

impl QuadBatch {
    pub fn new() -> Self {
        Self {
            pos: -1,
            entries: Vec::new(),
            vertices: Vec::new(),
            indices: Vec::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.pos >= 0
    }

    pub fn position(&self) -> i32 {
        self.pos
    }

    pub fn entries(&self) -> &[QuadEntry] {
        &self.entries
    }

    pub(crate) fn open(&mut self) {
        self.pos = 0;
        self.entries.clear();
        self.vertices.clear();
        self.indices.clear();
    }

    pub(crate) fn close(&mut self) {
        self.pos = -1;
        self.entries.clear();
        self.vertices.clear();
        self.indices.clear();
    }

    fn is_full(&self, num_tris: usize, num_verts: usize) -> bool {
        self.entries.len() >= MAX_QUAD_BATCH
            || self.vertices.len() + num_verts > NUM_VERTS
            || self.indices.len() + num_tris * 3 > NUM_INDEXES
    }

    fn push(&mut self, quad: &BatchedQuad) {
        let base = self.vertices.len() as u32;
        self.vertices.extend_from_slice(&quad.vertices);
        self.indices
            .extend([0, 1, 2, 0, 2, 3].into_iter().map(|i| base + i));
        self.entries.push(QuadEntry {
            texture: quad.texture,
            palette: quad.palette,
            group: quad.group,
            num_tris: 2,
            num_verts: 4,
        });
        self.pos += 1;
    }
}

impl<D: Device, P: Platform> Framebuffer<D, P> {
    /// Opens a batch. Only valid while 2D drawing is active inside a scene.
    pub fn begin_quad_batch(&mut self) {
        if self.mode < Mode2D::SetupOnly || !self.in_scene || self.quad_batch.is_open() {
            return;
        }
        self.quad_batch.open();
    }

    /// Makes room for `num_tris` triangles over `num_verts` vertices, flushing and reopening
    /// the batch when it would overflow.
    pub fn check_quad_batch(&mut self, num_tris: usize, num_verts: usize) {
        if self.quad_batch.is_full(num_tris, num_verts) {
            self.end_quad_batch();
            self.begin_quad_batch();
        }
    }

    /// Queues a quad. Returns `false` when no batch is open.
    pub fn add_quad(&mut self, quad: &BatchedQuad) -> bool {
        self.check_quad_batch(2, 4);
        if !self.quad_batch.is_open() {
            return false;
        }
        self.quad_batch.push(quad);
        true
    }

    /// Uploads the queued quads and draws them, one indexed draw per run of compatible
    /// quads, then closes the batch. Outside 2D drawing in a scene the batch is left as is.
    pub fn end_quad_batch(&mut self) {
        if !self.quad_batch.is_open() {
            return;
        }
        if self.mode < Mode2D::SetupOnly || !self.in_scene {
            debug!(quads = self.quad_batch.position(), "quad batch end outside 2D; kept open");
            return;
        }
        if self.quad_batch.position() == 0 {
            self.quad_batch.close();
            return;
        }
        let (Some(vb), Some(ib)) = (self.resources.vertex_buffer(), self.resources.index_buffer())
        else {
            self.quad_batch.close();
            return;
        };
        let uploaded = self
            .device
            .write_buffer(vb, bytemuck::cast_slice(&self.quad_batch.vertices))
            .and_then(|()| {
                self.device
                    .write_buffer(ib, bytemuck::cast_slice(&self.quad_batch.indices))
            });
        if let Err(error) = uploaded {
            warn!(%error, quads = self.quad_batch.position(), "quad batch upload failed");
            self.quad_batch.close();
            return;
        }
        self.device.set_stream_source(vb, FB_VERTEX_STRIDE);
        self.device.set_indices(ib);

        let shader = self.shaders.get(ShaderVariant::NormalColor);
        for run in merge_runs(&self.quad_batch.entries) {
            self.state
                .set_alpha_blend(&mut self.device, Some(BlendState::REPLACE));
            self.state.enable_alpha_test(&mut self.device, false);
            self.state.set_pixel_shader(&mut self.device, shader);
            if let Some(texture) = run.texture {
                self.state.set_texture(&mut self.device, 0, Some(texture));
            }
            self.device.draw_indexed_primitive(
                PrimitiveType::TriangleList,
                run.start_vertex,
                run.num_vertices,
                run.start_index,
                run.primitive_count,
            );
            self.stats.inc_draw_calls();
        }
        trace!(quads = self.quad_batch.position(), "quad batch drawn");
        self.quad_batch.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn entry(texture: u32) -> QuadEntry {
        QuadEntry {
            texture: Some(TextureId(texture)),
            palette: None,
            group: 0,
            num_tris: 2,
            num_verts: 4,
        }
    }

    #[test]
    fn identical_quads_merge_into_one_run() {
        let runs = merge_runs(&[entry(1); 5]);
        assert_eq!(
            runs,
            vec![DrawRun {
                texture: Some(TextureId(1)),
                start_vertex: 0,
                num_vertices: 20,
                start_index: 0,
                primitive_count: 10,
            }]
        );
    }

    #[test]
    fn alternating_textures_never_merge() {
        let entries: Vec<_> = (0..6).map(|i| entry(i % 2)).collect();
        let runs = merge_runs(&entries);
        assert_eq!(runs.len(), 6);
        assert_eq!(runs[3].start_vertex, 12);
        assert_eq!(runs[3].start_index, 18);
    }

    #[test]
    fn group_and_palette_split_runs() {
        let mut entries = vec![entry(1), entry(1), entry(1)];
        entries[1].group = 1;
        entries[2].group = 1;
        entries[2].palette = Some(TextureId(9));
        assert_eq!(merge_runs(&entries).len(), 3);
        assert!(merge_runs(&[]).is_empty());
    }

    #[test]
    fn batch_fills_up_at_the_quad_limit() {
        let mut batch = QuadBatch::new();
        batch.open();
        let quad = BatchedQuad {
            vertices: [FbVertex::default(); 4],
            texture: None,
            palette: None,
            group: 0,
        };
        for _ in 0..MAX_QUAD_BATCH {
            assert!(!batch.is_full(2, 4));
            batch.push(&quad);
        }
        assert!(batch.is_full(2, 4));
        assert_eq!(batch.indices[6..12], [4, 5, 6, 4, 6, 7]);
        batch.close();
        assert!(!batch.is_open());
    }

    #[test]
    fn ending_outside_2d_keeps_the_queued_quads() {
        use crate::config::FramebufferConfig;
        use crate::headless::{
            DeviceCall, HeadlessDevice, HeadlessFactory, HeadlessPlatform, MemoryShaderSource,
        };

        let mut fb = Framebuffer::new(
            &mut HeadlessFactory::new(),
            HeadlessPlatform::default(),
            &MemoryShaderSource::complete(),
            FramebufferConfig {
                width: 320,
                height: 200,
                ..Default::default()
            },
        )
        .unwrap();
        fb.begin_2d(false);
        fb.begin_quad_batch();
        let quad = BatchedQuad {
            vertices: [FbVertex::default(); 4],
            texture: Some(TextureId(7)),
            palette: None,
            group: 0,
        };
        assert!(fb.add_quad(&quad));
        assert!(fb.add_quad(&quad));
        let draws = |fb: &Framebuffer<HeadlessDevice, HeadlessPlatform>| {
            fb.device()
                .calls()
                .iter()
                .filter(|c| matches!(c, DeviceCall::DrawIndexedPrimitive { .. }))
                .count()
        };

        fb.mode = Mode2D::Idle;
        fb.end_quad_batch();
        assert_eq!(fb.quad_batch.position(), 2);
        assert_eq!(fb.quad_batch.entries().len(), 2);
        assert_eq!(draws(&fb), 0);

        fb.mode = Mode2D::FinishAndPresent;
        fb.end_quad_batch();
        assert!(!fb.quad_batch.is_open());
        assert_eq!(draws(&fb), 1);
    }
}
