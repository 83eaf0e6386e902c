//! Rendering of the engine's 2D draw list (HUD, menus, console) on top of the frame.

use std::fmt;

use bitflags::bitflags;
use tracing::{trace, warn};

use crate::device::{
    AddressMode, Color, Device, FbVertex, PrimitiveType, Rect, RenderState, SamplerState,
    FB_VERTEX_STRIDE,
};
use crate::error::{DeviceError, FatalError};
use crate::palette::{PalEntry, PALETTE_SIZE};
use crate::platform::Platform;
use crate::resources::native::{RemapTable, SourceImage};
use crate::shaders::{select_shader, DrawMode, ShaderVariant, TextureKind};
use crate::state::{blend_for_style, ps_const, RenderStyle};

use super::Framebuffer;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vertex2D {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub u: f32,
    pub v: f32,
    pub color0: Color,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawType {
    Triangles,
    Lines,
    Points,
}

impl DrawType {
    pub fn primitive(self) -> PrimitiveType {
        match self {
            DrawType::Triangles => PrimitiveType::TriangleList,
            DrawType::Lines => PrimitiveType::LineList,
            DrawType::Points => PrimitiveType::PointList,
        }
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct DrawFlags: u32 {
        /// Repeat texture coordinates instead of clamping to the border color.
        const WRAP = 1 << 0;
        const SPECIAL_COLORMAP = 1 << 1;
        const SCISSOR = 1 << 2;
    }
}

/// One draw over a contiguous range of the list's vertices.
#[derive(Clone, Copy)]
pub struct DrawCommand<'a> {
    pub draw_type: DrawType,
    pub vertex_index: u32,
    pub vertex_count: u32,
    pub render_style: RenderStyle,
    pub draw_mode: DrawMode,
    /// 0 (none) to 255 (fully gray).
    pub desaturate: u8,
    /// Second color fed to the shader, or the colorize range scale with
    /// [`DrawFlags::SPECIAL_COLORMAP`].
    pub color1: PalEntry,
    pub texture: Option<&'a dyn SourceImage>,
    pub translation: Option<&'a RemapTable>,
    pub flags: DrawFlags,
    /// Scissor rect in logical coordinates, used with [`DrawFlags::SCISSOR`].
    pub scissor: Rect,
}

impl<'a> DrawCommand<'a> {
    pub fn new(draw_type: DrawType, vertex_index: u32, vertex_count: u32) -> Self {
        Self {
            draw_type,
            vertex_index,
            vertex_count,
            render_style: RenderStyle::TRANSLUCENT,
            draw_mode: DrawMode::Normal,
            desaturate: 0,
            color1: PalEntry::default(),
            texture: None,
            translation: None,
            flags: DrawFlags::empty(),
            scissor: Rect::default(),
        }
    }
}

impl fmt::Debug for DrawCommand<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DrawCommand")
            .field("draw_type", &self.draw_type)
            .field("vertex_index", &self.vertex_index)
            .field("vertex_count", &self.vertex_count)
            .field("render_style", &self.render_style)
            .field("draw_mode", &self.draw_mode)
            .field("desaturate", &self.desaturate)
            .field("color1", &self.color1)
            .field(
                "texture",
                &self
                    .texture
                    .map(|image| (image.width(), image.height(), image.kind())),
            )
            .field("translation", &self.translation)
            .field("flags", &self.flags)
            .field("scissor", &self.scissor)
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct DrawList<'a> {
    pub vertices: Vec<Vertex2D>,
    pub indices: Vec<u32>,
    pub commands: Vec<DrawCommand<'a>>,
}

impl<'a> DrawList<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends vertices and returns the index of the first one.
    pub fn push_vertices(&mut self, vertices: &[Vertex2D]) -> u32 {
        let start = self.vertices.len() as u32;
        self.vertices.extend_from_slice(vertices);
        start
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl<D: Device, P: Platform> Framebuffer<D, P> {
    /// Draws the list into the open scene.
    ///
    /// Commands whose texture or translation cannot be mirrored on the device are skipped.
    /// Failing to grow the vertex buffers is the only fatal case.
    pub fn draw_2d(&mut self, list: &DrawList<'_>) -> Result<(), FatalError> {
        if !self.in_scene {
            trace!(commands = list.commands.len(), "2D draw outside a scene");
            return Ok(());
        }

        let (vertices, indices) = (list.vertices.len(), list.indices.len());
        let (max_vertices, max_indices) = self.resources.capacity();
        if vertices > max_vertices || indices > max_indices {
            self.resources
                .create_vertexes(
                    &mut self.device,
                    vertices.max(max_vertices),
                    indices.max(max_indices),
                )
                .map_err(|source| FatalError::VertexBufferResize {
                    vertices,
                    indices,
                    source,
                })?;
        }
        let (Some(vb), Some(ib)) = (self.resources.vertex_buffer(), self.resources.index_buffer())
        else {
            return Err(FatalError::VertexBufferResize {
                vertices,
                indices,
                source: DeviceError::InvalidCall("vertex buffers missing"),
            });
        };

        let yoffset = if self.gathering_wipe {
            0.0
        } else {
            self.lb_offset as f32
        };
        let converted: Vec<FbVertex> = list
            .vertices
            .iter()
            .map(|v| FbVertex {
                x: v.x,
                y: v.y + yoffset,
                z: v.z,
                rhw: 1.0,
                color0: v.color0,
                color1: Color::TRANSPARENT,
                tu: v.u,
                tv: v.v,
            })
            .collect();
        let uploaded = self
            .device
            .write_buffer(vb, bytemuck::cast_slice(&converted))
            .and_then(|()| self.device.write_buffer(ib, bytemuck::cast_slice(&list.indices)));
        if let Err(error) = uploaded {
            warn!(%error, "2D vertex upload failed; list dropped");
            return Ok(());
        }
        self.device.set_stream_source(vb, FB_VERTEX_STRIDE);
        self.device.set_indices(ib);

        self.device
            .set_sampler_state(0, SamplerState::AddressU(AddressMode::Border));
        self.device
            .set_sampler_state(0, SamplerState::AddressV(AddressMode::Border));
        self.state.enable_alpha_test(&mut self.device, true);

        let mut uv_wrapped = false;
        let mut scissoring = false;
        for cmd in &list.commands {
            let Some(variant) = self.bind_command_textures(cmd, &mut uv_wrapped) else {
                self.stats.inc_commands_skipped();
                continue;
            };
            let Some(shader) = self.shaders.get(variant) else {
                trace!(%variant, "shader not loaded; command skipped");
                self.stats.inc_commands_skipped();
                continue;
            };
            self.state
                .set_alpha_blend(&mut self.device, Some(blend_for_style(cmd.render_style)));
            self.state.set_pixel_shader(&mut self.device, Some(shader));

            if cmd.flags.contains(DrawFlags::SCISSOR) {
                let s = cmd.scissor;
                let y = yoffset as i32;
                self.device
                    .set_scissor_rect(Rect::new(s.left, s.top + y, s.right, s.bottom + y));
                self.device
                    .set_render_state(RenderState::ScissorTestEnable(true));
                scissoring = true;
            } else if scissoring {
                self.device
                    .set_render_state(RenderState::ScissorTestEnable(false));
                scissoring = false;
            }

            let primitive = cmd.draw_type.primitive();
            self.device.draw_primitive(
                primitive,
                cmd.vertex_index,
                primitive.primitive_count(cmd.vertex_count),
            );
            self.stats.inc_draw_calls();
        }

        if scissoring {
            self.device
                .set_render_state(RenderState::ScissorTestEnable(false));
        }
        if uv_wrapped {
            self.device
                .set_sampler_state(0, SamplerState::AddressU(AddressMode::Border));
            self.device
                .set_sampler_state(0, SamplerState::AddressV(AddressMode::Border));
        }
        Ok(())
    }

    /// Binds the texture, palette and shader constants a command needs and picks its
    /// shader. `None` means the command cannot be drawn.
    fn bind_command_textures(
        &mut self,
        cmd: &DrawCommand<'_>,
        uv_wrapped: &mut bool,
    ) -> Option<ShaderVariant> {
        let Some(image) = cmd.texture else {
            return Some(ShaderVariant::VertexColor);
        };

        let wrap = cmd.flags.contains(DrawFlags::WRAP);
        if *uv_wrapped != wrap {
            let mode = if wrap {
                AddressMode::Wrap
            } else {
                AddressMode::Border
            };
            self.device
                .set_sampler_state(0, SamplerState::AddressU(mode));
            self.device
                .set_sampler_state(0, SamplerState::AddressV(mode));
            *uv_wrapped = wrap;
        }

        let special = cmd.flags.contains(DrawFlags::SPECIAL_COLORMAP);
        let c = cmd.color1;
        if special {
            let scale = [c.r as f32 / 510.0, c.g as f32 / 510.0, c.b as f32 / 510.0, 0.0];
            self.state
                .set_constant(&mut self.device, ps_const::COLOR1, scale);
            self.state
                .set_constant(&mut self.device, ps_const::COLOR2, scale);
        } else {
            let d = cmd.desaturate as f32 / 255.0;
            self.state
                .set_constant(&mut self.device, ps_const::DESATURATION, [d, 1.0 - d, 0.0, 0.0]);
            self.state.set_constant(
                &mut self.device,
                ps_const::COLOR1,
                [c.r as f32 / 255.0, c.g as f32 / 255.0, c.b as f32 / 255.0, 0.0],
            );
        }

        let kind = if cmd.translation.is_some() {
            TextureKind::Paletted
        } else {
            image.kind()
        };
        let mode = if cmd.draw_mode == DrawMode::Normal && cmd.desaturate > 0 {
            DrawMode::Desaturate
        } else {
            cmd.draw_mode
        };

        let Some(texture) = self.natives.resolve_texture(&mut self.device, image, kind) else {
            trace!(?kind, "texture unavailable; command skipped");
            return None;
        };
        self.state.set_texture(&mut self.device, 0, Some(texture));

        if kind == TextureKind::Paletted {
            match cmd.translation {
                Some(remap) => {
                    let Some(binding) = self.natives.resolve_palette(&mut self.device, remap) else {
                        trace!("translation unavailable; command skipped");
                        return None;
                    };
                    self.state.set_palette_texture(
                        &mut self.device,
                        binding.texture,
                        binding.size,
                        binding.border,
                    );
                }
                None => {
                    let palette = self.resources.palette_texture()?;
                    self.state.set_palette_texture(
                        &mut self.device,
                        palette,
                        PALETTE_SIZE as u32,
                        self.border_color,
                    );
                }
            }
        }

        Some(select_shader(Some(kind), mode, special))
    }
}
