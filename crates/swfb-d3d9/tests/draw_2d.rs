mod common;

use common::{count, framebuffer, shaders_at_draws, small_windowed, TestFramebuffer, TestImage};
use pretty_assertions::assert_eq;
use swfb_d3d9::device::{
    AddressMode, Blend, BlendOp, Color, FbVertex, PrimitiveType, Rect, RenderState,
    SamplerState, TextureId,
};
use swfb_d3d9::headless::DeviceCall;
use swfb_d3d9::resources::native::RemapTable;
use swfb_d3d9::resources::NUM_VERTS;
use swfb_d3d9::shaders::{DrawMode, TextureKind};
use swfb_d3d9::state::ps_const;
use swfb_d3d9::{
    BatchedQuad, DisplayMode, DrawCommand, DrawFlags, DrawList, DrawType, FatalError,
    FramebufferConfig, PalEntry, Vertex2D,
};

fn in_2d(config: FramebufferConfig) -> TestFramebuffer {
    let mut fb = framebuffer(config);
    assert!(fb.begin_2d(true));
    fb
}

fn triangles(list: &mut DrawList<'_>, n: u32) -> u32 {
    let vertex = Vertex2D {
        y: 10.0,
        color0: Color::WHITE,
        ..Default::default()
    };
    list.push_vertices(&vec![vertex; n as usize])
}

/// Shaders of the draws issued after `skip` earlier draws.
fn shaders_after(fb: &TestFramebuffer, skip: usize) -> Vec<Option<String>> {
    let device = fb.device();
    shaders_at_draws(device, device.calls())
        .into_iter()
        .skip(skip)
        .collect()
}

fn shader(name: &str) -> Option<String> {
    Some(name.to_string())
}

#[test]
fn untextured_commands_use_vertex_color_and_style_blend() {
    let mut fb = in_2d(small_windowed());
    let mut list = DrawList::new();
    let start = triangles(&mut list, 6);
    list.commands.push(DrawCommand::new(DrawType::Triangles, start, 6));
    fb.device_mut().take_calls();

    fb.draw_2d(&list).expect("draw");

    let calls = fb.device().calls().to_vec();
    assert!(calls.contains(&DeviceCall::DrawPrimitive {
        primitive: PrimitiveType::TriangleList,
        start_vertex: 0,
        primitive_count: 2,
    }));
    assert!(calls.contains(&DeviceCall::RenderState(RenderState::AlphaBlendEnable(true))));
    assert!(calls.contains(&DeviceCall::RenderState(RenderState::BlendOp(BlendOp::Add))));
    assert!(calls.contains(&DeviceCall::RenderState(RenderState::SrcBlend(Blend::SrcAlpha))));
    assert!(calls.contains(&DeviceCall::RenderState(RenderState::DestBlend(
        Blend::InvSrcAlpha
    ))));
    assert!(calls.contains(&DeviceCall::RenderState(RenderState::AlphaTestEnable(true))));
    assert!(calls.contains(&DeviceCall::SamplerState {
        slot: 0,
        state: SamplerState::AddressU(AddressMode::Border),
    }));
    // The log was drained after the composite, so this is the only draw in it.
    assert_eq!(shaders_after(&fb, 0), vec![shader("VertexColor.pso")]);
    assert_eq!(fb.stats().draw_calls, 2);
}

#[test]
fn lines_and_points_count_primitives_from_vertices() {
    let mut fb = in_2d(small_windowed());
    let mut list = DrawList::new();
    let lines = triangles(&mut list, 4);
    let points = triangles(&mut list, 3);
    list.commands.push(DrawCommand::new(DrawType::Lines, lines, 4));
    list.commands.push(DrawCommand::new(DrawType::Points, points, 3));
    fb.device_mut().take_calls();

    fb.draw_2d(&list).unwrap();

    let draws: Vec<_> = fb
        .device()
        .calls()
        .iter()
        .filter(|c| c.is_draw())
        .cloned()
        .collect();
    assert_eq!(
        draws,
        vec![
            DeviceCall::DrawPrimitive {
                primitive: PrimitiveType::LineList,
                start_vertex: 0,
                primitive_count: 2,
            },
            DeviceCall::DrawPrimitive {
                primitive: PrimitiveType::PointList,
                start_vertex: 4,
                primitive_count: 3,
            },
        ]
    );
}

#[test]
fn letterbox_offset_is_added_to_vertices_unless_gathering_a_wipe() {
    let config = FramebufferConfig {
        width: 320,
        height: 200,
        fullscreen: true,
        display_mode: Some(DisplayMode {
            true_height: 240,
            pixel_doubling: 0,
        }),
        ..Default::default()
    };
    let mut fb = in_2d(config);
    let mut list = DrawList::new();
    let start = triangles(&mut list, 3);
    let mut cmd = DrawCommand::new(DrawType::Triangles, start, 3);
    cmd.flags = DrawFlags::SCISSOR;
    cmd.scissor = Rect::new(10, 10, 100, 100);
    list.commands.push(cmd);
    fb.device_mut().take_calls();

    fb.draw_2d(&list).unwrap();

    let calls = fb.device().calls().to_vec();
    let vb = calls
        .iter()
        .find_map(|c| match c {
            DeviceCall::StreamSource { buffer, .. } => Some(*buffer),
            _ => None,
        })
        .expect("stream source");
    let data = fb.device().buffer_data(vb).unwrap();
    let y = f32::from_le_bytes(data[4..8].try_into().unwrap());
    assert_eq!(y, 30.0);
    assert!(calls.contains(&DeviceCall::ScissorRect(Rect::new(10, 30, 100, 120))));
    let scissor_toggles: Vec<_> = calls
        .iter()
        .filter_map(|c| match c {
            DeviceCall::RenderState(RenderState::ScissorTestEnable(on)) => Some(*on),
            _ => None,
        })
        .collect();
    assert_eq!(scissor_toggles, vec![true, false]);

    fb.set_gathering_wipe_screen(true);
    fb.draw_2d(&list).unwrap();
    let data = fb.device().buffer_data(vb).unwrap();
    assert_eq!(f32::from_le_bytes(data[4..8].try_into().unwrap()), 10.0);
}

#[test]
fn textured_commands_pick_shader_by_kind_and_mode() {
    let mut fb = in_2d(FramebufferConfig {
        bgra: true,
        ..small_windowed()
    });
    let color = TestImage::new(16, 16, TextureKind::Color);
    let paletted = TestImage::new(16, 16, TextureKind::Paletted);
    let mut list = DrawList::new();
    let start = triangles(&mut list, 3);

    let mut normal = DrawCommand::new(DrawType::Triangles, start, 3);
    normal.texture = Some(&color);
    let mut desaturated = normal;
    desaturated.desaturate = 128;
    let mut inverted = normal;
    inverted.draw_mode = DrawMode::Invert;
    let mut indexed = normal;
    indexed.texture = Some(&paletted);
    let mut stencil = indexed;
    stencil.draw_mode = DrawMode::Stencil;
    list.commands
        .extend([normal, desaturated, inverted, indexed, stencil]);

    fb.draw_2d(&list).unwrap();

    assert_eq!(
        shaders_after(&fb, 1),
        vec![
            shader("NormalColor.pso"),
            shader("NormalColorD.pso"),
            shader("NormalColorInv.pso"),
            shader("NormalColorPal.pso"),
            shader("PalStencil.pso"),
        ]
    );
    assert_eq!(
        fb.device().pixel_shader_constant(ps_const::DESATURATION),
        Some([0.0, 1.0, 0.0, 0.0])
    );
    assert_eq!(fb.natives().texture_count(), 2);
}

#[test]
fn desaturation_and_color_constants_follow_the_command() {
    let mut fb = in_2d(small_windowed());
    let image = TestImage::new(8, 8, TextureKind::Color);
    let mut list = DrawList::new();
    let start = triangles(&mut list, 3);
    let mut cmd = DrawCommand::new(DrawType::Triangles, start, 3);
    cmd.texture = Some(&image);
    cmd.desaturate = 51;
    cmd.color1 = PalEntry::rgb(255, 0, 51);
    list.commands.push(cmd);

    fb.draw_2d(&list).unwrap();

    let device = fb.device();
    assert_eq!(
        device.pixel_shader_constant(ps_const::DESATURATION),
        Some([0.2, 0.8, 0.0, 0.0])
    );
    assert_eq!(
        device.pixel_shader_constant(ps_const::COLOR1),
        Some([1.0, 0.0, 0.2, 0.0])
    );
}

#[test]
fn special_colormap_scales_colors_into_both_registers() {
    let mut fb = in_2d(small_windowed());
    let image = TestImage::new(8, 8, TextureKind::Paletted);
    let mut list = DrawList::new();
    let start = triangles(&mut list, 3);
    let mut cmd = DrawCommand::new(DrawType::Triangles, start, 3);
    cmd.texture = Some(&image);
    cmd.flags = DrawFlags::SPECIAL_COLORMAP;
    cmd.color1 = PalEntry::rgb(255, 51, 0);
    list.commands.push(cmd);

    fb.draw_2d(&list).unwrap();

    let expected = Some([0.5, 0.1, 0.0, 0.0]);
    assert_eq!(fb.device().pixel_shader_constant(ps_const::COLOR1), expected);
    assert_eq!(fb.device().pixel_shader_constant(ps_const::COLOR2), expected);
    assert_eq!(shaders_after(&fb, 1), vec![shader("SpecialColorMapPal.pso")]);
}

#[test]
fn translations_bind_their_own_palette_texture() {
    let mut fb = in_2d(FramebufferConfig {
        bgra: true,
        ..small_windowed()
    });
    let image = TestImage::new(8, 8, TextureKind::Color);
    let remap = RemapTable::new(vec![PalEntry::rgb(9, 9, 9); 5]);
    let mut list = DrawList::new();
    let start = triangles(&mut list, 3);
    let mut cmd = DrawCommand::new(DrawType::Triangles, start, 3);
    cmd.texture = Some(&image);
    cmd.translation = Some(&remap);
    list.commands.push(cmd);

    fb.draw_2d(&list).unwrap();

    assert_eq!(
        fb.device().pixel_shader_constant(ps_const::PALETTE_MOD),
        Some([255.0 / 8.0, 0.5 / 8.0, 0.0, 0.0])
    );
    assert_eq!(fb.natives().palette_count(), 1);
    assert!(remap.native_slot().is_bound());
    assert_eq!(shaders_after(&fb, 1), vec![shader("NormalColorPal.pso")]);
    assert!(image.slots.slot(TextureKind::Paletted).is_bound());
}

#[test]
fn commands_without_a_native_texture_are_skipped() {
    let mut fb = in_2d(small_windowed());
    let image = TestImage::new(8, 8, TextureKind::Color);
    let mut list = DrawList::new();
    let start = triangles(&mut list, 3);
    let mut textured = DrawCommand::new(DrawType::Triangles, start, 3);
    textured.texture = Some(&image);
    list.commands
        .extend([textured, DrawCommand::new(DrawType::Triangles, start, 3)]);
    fb.device_mut().inject.texture_creation = true;
    fb.device_mut().take_calls();

    fb.draw_2d(&list).unwrap();

    assert_eq!(count(fb.device().calls(), DeviceCall::is_draw), 1);
    assert_eq!(fb.stats().commands_skipped, 1);
}

#[test]
fn wrapped_sampling_is_restored_to_border() {
    let mut fb = in_2d(small_windowed());
    let image = TestImage::new(8, 8, TextureKind::Color);
    let mut list = DrawList::new();
    let start = triangles(&mut list, 3);
    let mut cmd = DrawCommand::new(DrawType::Triangles, start, 3);
    cmd.texture = Some(&image);
    cmd.flags = DrawFlags::WRAP;
    list.commands.push(cmd);
    fb.device_mut().take_calls();

    fb.draw_2d(&list).unwrap();

    let modes: Vec<_> = fb
        .device()
        .calls()
        .iter()
        .filter_map(|c| match c {
            DeviceCall::SamplerState {
                slot: 0,
                state: SamplerState::AddressU(mode),
            } => Some(*mode),
            _ => None,
        })
        .collect();
    assert_eq!(
        modes,
        vec![AddressMode::Border, AddressMode::Wrap, AddressMode::Border]
    );
}

#[test]
fn drawing_outside_a_scene_does_nothing() {
    let mut fb = framebuffer(small_windowed());
    let mut list = DrawList::new();
    let start = triangles(&mut list, 3);
    list.commands.push(DrawCommand::new(DrawType::Triangles, start, 3));
    fb.device_mut().take_calls();

    assert!(fb.draw_2d(&list).is_ok());
    assert!(fb.device().calls().is_empty());
}

#[test]
fn oversized_lists_grow_the_vertex_buffer() {
    let mut fb = in_2d(small_windowed());
    let mut list = DrawList::new();
    let n = NUM_VERTS as u32 + 3;
    let start = triangles(&mut list, n);
    list.commands.push(DrawCommand::new(DrawType::Triangles, start, n));

    fb.draw_2d(&list).unwrap();

    assert!(fb.device().calls().contains(&DeviceCall::WriteBuffer {
        buffer: fb
            .device()
            .calls()
            .iter()
            .rev()
            .find_map(|c| match c {
                DeviceCall::StreamSource { buffer, .. } => Some(*buffer),
                _ => None,
            })
            .unwrap(),
        len: n as usize * std::mem::size_of::<FbVertex>(),
    }));
    assert_eq!(fb.device().live_buffers(), 2);
}

#[test]
fn failing_to_grow_the_vertex_buffer_is_fatal() {
    let mut fb = in_2d(small_windowed());
    let mut list = DrawList::new();
    let n = NUM_VERTS as u32 + 3;
    triangles(&mut list, n);
    fb.device_mut().inject.buffers = true;

    match fb.draw_2d(&list) {
        Err(FatalError::VertexBufferResize { vertices, .. }) => assert_eq!(vertices, n as usize),
        other => panic!("expected a fatal resize error, got {other:?}"),
    }
}

fn quad(texture: u32) -> BatchedQuad {
    BatchedQuad {
        vertices: [FbVertex::default(); 4],
        texture: Some(TextureId(texture)),
        palette: None,
        group: 0,
    }
}

fn indexed_draws(fb: &TestFramebuffer) -> Vec<DeviceCall> {
    fb.device()
        .calls()
        .iter()
        .filter(|c| matches!(c, DeviceCall::DrawIndexedPrimitive { .. }))
        .cloned()
        .collect()
}

#[test]
fn matching_quads_share_one_indexed_draw() {
    let mut fb = framebuffer(small_windowed());
    fb.begin_2d(false);
    fb.begin_quad_batch();
    for _ in 0..3 {
        assert!(fb.add_quad(&quad(1000)));
    }
    fb.end_quad_batch();

    assert_eq!(
        indexed_draws(&fb),
        vec![DeviceCall::DrawIndexedPrimitive {
            primitive: PrimitiveType::TriangleList,
            min_index: 0,
            num_vertices: 12,
            start_index: 0,
            primitive_count: 6,
        }]
    );
    assert!(fb
        .device()
        .calls()
        .contains(&DeviceCall::RenderState(RenderState::SrcBlend(Blend::One))));
}

#[test]
fn alternating_quads_each_get_a_draw() {
    let mut fb = framebuffer(small_windowed());
    fb.begin_2d(false);
    fb.begin_quad_batch();
    for i in 0..4 {
        fb.add_quad(&quad(1000 + i % 2));
    }
    fb.end_quad_batch();
    assert_eq!(indexed_draws(&fb).len(), 4);
}

#[test]
fn quads_need_an_open_2d_scene() {
    let mut fb = framebuffer(small_windowed());
    fb.begin_quad_batch();
    assert!(!fb.add_quad(&quad(1)));

    fb.begin_2d(false);
    fb.begin_quad_batch();
    assert!(fb.add_quad(&quad(1)));
    // Finishing the frame flushes the open batch before presenting.
    fb.end_frame();
    let calls = fb.device().calls();
    let drawn = calls
        .iter()
        .position(|c| matches!(c, DeviceCall::DrawIndexedPrimitive { .. }))
        .expect("batch flushed");
    let presented = calls.iter().position(DeviceCall::is_present).unwrap();
    assert!(drawn < presented);
}
