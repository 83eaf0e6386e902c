mod common;

use common::{count, framebuffer, framebuffer_with, small_windowed, TestImage};
use pretty_assertions::assert_eq;
use swfb_d3d9::device::{CooperativeLevel, DeviceCaps, LineCaps, VertexProcessing};
use swfb_d3d9::headless::{DeviceCall, HeadlessFactory, HeadlessPlatform, MemoryShaderSource};
use swfb_d3d9::resources::creation::VENDOR_NVIDIA;
use swfb_d3d9::resources::native::{RemapTable, SourceImage};
use swfb_d3d9::shaders::{shader_path, ShaderVariant, TextureKind};
use swfb_d3d9::{Framebuffer, FramebufferConfig, InitError, PalEntry};

fn fullscreen_at(refresh_rate: u32) -> FramebufferConfig {
    FramebufferConfig {
        fullscreen: true,
        refresh_rate,
        ..small_windowed()
    }
}

#[test]
fn lost_device_skips_drawing_and_presenting() {
    let mut fb = framebuffer(small_windowed());
    fb.device_mut().set_cooperative_level(CooperativeLevel::Lost);
    fb.device_mut().take_calls();

    fb.end_frame();
    fb.end_frame();

    let calls = fb.device().calls();
    assert_eq!(count(calls, DeviceCall::is_draw), 0);
    assert_eq!(count(calls, DeviceCall::is_present), 0);
    assert!(!calls.iter().any(|c| matches!(c, DeviceCall::Reset(_))));
    assert_eq!(fb.platform().yields, 2);
    assert_eq!(fb.stats().frames_skipped, 2);
}

#[test]
fn resettable_device_is_reset_before_drawing() {
    let mut fb = framebuffer(small_windowed());
    fb.device_mut().set_cooperative_level(CooperativeLevel::NotReset);
    fb.device_mut().take_calls();

    fb.end_frame();

    let calls = fb.device().calls();
    let reset = calls
        .iter()
        .position(|c| matches!(c, DeviceCall::Reset(_)))
        .expect("reset issued");
    let first_draw = calls.iter().position(DeviceCall::is_draw).expect("frame drawn");
    assert!(reset < first_draw);
    assert_eq!(count(calls, DeviceCall::is_present), 1);
    let stats = fb.stats();
    assert_eq!((stats.resets_attempted, stats.resets_succeeded), (1, 1));
}

#[test]
fn failed_reset_skips_the_frame_and_retries_next_time() {
    let mut fb = framebuffer(small_windowed());
    fb.device_mut().set_cooperative_level(CooperativeLevel::NotReset);
    fb.device_mut().inject.reset_failures = 1;
    fb.device_mut().take_calls();

    fb.end_frame();
    assert_eq!(count(fb.device().calls(), DeviceCall::is_draw), 0);
    assert_eq!(fb.stats().frames_skipped, 1);

    fb.end_frame();
    assert_eq!(count(fb.device().calls(), DeviceCall::is_present), 1);
    let stats = fb.stats();
    assert_eq!((stats.resets_attempted, stats.resets_succeeded), (2, 1));
}

#[test]
fn reset_state_is_reapplied_after_recovery() {
    let mut fb = framebuffer(small_windowed());
    fb.set_gamma(2.0);
    fb.end_frame();
    fb.device_mut().set_cooperative_level(CooperativeLevel::NotReset);
    fb.end_frame();
    // A reset wipes device constants; they are re-sent in the recovering frame.
    assert_eq!(
        fb.device().pixel_shader_constant(swfb_d3d9::state::ps_const::GAMMA),
        Some([0.5, 0.5, 0.5, 0.5])
    );
}

#[test]
fn reset_retries_with_default_refresh_rate() {
    let mut fb = framebuffer(fullscreen_at(75));
    fb.device_mut().inject.reset_rejects_refresh = true;
    fb.device_mut().take_calls();

    assert!(fb.reset());

    let resets: Vec<u32> = fb
        .device()
        .calls()
        .iter()
        .filter_map(|c| match c {
            DeviceCall::Reset(params) => Some(params.refresh_rate),
            _ => None,
        })
        .collect();
    assert_eq!(resets, vec![75, 0]);
}

#[test]
fn vsync_and_refresh_changes_reset_the_device() {
    let mut fb = framebuffer(fullscreen_at(0));
    fb.set_vsync(true);
    assert!(fb.device().present_params().vsync);
    fb.set_vsync(true);
    fb.new_refresh_rate(60);
    assert_eq!(fb.device().present_params().refresh_rate, 60);
    assert_eq!(fb.stats().resets_attempted, 2);

    let mut windowed = framebuffer(small_windowed());
    windowed.new_refresh_rate(60);
    assert_eq!(windowed.stats().resets_attempted, 0);
}

#[test]
fn reset_drops_native_mirrors() {
    let mut fb = framebuffer(small_windowed());
    let image = TestImage::new(8, 8, TextureKind::Color);
    let remap = RemapTable::new(vec![PalEntry::rgb(1, 2, 3); 5]);
    let texture = fb.create_native_texture(&image, TextureKind::Color);
    let palette = fb.create_native_palette(&remap);
    assert!(texture.is_some() && palette.is_some());
    assert_eq!(fb.natives().texture_count(), 1);

    assert!(fb.reset());
    assert_eq!(fb.natives().texture_count(), 0);
    assert_eq!(fb.natives().palette_count(), 0);
    assert_eq!(fb.natives().texture(texture.unwrap()), None);
    assert!(!fb.update_native_texture(&image, TextureKind::Color));
    assert!(!fb.update_native_palette(&remap));

    let again = fb.create_native_texture(&image, TextureKind::Color);
    assert!(again.is_some());
    assert!(fb.update_native_texture(&image, TextureKind::Color));
    fb.destroy_native_texture(image.native_slots().slot(TextureKind::Color));
    assert_eq!(fb.natives().texture_count(), 0);
    assert!(!image.native_slots().slot(TextureKind::Color).is_bound());
}

#[test]
fn creation_falls_back_to_software_vertex_processing() {
    let mut factory = HeadlessFactory::new();
    factory.reject_hardware_vp = true;
    let fb = framebuffer_with(&mut factory, small_windowed());
    assert_eq!(
        factory.attempts(),
        &[(VertexProcessing::Hardware, 0), (VertexProcessing::Software, 0)]
    );
    assert_eq!(fb.shader_tier(), Some("30"));
}

#[test]
fn no_device_reports_every_attempt() {
    let mut factory = HeadlessFactory::new();
    factory.reject_hardware_vp = true;
    factory.reject_software_vp = true;
    let result = Framebuffer::new(
        &mut factory,
        HeadlessPlatform::default(),
        &MemoryShaderSource::complete(),
        fullscreen_at(60),
    );
    match result {
        Err(InitError::NoDevice { attempts }) => assert_eq!(attempts.len(), 4),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("device creation should fail"),
    }
}

#[test]
fn missing_required_shader_falls_back_a_tier_then_fails() {
    let mut source = MemoryShaderSource::complete();
    source.remove(&shader_path("30", ShaderVariant::NormalColorPal));
    let fb = Framebuffer::new(
        &mut HeadlessFactory::new(),
        HeadlessPlatform::default(),
        &source,
        small_windowed(),
    )
    .expect("sm20 fallback");
    assert_eq!(fb.shader_tier(), Some("20"));

    source.remove(&shader_path("20", ShaderVariant::NormalColorPal));
    let result = Framebuffer::new(
        &mut HeadlessFactory::new(),
        HeadlessPlatform::default(),
        &source,
        small_windowed(),
    );
    assert!(matches!(result, Err(InitError::NoShaderModel)));
}

#[test]
fn missing_vertex_buffers_fail_initialization() {
    let mut factory = HeadlessFactory::new();
    factory.inject.buffers = true;
    let result = Framebuffer::new(
        &mut factory,
        HeadlessPlatform::default(),
        &MemoryShaderSource::complete(),
        small_windowed(),
    );
    match result {
        Err(InitError::Resource(error)) => assert_eq!(error.resource, "vertex buffers"),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("initialization should fail"),
    }
}

#[test]
fn vendor_caps_decide_antialiased_lines() {
    let mut factory = HeadlessFactory::new();
    factory.vendor_id = Some(VENDOR_NVIDIA);
    let fb = framebuffer_with(&mut factory, small_windowed());
    assert!(fb.caps().line_caps.contains(LineCaps::ANTIALIAS));
    assert!(fb.hw_aa_lines());

    let mut factory = HeadlessFactory::new();
    factory.caps = Some(DeviceCaps {
        line_caps: LineCaps::ANTIALIAS,
        max_texture_width: 4096,
        max_texture_height: 4096,
    });
    let fb = framebuffer_with(
        &mut factory,
        FramebufferConfig {
            hw_aa_lines: false,
            ..small_windowed()
        },
    );
    assert!(!fb.hw_aa_lines());
}

#[test]
fn missing_caps_are_treated_as_none() {
    let mut factory = HeadlessFactory::new();
    factory.inject.caps = true;
    let fb = framebuffer_with(&mut factory, small_windowed());
    assert_eq!(fb.caps(), DeviceCaps::default());
    assert!(!fb.hw_aa_lines());
}
