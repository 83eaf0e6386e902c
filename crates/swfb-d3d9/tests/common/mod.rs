#![allow(dead_code)]

use swfb_d3d9::headless::{DeviceCall, HeadlessDevice, HeadlessFactory, HeadlessPlatform, MemoryShaderSource};
use swfb_d3d9::resources::native::{NativeTextureSlots, SourceImage};
use swfb_d3d9::shaders::TextureKind;
use swfb_d3d9::{Framebuffer, FramebufferConfig};

pub type TestFramebuffer = Framebuffer<HeadlessDevice, HeadlessPlatform>;

pub fn framebuffer(config: FramebufferConfig) -> TestFramebuffer {
    framebuffer_with(&mut HeadlessFactory::new(), config)
}

pub fn framebuffer_with(factory: &mut HeadlessFactory, config: FramebufferConfig) -> TestFramebuffer {
    Framebuffer::new(
        factory,
        HeadlessPlatform::default(),
        &MemoryShaderSource::complete(),
        config,
    )
    .expect("framebuffer creation")
}

pub fn small_windowed() -> FramebufferConfig {
    FramebufferConfig {
        width: 320,
        height: 200,
        ..Default::default()
    }
}

/// Solid-color engine image.
#[derive(Debug, Default)]
pub struct TestImage {
    pub width: u32,
    pub height: u32,
    pub kind: Option<TextureKind>,
    pub value: u8,
    pub slots: NativeTextureSlots,
}

impl TestImage {
    pub fn new(width: u32, height: u32, kind: TextureKind) -> Self {
        Self {
            width,
            height,
            kind: Some(kind),
            value: 0x7f,
            slots: NativeTextureSlots::default(),
        }
    }
}

impl SourceImage for TestImage {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn kind(&self) -> TextureKind {
        self.kind.unwrap_or(TextureKind::Color)
    }

    fn fill_buffer(&self, dest: &mut [u8], pitch: usize, kind: TextureKind) {
        let row = self.width as usize * kind.format().bytes_per_pixel();
        for y in 0..self.height as usize {
            dest[y * pitch..y * pitch + row].fill(self.value);
        }
    }

    fn native_slots(&self) -> &NativeTextureSlots {
        &self.slots
    }
}

/// File name of the shader bound at each draw in `calls`, `None` for no shader.
pub fn shaders_at_draws(device: &HeadlessDevice, calls: &[DeviceCall]) -> Vec<Option<String>> {
    let mut current = None;
    let mut out = Vec::new();
    for call in calls {
        match call {
            DeviceCall::SetPixelShader(shader) => {
                current = shader.and_then(|id| device.shader_bytecode(id)).map(|bytes| {
                    let path = String::from_utf8_lossy(bytes);
                    path.rsplit('/').next().unwrap_or_default().to_string()
                });
            }
            call if call.is_draw() => out.push(current.clone()),
            _ => {}
        }
    }
    out
}

pub fn count(calls: &[DeviceCall], pred: impl Fn(&DeviceCall) -> bool) -> usize {
    calls.iter().filter(|c| pred(c)).count()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::TRACE)
        .try_init();
}
