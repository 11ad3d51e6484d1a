// src/main.rs
//! Headless demo: loads a shader (built-in or from the first argument),
//! drives a material and two instances through a few frames on the render
//! thread against the recording backend, then reports what reached the GPU.

use std::backtrace::Backtrace;
use std::fs::File;
use std::io::Write;
use std::panic;
use std::sync::Arc;

use anyhow::Context as _;
use glam::{Mat4, Vec3, Vec4};
use log::{info, warn};

use slop_render_core::gpu::{GpuCall, RecordingBackend, TextureHandle};
use slop_render_core::shader::RendererUniforms;
use slop_render_core::texture::TextureFormat;
use slop_render_core::{
    init_logging, LoggingConfig, Material, MaterialFlags, MaterialInstance, RenderContext, RenderThread,
    RendererConfig, Shader, ShaderLibrary, Texture, Texture2D,
};

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

const BUILTIN_SHADER: &str = r#"#type vertex
uniform mat4 r_ViewProjection;
uniform mat4 u_Transform;

void main() {}

#type fragment
struct Light
{
    vec3 Direction;
    float Intensity;
};

uniform Light u_Light;
uniform vec4 u_Color;
uniform float u_Roughness;
uniform sampler2D u_Albedo;

void main() {}
"#;

fn main() -> anyhow::Result<()> {
    setup_diagnostics();

    let ctx = RenderContext::new(RendererConfig::default().with_frames_in_flight(2));
    let mut render = RenderThread::spawn(&ctx, RecordingBackend::new())?;

    let mut library = ShaderLibrary::new();
    let shader = match std::env::args().nth(1) {
        Some(path) => library
            .load(&ctx, &path)
            .with_context(|| format!("loading shader {}", path))?,
        None => {
            let shader = Shader::from_source(&ctx, "builtin_lit", BUILTIN_SHADER)?;
            library.add(Arc::clone(&shader))?;
            shader
        }
    };
    info!("Using shader '{}' (compute: {})", shader.name(), shader.is_compute());

    let material = Material::new(&shader, "default");
    set_or_warn(&material, "u_Color", Vec4::new(0.8, 0.8, 0.8, 1.0));
    set_or_warn(&material, "u_Roughness", 0.5f32);
    set_or_warn(&material, "u_Transform", Mat4::IDENTITY);
    material.set_flag(MaterialFlags::BLEND, false);

    let albedo: Arc<dyn Texture> =
        Arc::new(Texture2D::new(TextureHandle(1), TextureFormat::Rgba8, 256, 256).with_path("textures/checker.png"));
    if let Err(err) = material.set_texture("u_Albedo", albedo) {
        warn!("{}", err);
    }

    let red = MaterialInstance::new(&material, "red");
    red.set("u_Color", Vec4::new(1.0, 0.1, 0.1, 1.0))?;
    let shiny = MaterialInstance::new(&material, "shiny");
    shiny.set("u_Roughness", 0.05f32)?;

    let view_projection = Mat4::perspective_rh(60f32.to_radians(), 16.0 / 9.0, 0.1, 100.0)
        * Mat4::look_at_rh(Vec3::new(0.0, 2.0, 5.0), Vec3::ZERO, Vec3::Y);

    for frame in 0..3 {
        let mut renderer_uniforms = RendererUniforms::new();
        renderer_uniforms.push("r_ViewProjection", view_projection);
        shader.upload_renderer_uniforms(&ctx, renderer_uniforms)?;

        set_or_warn(&material, "u_Roughness", 0.5f32 + frame as f32 * 0.1);
        material.bind(&ctx)?;
        red.bind(&ctx)?;
        shiny.bind(&ctx)?;
        render.render_frame(&ctx)?;
    }

    let executed = render.wait_idle()?;
    let backend = render.shutdown()?;

    let uploads = backend.uploads().len();
    let texture_binds = backend
        .calls()
        .iter()
        .filter(|call| matches!(call, GpuCall::BindTexture { .. }))
        .count();
    let metrics = ctx.metrics();
    info!(
        "Done: {} commands on the render thread, {} uniform uploads, {} texture binds",
        executed, uploads, texture_binds
    );
    info!(
        "Queue metrics: submitted={} executed={} rejected={} frames={} peak={} bytes",
        metrics.submitted, metrics.executed, metrics.rejected, metrics.frames, metrics.peak_bytes
    );
    Ok(())
}

fn set_or_warn<T: bytemuck::Pod>(material: &Material, name: &str, value: T) {
    if let Err(err) = material.set(name, value) {
        warn!("Material '{}': {}", material.name(), err);
    }
}

/// Logger plus a panic hook that also writes `render_crash.log`.
fn setup_diagnostics() {
    init_logging(&LoggingConfig::default());

    panic::set_hook(Box::new(|panic_info| {
        let backtrace = Backtrace::force_capture();
        let msg = match panic_info.payload().downcast_ref::<&'static str>() {
            Some(s) => *s,
            None => match panic_info.payload().downcast_ref::<String>() {
                Some(s) => &s[..],
                None => "Box<dyn Any>",
            },
        };
        let location = panic_info
            .location()
            .map_or("unknown location".to_string(), |loc| format!("{}:{}", loc.file(), loc.line()));
        let thread = std::thread::current().name().unwrap_or("unnamed").to_owned();

        let crash_msg = format!(
            "=== RENDER CRASH ===\nThread: {}\nReason: {}\nLocation: {}\n\nStack Trace:\n{}",
            thread, msg, location, backtrace
        );
        eprintln!("\x1b[31;1m{}\x1b[0m", crash_msg);

        if let Ok(mut file) = File::create("render_crash.log") {
            let _ = file.write_all(crash_msg.as_bytes());
            eprintln!("Crash report saved to render_crash.log");
        }
    }));
}
