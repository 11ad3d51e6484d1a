// src/shader/program.rs
//! Shader asset: source, reflection and the backend program built from it.
//!
//! Loading is split in two halves:
//! - on the calling thread the source is preprocessed and reflected, so
//!   materials can size their buffers immediately;
//! - on the render thread the program is compiled, its bindings resolved and,
//!   whenever a reload replaced the reflection (or a program already
//!   existed), the reload callbacks fired.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, error, info, trace, warn};
use parking_lot::{MappedRwLockReadGuard, Mutex, RwLock, RwLockReadGuard};
use xxhash_rust::xxh3::xxh3_64;

use super::parser::parse;
use super::preprocess::{preprocess, ShaderSources};
use super::reflection::ShaderReflection;
use super::uniform::ShaderDomain;
use crate::buffer::ByteBuffer;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::gpu::{ProgramId, RenderBackend, UniformValue};
use crate::renderer::RenderContext;

/// Called on the render thread after a successful recompile.
pub type ReloadCallback = Arc<dyn Fn() + Send + Sync + 'static>;

/// Handle for removing a reload callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReloadCallbackId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// New source was reflected and a recompile queued.
    Reloaded,
    /// Source fingerprint matched the loaded one; nothing was queued.
    Unchanged,
}

struct ShaderState {
    sources: ShaderSources,
    reflection: ShaderReflection,
    fingerprint: u64,
}

pub struct Shader {
    name: String,
    path: Option<PathBuf>,
    state: RwLock<ShaderState>,
    program: RwLock<Option<ProgramId>>,
    last_error: Mutex<Option<String>>,
    loaded: AtomicBool,
    callbacks: Mutex<Vec<(ReloadCallbackId, ReloadCallback)>>,
    next_callback: AtomicU64,
}

impl std::fmt::Debug for Shader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shader")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("program", &*self.program.read())
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

impl Shader {
    /// Reflect `source` and queue its compilation.
    pub fn from_source(ctx: &RenderContext, name: impl Into<String>, source: &str) -> Result<Arc<Self>> {
        let name = name.into();
        let state = reflect(source).with_context(|| format!("failed to load shader '{}'", name))?;
        let shader = Arc::new(Self::with_state(name, None, state));
        shader.queue_compile(ctx, None)?;
        Ok(shader)
    }

    /// Read, reflect and queue compilation of a shader file. The shader is
    /// named after the file stem.
    pub fn from_file(ctx: &RenderContext, path: impl AsRef<Path>) -> Result<Arc<Self>> {
        let path = path.as_ref();
        let name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("shader")
            .to_owned();
        Self::from_file_named(ctx, name, path)
    }

    pub fn from_file_named(ctx: &RenderContext, name: impl Into<String>, path: impl AsRef<Path>) -> Result<Arc<Self>> {
        let name = name.into();
        let path = path.as_ref();
        let source = read_source(path)?;
        let state = reflect(&source).with_context(|| format!("failed to load shader '{}'", name))?;
        let shader = Arc::new(Self::with_state(name, Some(path.to_path_buf()), state));
        shader.queue_compile(ctx, None)?;
        Ok(shader)
    }

    fn with_state(name: String, path: Option<PathBuf>, state: ShaderState) -> Self {
        debug!(
            "Reflected shader '{}': {} + {} material bytes, {} resources",
            name,
            state.reflection.material_buffer_size(ShaderDomain::Vertex),
            state.reflection.material_buffer_size(ShaderDomain::Pixel),
            state.reflection.resources().len()
        );
        Self {
            name,
            path,
            state: RwLock::new(state),
            program: RwLock::new(None),
            last_error: Mutex::new(None),
            loaded: AtomicBool::new(false),
            callbacks: Mutex::new(Vec::new()),
            next_callback: AtomicU64::new(0),
        }
    }

    // ---- reload ----

    /// Re-read the shader file. Unchanged sources are skipped unless `force` is set.
    pub fn reload(self: &Arc<Self>, ctx: &RenderContext, force: bool) -> Result<ReloadOutcome> {
        let path = self
            .path
            .clone()
            .ok_or_else(|| Error::custom(format!("shader '{}' was not loaded from a file", self.name)))?;
        let source = read_source(&path)?;
        self.reload_from_source(ctx, &source, force)
    }

    /// Replace the shader source. The new reflection takes effect on the render
    /// thread once it compiles; a parse or compile error keeps the current state.
    pub fn reload_from_source(self: &Arc<Self>, ctx: &RenderContext, source: &str, force: bool) -> Result<ReloadOutcome> {
        if !force && self.state.read().fingerprint == xxh3_64(source.as_bytes()) {
            trace!("Shader '{}' unchanged, skipping reload", self.name);
            return Ok(ReloadOutcome::Unchanged);
        }
        let state = reflect(source).with_context(|| format!("failed to reload shader '{}'", self.name))?;
        self.queue_compile(ctx, Some(state))?;
        info!("Shader '{}' queued for reload", self.name);
        Ok(ReloadOutcome::Reloaded)
    }

    pub fn add_reload_callback<F>(&self, callback: F) -> ReloadCallbackId
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = ReloadCallbackId(self.next_callback.fetch_add(1, Ordering::Relaxed));
        self.callbacks.lock().push((id, Arc::new(callback)));
        id
    }

    pub fn remove_reload_callback(&self, id: ReloadCallbackId) {
        self.callbacks.lock().retain(|(existing, _)| *existing != id);
    }

    fn queue_compile(self: &Arc<Self>, ctx: &RenderContext, pending: Option<ShaderState>) -> Result<()> {
        let shader = Arc::clone(self);
        ctx.submit(move |backend| shader.compile(backend, pending))
    }

    /// Render thread: build the program, swap it and `pending` in, then resolve
    /// bindings. On failure the previous program and reflection stay.
    fn compile(&self, backend: &mut dyn RenderBackend, pending: Option<ShaderState>) {
        let compiled = match &pending {
            Some(state) => backend.compile_program(&self.name, &state.sources),
            None => backend.compile_program(&self.name, &self.state.read().sources),
        };
        let program = match compiled {
            Ok(program) => program,
            Err(err) => {
                error!("Failed to compile shader '{}': {}", self.name, err);
                *self.last_error.lock() = Some(err.to_string());
                return;
            }
        };

        if let Some(old) = self.program.write().replace(program) {
            backend.delete_program(old);
        }
        *self.last_error.lock() = None;
        let layout_replaced = pending.is_some();
        {
            let mut state = self.state.write();
            if let Some(pending) = pending {
                *state = pending;
            }
            state.reflection.resolve_bindings(backend, program, &self.name);
        }

        // Listeners sized themselves from the reflection handed out at load,
        // so any swapped-in layout must reach them even if no compile succeeded before.
        let was_loaded = self.loaded.swap(true, Ordering::AcqRel);
        if was_loaded || layout_replaced {
            let callbacks: Vec<ReloadCallback> = self.callbacks.lock().iter().map(|(_, cb)| Arc::clone(cb)).collect();
            debug!("Shader '{}' recompiled, notifying {} listeners", self.name, callbacks.len());
            for callback in callbacks {
                callback();
            }
        }
    }

    // ---- binding & uploads ----

    /// Queue binding of this program.
    pub fn bind(self: &Arc<Self>, ctx: &RenderContext) -> Result<()> {
        let shader = Arc::clone(self);
        ctx.submit(move |backend| {
            if let Some(program) = shader.program() {
                backend.use_program(program);
            }
        })
    }

    /// Queue a by-name upload. Names the program does not know are skipped.
    pub fn set_uniform(self: &Arc<Self>, ctx: &RenderContext, name: &str, value: impl Into<UniformValue>) -> Result<()> {
        let shader = Arc::clone(self);
        let name = name.to_owned();
        let value = value.into();
        ctx.submit(move |backend| shader.set_uniform_from_render_thread(backend, &name, value))
    }

    pub fn set_float(self: &Arc<Self>, ctx: &RenderContext, name: &str, value: f32) -> Result<()> {
        self.set_uniform(ctx, name, value)
    }

    pub fn set_mat4(self: &Arc<Self>, ctx: &RenderContext, name: &str, value: glam::Mat4) -> Result<()> {
        self.set_uniform(ctx, name, value)
    }

    pub fn set_int_array(self: &Arc<Self>, ctx: &RenderContext, name: &str, values: Vec<i32>) -> Result<()> {
        self.set_uniform(ctx, name, values)
    }

    /// Immediate by-name upload for code already running on the render thread.
    pub fn set_uniform_from_render_thread(&self, backend: &mut dyn RenderBackend, name: &str, value: UniformValue) {
        let Some(program) = self.program() else {
            trace!("Shader '{}' not compiled, dropping upload of '{}'", self.name, name);
            return;
        };
        backend.use_program(program);
        let location = backend.uniform_location(program, name);
        if location.is_resolved() {
            backend.upload_uniform(location, value);
        }
    }

    pub fn set_mat4_now(&self, backend: &mut dyn RenderBackend, name: &str, value: glam::Mat4) {
        self.set_uniform_from_render_thread(backend, name, UniformValue::Mat4(value));
    }

    /// Queue an upload of a vertex-stage material buffer through the cached locations.
    pub fn set_vs_material_uniform_buffer(self: &Arc<Self>, ctx: &RenderContext, buffer: ByteBuffer) -> Result<()> {
        self.set_material_uniform_buffer(ctx, ShaderDomain::Vertex, buffer)
    }

    /// Queue an upload of a pixel-stage material buffer through the cached locations.
    pub fn set_ps_material_uniform_buffer(self: &Arc<Self>, ctx: &RenderContext, buffer: ByteBuffer) -> Result<()> {
        self.set_material_uniform_buffer(ctx, ShaderDomain::Pixel, buffer)
    }

    fn set_material_uniform_buffer(self: &Arc<Self>, ctx: &RenderContext, domain: ShaderDomain, buffer: ByteBuffer) -> Result<()> {
        let shader = Arc::clone(self);
        ctx.submit(move |backend| {
            if let Some(program) = shader.program() {
                backend.use_program(program);
                shader.upload_material_buffer(backend, domain, buffer.as_slice());
            }
        })
    }

    /// Queue renderer-owned (`r_`) values. Declared names use their cached
    /// location, anything else falls back to a by-name lookup.
    pub fn upload_renderer_uniforms(self: &Arc<Self>, ctx: &RenderContext, uniforms: RendererUniforms) -> Result<()> {
        let shader = Arc::clone(self);
        ctx.submit(move |backend| {
            let Some(program) = shader.program() else {
                return;
            };
            backend.use_program(program);
            for (name, value) in uniforms.values {
                let cached = {
                    let state = shader.state.read();
                    ShaderDomain::ALL.iter().find_map(|domain| {
                        state
                            .reflection
                            .renderer_buffer(*domain)
                            .find_uniform(&name)
                            .map(|u| u.location())
                    })
                };
                let location = match cached {
                    Some(location) => location,
                    None => backend.uniform_location(program, &name),
                };
                if location.is_resolved() {
                    backend.upload_uniform(location, value);
                }
            }
        })
    }

    /// Render thread: walk the material buffer declarations of `domain` over `bytes`.
    pub(crate) fn upload_material_buffer(&self, backend: &mut dyn RenderBackend, domain: ShaderDomain, bytes: &[u8]) {
        self.state
            .read()
            .reflection
            .upload_material_buffer(backend, domain, bytes);
    }

    // ---- accessors ----

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Current backend program, once the first compile has run.
    pub fn program(&self) -> Option<ProgramId> {
        *self.program.read()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    pub fn is_compute(&self) -> bool {
        self.state.read().sources.is_compute()
    }

    /// Message of the last failed compile, cleared by the next successful one.
    pub fn last_compile_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    /// Read access to the reflected declarations.
    pub fn reflection(&self) -> MappedRwLockReadGuard<'_, ShaderReflection> {
        RwLockReadGuard::map(self.state.read(), |state| &state.reflection)
    }

    pub fn material_buffer_size(&self, domain: ShaderDomain) -> usize {
        self.state.read().reflection.material_buffer_size(domain)
    }
}

/// Ordered list of renderer-owned values for one upload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RendererUniforms {
    values: Vec<(String, UniformValue)>,
}

impl RendererUniforms {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<UniformValue>) -> &mut Self {
        self.values.push((name.into(), value.into()));
        self
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn reflect(source: &str) -> Result<ShaderState> {
    let sources = preprocess(source)?;
    let reflection = if sources.is_compute() {
        ShaderReflection::new()
    } else {
        parse(&sources)?
    };
    Ok(ShaderState {
        sources,
        reflection,
        fingerprint: xxh3_64(source.as_bytes()),
    })
}

fn read_source(path: &Path) -> Result<String> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("could not read shader file '{}'", path.display()))?;
    if source.trim().is_empty() {
        warn!("Shader file '{}' is empty", path.display());
    }
    Ok(source)
}
