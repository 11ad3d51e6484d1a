// src/materials/material.rs
//! Material: shared uniform values and textures for one shader.
//!
//! # Storage
//! One `ByteBuffer` per shader domain, sized to that domain's material
//! uniform buffer, plus a texture list indexed by sampler register.
//!
//! # Instances
//! Live instances are tracked weakly. A `set` is mirrored into every
//! instance that has not overridden the same name.
//!
//! # Locking
//! Shader reflection, then material storage, then the instance list, then
//! instance storage. Material storage stays write-locked while a change is
//! pushed into instances, and read-locked while a new instance copies it and
//! registers.

use std::ops::BitOr;
use std::sync::{Arc, Weak};

use bytemuck::Pod;
use log::{debug, trace, warn};
use parking_lot::{MappedRwLockReadGuard, Mutex, RwLock, RwLockReadGuard};

use super::instance::MaterialInstance;
use crate::buffer::ByteBuffer;
use crate::error::{Error, Result};
use crate::gpu::RenderBackend;
use crate::renderer::RenderContext;
use crate::shader::{ReloadCallbackId, Shader, ShaderDomain};
use crate::texture::Texture;

// ============================================================================
// FLAGS
// ============================================================================

/// Fixed-function state a material asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaterialFlags(u32);

impl MaterialFlags {
    pub const NONE: Self = Self(0);
    pub const DEPTH_TEST: Self = Self(1 << 1);
    pub const BLEND: Self = Self(1 << 2);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn set(&mut self, flag: Self, enabled: bool) {
        if enabled {
            self.0 |= flag.0;
        } else {
            self.0 &= !flag.0;
        }
    }
}

impl Default for MaterialFlags {
    fn default() -> Self {
        Self::DEPTH_TEST | Self::BLEND
    }
}

impl BitOr for MaterialFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

// ============================================================================
// MATERIAL
// ============================================================================

/// Where a material uniform lives inside the per-domain buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct UniformSlot {
    pub domain: ShaderDomain,
    pub offset: usize,
    pub size: usize,
}

pub(crate) type TextureList = Vec<Option<Arc<dyn Texture>>>;

#[derive(Debug)]
struct MaterialStorage {
    vs: ByteBuffer,
    ps: ByteBuffer,
    textures: TextureList,
    flags: MaterialFlags,
}

impl MaterialStorage {
    fn buffer(&self, domain: ShaderDomain) -> &ByteBuffer {
        match domain {
            ShaderDomain::Vertex => &self.vs,
            ShaderDomain::Pixel => &self.ps,
        }
    }

    fn buffer_mut(&mut self, domain: ShaderDomain) -> &mut ByteBuffer {
        match domain {
            ShaderDomain::Vertex => &mut self.vs,
            ShaderDomain::Pixel => &mut self.ps,
        }
    }
}

pub struct Material {
    name: String,
    shader: Arc<Shader>,
    storage: RwLock<MaterialStorage>,
    instances: Mutex<Vec<Weak<MaterialInstance>>>,
    reload_callback: ReloadCallbackId,
}

impl std::fmt::Debug for Material {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Material")
            .field("name", &self.name)
            .field("shader", &self.shader.name())
            .field("flags", &self.flags())
            .field("instances", &self.instance_count())
            .finish()
    }
}

impl Material {
    /// Create a material with zeroed buffers sized from `shader`'s reflection.
    pub fn new(shader: &Arc<Shader>, name: impl Into<String>) -> Arc<Self> {
        let name = name.into();
        let storage = MaterialStorage {
            vs: ByteBuffer::new(shader.material_buffer_size(ShaderDomain::Vertex)),
            ps: ByteBuffer::new(shader.material_buffer_size(ShaderDomain::Pixel)),
            textures: Vec::new(),
            flags: MaterialFlags::default(),
        };
        debug!(
            "Material '{}' created for shader '{}' ({} + {} bytes)",
            name,
            shader.name(),
            storage.vs.size(),
            storage.ps.size()
        );

        Arc::new_cyclic(|this: &Weak<Material>| {
            let this = this.clone();
            let reload_callback = shader.add_reload_callback(move || {
                if let Some(material) = this.upgrade() {
                    material.on_shader_reloaded();
                }
            });
            Self {
                name,
                shader: Arc::clone(shader),
                storage: RwLock::new(storage),
                instances: Mutex::new(Vec::new()),
                reload_callback,
            }
        })
    }

    // ---- values ----

    /// Write `value` into the uniform `name`, truncated to the declared size,
    /// and mirror it into every instance that has not overridden `name`.
    pub fn set<T: Pod>(&self, name: &str, value: T) -> Result<()> {
        let slot = self
            .find_uniform(name)
            .ok_or_else(|| Error::UniformNotFound(format!("{} (material '{}')", name, self.name)))?;
        let bytes = bytemuck::bytes_of(&value);
        let bytes = &bytes[..bytes.len().min(slot.size)];

        let mut storage = self.storage.write();
        storage.buffer_mut(slot.domain).write(bytes, slot.offset)?;
        for instance in self.live_instances() {
            instance.on_material_value_updated(name, slot, bytes);
        }
        Ok(())
    }

    /// Read back the uniform `name` as `T`.
    pub fn get<T: Pod>(&self, name: &str) -> Result<T> {
        let slot = self
            .find_uniform(name)
            .ok_or_else(|| Error::UniformNotFound(format!("{} (material '{}')", name, self.name)))?;
        self.storage.read().buffer(slot.domain).read_value(slot.offset)
    }

    /// Bind `texture` to the sampler `name`.
    pub fn set_texture(&self, name: &str, texture: Arc<dyn Texture>) -> Result<()> {
        self.set_texture_at(name, 0, texture)
    }

    /// Bind `texture` to element `index` of a sampler array.
    pub fn set_texture_at(&self, name: &str, index: u32, texture: Arc<dyn Texture>) -> Result<()> {
        let register = self
            .find_texture_register(name, index, texture.as_ref())
            .ok_or_else(|| Error::ResourceNotFound(format!("{}[{}] (material '{}')", name, index, self.name)))?;
        place_texture(&mut self.storage.write().textures, register, texture);
        Ok(())
    }

    // ---- flags ----

    pub fn flags(&self) -> MaterialFlags {
        self.storage.read().flags
    }

    pub fn flag(&self, flag: MaterialFlags) -> bool {
        self.flags().contains(flag)
    }

    pub fn set_flag(&self, flag: MaterialFlags, enabled: bool) {
        self.storage.write().flags.set(flag, enabled);
    }

    // ---- binding ----

    /// Queue binding of the program, both material buffers and all textures
    /// as a single render command.
    pub fn bind(self: &Arc<Self>, ctx: &RenderContext) -> Result<()> {
        let material = Arc::clone(self);
        ctx.submit(move |backend| material.bind_now(backend))
    }

    fn bind_now(&self, backend: &mut dyn RenderBackend) {
        let Some(program) = self.shader.program() else {
            trace!("Material '{}' bound before its shader compiled", self.name);
            return;
        };
        backend.use_program(program);

        let reflection = self.shader.reflection();
        let storage = self.storage.read();
        for domain in ShaderDomain::ALL {
            let buffer = storage.buffer(domain);
            if !buffer.is_empty() {
                reflection.upload_material_buffer(backend, domain, buffer.as_slice());
            }
        }
        bind_textures(backend, &storage.textures);
    }

    pub(crate) fn bind_textures(&self, backend: &mut dyn RenderBackend) {
        bind_textures(backend, &self.storage.read().textures);
    }

    // ---- accessors ----

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shader(&self) -> &Arc<Shader> {
        &self.shader
    }

    /// Current contents of one domain's buffer.
    pub fn buffer(&self, domain: ShaderDomain) -> MappedRwLockReadGuard<'_, ByteBuffer> {
        RwLockReadGuard::map(self.storage.read(), |storage| storage.buffer(domain))
    }

    pub fn instance_count(&self) -> usize {
        self.instances.lock().iter().filter(|w| w.strong_count() > 0).count()
    }

    // ---- shared with instances ----

    /// Material buffer slot of `name`, vertex domain first.
    pub(crate) fn find_uniform(&self, name: &str) -> Option<UniformSlot> {
        let reflection = self.shader.reflection();
        reflection.find_material_uniform(name).map(|uniform| UniformSlot {
            domain: uniform.domain(),
            offset: uniform.offset() as usize,
            size: uniform.size() as usize,
        })
    }

    /// Register for element `index` of sampler `name`. A texture of the wrong
    /// kind is accepted with a warning.
    pub(crate) fn find_texture_register(&self, name: &str, index: u32, texture: &dyn Texture) -> Option<u32> {
        let reflection = self.shader.reflection();
        let resource = reflection.find_resource(name)?;
        if index >= resource.count() {
            return None;
        }
        if !resource.resource_type().accepts(texture.kind()) {
            warn!(
                "Texture of kind {:?} bound to {:?} sampler '{}' in material '{}'",
                texture.kind(),
                resource.resource_type(),
                name,
                self.name
            );
        }
        Some(resource.register() + index)
    }

    /// Build an instance from copies of the current buffers and register it
    /// before any other write can land.
    pub(crate) fn attach_instance<F>(&self, build: F) -> Arc<MaterialInstance>
    where
        F: FnOnce(ByteBuffer, ByteBuffer) -> Arc<MaterialInstance>,
    {
        let storage = self.storage.read();
        let instance = build(storage.vs.clone(), storage.ps.clone());
        self.instances.lock().push(Arc::downgrade(&instance));
        instance
    }

    pub(crate) fn unregister_instance(&self, instance: *const MaterialInstance) {
        self.instances
            .lock()
            .retain(|weak| weak.strong_count() > 0 && !std::ptr::eq(weak.as_ptr(), instance));
    }

    fn live_instances(&self) -> Vec<Arc<MaterialInstance>> {
        self.instances.lock().iter().filter_map(Weak::upgrade).collect()
    }

    /// Render thread: the shader recompiled, so offsets and sizes may have
    /// moved. Reallocate zeroed buffers and make every instance start over.
    fn on_shader_reloaded(&self) {
        let (vs_size, ps_size) = {
            let reflection = self.shader.reflection();
            (
                reflection.material_buffer_size(ShaderDomain::Vertex),
                reflection.material_buffer_size(ShaderDomain::Pixel),
            )
        };
        let mut storage = self.storage.write();
        storage.vs.allocate(vs_size);
        storage.ps.allocate(ps_size);
        let instances = self.live_instances();
        debug!(
            "Material '{}' reset after shader reload ({} + {} bytes, {} instances)",
            self.name,
            vs_size,
            ps_size,
            instances.len()
        );
        for instance in instances {
            instance.on_shader_reloaded(&storage.vs, &storage.ps);
        }
    }
}

impl Drop for Material {
    fn drop(&mut self) {
        self.shader.remove_reload_callback(self.reload_callback);
    }
}

pub(crate) fn place_texture(textures: &mut TextureList, register: u32, texture: Arc<dyn Texture>) {
    let index = register as usize;
    if textures.len() <= index {
        textures.resize(index + 1, None);
    }
    textures[index] = Some(texture);
}

pub(crate) fn bind_textures(backend: &mut dyn RenderBackend, textures: &TextureList) {
    for (slot, texture) in textures.iter().enumerate() {
        if let Some(texture) = texture {
            texture.bind(backend, slot as u32);
        }
    }
}
