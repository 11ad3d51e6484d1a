// src/materials/instance.rs
//! Per-object override layer on top of a [`Material`].
//!
//! An instance starts as a copy of its parent's buffers. Names it sets
//! itself become overrides and stop following the parent; every other
//! value keeps mirroring parent writes. Unknown names are ignored so an
//! instance survives a shader variant that drops a field.

use std::collections::HashSet;
use std::sync::Arc;

use bytemuck::Pod;
use log::{trace, warn};
use parking_lot::RwLock;

use super::material::{bind_textures, place_texture, Material, MaterialFlags, TextureList, UniformSlot};
use crate::buffer::ByteBuffer;
use crate::error::{Error, Result};
use crate::gpu::RenderBackend;
use crate::renderer::RenderContext;
use crate::shader::ShaderDomain;
use crate::texture::Texture;

#[derive(Debug)]
struct InstanceStorage {
    vs: ByteBuffer,
    ps: ByteBuffer,
    textures: TextureList,
    overridden: HashSet<String>,
}

impl InstanceStorage {
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

#[derive(Debug)]
pub struct MaterialInstance {
    name: String,
    material: Arc<Material>,
    storage: RwLock<InstanceStorage>,
}

impl MaterialInstance {
    pub fn new(material: &Arc<Material>, name: impl Into<String>) -> Arc<Self> {
        let name = name.into();
        material.attach_instance(|vs, ps| {
            Arc::new(Self {
                name,
                material: Arc::clone(material),
                storage: RwLock::new(InstanceStorage {
                    vs,
                    ps,
                    textures: Vec::new(),
                    overridden: HashSet::new(),
                }),
            })
        })
    }

    /// Override the uniform `name`. Names the parent's shader does not
    /// declare are ignored.
    pub fn set<T: Pod>(&self, name: &str, value: T) -> Result<()> {
        let Some(slot) = self.material.find_uniform(name) else {
            trace!("Instance '{}' ignoring unknown uniform '{}'", self.name, name);
            return Ok(());
        };
        let bytes = bytemuck::bytes_of(&value);
        let bytes = &bytes[..bytes.len().min(slot.size)];

        let mut storage = self.storage.write();
        storage.buffer_mut(slot.domain).write(bytes, slot.offset)?;
        storage.overridden.insert(name.to_owned());
        Ok(())
    }

    pub fn get<T: Pod>(&self, name: &str) -> Result<T> {
        let slot = self
            .material
            .find_uniform(name)
            .ok_or_else(|| Error::UniformNotFound(format!("{} (instance '{}')", name, self.name)))?;
        self.storage.read().buffer(slot.domain).read_value(slot.offset)
    }

    /// Bind `texture` on this instance only. Unknown samplers are ignored.
    pub fn set_texture(&self, name: &str, texture: Arc<dyn Texture>) {
        self.set_texture_at(name, 0, texture);
    }

    pub fn set_texture_at(&self, name: &str, index: u32, texture: Arc<dyn Texture>) {
        let Some(register) = self.material.find_texture_register(name, index, texture.as_ref()) else {
            trace!("Instance '{}' ignoring unknown sampler '{}'", self.name, name);
            return;
        };
        place_texture(&mut self.storage.write().textures, register, texture);
    }

    /// Flags are material state; this writes through to the parent.
    pub fn set_flag(&self, flag: MaterialFlags, enabled: bool) {
        self.material.set_flag(flag, enabled);
    }

    pub fn flag(&self, flag: MaterialFlags) -> bool {
        self.material.flag(flag)
    }

    pub fn is_overridden(&self, name: &str) -> bool {
        self.storage.read().overridden.contains(name)
    }

    /// Queue binding of the program, this instance's buffers, the parent's
    /// textures and then this instance's textures.
    pub fn bind(self: &Arc<Self>, ctx: &RenderContext) -> Result<()> {
        let instance = Arc::clone(self);
        ctx.submit(move |backend| instance.bind_now(backend))
    }

    fn bind_now(&self, backend: &mut dyn RenderBackend) {
        let shader = self.material.shader();
        let Some(program) = shader.program() else {
            return;
        };
        backend.use_program(program);

        {
            let reflection = shader.reflection();
            let storage = self.storage.read();
            for domain in ShaderDomain::ALL {
                let buffer = storage.buffer(domain);
                if !buffer.is_empty() {
                    reflection.upload_material_buffer(backend, domain, buffer.as_slice());
                }
            }
        }

        self.material.bind_textures(backend);
        bind_textures(backend, &self.storage.read().textures);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn material(&self) -> &Arc<Material> {
        &self.material
    }

    pub fn buffer(&self, domain: ShaderDomain) -> ByteBuffer {
        self.storage.read().buffer(domain).clone()
    }

    /// Parent wrote `bytes` at `slot`; follow it unless `name` is overridden.
    pub(crate) fn on_material_value_updated(&self, name: &str, slot: UniformSlot, bytes: &[u8]) {
        let mut storage = self.storage.write();
        if storage.overridden.contains(name) {
            return;
        }
        if let Err(err) = storage.buffer_mut(slot.domain).write(bytes, slot.offset) {
            warn!("Instance '{}' could not mirror '{}': {}", self.name, name, err);
        }
    }

    /// Parent buffers were reallocated; start over from them and drop all overrides.
    pub(crate) fn on_shader_reloaded(&self, vs: &ByteBuffer, ps: &ByteBuffer) {
        let mut storage = self.storage.write();
        storage.vs = vs.clone();
        storage.ps = ps.clone();
        storage.overridden.clear();
    }
}

impl Drop for MaterialInstance {
    fn drop(&mut self) {
        self.material.unregister_instance(self as *const Self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{GpuCall, RecordingBackend, TextureHandle, UniformValue};
    use crate::shader::Shader;
    use crate::texture::{Texture2D, TextureFormat};
    use glam::{Vec3, Vec4};

    const SURFACE: &str = "#type vertex\n\
        void main() {}\n\
        #type fragment\n\
        uniform vec4 u_Color;\n\
        uniform float u_Metalness;\n\
        uniform sampler2D u_Albedo;\n\
        uniform sampler2D u_Normal;\n\
        void main() {}\n";

    fn setup(backend: &mut RecordingBackend) -> (RenderContext, Arc<Material>) {
        let ctx = RenderContext::default();
        let shader = Shader::from_source(&ctx, "surface", SURFACE).unwrap();
        ctx.wait_and_render(backend);
        backend.take_calls();
        (ctx, Material::new(&shader, "surface"))
    }

    fn texture(id: u32) -> Arc<dyn Texture> {
        Arc::new(Texture2D::new(TextureHandle(id), TextureFormat::Rgba8, 1, 1))
    }

    #[test]
    fn test_starts_as_copy_of_parent() {
        let mut backend = RecordingBackend::new();
        let (_ctx, material) = setup(&mut backend);
        material.set("u_Color", Vec4::new(0.2, 0.4, 0.6, 1.0)).unwrap();

        let instance = MaterialInstance::new(&material, "crate_01");
        assert_eq!(instance.get::<Vec4>("u_Color").unwrap(), Vec4::new(0.2, 0.4, 0.6, 1.0));
        assert_eq!(instance.buffer(ShaderDomain::Pixel), *material.buffer(ShaderDomain::Pixel));
    }

    #[test]
    fn test_parent_writes_propagate_until_overridden() {
        let mut backend = RecordingBackend::new();
        let (_ctx, material) = setup(&mut backend);
        let follower = MaterialInstance::new(&material, "follower");
        let rebel = MaterialInstance::new(&material, "rebel");

        rebel.set("u_Color", Vec4::new(0.0, 1.0, 0.0, 1.0)).unwrap();
        material.set("u_Color", Vec4::new(1.0, 0.0, 0.0, 1.0)).unwrap();
        material.set("u_Metalness", 0.75f32).unwrap();

        assert_eq!(follower.get::<Vec4>("u_Color").unwrap(), Vec4::new(1.0, 0.0, 0.0, 1.0));
        assert_eq!(rebel.get::<Vec4>("u_Color").unwrap(), Vec4::new(0.0, 1.0, 0.0, 1.0));
        assert_eq!(rebel.get::<f32>("u_Metalness").unwrap(), 0.75);
        assert!(rebel.is_overridden("u_Color"));
        assert!(!rebel.is_overridden("u_Metalness"));
    }

    #[test]
    fn test_unknown_name_is_ignored() {
        let mut backend = RecordingBackend::new();
        let (_ctx, material) = setup(&mut backend);
        let instance = MaterialInstance::new(&material, "crate_01");

        let before = instance.buffer(ShaderDomain::Pixel);
        assert!(instance.set("u_Emission", Vec3::ONE).is_ok());
        instance.set_texture("u_Emissive", texture(5));
        assert_eq!(instance.buffer(ShaderDomain::Pixel), before);
        assert!(!instance.is_overridden("u_Emission"));
    }

    #[test]
    fn test_flags_write_through_to_parent() {
        let mut backend = RecordingBackend::new();
        let (_ctx, material) = setup(&mut backend);
        let instance = MaterialInstance::new(&material, "crate_01");

        instance.set_flag(MaterialFlags::DEPTH_TEST, false);
        assert!(!material.flag(MaterialFlags::DEPTH_TEST));
        assert!(!instance.flag(MaterialFlags::DEPTH_TEST));
    }

    #[test]
    fn test_bind_uploads_own_values_and_layers_textures() {
        let mut backend = RecordingBackend::new();
        let (ctx, material) = setup(&mut backend);
        material.set_texture("u_Albedo", texture(1)).unwrap();
        material.set_texture("u_Normal", texture(2)).unwrap();

        let instance = MaterialInstance::new(&material, "crate_01");
        instance.set("u_Color", Vec4::ONE).unwrap();
        instance.set_texture("u_Normal", texture(9));

        instance.bind(&ctx).unwrap();
        ctx.wait_and_render(&mut backend);

        let color = material.shader().reflection().find_material_uniform("u_Color").unwrap().location();
        assert!(backend.uploads().contains(&(color, UniformValue::Vec4(Vec4::ONE))));

        let binds: Vec<_> = backend
            .calls()
            .iter()
            .filter(|call| matches!(call, GpuCall::BindTexture { .. }))
            .cloned()
            .collect();
        assert_eq!(
            binds,
            vec![
                GpuCall::BindTexture { texture: TextureHandle(1), slot: 0 },
                GpuCall::BindTexture { texture: TextureHandle(2), slot: 1 },
                GpuCall::BindTexture { texture: TextureHandle(9), slot: 1 },
            ]
        );
    }

    #[test]
    fn test_shader_reload_discards_overrides() {
        let mut backend = RecordingBackend::new();
        let (ctx, material) = setup(&mut backend);
        let instance = MaterialInstance::new(&material, "crate_01");
        instance.set("u_Metalness", 1.0f32).unwrap();

        material
            .shader()
            .reload_from_source(&ctx, SURFACE, true)
            .unwrap();
        ctx.wait_and_render(&mut backend);

        assert!(!instance.is_overridden("u_Metalness"));
        assert_eq!(instance.get::<f32>("u_Metalness").unwrap(), 0.0);

        material.set("u_Metalness", 0.5f32).unwrap();
        assert_eq!(instance.get::<f32>("u_Metalness").unwrap(), 0.5);
    }

    #[test]
    fn test_instances_created_during_parent_writes_stay_in_sync() {
        let mut backend = RecordingBackend::new();
        let (_ctx, material) = setup(&mut backend);

        let writer = {
            let material = Arc::clone(&material);
            std::thread::spawn(move || {
                for step in 1..=2000 {
                    material.set("u_Metalness", step as f32).unwrap();
                }
            })
        };
        let instances: Vec<_> = (0..500)
            .map(|i| MaterialInstance::new(&material, format!("crate_{:03}", i)))
            .collect();
        writer.join().unwrap();

        assert_eq!(material.get::<f32>("u_Metalness").unwrap(), 2000.0);
        for instance in &instances {
            assert_eq!(instance.get::<f32>("u_Metalness").unwrap(), 2000.0, "{}", instance.name());
        }
    }

    #[test]
    fn test_drop_unregisters() {
        let mut backend = RecordingBackend::new();
        let (_ctx, material) = setup(&mut backend);
        let a = MaterialInstance::new(&material, "a");
        let b = MaterialInstance::new(&material, "b");
        assert_eq!(material.instance_count(), 2);

        drop(a);
        assert_eq!(material.instance_count(), 1);
        material.set("u_Metalness", 0.3f32).unwrap();
        assert_eq!(b.get::<f32>("u_Metalness").unwrap(), 0.3);
    }
}
