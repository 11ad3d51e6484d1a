// src/shader/reflection.rs
//! Everything reflected from one shader's source: structs, the renderer and
//! material uniform buffers of each stage, and sampler resources.

use crate::error::{Error, Result};

use super::uniform::{
    ResourceType, ShaderDomain, ShaderResourceDeclaration, ShaderStruct, ShaderUniformBufferDeclaration,
    ShaderUniformDeclaration, RENDERER_UNIFORM_PREFIX,
};

#[derive(Debug, Clone, PartialEq)]
pub struct ShaderReflection {
    structs: Vec<ShaderStruct>,
    vs_renderer: ShaderUniformBufferDeclaration,
    ps_renderer: ShaderUniformBufferDeclaration,
    vs_material: Option<ShaderUniformBufferDeclaration>,
    ps_material: Option<ShaderUniformBufferDeclaration>,
    resources: Vec<ShaderResourceDeclaration>,
    next_register: u32,
}

impl Default for ShaderReflection {
    fn default() -> Self {
        Self::new()
    }
}

impl ShaderReflection {
    pub fn new() -> Self {
        Self {
            structs: Vec::new(),
            vs_renderer: ShaderUniformBufferDeclaration::new("Renderer", ShaderDomain::Vertex),
            ps_renderer: ShaderUniformBufferDeclaration::new("Renderer", ShaderDomain::Pixel),
            vs_material: None,
            ps_material: None,
            resources: Vec::new(),
            next_register: 0,
        }
    }

    pub fn structs(&self) -> &[ShaderStruct] {
        &self.structs
    }

    pub fn find_struct(&self, name: &str) -> Option<&ShaderStruct> {
        self.structs.iter().find(|s| s.name() == name)
    }

    /// Per-frame uniforms (`r_` prefix) of one stage.
    pub fn renderer_buffer(&self, domain: ShaderDomain) -> &ShaderUniformBufferDeclaration {
        match domain {
            ShaderDomain::Vertex => &self.vs_renderer,
            ShaderDomain::Pixel => &self.ps_renderer,
        }
    }

    /// Material-authored uniforms of one stage, if the stage declares any.
    pub fn material_buffer(&self, domain: ShaderDomain) -> Option<&ShaderUniformBufferDeclaration> {
        match domain {
            ShaderDomain::Vertex => self.vs_material.as_ref(),
            ShaderDomain::Pixel => self.ps_material.as_ref(),
        }
    }

    pub fn material_buffer_size(&self, domain: ShaderDomain) -> usize {
        self.material_buffer(domain).map_or(0, |b| b.size() as usize)
    }

    /// Material uniform lookup: vertex buffer first, then pixel.
    pub fn find_material_uniform(&self, name: &str) -> Option<&ShaderUniformDeclaration> {
        ShaderDomain::ALL
            .iter()
            .filter_map(|domain| self.material_buffer(*domain))
            .find_map(|buffer| buffer.find_uniform(name))
    }

    pub fn resources(&self) -> &[ShaderResourceDeclaration] {
        &self.resources
    }

    pub fn find_resource(&self, name: &str) -> Option<&ShaderResourceDeclaration> {
        self.resources.iter().find(|r| r.name() == name)
    }

    /// Number of texture registers claimed by all resources.
    pub fn register_count(&self) -> u32 {
        self.next_register
    }

    // ---- construction (parser) ----

    /// Keep the first definition of a struct name; stages commonly repeat them.
    pub(crate) fn add_struct(&mut self, structure: ShaderStruct) -> bool {
        if self.find_struct(structure.name()).is_some() {
            return false;
        }
        self.structs.push(structure);
        true
    }

    /// Route a value uniform to the renderer or material buffer of its domain.
    pub(crate) fn push_uniform(&mut self, uniform: ShaderUniformDeclaration) -> Result<()> {
        let domain = uniform.domain();
        if uniform.name().starts_with(RENDERER_UNIFORM_PREFIX) {
            return match domain {
                ShaderDomain::Vertex => self.vs_renderer.push_uniform(uniform),
                ShaderDomain::Pixel => self.ps_renderer.push_uniform(uniform),
            };
        }
        let slot = match domain {
            ShaderDomain::Vertex => &mut self.vs_material,
            ShaderDomain::Pixel => &mut self.ps_material,
        };
        slot.get_or_insert_with(|| ShaderUniformBufferDeclaration::new("Material", domain))
            .push_uniform(uniform)
    }

    /// Claim `count` consecutive registers for a sampler. Repeated names across
    /// stages share the first declaration.
    pub(crate) fn push_resource(&mut self, ty: ResourceType, name: &str, count: u32) -> Result<()> {
        if self.find_resource(name).is_some() {
            return Ok(());
        }
        let register = self.next_register;
        self.next_register = register
            .checked_add(count)
            .ok_or_else(|| Error::ShaderSyntax(format!("sampler '{}' runs past the last texture register", name)))?;
        self.resources
            .push(ShaderResourceDeclaration::new(ty, name, count, register));
        Ok(())
    }

    // ---- binding resolution ----

    pub(crate) fn buffers_mut(&mut self) -> impl Iterator<Item = &mut ShaderUniformBufferDeclaration> {
        [&mut self.vs_renderer, &mut self.ps_renderer]
            .into_iter()
            .chain(self.vs_material.as_mut())
            .chain(self.ps_material.as_mut())
    }

    pub(crate) fn resources_mut(&mut self) -> &mut [ShaderResourceDeclaration] {
        &mut self.resources
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::uniform::UniformType;

    #[test]
    fn test_prefix_routing() {
        let mut reflection = ShaderReflection::new();
        reflection.push_uniform(ShaderUniformDeclaration::new(ShaderDomain::Vertex, UniformType::Vec3, "u_Color", 1).unwrap()).unwrap();
        reflection.push_uniform(ShaderUniformDeclaration::new(ShaderDomain::Vertex, UniformType::Mat4, "r_ViewMatrix", 1).unwrap()).unwrap();

        let material = reflection.material_buffer(ShaderDomain::Vertex).unwrap();
        assert_eq!(material.uniforms().len(), 1);
        assert_eq!(material.size(), 12);
        assert!(reflection.renderer_buffer(ShaderDomain::Vertex).find_uniform("r_ViewMatrix").is_some());
        assert!(reflection.material_buffer(ShaderDomain::Pixel).is_none());
    }

    #[test]
    fn test_material_lookup_prefers_vertex() {
        let mut reflection = ShaderReflection::new();
        reflection.push_uniform(ShaderUniformDeclaration::new(ShaderDomain::Pixel, UniformType::Float, "u_Shared", 1).unwrap()).unwrap();
        reflection.push_uniform(ShaderUniformDeclaration::new(ShaderDomain::Vertex, UniformType::Float, "u_Shared", 1).unwrap()).unwrap();

        let found = reflection.find_material_uniform("u_Shared").unwrap();
        assert_eq!(found.domain(), ShaderDomain::Vertex);
        assert!(reflection.find_material_uniform("r_ViewMatrix").is_none());
    }

    #[test]
    fn test_registers_do_not_collide() {
        let mut reflection = ShaderReflection::new();
        reflection.push_resource(ResourceType::Texture2D, "u_Albedo", 1).unwrap();
        reflection.push_resource(ResourceType::Texture2D, "u_Textures", 4).unwrap();
        reflection.push_resource(ResourceType::TextureCube, "u_Environment", 1).unwrap();
        reflection.push_resource(ResourceType::Texture2D, "u_Albedo", 1).unwrap();

        let registers: Vec<_> = reflection.resources().iter().map(|r| r.registers()).collect();
        assert_eq!(registers, vec![0..1, 1..5, 5..6]);
        assert_eq!(reflection.register_count(), 6);
    }
}
