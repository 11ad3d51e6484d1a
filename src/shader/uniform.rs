// src/shader/uniform.rs
//! Uniform declarations and sequential buffer layout.
//!
//! Offsets are assigned once, in push order, with no alignment padding:
//! `offset[i] = offset[i - 1] + size[i - 1]`.

use crate::error::{Error, Result};
use crate::gpu::UniformLocation;
use crate::texture::TextureKind;

/// Uniforms whose names start with this prefix are fed by the renderer
/// (view/projection and other per-frame state), not by materials.
pub const RENDERER_UNIFORM_PREFIX: &str = "r_";

/// Stage a uniform belongs to. Compute programs carry no reflected uniforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderDomain {
    Vertex,
    Pixel,
}

impl ShaderDomain {
    pub const ALL: [ShaderDomain; 2] = [ShaderDomain::Vertex, ShaderDomain::Pixel];
}

/// Type of a value uniform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformType {
    Int32,
    Float,
    Vec2,
    Vec3,
    Vec4,
    Mat3,
    Mat4,
    Struct,
}

impl UniformType {
    /// Parse a GLSL type spelling. `int` is accepted as an alias of `int32`.
    pub fn from_glsl(name: &str) -> Option<Self> {
        match name {
            "int32" | "int" => Some(UniformType::Int32),
            "float" => Some(UniformType::Float),
            "vec2" => Some(UniformType::Vec2),
            "vec3" => Some(UniformType::Vec3),
            "vec4" => Some(UniformType::Vec4),
            "mat3" => Some(UniformType::Mat3),
            "mat4" => Some(UniformType::Mat4),
            _ => None,
        }
    }

    /// Size in bytes of one element. Struct sizes live on the [`ShaderStruct`].
    pub fn size(self) -> u32 {
        match self {
            UniformType::Int32 | UniformType::Float => 4,
            UniformType::Vec2 => 8,
            UniformType::Vec3 => 12,
            UniformType::Vec4 => 16,
            UniformType::Mat3 => 36,
            UniformType::Mat4 => 64,
            UniformType::Struct => 0,
        }
    }
}

// ============================================================================
// STRUCTS
// ============================================================================

/// One field of a [`ShaderStruct`]. `offset` is relative to the struct start.
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderStructField {
    name: String,
    ty: UniformType,
    count: u32,
    offset: u32,
}

impl ShaderStructField {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn uniform_type(&self) -> UniformType {
        self.ty
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn size(&self) -> u32 {
        self.ty.size() * self.count
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShaderStruct {
    name: String,
    fields: Vec<ShaderStructField>,
    size: u32,
    offset: u32,
}

impl ShaderStruct {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            size: 0,
            offset: 0,
        }
    }

    /// Append a field at the current end of the struct.
    pub fn add_field(&mut self, name: impl Into<String>, ty: UniformType, count: u32) -> Result<()> {
        let field = ShaderStructField {
            name: name.into(),
            ty,
            count,
            offset: self.size,
        };
        let field_size = array_size(ty.size(), count, &field.name)?;
        self.size = grow_layout(self.size, field_size, &self.name)?;
        self.fields.push(field);
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[ShaderStructField] {
        &self.fields
    }

    /// Sum of field sizes.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Offset of the struct inside its owning buffer.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub(crate) fn set_offset(&mut self, offset: u32) {
        self.offset = offset;
    }
}

// ============================================================================
// VALUE UNIFORMS
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ShaderUniformDeclaration {
    name: String,
    ty: UniformType,
    count: u32,
    size: u32,
    offset: u32,
    domain: ShaderDomain,
    structure: Option<ShaderStruct>,
    location: UniformLocation,
    /// Struct fields only, element-major: `element * fields + field`.
    field_locations: Vec<UniformLocation>,
}

impl ShaderUniformDeclaration {
    pub fn new(domain: ShaderDomain, ty: UniformType, name: impl Into<String>, count: u32) -> Result<Self> {
        let name = name.into();
        let size = array_size(ty.size(), count, &name)?;
        Ok(Self {
            name,
            ty,
            count,
            size,
            offset: 0,
            domain,
            structure: None,
            location: UniformLocation::UNRESOLVED,
            field_locations: Vec::new(),
        })
    }

    pub fn new_struct(
        domain: ShaderDomain,
        structure: ShaderStruct,
        name: impl Into<String>,
        count: u32,
    ) -> Result<Self> {
        let name = name.into();
        let size = array_size(structure.size(), count, &name)?;
        let field_slots = structure.fields().len() * count as usize;
        Ok(Self {
            name,
            ty: UniformType::Struct,
            count,
            size,
            offset: 0,
            domain,
            structure: Some(structure),
            location: UniformLocation::UNRESOLVED,
            field_locations: vec![UniformLocation::UNRESOLVED; field_slots],
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn uniform_type(&self) -> UniformType {
        self.ty
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn is_array(&self) -> bool {
        self.count > 1
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn domain(&self) -> ShaderDomain {
        self.domain
    }

    pub fn structure(&self) -> Option<&ShaderStruct> {
        self.structure.as_ref()
    }

    /// Resolved location; always unresolved for struct declarations, whose
    /// fields are resolved individually.
    pub fn location(&self) -> UniformLocation {
        self.location
    }

    /// Name the compiled program knows a struct field by:
    /// `outer.field`, or `outer[i].field` for struct arrays.
    pub fn field_binding_name(&self, element: u32, field: &ShaderStructField) -> String {
        if self.count > 1 {
            format!("{}[{}].{}", self.name, element, field.name())
        } else {
            format!("{}.{}", self.name, field.name())
        }
    }

    pub fn field_location(&self, element: u32, field_index: usize) -> UniformLocation {
        let fields = self.structure.as_ref().map_or(0, |s| s.fields().len());
        self.field_locations
            .get(element as usize * fields + field_index)
            .copied()
            .unwrap_or(UniformLocation::UNRESOLVED)
    }

    pub(crate) fn set_offset(&mut self, offset: u32) {
        self.offset = offset;
        if let Some(structure) = self.structure.as_mut() {
            structure.set_offset(offset);
        }
    }

    pub(crate) fn set_location(&mut self, location: UniformLocation) {
        self.location = location;
    }

    pub(crate) fn set_field_location(&mut self, element: u32, field_index: usize, location: UniformLocation) {
        let fields = self.structure.as_ref().map_or(0, |s| s.fields().len());
        if let Some(slot) = self.field_locations.get_mut(element as usize * fields + field_index) {
            *slot = location;
        }
    }
}

/// Named, domain-scoped list of value uniforms with a running size.
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderUniformBufferDeclaration {
    name: String,
    domain: ShaderDomain,
    uniforms: Vec<ShaderUniformDeclaration>,
    size: u32,
}

impl ShaderUniformBufferDeclaration {
    pub fn new(name: impl Into<String>, domain: ShaderDomain) -> Self {
        Self {
            name: name.into(),
            domain,
            uniforms: Vec::new(),
            size: 0,
        }
    }

    /// Pack `uniform` directly after the previous entry.
    pub fn push_uniform(&mut self, mut uniform: ShaderUniformDeclaration) -> Result<()> {
        let offset = self.size;
        self.size = grow_layout(self.size, uniform.size(), &self.name)?;
        uniform.set_offset(offset);
        self.uniforms.push(uniform);
        Ok(())
    }

    pub fn find_uniform(&self, name: &str) -> Option<&ShaderUniformDeclaration> {
        self.uniforms.iter().find(|u| u.name() == name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn domain(&self) -> ShaderDomain {
        self.domain
    }

    pub fn uniforms(&self) -> &[ShaderUniformDeclaration] {
        &self.uniforms
    }

    pub(crate) fn uniforms_mut(&mut self) -> &mut [ShaderUniformDeclaration] {
        &mut self.uniforms
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.uniforms.is_empty()
    }
}

fn array_size(element: u32, count: u32, name: &str) -> Result<u32> {
    element
        .checked_mul(count)
        .ok_or_else(|| Error::ShaderSyntax(format!("'{}' with {} elements does not fit a uniform buffer", name, count)))
}

fn grow_layout(size: u32, extra: u32, owner: &str) -> Result<u32> {
    size.checked_add(extra)
        .ok_or_else(|| Error::ShaderSyntax(format!("layout of '{}' exceeds {} bytes", owner, u32::MAX)))
}

// ============================================================================
// RESOURCES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    Texture2D,
    TextureCube,
    Texture2DShadow,
}

impl ResourceType {
    pub fn from_glsl(name: &str) -> Option<Self> {
        match name {
            "sampler2D" => Some(ResourceType::Texture2D),
            "samplerCube" => Some(ResourceType::TextureCube),
            "sampler2DShadow" => Some(ResourceType::Texture2DShadow),
            _ => None,
        }
    }

    /// Whether a texture of `kind` can be sampled through this resource.
    pub fn accepts(self, kind: TextureKind) -> bool {
        match self {
            ResourceType::Texture2D | ResourceType::Texture2DShadow => kind == TextureKind::Texture2D,
            ResourceType::TextureCube => kind == TextureKind::TextureCube,
        }
    }
}

/// Sampler uniform. Occupies `count` consecutive texture registers starting at `register`.
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderResourceDeclaration {
    name: String,
    ty: ResourceType,
    count: u32,
    register: u32,
    location: UniformLocation,
}

impl ShaderResourceDeclaration {
    pub fn new(ty: ResourceType, name: impl Into<String>, count: u32, register: u32) -> Self {
        Self {
            name: name.into(),
            ty,
            count,
            register,
            location: UniformLocation::UNRESOLVED,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resource_type(&self) -> ResourceType {
        self.ty
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn register(&self) -> u32 {
        self.register
    }

    pub fn registers(&self) -> std::ops::Range<u32> {
        self.register..self.register + self.count
    }

    pub fn location(&self) -> UniformLocation {
        self.location
    }

    pub(crate) fn set_location(&mut self, location: UniformLocation) {
        self.location = location;
    }
}
