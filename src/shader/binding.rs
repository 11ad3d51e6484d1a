// src/shader/binding.rs
//! Binding resolution and declaration-driven uploads.
//!
//! Runs on the render thread only. Unresolved locations are logged once at
//! resolve time and then silently skipped on every upload.

use bytemuck::Pod;
use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};
use log::{trace, warn};

use super::reflection::ShaderReflection;
use super::uniform::{ShaderDomain, ShaderUniformDeclaration, UniformType};
use crate::gpu::{ProgramId, RenderBackend, UniformLocation, UniformValue};

impl ShaderReflection {
    /// Query every declaration's location in `program` and point each sampler
    /// at its texture register(s).
    pub(crate) fn resolve_bindings(&mut self, backend: &mut dyn RenderBackend, program: ProgramId, shader: &str) {
        backend.use_program(program);

        for buffer in self.buffers_mut() {
            for uniform in buffer.uniforms_mut() {
                resolve_uniform(backend, program, shader, uniform);
            }
        }

        for resource in self.resources_mut() {
            let location = lookup(backend, program, shader, resource.name());
            resource.set_location(location);
            if !location.is_resolved() {
                continue;
            }
            let value = if resource.count() > 1 {
                UniformValue::IntArray(resource.registers().map(|r| r as i32).collect())
            } else {
                UniformValue::Int(resource.register() as i32)
            };
            backend.upload_uniform(location, value);
        }
    }

    /// Upload one material buffer's bytes through its declarations. `bytes`
    /// must be laid out as this shader's material buffer for `domain`.
    pub(crate) fn upload_material_buffer(&self, backend: &mut dyn RenderBackend, domain: ShaderDomain, bytes: &[u8]) {
        let Some(buffer) = self.material_buffer(domain) else {
            return;
        };
        for uniform in buffer.uniforms() {
            upload_uniform(backend, uniform, bytes);
        }
    }
}

fn lookup(backend: &mut dyn RenderBackend, program: ProgramId, shader: &str, name: &str) -> UniformLocation {
    let location = backend.uniform_location(program, name);
    if !location.is_resolved() {
        warn!("Could not find uniform '{}' in shader '{}'", name, shader);
    }
    location
}

fn resolve_uniform(
    backend: &mut dyn RenderBackend,
    program: ProgramId,
    shader: &str,
    uniform: &mut ShaderUniformDeclaration,
) {
    let Some(structure) = uniform.structure().cloned() else {
        let location = lookup(backend, program, shader, uniform.name());
        uniform.set_location(location);
        return;
    };

    for element in 0..uniform.count() {
        for (index, field) in structure.fields().iter().enumerate() {
            let name = uniform.field_binding_name(element, field);
            let location = lookup(backend, program, shader, &name);
            uniform.set_field_location(element, index, location);
        }
    }
}

fn upload_uniform(backend: &mut dyn RenderBackend, uniform: &ShaderUniformDeclaration, bytes: &[u8]) {
    let Some(structure) = uniform.structure() else {
        let location = uniform.location();
        if !location.is_resolved() {
            return;
        }
        let start = uniform.offset() as usize;
        upload_value(backend, location, uniform.uniform_type(), uniform.count(), bytes, start, uniform.name());
        return;
    };

    for element in 0..uniform.count() {
        let element_start = (uniform.offset() + element * structure.size()) as usize;
        for (index, field) in structure.fields().iter().enumerate() {
            let location = uniform.field_location(element, index);
            if !location.is_resolved() {
                continue;
            }
            let start = element_start + field.offset() as usize;
            upload_value(backend, location, field.uniform_type(), field.count(), bytes, start, field.name());
        }
    }
}

fn upload_value(
    backend: &mut dyn RenderBackend,
    location: UniformLocation,
    ty: UniformType,
    count: u32,
    bytes: &[u8],
    start: usize,
    name: &str,
) {
    let end = start + (ty.size() * count) as usize;
    match bytes.get(start..end).and_then(|slice| decode(ty, count, slice)) {
        Some(value) => backend.upload_uniform(location, value),
        None => trace!("Skipping upload of '{}': bytes {}..{} out of range", name, start, end),
    }
}

/// Typed view of packed uniform bytes. Arrays decode to the array variants.
pub(crate) fn decode(ty: UniformType, count: u32, bytes: &[u8]) -> Option<UniformValue> {
    fn one<T: Pod>(bytes: &[u8]) -> T {
        bytemuck::pod_read_unaligned(&bytes[..std::mem::size_of::<T>()])
    }
    fn many<T: Pod>(bytes: &[u8]) -> Vec<T> {
        bytes
            .chunks_exact(std::mem::size_of::<T>())
            .map(bytemuck::pod_read_unaligned::<T>)
            .collect()
    }

    if bytes.len() != (ty.size() * count) as usize {
        return None;
    }
    let value = match (ty, count > 1) {
        (UniformType::Int32, false) => UniformValue::Int(one::<i32>(bytes)),
        (UniformType::Int32, true) => UniformValue::IntArray(many(bytes)),
        (UniformType::Float, false) => UniformValue::Float(one::<f32>(bytes)),
        (UniformType::Float, true) => UniformValue::FloatArray(many(bytes)),
        (UniformType::Vec2, false) => UniformValue::Vec2(one::<Vec2>(bytes)),
        (UniformType::Vec2, true) => UniformValue::Vec2Array(many(bytes)),
        (UniformType::Vec3, false) => UniformValue::Vec3(one::<Vec3>(bytes)),
        (UniformType::Vec3, true) => UniformValue::Vec3Array(many(bytes)),
        (UniformType::Vec4, false) => UniformValue::Vec4(one::<Vec4>(bytes)),
        (UniformType::Vec4, true) => UniformValue::Vec4Array(many(bytes)),
        (UniformType::Mat3, false) => UniformValue::Mat3(one::<Mat3>(bytes)),
        (UniformType::Mat3, true) => UniformValue::Mat3Array(many(bytes)),
        (UniformType::Mat4, false) => UniformValue::Mat4(one::<Mat4>(bytes)),
        (UniformType::Mat4, true) => UniformValue::Mat4Array(many(bytes)),
        (UniformType::Struct, _) => return None,
    };
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::ByteBuffer;
    use crate::gpu::RecordingBackend;
    use crate::shader::{parse, preprocess};

    const LIT: &str = "#type vertex\n\
        uniform mat4 r_ViewProjection;\n\
        uniform mat4 u_Bones[2];\n\
        void main() {}\n\
        #type fragment\n\
        struct Light { vec3 Direction; float Intensity; };\n\
        uniform Light u_Light;\n\
        uniform vec4 u_Color;\n\
        uniform float u_Unused;\n\
        uniform sampler2D u_Albedo;\n\
        uniform sampler2D u_Shadows[3];\n\
        void main() {}\n";

    fn compiled() -> (ShaderReflection, RecordingBackend, ProgramId) {
        let sources = preprocess(LIT).unwrap();
        let mut reflection = parse(&sources).unwrap();
        let mut backend = RecordingBackend::new();
        backend.optimize_out("u_Unused");
        let program = backend.compile_program("lit", &sources).unwrap();
        reflection.resolve_bindings(&mut backend, program, "lit");
        (reflection, backend, program)
    }

    #[test]
    fn test_struct_fields_resolve_by_dotted_name() {
        let (reflection, backend, program) = compiled();
        assert!(backend.location_of(program, "u_Light.Direction").is_some());
        assert!(backend.location_of(program, "u_Light.Intensity").is_some());
        assert!(backend.location_of(program, "u_Light").is_none());

        let light = reflection.find_material_uniform("u_Light").unwrap();
        assert!(light.field_location(0, 0).is_resolved());
        assert!(light.field_location(0, 1).is_resolved());
    }

    #[test]
    fn test_missing_uniform_stays_unresolved() {
        let (reflection, _, _) = compiled();
        let unused = reflection.find_material_uniform("u_Unused").unwrap();
        assert_eq!(unused.location(), UniformLocation::UNRESOLVED);
        let color = reflection.find_material_uniform("u_Color").unwrap();
        assert!(color.location().is_resolved());
    }

    #[test]
    fn test_samplers_receive_registers() {
        let (reflection, backend, _) = compiled();
        let albedo = reflection.find_resource("u_Albedo").unwrap().location();
        let shadows = reflection.find_resource("u_Shadows").unwrap().location();

        let uploads = backend.uploads();
        assert!(uploads.contains(&(albedo, UniformValue::Int(0))));
        assert!(uploads.contains(&(shadows, UniformValue::IntArray(vec![1, 2, 3]))));
    }

    #[test]
    fn test_material_upload_walks_declarations() {
        let (reflection, mut backend, _) = compiled();
        backend.take_calls();

        let size = reflection.material_buffer_size(ShaderDomain::Pixel);
        assert_eq!(size, 16 + 16 + 4);
        let mut bytes = ByteBuffer::new(size);
        bytes.write_value(&Vec3::new(0.0, -1.0, 0.0), 0).unwrap();
        bytes.write_value(&2.5f32, 12).unwrap();
        bytes.write_value(&Vec4::new(1.0, 0.0, 0.0, 1.0), 16).unwrap();

        reflection.upload_material_buffer(&mut backend, ShaderDomain::Pixel, bytes.as_slice());

        let light = reflection.find_material_uniform("u_Light").unwrap();
        let color = reflection.find_material_uniform("u_Color").unwrap();
        assert_eq!(
            backend.uploads(),
            vec![
                (light.field_location(0, 0), UniformValue::Vec3(Vec3::new(0.0, -1.0, 0.0))),
                (light.field_location(0, 1), UniformValue::Float(2.5)),
                (color.location(), UniformValue::Vec4(Vec4::new(1.0, 0.0, 0.0, 1.0))),
            ]
        );
    }

    #[test]
    fn test_array_upload_uses_array_value() {
        let (reflection, mut backend, _) = compiled();
        backend.take_calls();

        let mut bytes = ByteBuffer::new(reflection.material_buffer_size(ShaderDomain::Vertex));
        bytes.write_value(&Mat4::IDENTITY, 0).unwrap();
        bytes.write_value(&Mat4::from_scale(Vec3::splat(2.0)), 64).unwrap();
        reflection.upload_material_buffer(&mut backend, ShaderDomain::Vertex, bytes.as_slice());

        let uploads = backend.uploads();
        assert_eq!(uploads.len(), 1);
        assert_eq!(
            uploads[0].1,
            UniformValue::Mat4Array(vec![Mat4::IDENTITY, Mat4::from_scale(Vec3::splat(2.0))])
        );
    }

    #[test]
    fn test_short_buffer_is_skipped() {
        let (reflection, mut backend, _) = compiled();
        backend.take_calls();
        reflection.upload_material_buffer(&mut backend, ShaderDomain::Pixel, &[0u8; 8]);
        assert!(backend.uploads().is_empty());
    }

    #[test]
    fn test_decode_rejects_size_mismatch() {
        assert_eq!(decode(UniformType::Float, 1, &[0u8; 4]), Some(UniformValue::Float(0.0)));
        assert_eq!(decode(UniformType::Vec3, 1, &[0u8; 8]), None);
    }
}
