// src/gpu/mod.rs
//! GPU program boundary.
//!
//! Everything the core needs from a graphics API goes through [`RenderBackend`].
//! Commands replayed by the render thread receive `&mut dyn RenderBackend`,
//! so no global GPU context exists anywhere in the crate.

mod recording;

pub use recording::{GpuCall, RecordingBackend};

use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};

use crate::error::Result;
use crate::shader::ShaderSources;

/// Linked program handle issued by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramId(pub u32);

/// Backend texture object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u32);

/// Location of a uniform inside a linked program. `-1` means the program has
/// no such uniform (misspelled or optimized out).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub i32);

impl UniformLocation {
    pub const UNRESOLVED: Self = Self(-1);

    #[inline]
    pub fn is_resolved(self) -> bool {
        self.0 >= 0
    }
}

impl Default for UniformLocation {
    fn default() -> Self {
        Self::UNRESOLVED
    }
}

/// Typed payload of one uniform upload.
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    Int(i32),
    IntArray(Vec<i32>),
    Float(f32),
    FloatArray(Vec<f32>),
    Vec2(Vec2),
    Vec2Array(Vec<Vec2>),
    Vec3(Vec3),
    Vec3Array(Vec<Vec3>),
    Vec4(Vec4),
    Vec4Array(Vec<Vec4>),
    Mat3(Mat3),
    Mat3Array(Vec<Mat3>),
    Mat4(Mat4),
    Mat4Array(Vec<Mat4>),
}

impl UniformValue {
    /// Number of elements carried by this value.
    pub fn len(&self) -> usize {
        match self {
            UniformValue::IntArray(v) => v.len(),
            UniformValue::FloatArray(v) => v.len(),
            UniformValue::Vec2Array(v) => v.len(),
            UniformValue::Vec3Array(v) => v.len(),
            UniformValue::Vec4Array(v) => v.len(),
            UniformValue::Mat3Array(v) => v.len(),
            UniformValue::Mat4Array(v) => v.len(),
            _ => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

macro_rules! impl_uniform_value_from {
    ($($ty:ty => $variant:ident, $array:ident;)*) => {
        $(
            impl From<$ty> for UniformValue {
                fn from(value: $ty) -> Self {
                    UniformValue::$variant(value)
                }
            }

            impl From<Vec<$ty>> for UniformValue {
                fn from(values: Vec<$ty>) -> Self {
                    UniformValue::$array(values)
                }
            }
        )*
    };
}

impl_uniform_value_from! {
    i32 => Int, IntArray;
    f32 => Float, FloatArray;
    Vec2 => Vec2, Vec2Array;
    Vec3 => Vec3, Vec3Array;
    Vec4 => Vec4, Vec4Array;
    Mat3 => Mat3, Mat3Array;
    Mat4 => Mat4, Mat4Array;
}

/// The graphics API as seen from replayed commands.
///
/// Implementations are only ever driven from the render thread.
pub trait RenderBackend {
    /// Compile and link every stage in `sources` into one program.
    fn compile_program(&mut self, name: &str, sources: &ShaderSources) -> Result<ProgramId>;

    fn delete_program(&mut self, program: ProgramId);

    fn use_program(&mut self, program: ProgramId);

    /// Query a uniform location by name. Returns [`UniformLocation::UNRESOLVED`] on a miss.
    fn uniform_location(&mut self, program: ProgramId, name: &str) -> UniformLocation;

    /// Upload a value to the currently bound program.
    fn upload_uniform(&mut self, location: UniformLocation, value: UniformValue);

    /// Bind a texture to a texture unit.
    fn bind_texture(&mut self, texture: TextureHandle, slot: u32);
}
