// src/shader/mod.rs
//! Shader sources, reflection and programs.
//!
//! - `preprocess` splits a multi-stage file on `#type` markers
//! - `parser` reflects structs, uniforms and samplers out of each stage
//! - `binding` resolves reflected names against a compiled program
//! - `program` owns the compiled program and its hot reload
//! - `library` keeps shaders by name

mod binding;
mod library;
mod parser;
mod preprocess;
mod program;
mod reflection;
mod uniform;

pub use library::ShaderLibrary;
pub use parser::{parse, MAX_ARRAY_LENGTH};
pub use preprocess::{preprocess, ShaderSources, ShaderStage};
pub use program::{ReloadCallback, ReloadCallbackId, ReloadOutcome, RendererUniforms, Shader};
pub use reflection::ShaderReflection;
pub use uniform::{
    ResourceType, ShaderDomain, ShaderResourceDeclaration, ShaderStruct, ShaderStructField,
    ShaderUniformBufferDeclaration, ShaderUniformDeclaration, UniformType, RENDERER_UNIFORM_PREFIX,
};
