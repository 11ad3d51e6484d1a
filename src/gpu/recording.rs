// src/gpu/recording.rs
//! Headless backend that records every call.
//!
//! Locations are handed out per program in query order, starting at 0, so a
//! name always maps to the same location for the lifetime of a program.
//! Names registered with [`RecordingBackend::optimize_out`] behave like
//! uniforms the driver stripped from the program.

use std::collections::{HashMap, HashSet};

use super::{ProgramId, RenderBackend, TextureHandle, UniformLocation, UniformValue};
use crate::error::{Error, Result};
use crate::shader::ShaderSources;

/// One observed backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum GpuCall {
    CompileProgram { program: ProgramId, name: String },
    DeleteProgram(ProgramId),
    UseProgram(ProgramId),
    Upload {
        location: UniformLocation,
        value: UniformValue,
    },
    BindTexture { texture: TextureHandle, slot: u32 },
}

#[derive(Debug, Default)]
struct ProgramLocations {
    by_name: HashMap<String, UniformLocation>,
    next: i32,
}

#[derive(Debug, Default)]
pub struct RecordingBackend {
    next_program: u32,
    programs: HashMap<ProgramId, ProgramLocations>,
    optimized_out: HashSet<String>,
    compile_failure: Option<String>,
    calls: Vec<GpuCall>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `name` resolve to [`UniformLocation::UNRESOLVED`] in every program.
    pub fn optimize_out(&mut self, name: impl Into<String>) -> &mut Self {
        self.optimized_out.insert(name.into());
        self
    }

    /// Fail the next `compile_program` call with `message`.
    pub fn fail_next_compile(&mut self, message: impl Into<String>) -> &mut Self {
        self.compile_failure = Some(message.into());
        self
    }

    pub fn calls(&self) -> &[GpuCall] {
        &self.calls
    }

    pub fn take_calls(&mut self) -> Vec<GpuCall> {
        std::mem::take(&mut self.calls)
    }

    /// Only the uniform uploads, in order.
    pub fn uploads(&self) -> Vec<(UniformLocation, UniformValue)> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                GpuCall::Upload { location, value } => Some((*location, value.clone())),
                _ => None,
            })
            .collect()
    }

    /// Location previously handed out for `name`, if it was ever queried.
    pub fn location_of(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        self.programs
            .get(&program)
            .and_then(|p| p.by_name.get(name).copied())
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }
}

impl RenderBackend for RecordingBackend {
    fn compile_program(&mut self, name: &str, sources: &ShaderSources) -> Result<ProgramId> {
        if let Some(message) = self.compile_failure.take() {
            return Err(Error::ShaderCompile(format!("{}: {}", name, message)));
        }
        if sources.is_empty() {
            return Err(Error::ShaderCompile(format!("{}: no stages to compile", name)));
        }

        self.next_program += 1;
        let program = ProgramId(self.next_program);
        self.programs.insert(program, ProgramLocations::default());
        self.calls.push(GpuCall::CompileProgram {
            program,
            name: name.to_owned(),
        });
        Ok(program)
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.programs.remove(&program);
        self.calls.push(GpuCall::DeleteProgram(program));
    }

    fn use_program(&mut self, program: ProgramId) {
        self.calls.push(GpuCall::UseProgram(program));
    }

    fn uniform_location(&mut self, program: ProgramId, name: &str) -> UniformLocation {
        if self.optimized_out.contains(name) {
            return UniformLocation::UNRESOLVED;
        }
        let Some(locations) = self.programs.get_mut(&program) else {
            return UniformLocation::UNRESOLVED;
        };
        if let Some(location) = locations.by_name.get(name) {
            return *location;
        }
        let location = UniformLocation(locations.next);
        locations.next += 1;
        locations.by_name.insert(name.to_owned(), location);
        location
    }

    fn upload_uniform(&mut self, location: UniformLocation, value: UniformValue) {
        self.calls.push(GpuCall::Upload { location, value });
    }

    fn bind_texture(&mut self, texture: TextureHandle, slot: u32) {
        self.calls.push(GpuCall::BindTexture { texture, slot });
    }
}
