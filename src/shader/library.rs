// src/shader/library.rs
//! Name-keyed registry of loaded shaders.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use log::{info, warn};

use super::program::{ReloadOutcome, Shader};
use crate::error::{Error, Result};
use crate::renderer::RenderContext;

#[derive(Debug, Default)]
pub struct ShaderLibrary {
    shaders: HashMap<String, Arc<Shader>>,
}

impl ShaderLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `shader` under its own name. Registering a name twice is an error.
    pub fn add(&mut self, shader: Arc<Shader>) -> Result<()> {
        let name = shader.name().to_owned();
        self.add_named(name, shader)
    }

    pub fn add_named(&mut self, name: impl Into<String>, shader: Arc<Shader>) -> Result<()> {
        let name = name.into();
        crate::ensure!(
            !self.shaders.contains_key(&name),
            "shader '{}' already exists in the library",
            name
        );
        self.shaders.insert(name, shader);
        Ok(())
    }

    /// Load a shader file and register it under its file stem.
    pub fn load(&mut self, ctx: &RenderContext, path: impl AsRef<Path>) -> Result<Arc<Shader>> {
        let shader = Shader::from_file(ctx, path)?;
        self.add(Arc::clone(&shader))?;
        Ok(shader)
    }

    pub fn load_named(&mut self, ctx: &RenderContext, name: &str, path: impl AsRef<Path>) -> Result<Arc<Shader>> {
        let shader = Shader::from_file_named(ctx, name, path)?;
        self.add_named(name, Arc::clone(&shader))?;
        Ok(shader)
    }

    pub fn get(&self, name: &str) -> Result<Arc<Shader>> {
        self.shaders
            .get(name)
            .cloned()
            .ok_or_else(|| Error::ResourceNotFound(format!("shader '{}'", name)))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.shaders.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.shaders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shaders.is_empty()
    }

    /// Re-read every file-backed shader whose source changed. Failures are
    /// logged and skipped. Returns how many shaders were queued for recompile.
    pub fn reload_all(&self, ctx: &RenderContext) -> usize {
        let mut reloaded = 0;
        for (name, shader) in &self.shaders {
            if shader.path().is_none() {
                continue;
            }
            match shader.reload(ctx, false) {
                Ok(ReloadOutcome::Reloaded) => reloaded += 1,
                Ok(ReloadOutcome::Unchanged) => {}
                Err(err) => warn!("Hot reload of shader '{}' failed: {}", name, err),
            }
        }
        if reloaded > 0 {
            info!("Reloaded {} shader(s)", reloaded);
        }
        reloaded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLAT: &str = "#type vertex\nuniform mat4 u_Transform;\nvoid main() {}\n#type fragment\nvoid main() {}\n";

    #[test]
    fn test_add_and_get() {
        let ctx = RenderContext::default();
        let mut library = ShaderLibrary::new();
        library.add(Shader::from_source(&ctx, "flat", FLAT).unwrap()).unwrap();

        assert!(library.exists("flat"));
        assert_eq!(library.get("flat").unwrap().name(), "flat");
        assert!(library.get("lit").unwrap_err().is_lookup());
    }

    #[test]
    fn test_duplicate_name_is_rejected() {
        let ctx = RenderContext::default();
        let mut library = ShaderLibrary::new();
        library.add(Shader::from_source(&ctx, "flat", FLAT).unwrap()).unwrap();

        let err = library.add(Shader::from_source(&ctx, "flat", FLAT).unwrap()).unwrap_err();
        assert!(err.to_string().contains("already exists"));
        assert_eq!(library.len(), 1);
    }

    #[test]
    fn test_load_and_reload_all() {
        let dir = std::env::temp_dir().join(format!("slop_library_test_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("textured.glsl");
        std::fs::write(&path, FLAT).unwrap();

        let ctx = RenderContext::default();
        let mut library = ShaderLibrary::new();
        library.load(&ctx, &path).unwrap();
        library
            .add(Shader::from_source(&ctx, "inline", FLAT).unwrap())
            .unwrap();
        assert!(library.exists("textured"));
        assert_eq!(library.reload_all(&ctx), 0);

        std::fs::write(&path, FLAT.replace("mat4", "mat3")).unwrap();
        assert_eq!(library.reload_all(&ctx), 1);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
