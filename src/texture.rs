// src/texture.rs
//! Texture references as seen by materials.
//!
//! The backend owns the GPU objects; these types only carry the handle and
//! enough metadata to check them against sampler declarations.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::gpu::{RenderBackend, TextureHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureKind {
    Texture2D,
    TextureCube,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureFormat {
    #[default]
    Rgba8,
    Rgb8,
    Rgba16Float,
    Depth24Stencil8,
}

/// Anything a material can bind to a sampler slot.
pub trait Texture: fmt::Debug + Send + Sync {
    fn handle(&self) -> TextureHandle;

    fn kind(&self) -> TextureKind;

    fn format(&self) -> TextureFormat;

    fn width(&self) -> u32;

    fn height(&self) -> u32;

    fn bind(&self, backend: &mut dyn RenderBackend, slot: u32) {
        backend.bind_texture(self.handle(), slot);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Texture2D {
    handle: TextureHandle,
    format: TextureFormat,
    width: u32,
    height: u32,
    path: Option<PathBuf>,
}

impl Texture2D {
    pub fn new(handle: TextureHandle, format: TextureFormat, width: u32, height: u32) -> Self {
        Self {
            handle,
            format,
            width,
            height,
            path: None,
        }
    }

    /// Record the asset this texture was loaded from.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl Texture for Texture2D {
    fn handle(&self) -> TextureHandle {
        self.handle
    }

    fn kind(&self) -> TextureKind {
        TextureKind::Texture2D
    }

    fn format(&self) -> TextureFormat {
        self.format
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }
}

/// Six square faces of `size` × `size`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureCube {
    handle: TextureHandle,
    format: TextureFormat,
    size: u32,
}

impl TextureCube {
    pub fn new(handle: TextureHandle, format: TextureFormat, size: u32) -> Self {
        Self { handle, format, size }
    }
}

impl Texture for TextureCube {
    fn handle(&self) -> TextureHandle {
        self.handle
    }

    fn kind(&self) -> TextureKind {
        TextureKind::TextureCube
    }

    fn format(&self) -> TextureFormat {
        self.format
    }

    fn width(&self) -> u32 {
        self.size
    }

    fn height(&self) -> u32 {
        self.size
    }
}
