// src/shader/preprocess.rs
//! Splits a combined shader file into per-stage sources on `#type <stage>` lines.

use std::collections::BTreeMap;

use log::warn;

use super::uniform::ShaderDomain;
use crate::error::{Error, Result};

const TYPE_TOKEN: &str = "#type";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}

impl ShaderStage {
    /// Stage named by a `#type` marker. `pixel` is an alias of `fragment`.
    pub fn from_marker(name: &str) -> Option<Self> {
        match name {
            "vertex" => Some(ShaderStage::Vertex),
            "fragment" | "pixel" => Some(ShaderStage::Fragment),
            "compute" => Some(ShaderStage::Compute),
            _ => None,
        }
    }

    /// Uniform domain reflected for this stage.
    pub fn domain(self) -> Option<ShaderDomain> {
        match self {
            ShaderStage::Vertex => Some(ShaderDomain::Vertex),
            ShaderStage::Fragment => Some(ShaderDomain::Pixel),
            ShaderStage::Compute => None,
        }
    }
}

/// Per-stage source text, ordered vertex → fragment → compute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShaderSources {
    stages: BTreeMap<ShaderStage, String>,
    compute: bool,
}

impl ShaderSources {
    pub fn get(&self, stage: ShaderStage) -> Option<&str> {
        self.stages.get(&stage).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ShaderStage, &str)> {
        self.stages.iter().map(|(stage, text)| (*stage, text.as_str()))
    }

    /// True when the file contained a compute section. Such a shader has no other stages.
    pub fn is_compute(&self) -> bool {
        self.compute
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

/// Split `source` into stage sections.
///
/// Each section runs from the line after its marker up to the next marker or
/// the end of input. A compute section ends the scan and discards any other stage.
pub fn preprocess(source: &str) -> Result<ShaderSources> {
    let mut sources = ShaderSources::default();
    let mut pos = source.find(TYPE_TOKEN);

    while let Some(marker) = pos {
        let eol = source[marker..]
            .find(&['\r', '\n'][..])
            .map(|i| marker + i)
            .ok_or_else(|| Error::Preprocess(format!("'{}' marker without a following line", TYPE_TOKEN)))?;

        let name = source[marker + TYPE_TOKEN.len()..eol].trim();
        let stage = ShaderStage::from_marker(name)
            .ok_or_else(|| Error::Preprocess(format!("invalid shader type '{}'", name)))?;

        let body_start = source[eol..]
            .find(|c| c != '\r' && c != '\n')
            .map_or(source.len(), |i| eol + i);
        pos = source[body_start..].find(TYPE_TOKEN).map(|i| body_start + i);
        let body_end = pos.unwrap_or(source.len());
        let body = source[body_start..body_end].to_owned();

        if stage == ShaderStage::Compute {
            sources.stages.clear();
            sources.stages.insert(stage, body);
            sources.compute = true;
            break;
        }
        if sources.stages.insert(stage, body).is_some() {
            warn!("Duplicate '{} {}' section; keeping the last one", TYPE_TOKEN, name);
        }
    }

    if sources.is_empty() {
        return Err(Error::Preprocess(format!("no '{}' marker found", TYPE_TOKEN)));
    }
    Ok(sources)
}
