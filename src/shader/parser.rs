// src/shader/parser.rs
//! Declaration scanner for stage sources.
//!
//! Per stage, `struct` blocks are collected first, then `uniform` statements.
//! Keywords only match as whole words (whitespace or string edge on both sides).
//! Comments are blanked out beforehand so commented-out declarations are ignored.

use log::debug;

use super::preprocess::ShaderSources;
use super::reflection::ShaderReflection;
use super::uniform::{ResourceType, ShaderDomain, ShaderStruct, ShaderUniformDeclaration, UniformType};
use crate::ensure;
use crate::error::{Error, Result};

const STRUCT_TOKEN: &str = "struct";
const UNIFORM_TOKEN: &str = "uniform";
/// Upper bound on `[N]`. Sampler arrays upload one register per element.
pub const MAX_ARRAY_LENGTH: u32 = 4096;

/// Reflect every vertex/fragment stage in `sources`. Compute sources reflect to nothing.
pub fn parse(sources: &ShaderSources) -> Result<ShaderReflection> {
    let mut reflection = ShaderReflection::new();
    for (stage, text) in sources.iter() {
        let Some(domain) = stage.domain() else {
            continue;
        };
        let text = strip_comments(text);
        parse_structs(&mut reflection, &text)?;
        parse_uniforms(&mut reflection, domain, &text)?;
    }
    Ok(reflection)
}

pub(crate) fn parse_structs(reflection: &mut ShaderReflection, text: &str) -> Result<()> {
    let mut pos = 0;
    while let Some(start) = find_token(text, STRUCT_TOKEN, pos) {
        let close = text[start..]
            .find('}')
            .map(|i| start + i)
            .ok_or_else(|| Error::ShaderSyntax("unterminated struct block, missing '}'".into()))?;
        let block = &text[start + STRUCT_TOKEN.len()..close];
        let (header, body) = block
            .split_once('{')
            .ok_or_else(|| Error::ShaderSyntax(format!("struct '{}' has no body", block.trim())))?;

        let name = header.trim();
        ensure!(
            is_identifier(name),
            Error::ShaderSyntax(format!("invalid struct name '{}'", name))
        );

        let mut structure = ShaderStruct::new(name);
        for statement in body.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            let (type_name, raw_name) = declaration_parts(statement)?;
            let (field, count) = split_array_suffix(&raw_name)?;
            let ty = UniformType::from_glsl(type_name).ok_or_else(|| Error::UnknownType {
                type_name: type_name.to_owned(),
                name: format!("{}.{}", name, field),
            })?;
            structure.add_field(field, ty, count)?;
        }

        debug!("Reflected struct '{}' ({} bytes)", name, structure.size());
        reflection.add_struct(structure);
        pos = close + 1;
    }
    Ok(())
}

pub(crate) fn parse_uniforms(reflection: &mut ShaderReflection, domain: ShaderDomain, text: &str) -> Result<()> {
    let mut pos = 0;
    while let Some(start) = find_token(text, UNIFORM_TOKEN, pos) {
        let end = text[start..]
            .find(';')
            .map(|i| start + i)
            .ok_or_else(|| Error::ShaderSyntax("unterminated uniform statement, missing ';'".into()))?;
        let statement = &text[start + UNIFORM_TOKEN.len()..end];
        ensure!(
            !statement.contains('{'),
            Error::ShaderSyntax(format!("uniform blocks are not supported: '{}'", statement.trim()))
        );

        let (type_name, raw_name) = declaration_parts(statement)?;
        let (name, count) = split_array_suffix(&raw_name)?;

        if let Some(resource) = ResourceType::from_glsl(type_name) {
            reflection.push_resource(resource, &name, count)?;
        } else if let Some(ty) = UniformType::from_glsl(type_name) {
            reflection.push_uniform(ShaderUniformDeclaration::new(domain, ty, name, count)?)?;
        } else if let Some(structure) = reflection.find_struct(type_name).cloned() {
            reflection.push_uniform(ShaderUniformDeclaration::new_struct(domain, structure, name, count)?)?;
        } else {
            return Err(Error::UnknownType {
                type_name: type_name.to_owned(),
                name,
            });
        }
        pos = end + 1;
    }
    Ok(())
}

/// Position of `token` at or after `from`, bounded by whitespace or the string edges.
pub(crate) fn find_token(text: &str, token: &str, from: usize) -> Option<usize> {
    let mut search = from;
    while let Some(found) = text.get(search..)?.find(token) {
        let start = search + found;
        let end = start + token.len();
        let left = start == 0 || text[..start].ends_with(char::is_whitespace);
        let right = end == text.len() || text[end..].starts_with(char::is_whitespace);
        if left && right {
            return Some(start);
        }
        search = end;
    }
    None
}

/// Type and name of `[qualifiers] type name[N] [= init]`. A detached array
/// suffix (`name [N]`) is glued back onto the name.
fn declaration_parts(statement: &str) -> Result<(&str, String)> {
    let statement = statement.split_once('=').map_or(statement, |(lhs, _)| lhs);
    let (head, suffix) = match statement.find('[') {
        Some(bracket) => (&statement[..bracket], &statement[bracket..]),
        None => (statement, ""),
    };

    let tokens: Vec<&str> = head.split_whitespace().collect();
    let [.., type_name, name] = tokens.as_slice() else {
        return Err(Error::ShaderSyntax(format!(
            "expected '<type> <name>' in '{}'",
            statement.trim()
        )));
    };

    let suffix: String = suffix.chars().filter(|c| !c.is_whitespace()).collect();
    Ok((*type_name, format!("{}{}", name, suffix)))
}

/// Strip a trailing `[N]` from `raw`. `N` must be in `1..=MAX_ARRAY_LENGTH`.
fn split_array_suffix(raw: &str) -> Result<(String, u32)> {
    let (name, count) = match raw.find('[') {
        None => (raw, 1),
        Some(open) => {
            let rest = &raw[open + 1..];
            let close = rest
                .find(']')
                .ok_or_else(|| Error::ShaderSyntax(format!("missing ']' in '{}'", raw)))?;
            ensure!(
                close + 1 == rest.len(),
                Error::ShaderSyntax(format!("unexpected text after array suffix in '{}'", raw))
            );
            let count: u32 = rest[..close]
                .parse()
                .map_err(|_| Error::ShaderSyntax(format!("invalid array size in '{}'", raw)))?;
            ensure!(
                count > 0,
                Error::ShaderSyntax(format!("zero-length array '{}'", raw))
            );
            ensure!(
                count <= MAX_ARRAY_LENGTH,
                Error::ShaderSyntax(format!("array '{}' exceeds {} elements", raw, MAX_ARRAY_LENGTH))
            );
            (&raw[..open], count)
        }
    };

    ensure!(
        is_identifier(name),
        Error::ShaderSyntax(format!("invalid identifier '{}'", raw))
    );
    Ok((name.to_owned(), count))
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Replace `//` and `/* */` comments with spaces, keeping newlines.
pub(crate) fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        let next = chars.peek().copied();
        match (c, next) {
            ('/', Some('/')) => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut previous = '\0';
                for c in chars.by_ref() {
                    if previous == '*' && c == '/' {
                        break;
                    }
                    if c == '\n' {
                        out.push('\n');
                    }
                    previous = c;
                }
                out.push(' ');
            }
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::preprocess;

    fn reflect_vertex(text: &str) -> Result<ShaderReflection> {
        let mut reflection = ShaderReflection::new();
        parse_structs(&mut reflection, text)?;
        parse_uniforms(&mut reflection, ShaderDomain::Vertex, text)?;
        Ok(reflection)
    }

    #[test]
    fn test_material_and_renderer_split() {
        let reflection = reflect_vertex("uniform vec3 u_Color; uniform mat4 r_ViewMatrix;").unwrap();

        let material = reflection.material_buffer(ShaderDomain::Vertex).unwrap();
        assert_eq!(material.uniforms().len(), 1);
        let color = material.find_uniform("u_Color").unwrap();
        assert_eq!((color.size(), color.offset()), (12, 0));

        let renderer = reflection.renderer_buffer(ShaderDomain::Vertex);
        assert!(renderer.find_uniform("r_ViewMatrix").is_some());
        assert!(material.find_uniform("r_ViewMatrix").is_none());
    }

    #[test]
    fn test_struct_uniform() {
        let reflection = reflect_vertex(
            "struct Light { vec3 Direction; float Intensity; };\nuniform Light u_Light;",
        )
        .unwrap();

        let light = reflection.find_material_uniform("u_Light").unwrap();
        assert_eq!(light.uniform_type(), UniformType::Struct);
        assert_eq!(light.size(), 16);

        let structure = light.structure().unwrap();
        let names: Vec<String> = structure
            .fields()
            .iter()
            .map(|f| light.field_binding_name(0, f))
            .collect();
        assert_eq!(names, vec!["u_Light.Direction", "u_Light.Intensity"]);
    }

    #[test]
    fn test_array_suffix_is_stripped() {
        let reflection = reflect_vertex("uniform mat4 u_Bones[4];\nuniform float u_W [ 2 ];").unwrap();
        let bones = reflection.find_material_uniform("u_Bones").unwrap();
        assert_eq!((bones.count(), bones.size()), (4, 256));
        let weights = reflection.find_material_uniform("u_W").unwrap();
        assert_eq!((weights.count(), weights.offset()), (2, 256));
    }

    #[test]
    fn test_zero_and_unclosed_arrays_rejected() {
        assert!(reflect_vertex("uniform float u_A[0];").unwrap_err().is_parse());
        assert!(reflect_vertex("uniform float u_A[4;").unwrap_err().is_parse());
        assert!(reflect_vertex("struct S { float a[0]; };").unwrap_err().is_parse());
    }

    #[test]
    fn test_oversized_arrays_rejected() {
        let mut reflection = ShaderReflection::new();
        let err = parse_uniforms(&mut reflection, ShaderDomain::Vertex, "uniform mat4 u_A[100000000];").unwrap_err();
        assert!(err.is_parse());
        assert!(reflection.material_buffer(ShaderDomain::Vertex).is_none());

        assert!(reflect_vertex("uniform sampler2D u_Maps[4294967295];").unwrap_err().is_parse());
        assert!(reflect_vertex("uniform sampler2D u_Maps[99999999999];").unwrap_err().is_parse());
        assert!(reflect_vertex("struct S { mat4 m[100000000]; };").unwrap_err().is_parse());

        let at_limit = format!("uniform float u_W[{}];", MAX_ARRAY_LENGTH);
        let reflection = reflect_vertex(&at_limit).unwrap();
        assert_eq!(reflection.material_buffer_size(ShaderDomain::Vertex), 4 * MAX_ARRAY_LENGTH as usize);
    }

    #[test]
    fn test_unknown_type_is_fatal() {
        let err = reflect_vertex("uniform Material u_Material;").unwrap_err();
        assert!(matches!(err, Error::UnknownType { ref type_name, .. } if type_name == "Material"));
    }

    #[test]
    fn test_unterminated_statements() {
        assert!(reflect_vertex("uniform vec4 u_Color").is_err());
        assert!(reflect_vertex("struct Light { vec3 Direction;").is_err());
    }

    #[test]
    fn test_whole_word_matching() {
        let text = "vec4 my_uniform_color; uniforms; struct_x; uniform float u_Real;";
        let reflection = reflect_vertex(text).unwrap();
        let material = reflection.material_buffer(ShaderDomain::Vertex).unwrap();
        assert_eq!(material.uniforms().len(), 1);
        assert_eq!(material.uniforms()[0].name(), "u_Real");
        assert_eq!(find_token("uniform", "uniform", 0), Some(0));
    }

    #[test]
    fn test_resources_get_registers() {
        let reflection = reflect_vertex(
            "uniform sampler2D u_Albedo; uniform samplerCube u_Sky; uniform sampler2D u_Maps[3]; uniform sampler2DShadow u_Shadow;",
        )
        .unwrap();
        let registers: Vec<(String, u32, u32)> = reflection
            .resources()
            .iter()
            .map(|r| (r.name().to_owned(), r.register(), r.count()))
            .collect();
        assert_eq!(
            registers,
            vec![
                ("u_Albedo".to_owned(), 0, 1),
                ("u_Sky".to_owned(), 1, 1),
                ("u_Maps".to_owned(), 2, 3),
                ("u_Shadow".to_owned(), 5, 1),
            ]
        );
        assert!(reflection.material_buffer(ShaderDomain::Vertex).is_none());
    }

    #[test]
    fn test_qualifiers_initializers_and_comments() {
        let text = "// uniform float u_Old;\nuniform lowp vec4 u_Tint = vec4(1.0);\n/* uniform mat4 u_Gone; */\nlayout(location = 0) uniform float u_Alpha;";
        let reflection = reflect_vertex(&strip_comments(text)).unwrap();
        let material = reflection.material_buffer(ShaderDomain::Vertex).unwrap();
        let names: Vec<&str> = material.uniforms().iter().map(|u| u.name()).collect();
        assert_eq!(names, vec!["u_Tint", "u_Alpha"]);
    }

    #[test]
    fn test_full_source_both_stages() {
        let source = "#type vertex\n\
            uniform mat4 r_ViewProjection;\n\
            uniform mat4 u_Transform;\n\
            void main() {}\n\
            #type fragment\n\
            struct Light { vec3 Direction; float Intensity; };\n\
            uniform Light u_Light;\n\
            uniform vec4 u_Color;\n\
            uniform sampler2D u_Texture;\n\
            void main() {}\n";
        let sources = preprocess(source).unwrap();
        let reflection = parse(&sources).unwrap();

        assert_eq!(reflection.material_buffer_size(ShaderDomain::Vertex), 64);
        assert_eq!(reflection.material_buffer_size(ShaderDomain::Pixel), 32);
        let color = reflection.find_material_uniform("u_Color").unwrap();
        assert_eq!((color.domain(), color.offset()), (ShaderDomain::Pixel, 16));
        assert_eq!(reflection.find_resource("u_Texture").unwrap().register(), 0);
    }

    #[test]
    fn test_compute_reflects_nothing() {
        let sources = preprocess("#type compute\nuniform float u_Time;\nvoid main() {}\n").unwrap();
        let reflection = parse(&sources).unwrap();
        assert!(reflection.find_material_uniform("u_Time").is_none());
    }
}
