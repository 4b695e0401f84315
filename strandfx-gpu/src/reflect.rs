//! WGSL interface reflection.
//!
//! Programs follow a fixed binding convention:
//!
//! - the uniform block is the struct bound as `@group(0) @binding(0) var<uniform>`;
//! - textures live in group 1 at even bindings `2k`, with their sampler at `2k + 1`;
//! - vertex inputs are the `@location(n)` fields of `struct VertexInput`.
//!
//! The scanner only understands module-scope declarations. Function bodies are
//! skipped, so it never needs to parse expressions.

use std::collections::HashMap;

use crate::resource::TextureKind;

pub const UNIFORM_GROUP: u32 = 0;
pub const TEXTURE_GROUP: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReflectError {
    #[error("Unexpected end of source while parsing {0}")]
    UnexpectedEnd(&'static str),

    #[error("Expected {expected} but found '{found}'")]
    Unexpected { expected: &'static str, found: String },

    #[error("Uniform field '{field}' has unsupported type '{ty}'")]
    UnsupportedUniformType { field: String, ty: String },

    #[error("Uniform block struct '{0}' is not declared")]
    UnknownStruct(String),

    #[error("Texture '{name}' uses odd binding {binding}; textures take even bindings")]
    OddTextureBinding { name: String, binding: u32 },

    #[error("Unsupported resource binding '{name}' at group {group} binding {binding}")]
    UnsupportedBinding { name: String, group: u32, binding: u32 },

    #[error("Vertex and fragment stages disagree on '{0}'")]
    StageMismatch(String),
}

/// Uniform member types the renderer can set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformType {
    Float,
    Int,
    UInt,
    Vec2,
    Vec3,
    Vec4,
    Mat4,
    Vec4Array(u32),
}

impl UniformType {
    /// Alignment in the uniform address space.
    pub fn align(self) -> u32 {
        match self {
            UniformType::Float | UniformType::Int | UniformType::UInt => 4,
            UniformType::Vec2 => 8,
            UniformType::Vec3 | UniformType::Vec4 | UniformType::Mat4 | UniformType::Vec4Array(_) => 16,
        }
    }

    pub fn size(self) -> u32 {
        match self {
            UniformType::Float | UniformType::Int | UniformType::UInt => 4,
            UniformType::Vec2 => 8,
            UniformType::Vec3 => 12,
            UniformType::Vec4 => 16,
            UniformType::Mat4 => 64,
            UniformType::Vec4Array(n) => 16 * n,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformInfo {
    pub name: String,
    pub ty: UniformType,
    pub offset: u32,
}

/// How a texture binding is sampled by the shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleKind {
    Float,
    Depth,
    Uint,
    Sint,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureSlot {
    pub name: String,
    pub binding: u32,
    pub dimension: TextureKind,
    pub sample: SampleKind,
}

impl TextureSlot {
    pub fn sampler_binding(&self) -> u32 {
        self.binding + 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeInfo {
    pub name: String,
    pub location: u32,
}

/// Everything the device needs to know about a program's inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgramInterface {
    pub uniforms: Vec<UniformInfo>,
    /// Rounded up to 16 bytes; 0 when the program has no uniform block.
    pub uniform_block_size: u32,
    pub textures: Vec<TextureSlot>,
    pub attributes: Vec<AttributeInfo>,
}

impl ProgramInterface {
    /// Reflect both stages and merge them into one interface.
    pub fn reflect(vertex: &str, fragment: &str) -> Result<Self, ReflectError> {
        let vs = reflect_module(vertex)?;
        let fs = reflect_module(fragment)?;
        vs.merge(fs)
    }

    pub fn uniform(&self, name: &str) -> Option<&UniformInfo> {
        self.uniforms.iter().find(|u| u.name == name)
    }

    pub fn texture(&self, name: &str) -> Option<&TextureSlot> {
        self.textures.iter().find(|t| t.name == name)
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeInfo> {
        self.attributes.iter().find(|a| a.name == name)
    }

    fn merge(mut self, other: ProgramInterface) -> Result<Self, ReflectError> {
        if self.uniforms.is_empty() {
            self.uniforms = other.uniforms;
            self.uniform_block_size = other.uniform_block_size;
        } else if !other.uniforms.is_empty() && other.uniforms != self.uniforms {
            return Err(ReflectError::StageMismatch("uniform block".into()));
        }
        for slot in other.textures {
            match self.textures.iter().find(|t| t.binding == slot.binding) {
                Some(existing) if *existing != slot => {
                    return Err(ReflectError::StageMismatch(slot.name));
                }
                Some(_) => {}
                None => self.textures.push(slot),
            }
        }
        self.textures.sort_by_key(|t| t.binding);
        if self.attributes.is_empty() {
            self.attributes = other.attributes;
        }
        Ok(self)
    }
}

/// Reflect a single WGSL module.
pub fn reflect_module(source: &str) -> Result<ProgramInterface, ReflectError> {
    let tokens = tokenize(&strip_comments(source));
    let module = Parser { tokens, pos: 0 }.module()?;

    let mut interface = ProgramInterface::default();
    for global in &module.globals {
        let group = global.attr_u32("group").unwrap_or(0);
        let binding = global.attr_u32("binding").unwrap_or(0);
        if global.address_space.as_deref() == Some("uniform") {
            if group != UNIFORM_GROUP || binding != 0 {
                return Err(ReflectError::UnsupportedBinding {
                    name: global.name.clone(),
                    group,
                    binding,
                });
            }
            let fields = module
                .structs
                .get(&global.ty.name)
                .ok_or_else(|| ReflectError::UnknownStruct(global.ty.name.clone()))?;
            let (uniforms, size) = layout_uniforms(fields)?;
            interface.uniforms = uniforms;
            interface.uniform_block_size = size;
        } else if let Some((dimension, sample)) = texture_type(&global.ty) {
            if group != TEXTURE_GROUP {
                return Err(ReflectError::UnsupportedBinding {
                    name: global.name.clone(),
                    group,
                    binding,
                });
            }
            if binding % 2 != 0 {
                return Err(ReflectError::OddTextureBinding {
                    name: global.name.clone(),
                    binding,
                });
            }
            interface.textures.push(TextureSlot {
                name: global.name.clone(),
                binding,
                dimension,
                sample,
            });
        }
    }
    interface.textures.sort_by_key(|t| t.binding);

    if let Some(fields) = module.structs.get("VertexInput") {
        interface.attributes = fields
            .iter()
            .filter_map(|f| {
                f.attr_u32("location").map(|location| AttributeInfo {
                    name: f.name.clone(),
                    location,
                })
            })
            .collect();
    }
    Ok(interface)
}

fn layout_uniforms(fields: &[Field]) -> Result<(Vec<UniformInfo>, u32), ReflectError> {
    let mut offset = 0u32;
    let mut max_align = 16u32;
    let mut uniforms = Vec::with_capacity(fields.len());
    for field in fields {
        let ty = uniform_type(&field.ty).ok_or_else(|| ReflectError::UnsupportedUniformType {
            field: field.name.clone(),
            ty: field.ty.to_string(),
        })?;
        let align = field.attr_u32("align").unwrap_or(ty.align());
        max_align = max_align.max(align);
        offset = offset.next_multiple_of(align);
        uniforms.push(UniformInfo {
            name: field.name.clone(),
            ty,
            offset,
        });
        offset += field.attr_u32("size").unwrap_or(ty.size());
    }
    Ok((uniforms, offset.next_multiple_of(max_align)))
}

fn scalar_param(ty: &WgslType) -> Option<&str> {
    ty.params.first().map(|p| p.name.as_str())
}

fn uniform_type(ty: &WgslType) -> Option<UniformType> {
    let f32_param = scalar_param(ty) == Some("f32");
    Some(match ty.name.as_str() {
        "f32" => UniformType::Float,
        "i32" => UniformType::Int,
        "u32" => UniformType::UInt,
        "vec2f" => UniformType::Vec2,
        "vec3f" => UniformType::Vec3,
        "vec4f" => UniformType::Vec4,
        "mat4x4f" => UniformType::Mat4,
        "vec2" if f32_param => UniformType::Vec2,
        "vec3" if f32_param => UniformType::Vec3,
        "vec4" if f32_param => UniformType::Vec4,
        "mat4x4" if f32_param => UniformType::Mat4,
        "array" => {
            let element = ty.params.first()?;
            if uniform_type(element)? != UniformType::Vec4 {
                return None;
            }
            let count = ty.params.get(1)?.name.trim_end_matches(['u', 'i']).parse().ok()?;
            UniformType::Vec4Array(count)
        }
        _ => return None,
    })
}

fn texture_type(ty: &WgslType) -> Option<(TextureKind, SampleKind)> {
    let sample = match scalar_param(ty) {
        Some("u32") => SampleKind::Uint,
        Some("i32") => SampleKind::Sint,
        _ => SampleKind::Float,
    };
    Some(match ty.name.as_str() {
        "texture_2d" => (TextureKind::D2, sample),
        "texture_cube" => (TextureKind::Cube, sample),
        "texture_3d" => (TextureKind::D3, sample),
        "texture_2d_array" => (TextureKind::D2Array, sample),
        "texture_depth_2d" => (TextureKind::D2, SampleKind::Depth),
        "texture_depth_cube" => (TextureKind::Cube, SampleKind::Depth),
        "texture_depth_2d_array" => (TextureKind::D2Array, SampleKind::Depth),
        _ => return None,
    })
}

fn strip_comments(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    let mut block_depth = 0usize;
    while let Some(c) = chars.next() {
        if block_depth > 0 {
            match (c, chars.peek()) {
                ('*', Some('/')) => {
                    chars.next();
                    block_depth -= 1;
                }
                ('/', Some('*')) => {
                    chars.next();
                    block_depth += 1;
                }
                ('\n', _) => out.push('\n'),
                _ => {}
            }
            continue;
        }
        match (c, chars.peek()) {
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
                block_depth = 1;
            }
            _ => out.push(c),
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Punct(char),
}

fn tokenize(source: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c.is_alphanumeric() || c == '_' || c == '.' {
            let mut word = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_alphanumeric() || c == '_' || c == '.' {
                    word.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Word(word));
        } else {
            tokens.push(Token::Punct(c));
            chars.next();
        }
    }
    tokens
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct WgslType {
    name: String,
    params: Vec<WgslType>,
}

impl std::fmt::Display for WgslType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)?;
        if !self.params.is_empty() {
            let params: Vec<String> = self.params.iter().map(|p| p.to_string()).collect();
            write!(f, "<{}>", params.join(", "))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct Attribute {
    name: String,
    args: Vec<String>,
}

fn attr_u32(attrs: &[Attribute], name: &str) -> Option<u32> {
    attrs
        .iter()
        .find(|a| a.name == name)
        .and_then(|a| a.args.first())
        .and_then(|v| v.trim_end_matches(['u', 'i']).parse().ok())
}

#[derive(Debug, Clone)]
struct Field {
    attrs: Vec<Attribute>,
    name: String,
    ty: WgslType,
}

impl Field {
    fn attr_u32(&self, name: &str) -> Option<u32> {
        attr_u32(&self.attrs, name)
    }
}

#[derive(Debug, Clone)]
struct Global {
    attrs: Vec<Attribute>,
    address_space: Option<String>,
    name: String,
    ty: WgslType,
}

impl Global {
    fn attr_u32(&self, name: &str) -> Option<u32> {
        attr_u32(&self.attrs, name)
    }
}

#[derive(Debug, Default)]
struct Module {
    structs: HashMap<String, Vec<Field>>,
    globals: Vec<Global>,
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self, context: &'static str) -> Result<Token, ReflectError> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or(ReflectError::UnexpectedEnd(context))?;
        self.pos += 1;
        Ok(token)
    }

    fn is_punct(&self, c: char) -> bool {
        self.peek() == Some(&Token::Punct(c))
    }

    fn eat_punct(&mut self, c: char) -> bool {
        if self.is_punct(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, c: char, expected: &'static str) -> Result<(), ReflectError> {
        match self.next(expected)? {
            Token::Punct(p) if p == c => Ok(()),
            other => Err(unexpected(expected, &other)),
        }
    }

    fn word(&mut self, expected: &'static str) -> Result<String, ReflectError> {
        match self.next(expected)? {
            Token::Word(w) => Ok(w),
            other => Err(unexpected(expected, &other)),
        }
    }

    fn module(mut self) -> Result<Module, ReflectError> {
        let mut module = Module::default();
        while self.peek().is_some() {
            let attrs = self.attributes()?;
            match self.next("declaration")? {
                Token::Word(w) if w == "struct" => {
                    let name = self.word("struct name")?;
                    let fields = self.struct_body()?;
                    module.structs.insert(name, fields);
                }
                Token::Word(w) if w == "var" => {
                    let address_space = if self.eat_punct('<') {
                        let space = self.word("address space")?;
                        while !self.eat_punct('>') {
                            self.next("address space")?;
                        }
                        Some(space)
                    } else {
                        None
                    };
                    let name = self.word("variable name")?;
                    self.expect_punct(':', "':'")?;
                    let ty = self.ty()?;
                    self.skip_to_semicolon()?;
                    module.globals.push(Global {
                        attrs,
                        address_space,
                        name,
                        ty,
                    });
                }
                Token::Punct('{') => self.skip_block()?,
                _ => {}
            }
        }
        Ok(module)
    }

    fn attributes(&mut self) -> Result<Vec<Attribute>, ReflectError> {
        let mut attrs = Vec::new();
        while self.eat_punct('@') {
            let name = self.word("attribute name")?;
            let mut args = Vec::new();
            if self.eat_punct('(') {
                let mut current = String::new();
                loop {
                    match self.next("attribute arguments")? {
                        Token::Punct(')') => break,
                        Token::Punct(',') => args.push(std::mem::take(&mut current)),
                        Token::Word(w) => current.push_str(&w),
                        Token::Punct(p) => current.push(p),
                    }
                }
                if !current.is_empty() {
                    args.push(current);
                }
            }
            attrs.push(Attribute { name, args });
        }
        Ok(attrs)
    }

    fn struct_body(&mut self) -> Result<Vec<Field>, ReflectError> {
        self.expect_punct('{', "'{'")?;
        let mut fields = Vec::new();
        loop {
            if self.eat_punct('}') {
                break;
            }
            let attrs = self.attributes()?;
            let name = self.word("field name")?;
            self.expect_punct(':', "':'")?;
            let ty = self.ty()?;
            fields.push(Field { attrs, name, ty });
            if !self.eat_punct(',') && !self.eat_punct(';') {
                self.expect_punct('}', "',' or '}'")?;
                break;
            }
        }
        self.eat_punct(';');
        Ok(fields)
    }

    fn ty(&mut self) -> Result<WgslType, ReflectError> {
        let name = self.word("type")?;
        let mut params = Vec::new();
        if self.eat_punct('<') {
            loop {
                params.push(self.ty()?);
                if self.eat_punct('>') {
                    break;
                }
                self.expect_punct(',', "',' or '>'")?;
            }
        }
        Ok(WgslType { name, params })
    }

    fn skip_to_semicolon(&mut self) -> Result<(), ReflectError> {
        while !self.eat_punct(';') {
            self.next("';'")?;
        }
        Ok(())
    }

    fn skip_block(&mut self) -> Result<(), ReflectError> {
        let mut depth = 1;
        while depth > 0 {
            match self.next("'}'")? {
                Token::Punct('{') => depth += 1,
                Token::Punct('}') => depth -= 1,
                _ => {}
            }
        }
        Ok(())
    }
}

fn unexpected(expected: &'static str, found: &Token) -> ReflectError {
    let found = match found {
        Token::Word(w) => w.clone(),
        Token::Punct(p) => p.to_string(),
    };
    ReflectError::Unexpected { expected, found }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERTEX: &str = r#"
        struct Uniforms {
            u_mvp: mat4x4<f32>,
            u_cameraPosition: vec3f,
            u_fiberRadius: f32, // packs into the vec3 tail
            u_displayMode: i32,
            u_kernel: array<vec4<f32>, 4>,
            u_viewport: vec2f,
        };

        @group(0) @binding(0) var<uniform> u: Uniforms;
        @group(1) @binding(0) var u_positions: texture_2d<f32>;
        @group(1) @binding(1) var u_positionsSampler: sampler;

        struct VertexInput {
            @location(0) position: vec3f,
            @location(2) normal: vec3f,
        }

        /* fn unused() { @group(9) } */
        @vertex
        fn vs_main(input: VertexInput, @builtin(vertex_index) vid: u32) -> @builtin(position) vec4f {
            let p = textureLoad(u_positions, vec2i(0, 0), 0);
            if (true) { return p; }
            return vec4f(input.position, 1.0);
        }
    "#;

    const FRAGMENT: &str = r#"
        struct Uniforms {
            u_mvp: mat4x4<f32>,
            u_cameraPosition: vec3f,
            u_fiberRadius: f32,
            u_displayMode: i32,
            u_kernel: array<vec4<f32>, 4>,
            u_viewport: vec2f,
        };
        @group(0) @binding(0) var<uniform> u: Uniforms;
        @group(1) @binding(2) var u_shadowMap: texture_depth_2d;
        @group(1) @binding(3) var u_shadowSampler: sampler;
        @group(1) @binding(4) var u_ids: texture_2d<u32>;
        @group(1) @binding(5) var u_idsSampler: sampler;

        @fragment
        fn fs_main() -> @location(0) vec4f { return vec4f(1.0); }
    "#;

    #[test]
    fn test_uniform_layout_follows_wgsl_rules() {
        let interface = reflect_module(VERTEX).unwrap();
        let offsets: Vec<(&str, u32)> = interface
            .uniforms
            .iter()
            .map(|u| (u.name.as_str(), u.offset))
            .collect();
        assert_eq!(
            offsets,
            vec![
                ("u_mvp", 0),
                ("u_cameraPosition", 64),
                ("u_fiberRadius", 76),
                ("u_displayMode", 80),
                ("u_kernel", 96),
                ("u_viewport", 160),
            ]
        );
        assert_eq!(interface.uniform_block_size, 176);
        assert_eq!(
            interface.uniform("u_kernel").unwrap().ty,
            UniformType::Vec4Array(4)
        );
    }

    #[test]
    fn test_textures_and_attributes() {
        let interface = reflect_module(VERTEX).unwrap();
        assert_eq!(interface.textures.len(), 1);
        assert_eq!(interface.textures[0].name, "u_positions");
        assert_eq!(interface.textures[0].sampler_binding(), 1);
        let attributes: Vec<(&str, u32)> = interface
            .attributes
            .iter()
            .map(|a| (a.name.as_str(), a.location))
            .collect();
        assert_eq!(attributes, vec![("position", 0), ("normal", 2)]);
    }

    #[test]
    fn test_merge_unions_textures() {
        let interface = ProgramInterface::reflect(VERTEX, FRAGMENT).unwrap();
        let slots: Vec<(&str, SampleKind)> = interface
            .textures
            .iter()
            .map(|t| (t.name.as_str(), t.sample))
            .collect();
        assert_eq!(
            slots,
            vec![
                ("u_positions", SampleKind::Float),
                ("u_shadowMap", SampleKind::Depth),
                ("u_ids", SampleKind::Uint)
            ]
        );
        assert_eq!(interface.attributes.len(), 2);
    }

    #[test]
    fn test_merge_rejects_diverging_uniform_blocks() {
        let other = "struct U { a: f32 } @group(0) @binding(0) var<uniform> u: U;";
        let err = ProgramInterface::reflect(VERTEX, other).unwrap_err();
        assert_eq!(err, ReflectError::StageMismatch("uniform block".into()));
    }

    #[test]
    fn test_rejects_odd_texture_binding_and_bad_types() {
        let odd = "@group(1) @binding(1) var t: texture_2d<f32>;";
        assert!(matches!(
            reflect_module(odd),
            Err(ReflectError::OddTextureBinding { binding: 1, .. })
        ));
        let bad = "struct U { m: mat3x3<f32> } @group(0) @binding(0) var<uniform> u: U;";
        assert!(matches!(
            reflect_module(bad),
            Err(ReflectError::UnsupportedUniformType { .. })
        ));
        let missing = "@group(0) @binding(0) var<uniform> u: Nope;";
        assert_eq!(
            reflect_module(missing),
            Err(ReflectError::UnknownStruct("Nope".into()))
        );
    }

    #[test]
    fn test_module_without_uniforms() {
        let interface = reflect_module("@fragment fn fs_main() -> @location(0) vec4f { return vec4f(0.0); }").unwrap();
        assert!(interface.uniforms.is_empty());
        assert_eq!(interface.uniform_block_size, 0);
    }
}
