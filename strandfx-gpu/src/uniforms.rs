//! Typed shader parameters.
//!
//! Passes describe their inputs as [`ShaderParams`] records. A record writes its
//! values into a [`UniformSet`] keyed by uniform name, which the device checks
//! against the program's reflected interface before encoding.

use glam::{Mat4, Vec2, Vec3, Vec4};

use crate::reflect::UniformType;
use crate::resource::Texture;

/// How to treat names the program does not declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Validation {
    /// A missing uniform or texture is an error.
    #[default]
    Strict,
    /// Missing names are skipped with a trace message.
    Lenient,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    UInt(u32),
    Bool(bool),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat4(Mat4),
    Vec4Array(Vec<Vec4>),
}

impl UniformValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            UniformValue::Float(_) => "f32",
            UniformValue::Int(_) => "i32",
            UniformValue::UInt(_) => "u32",
            UniformValue::Bool(_) => "bool",
            UniformValue::Vec2(_) => "vec2f",
            UniformValue::Vec3(_) => "vec3f",
            UniformValue::Vec4(_) => "vec4f",
            UniformValue::Mat4(_) => "mat4x4f",
            UniformValue::Vec4Array(_) => "array<vec4f>",
        }
    }

    /// Booleans travel as integers; arrays may be shorter than the declaration.
    pub fn matches(&self, ty: UniformType) -> bool {
        match (self, ty) {
            (UniformValue::Float(_), UniformType::Float)
            | (UniformValue::Int(_), UniformType::Int)
            | (UniformValue::UInt(_), UniformType::UInt)
            | (UniformValue::Bool(_), UniformType::Int | UniformType::UInt)
            | (UniformValue::Vec2(_), UniformType::Vec2)
            | (UniformValue::Vec3(_), UniformType::Vec3)
            | (UniformValue::Vec4(_), UniformType::Vec4)
            | (UniformValue::Mat4(_), UniformType::Mat4) => true,
            (UniformValue::Vec4Array(values), UniformType::Vec4Array(n)) => values.len() <= n as usize,
            _ => false,
        }
    }

    /// Little-endian bytes as laid out in the uniform block.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            UniformValue::Float(v) => v.to_le_bytes().to_vec(),
            UniformValue::Int(v) => v.to_le_bytes().to_vec(),
            UniformValue::UInt(v) => v.to_le_bytes().to_vec(),
            UniformValue::Bool(v) => (*v as u32).to_le_bytes().to_vec(),
            UniformValue::Vec2(v) => bytemuck::cast_slice(&v.to_array()).to_vec(),
            UniformValue::Vec3(v) => bytemuck::cast_slice(&v.to_array()).to_vec(),
            UniformValue::Vec4(v) => bytemuck::cast_slice(&v.to_array()).to_vec(),
            UniformValue::Mat4(m) => bytemuck::cast_slice(&m.to_cols_array()).to_vec(),
            UniformValue::Vec4Array(values) => values
                .iter()
                .flat_map(|v| bytemuck::cast_slice::<f32, u8>(&v.to_array()).to_vec())
                .collect(),
        }
    }
}

macro_rules! impl_from_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for UniformValue {
            fn from(value: $ty) -> Self {
                UniformValue::$variant(value)
            }
        })*
    };
}

impl_from_value!(
    f32 => Float,
    i32 => Int,
    u32 => UInt,
    bool => Bool,
    Vec2 => Vec2,
    Vec3 => Vec3,
    Vec4 => Vec4,
    Mat4 => Mat4,
    Vec<Vec4> => Vec4Array,
);

impl From<[f32; 3]> for UniformValue {
    fn from(value: [f32; 3]) -> Self {
        UniformValue::Vec3(Vec3::from_array(value))
    }
}

/// Named values and textures for one draw.
#[derive(Debug, Default)]
pub struct UniformSet<'a> {
    pub(crate) values: Vec<(&'static str, UniformValue)>,
    pub(crate) textures: Vec<(&'static str, &'a Texture)>,
}

impl<'a> UniformSet<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value, replacing an earlier one of the same name.
    pub fn set(&mut self, name: &'static str, value: impl Into<UniformValue>) -> &mut Self {
        let value = value.into();
        match self.values.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.values.push((name, value)),
        }
        self
    }

    pub fn texture(&mut self, name: &'static str, texture: &'a Texture) -> &mut Self {
        match self.textures.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = texture,
            None => self.textures.push((name, texture)),
        }
        self
    }

    pub fn value(&self, name: &str) -> Option<&UniformValue> {
        self.values.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    pub fn values(&self) -> impl Iterator<Item = (&'static str, &UniformValue)> {
        self.values.iter().map(|(n, v)| (*n, v))
    }

    pub fn textures(&self) -> impl Iterator<Item = (&'static str, &'a Texture)> + '_ {
        self.textures.iter().map(|(n, t)| (*n, *t))
    }
}

/// A typed parameter record for one program.
pub trait ShaderParams {
    fn write<'a>(&'a self, set: &mut UniformSet<'a>);

    fn to_set(&self) -> UniformSet<'_> {
        let mut set = UniformSet::new();
        self.write(&mut set);
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches() {
        assert!(UniformValue::Float(1.0).matches(UniformType::Float));
        assert!(!UniformValue::Float(1.0).matches(UniformType::Int));
        assert!(UniformValue::Bool(true).matches(UniformType::Int));
        assert!(UniformValue::Bool(true).matches(UniformType::UInt));
        assert!(UniformValue::Vec4Array(vec![Vec4::ONE; 3]).matches(UniformType::Vec4Array(4)));
        assert!(!UniformValue::Vec4Array(vec![Vec4::ONE; 5]).matches(UniformType::Vec4Array(4)));
    }

    #[test]
    fn test_encode_sizes() {
        assert_eq!(UniformValue::Vec3(Vec3::ONE).encode().len(), 12);
        assert_eq!(UniformValue::Mat4(Mat4::IDENTITY).encode().len(), 64);
        assert_eq!(UniformValue::Bool(true).encode(), vec![1, 0, 0, 0]);
        assert_eq!(UniformValue::Vec4Array(vec![Vec4::ZERO; 2]).encode().len(), 32);
        let bytes = UniformValue::Float(1.0).encode();
        assert_eq!(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]), 1.0);
    }

    #[test]
    fn test_set_replaces_by_name() {
        let mut set = UniformSet::new();
        set.set("u_gamma", 2.2f32).set("u_gamma", 1.8f32).set("u_useFxaa", true);
        assert_eq!(set.values().count(), 2);
        assert_eq!(set.value("u_gamma"), Some(&UniformValue::Float(1.8)));
    }

    struct Params {
        exposure: f32,
        grading: [f32; 3],
    }

    impl ShaderParams for Params {
        fn write<'a>(&'a self, set: &mut UniformSet<'a>) {
            set.set("u_exposure", self.exposure).set("u_grading", self.grading);
        }
    }

    #[test]
    fn test_params_to_set() {
        let params = Params {
            exposure: 1.5,
            grading: [1.0, 0.5, 0.25],
        };
        let set = params.to_set();
        assert_eq!(set.value("u_exposure"), Some(&UniformValue::Float(1.5)));
        assert_eq!(
            set.value("u_grading"),
            Some(&UniformValue::Vec3(Vec3::new(1.0, 0.5, 0.25)))
        );
    }
}
