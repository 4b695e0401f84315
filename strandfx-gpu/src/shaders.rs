//! WGSL programs used by the render passes.
//!
//! Every stage is embedded with `include_str!`. A [`ShaderLibrary`] can point
//! at a directory whose files override the embedded stage of the same name,
//! which keeps shader iteration free of rebuilds.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::resource::ProgramSource;

const FULLSCREEN_VERTEX: &str = "fullscreen.vert.wgsl";

const EMBEDDED: &[(&str, &str)] = &[
    (FULLSCREEN_VERTEX, include_str!("../shaders/fullscreen.vert.wgsl")),
    ("shadow.vert.wgsl", include_str!("../shaders/shadow.vert.wgsl")),
    ("shadow.frag.wgsl", include_str!("../shaders/shadow.frag.wgsl")),
    ("forward.vert.wgsl", include_str!("../shaders/forward.vert.wgsl")),
    ("forward.frag.wgsl", include_str!("../shaders/forward.frag.wgsl")),
    ("hair.vert.wgsl", include_str!("../shaders/hair.vert.wgsl")),
    ("hair.frag.wgsl", include_str!("../shaders/hair.frag.wgsl")),
    ("linear_depth.frag.wgsl", include_str!("../shaders/linear_depth.frag.wgsl")),
    ("ssao.frag.wgsl", include_str!("../shaders/ssao.frag.wgsl")),
    ("blur.frag.wgsl", include_str!("../shaders/blur.frag.wgsl")),
    ("sss_blur.frag.wgsl", include_str!("../shaders/sss_blur.frag.wgsl")),
    ("tonemapping.frag.wgsl", include_str!("../shaders/tonemapping.frag.wgsl")),
    ("final.frag.wgsl", include_str!("../shaders/final.frag.wgsl")),
    ("debug_depth.frag.wgsl", include_str!("../shaders/debug_depth.frag.wgsl")),
    ("debug_sphere.vert.wgsl", include_str!("../shaders/debug_sphere.vert.wgsl")),
    ("debug_sphere.frag.wgsl", include_str!("../shaders/debug_sphere.frag.wgsl")),
];

/// Every program the renderer compiles at initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProgramRole {
    Shadow,
    HairShadow,
    Forward,
    Hair,
    LinearDepth,
    Ssao,
    Blur,
    SssBlur,
    Tonemapping,
    Final,
    DebugShadowMap,
    DebugSphere,
}

impl ProgramRole {
    pub const ALL: [ProgramRole; 12] = [
        ProgramRole::Shadow,
        ProgramRole::HairShadow,
        ProgramRole::Forward,
        ProgramRole::Hair,
        ProgramRole::LinearDepth,
        ProgramRole::Ssao,
        ProgramRole::Blur,
        ProgramRole::SssBlur,
        ProgramRole::Tonemapping,
        ProgramRole::Final,
        ProgramRole::DebugShadowMap,
        ProgramRole::DebugSphere,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ProgramRole::Shadow => "shadow",
            ProgramRole::HairShadow => "hair_shadow",
            ProgramRole::Forward => "forward",
            ProgramRole::Hair => "hair",
            ProgramRole::LinearDepth => "linear_depth",
            ProgramRole::Ssao => "ssao",
            ProgramRole::Blur => "blur",
            ProgramRole::SssBlur => "sss_blur",
            ProgramRole::Tonemapping => "tonemapping",
            ProgramRole::Final => "final",
            ProgramRole::DebugShadowMap => "debug_shadow_map",
            ProgramRole::DebugSphere => "debug_sphere",
        }
    }

    /// Vertex and fragment stage file names.
    pub fn stages(self) -> (&'static str, &'static str) {
        match self {
            ProgramRole::Shadow => ("shadow.vert.wgsl", "shadow.frag.wgsl"),
            ProgramRole::HairShadow => ("hair.vert.wgsl", "shadow.frag.wgsl"),
            ProgramRole::Forward => ("forward.vert.wgsl", "forward.frag.wgsl"),
            ProgramRole::Hair => ("hair.vert.wgsl", "hair.frag.wgsl"),
            ProgramRole::LinearDepth => (FULLSCREEN_VERTEX, "linear_depth.frag.wgsl"),
            ProgramRole::Ssao => (FULLSCREEN_VERTEX, "ssao.frag.wgsl"),
            ProgramRole::Blur => (FULLSCREEN_VERTEX, "blur.frag.wgsl"),
            ProgramRole::SssBlur => (FULLSCREEN_VERTEX, "sss_blur.frag.wgsl"),
            ProgramRole::Tonemapping => (FULLSCREEN_VERTEX, "tonemapping.frag.wgsl"),
            ProgramRole::Final => (FULLSCREEN_VERTEX, "final.frag.wgsl"),
            ProgramRole::DebugShadowMap => (FULLSCREEN_VERTEX, "debug_depth.frag.wgsl"),
            ProgramRole::DebugSphere => ("debug_sphere.vert.wgsl", "debug_sphere.frag.wgsl"),
        }
    }
}

impl fmt::Display for ProgramRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ShaderSourceError {
    #[error("Failed to read shader {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No shader stage named '{0}'")]
    UnknownStage(String),
}

/// Resolves program sources, preferring files from an override directory.
#[derive(Debug, Clone, Default)]
pub struct ShaderLibrary {
    override_dir: Option<PathBuf>,
}

impl ShaderLibrary {
    /// Embedded sources only.
    pub fn embedded() -> Self {
        Self::default()
    }

    pub fn with_override_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            override_dir: Some(dir.into()),
        }
    }

    pub fn override_dir(&self) -> Option<&Path> {
        self.override_dir.as_deref()
    }

    pub fn stage_source(&self, file: &str) -> Result<String, ShaderSourceError> {
        if let Some(dir) = &self.override_dir {
            let path = dir.join(file);
            if path.is_file() {
                debug!(path = %path.display(), "Using shader override");
                return std::fs::read_to_string(&path)
                    .map_err(|source| ShaderSourceError::Io { path, source });
            }
        }
        EMBEDDED
            .iter()
            .find(|(name, _)| *name == file)
            .map(|(_, source)| source.to_string())
            .ok_or_else(|| ShaderSourceError::UnknownStage(file.to_string()))
    }

    pub fn program(&self, role: ProgramRole) -> Result<ProgramSource, ShaderSourceError> {
        let (vertex, fragment) = role.stages();
        Ok(ProgramSource::new(
            role.name(),
            self.stage_source(vertex)?,
            self.stage_source(fragment)?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflect::{ProgramInterface, SampleKind, UniformType};

    fn interface(role: ProgramRole) -> ProgramInterface {
        let source = ShaderLibrary::embedded().program(role).unwrap();
        ProgramInterface::reflect(&source.vertex, &source.fragment)
            .unwrap_or_else(|err| panic!("{role}: {err}"))
    }

    #[test]
    fn test_every_program_reflects() {
        for role in ProgramRole::ALL {
            interface(role);
        }
    }

    #[test]
    fn test_hair_program_interface() {
        let hair = interface(ProgramRole::Hair);
        assert!(hair.attributes.is_empty());
        let names: Vec<&str> = hair.textures.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["u_positions", "u_tangents", "u_directionalShadowDepthTex"]);
        assert_eq!(hair.uniform("u_displayMode").map(|u| u.ty), Some(UniformType::Int));

        let shadow = interface(ProgramRole::HairShadow);
        assert_eq!(shadow.textures.len(), 2);
        assert_eq!(shadow.uniform_block_size, hair.uniform_block_size);
    }

    #[test]
    fn test_forward_program_interface() {
        let forward = interface(ProgramRole::Forward);
        let locations: Vec<u32> = forward.attributes.iter().map(|a| a.location).collect();
        assert_eq!(locations, [0, 1, 2]);
        let shadow_map = forward.texture("u_directionalShadowDepthTex").unwrap();
        assert_eq!(shadow_map.sample, SampleKind::Depth);
        assert_eq!(shadow_map.binding, 2);
    }

    #[test]
    fn test_ssao_kernel_array() {
        let ssao = interface(ProgramRole::Ssao);
        assert_eq!(
            ssao.uniform("u_kernel").map(|u| u.ty),
            Some(UniformType::Vec4Array(256))
        );
    }

    #[test]
    fn test_override_dir_falls_back_to_embedded() {
        let dir = std::env::temp_dir().join(format!("strandfx-shaders-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("final.frag.wgsl"), "@fragment fn fs_main() {}").unwrap();

        let library = ShaderLibrary::with_override_dir(&dir);
        let source = library.program(ProgramRole::Final).unwrap();
        assert_eq!(source.fragment, "@fragment fn fs_main() {}");
        assert!(source.vertex.contains("vs_main"));
        assert!(matches!(
            library.stage_source("missing.wgsl"),
            Err(ShaderSourceError::UnknownStage(_))
        ));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
