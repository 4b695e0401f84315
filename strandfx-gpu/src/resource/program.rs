//! Shader programs: WGSL vertex and fragment stages plus their reflected interface.

use std::fmt;

use super::{Lifetime, ResourceError, impl_gpu_resource};
use crate::backend::BackendError;
use crate::binding::BindingError;
use crate::reflect::{ProgramInterface, ReflectError, UniformType};
use crate::resource::ResourceKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

/// Source text for both stages. Each stage is a complete WGSL module whose entry
/// point is `vs_main` or `fs_main`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramSource {
    pub name: String,
    pub vertex: String,
    pub fragment: String,
}

impl ProgramSource {
    pub fn new(name: impl Into<String>, vertex: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vertex: vertex.into(),
            fragment: fragment.into(),
        }
    }

    pub fn stage(&self, stage: ShaderStage) -> &str {
        match stage {
            ShaderStage::Vertex => &self.vertex,
            ShaderStage::Fragment => &self.fragment,
        }
    }
}

/// One compiler message, with its 1-based source line when known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub line: Option<u32>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileFailure {
    pub stage: ShaderStage,
    pub diagnostics: Vec<Diagnostic>,
}

/// Interleaves diagnostics with the source lines they point at:
///
/// ```text
/// > let x = y;
///   L12: no definition in scope for identifier: 'y'
/// ```
pub fn format_diagnostics(source: &str, diagnostics: &[Diagnostic]) -> String {
    let lines: Vec<&str> = source.lines().collect();
    let mut out = String::new();
    for diagnostic in diagnostics {
        match diagnostic.line {
            Some(line) => {
                let text = lines
                    .get(line.saturating_sub(1) as usize)
                    .map(|l| l.trim())
                    .unwrap_or("");
                out.push_str(&format!("> {text}\n  L{line}: {}\n", diagnostic.message));
            }
            None => out.push_str(&format!("  {}\n", diagnostic.message)),
        }
    }
    out
}

#[derive(Debug, thiserror::Error)]
pub enum ShaderError {
    #[error("Program '{program}' failed to compile its {stage} stage:\n{log}")]
    Compile {
        program: String,
        stage: ShaderStage,
        log: String,
    },

    #[error("Program '{program}': {source}")]
    Reflection {
        program: String,
        #[source]
        source: ReflectError,
    },

    #[error("Program '{program}' has no uniform named '{name}'")]
    MissingUniform { program: String, name: String },

    #[error("Program '{program}' uniform '{name}' is {expected:?}, got {actual}")]
    TypeMismatch {
        program: String,
        name: String,
        expected: UniformType,
        actual: &'static str,
    },

    #[error("Program '{program}' uniform '{name}' is not a sampler")]
    NotASampler { program: String, name: String },

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error(transparent)]
    Binding(#[from] BindingError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// A linked program. Compilation failure leaves no program behind, so a live
/// `ShaderProgram` is always usable until destroyed.
#[derive(Debug)]
pub struct ShaderProgram {
    pub(crate) lifetime: Lifetime,
    name: String,
    interface: ProgramInterface,
}

impl_gpu_resource!(ShaderProgram, ResourceKind::ShaderProgram);

impl ShaderProgram {
    pub(crate) fn new(name: &str, interface: ProgramInterface) -> Self {
        Self {
            lifetime: Lifetime::new(),
            name: name.to_string(),
            interface,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interface(&self) -> &ProgramInterface {
        &self.interface
    }

    pub fn has_uniform(&self, name: &str) -> bool {
        self.interface.uniform(name).is_some()
    }

    pub fn attribute_location(&self, name: &str) -> Option<u32> {
        self.interface.attribute(name).map(|a| a.location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_diagnostics_quotes_source_line() {
        let source = "fn a() {}\n  let x = y;\nfn b() {}";
        let log = format_diagnostics(
            source,
            &[
                Diagnostic {
                    line: Some(2),
                    message: "unknown identifier 'y'".into(),
                },
                Diagnostic {
                    line: None,
                    message: "1 error".into(),
                },
            ],
        );
        assert_eq!(log, "> let x = y;\n  L2: unknown identifier 'y'\n  1 error\n");
    }

    #[test]
    fn test_format_diagnostics_tolerates_out_of_range_line() {
        let log = format_diagnostics(
            "one line",
            &[Diagnostic {
                line: Some(40),
                message: "eof".into(),
            }],
        );
        assert_eq!(log, "> \n  L40: eof\n");
    }
}
