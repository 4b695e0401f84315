//! Ordered list of passes with declared inputs and outputs.
//!
//! The graph runs passes in the order they were added. Building it checks
//! that every texture a pass reads is either persistent or written by an
//! earlier pass.

mod execution;
pub mod pass;
pub mod resource;

use std::collections::BTreeMap;

use tracing::debug_span;

use crate::backend::GpuBackend;
use crate::frame_graph::pass::PassNode;
use crate::frame_graph::resource::{ResourceInfo, ResourceState};
use crate::passes::PassError;

pub use pass::{Pass, PassBuilder, PassContext};
pub use resource::GraphResource;

/// Frame graph builder
pub struct FrameGraph<'p, B: GpuBackend> {
    passes: Vec<PassNode<'p, B>>,
    resource_info: BTreeMap<GraphResource, ResourceInfo>,
}

impl<'p, B: GpuBackend> Default for FrameGraph<'p, B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'p, B: GpuBackend> FrameGraph<'p, B> {
    pub fn new() -> Self {
        Self {
            passes: Vec::new(),
            resource_info: BTreeMap::new(),
        }
    }

    pub fn add_pass(&mut self, builder: PassBuilder<'p, B>) -> Result<&mut Self, FrameGraphError> {
        let pass = builder.build()?;

        for read in pass.reads() {
            let info = self.resource_info.entry(*read).or_default();
            info.state = info.state.with_read();
        }
        for write in pass.writes() {
            let info = self.resource_info.entry(*write).or_default();
            info.state = info.state.with_write();
        }

        self.passes.push(pass);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Build and validate the frame graph
    pub fn build(mut self) -> Result<ExecutableFrameGraph<'p, B>, FrameGraphError> {
        let execution_order = execution::validate_order(&self.passes)?;

        for (idx, &pass_idx) in execution_order.iter().enumerate() {
            let pass = &self.passes[pass_idx];
            for resource in pass.reads().iter().chain(pass.writes()) {
                if let Some(info) = self.resource_info.get_mut(resource) {
                    info.touch(idx);
                }
            }
        }

        Ok(ExecutableFrameGraph {
            passes: self.passes,
            execution_order,
            resource_info: self.resource_info,
        })
    }
}

/// Executable frame graph ready for execution
pub struct ExecutableFrameGraph<'p, B: GpuBackend> {
    passes: Vec<PassNode<'p, B>>,
    execution_order: Vec<usize>,
    resource_info: BTreeMap<GraphResource, ResourceInfo>,
}

impl<'p, B: GpuBackend> ExecutableFrameGraph<'p, B> {
    /// Run every pass. The first failure aborts the frame.
    pub fn execute(&self, ctx: &mut PassContext<'_, B>) -> Result<(), FrameGraphError> {
        for &pass_idx in &self.execution_order {
            let node = &self.passes[pass_idx];
            let _span = debug_span!("pass", name = node.name()).entered();
            node.pass()
                .execute(ctx)
                .map_err(|source| FrameGraphError::Pass {
                    name: node.name().to_string(),
                    source: Box::new(source),
                })?;
        }
        Ok(())
    }

    /// Pass names in execution order.
    pub fn pass_names(&self) -> Vec<&str> {
        self.execution_order
            .iter()
            .map(|&idx| self.passes[idx].name())
            .collect()
    }

    pub fn resource_state(&self, resource: GraphResource) -> Option<ResourceState> {
        self.resource_info.get(&resource).map(|info| info.state)
    }

    /// First and last pass index touching `resource`.
    pub fn resource_lifetime(&self, resource: GraphResource) -> Option<(usize, usize)> {
        self.resource_info
            .get(&resource)
            .map(|info| (info.first_used_pass, info.last_used_pass))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameGraphError {
    #[error("Pass '{pass}' reads {resource} but no earlier pass writes it")]
    MissingProducer {
        pass: String,
        resource: GraphResource,
    },

    #[error("Pass '{0}' was added without an implementation")]
    MissingPass(String),

    #[error("Pass '{name}' failed: {source}")]
    Pass {
        name: String,
        #[source]
        source: Box<PassError>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;
    use crate::camera::Camera;
    use crate::config::Config;
    use crate::device::Device;
    use crate::frame_resources::{FrameResources, TextureRole};
    use std::cell::RefCell;
    use strandfx_data::World;

    struct Probe<'l> {
        name: &'static str,
        log: &'l RefCell<Vec<&'static str>>,
        fail: bool,
    }

    impl<'l> Pass<RecordingBackend> for Probe<'l> {
        fn name(&self) -> &str {
            self.name
        }

        fn execute(&self, _ctx: &mut PassContext<'_, RecordingBackend>) -> Result<(), PassError> {
            self.log.borrow_mut().push(self.name);
            if self.fail {
                Err(PassError::MissingMaterial("probe".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn probe<'l>(name: &'static str, log: &'l RefCell<Vec<&'static str>>) -> Probe<'l> {
        Probe { name, log, fail: false }
    }

    #[test]
    fn test_missing_producer_is_rejected() {
        let log = RefCell::new(Vec::new());
        let mut graph: FrameGraph<'_, RecordingBackend> = FrameGraph::new();
        graph
            .add_pass(
                PassBuilder::new("tonemap")
                    .read(TextureRole::ForwardColor)
                    .write(TextureRole::Tonemapped)
                    .with_pass(probe("tonemap", &log)),
            )
            .unwrap();
        let err = graph.build().err().unwrap();
        assert!(matches!(
            err,
            FrameGraphError::MissingProducer {
                resource: GraphResource::Texture(TextureRole::ForwardColor),
                ..
            }
        ));
    }

    #[test]
    fn test_persistent_reads_need_no_producer() {
        let log = RefCell::new(Vec::new());
        let mut graph: FrameGraph<'_, RecordingBackend> = FrameGraph::new();
        graph
            .add_pass(
                PassBuilder::new("forward")
                    .read(TextureRole::ShadowDepth)
                    .write(TextureRole::ForwardColor)
                    .with_pass(probe("forward", &log)),
            )
            .unwrap();
        assert!(graph.build().is_ok());
    }

    #[test]
    fn test_builder_without_pass_fails() {
        let mut graph: FrameGraph<'_, RecordingBackend> = FrameGraph::new();
        assert!(matches!(
            graph.add_pass(PassBuilder::new("empty")),
            Err(FrameGraphError::MissingPass(_))
        ));
    }

    #[test]
    fn test_executes_in_insertion_order_and_stops_on_failure() {
        let log = RefCell::new(Vec::new());
        let mut graph: FrameGraph<'_, RecordingBackend> = FrameGraph::new();
        graph
            .add_pass(PassBuilder::new("a").write(TextureRole::ForwardColor).with_pass(probe("a", &log)))
            .unwrap()
            .add_pass(
                PassBuilder::new("b")
                    .read(TextureRole::ForwardColor)
                    .write(TextureRole::Tonemapped)
                    .with_pass(Probe { name: "b", log: &log, fail: true }),
            )
            .unwrap()
            .add_pass(
                PassBuilder::new("c")
                    .read(TextureRole::Tonemapped)
                    .write_backbuffer()
                    .with_pass(probe("c", &log)),
            )
            .unwrap();
        let graph = graph.build().unwrap();
        assert_eq!(graph.pass_names(), ["a", "b", "c"]);
        assert_eq!(
            graph.resource_state(TextureRole::ForwardColor.into()),
            Some(ResourceState::ReadWrite)
        );
        assert_eq!(graph.resource_lifetime(TextureRole::Tonemapped.into()), Some((1, 2)));

        let mut device = Device::new(RecordingBackend::new());
        let resources = FrameResources::new();
        let config = Config::default();
        let world = World::new();
        let camera = Camera::new(Default::default(), Default::default(), Default::default()).frame();
        let mut ctx = PassContext {
            device: &mut device,
            resources: &resources,
            config: &config,
            world: &world,
            camera: &camera,
        };
        let err = graph.execute(&mut ctx).unwrap_err();
        assert!(matches!(err, FrameGraphError::Pass { ref name, .. } if name == "b"));
        assert_eq!(*log.borrow(), ["a", "b"]);
    }
}
