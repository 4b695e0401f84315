use std::collections::BTreeSet;

use strandfx_data::World;

use crate::backend::GpuBackend;
use crate::camera::FrameCamera;
use crate::config::Config;
use crate::device::Device;
use crate::frame_graph::FrameGraphError;
use crate::frame_graph::resource::GraphResource;
use crate::frame_resources::{FrameResources, TextureRole};
use crate::passes::PassError;

/// Everything a pass may touch while it runs.
pub struct PassContext<'a, B: GpuBackend> {
    pub device: &'a mut Device<B>,
    pub resources: &'a FrameResources,
    pub config: &'a Config,
    pub world: &'a World,
    pub camera: &'a FrameCamera,
}

/// Trait for frame graph passes
pub trait Pass<B: GpuBackend> {
    fn name(&self) -> &str;

    fn execute(&self, ctx: &mut PassContext<'_, B>) -> Result<(), PassError>;
}

/// Pass builder for declarative pass construction
pub struct PassBuilder<'p, B: GpuBackend> {
    name: String,
    reads: Vec<GraphResource>,
    writes: Vec<GraphResource>,
    pass: Option<Box<dyn Pass<B> + 'p>>,
}

impl<'p, B: GpuBackend> PassBuilder<'p, B> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reads: Vec::new(),
            writes: Vec::new(),
            pass: None,
        }
    }

    pub fn read(mut self, role: TextureRole) -> Self {
        self.reads.push(role.into());
        self
    }

    pub fn write(mut self, role: TextureRole) -> Self {
        self.writes.push(role.into());
        self
    }

    pub fn read_write(self, role: TextureRole) -> Self {
        self.read(role).write(role)
    }

    pub fn write_backbuffer(mut self) -> Self {
        self.writes.push(GraphResource::Backbuffer);
        self
    }

    pub fn with_pass(mut self, pass: impl Pass<B> + 'p) -> Self {
        self.pass = Some(Box::new(pass));
        self
    }

    pub fn build(self) -> Result<PassNode<'p, B>, FrameGraphError> {
        let pass = self
            .pass
            .ok_or_else(|| FrameGraphError::MissingPass(self.name.clone()))?;
        Ok(PassNode {
            name: self.name,
            reads: self.reads.into_iter().collect(),
            writes: self.writes.into_iter().collect(),
            pass,
        })
    }
}

/// Internal pass node representation
pub struct PassNode<'p, B: GpuBackend> {
    name: String,
    reads: BTreeSet<GraphResource>,
    writes: BTreeSet<GraphResource>,
    pass: Box<dyn Pass<B> + 'p>,
}

impl<'p, B: GpuBackend> PassNode<'p, B> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn reads(&self) -> &BTreeSet<GraphResource> {
        &self.reads
    }

    pub fn writes(&self) -> &BTreeSet<GraphResource> {
        &self.writes
    }

    pub fn pass(&self) -> &dyn Pass<B> {
        self.pass.as_ref()
    }

    /// True when `other` consumes something this pass produces.
    pub fn feeds(&self, other: &PassNode<'_, B>) -> bool {
        !self.writes.is_disjoint(&other.reads)
    }
}
