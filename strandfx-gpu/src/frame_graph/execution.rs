use std::collections::BTreeSet;

use crate::backend::GpuBackend;
use crate::frame_graph::FrameGraphError;
use crate::frame_graph::pass::PassNode;
use crate::frame_graph::resource::GraphResource;

/// Check that every read is satisfied by a persistent resource or an earlier
/// write. Passes run in insertion order, so the order is returned unchanged.
pub fn validate_order<B: GpuBackend>(passes: &[PassNode<'_, B>]) -> Result<Vec<usize>, FrameGraphError> {
    let mut produced: BTreeSet<GraphResource> = BTreeSet::new();
    for pass in passes {
        for &resource in pass.reads() {
            if !resource.is_persistent() && !produced.contains(&resource) {
                return Err(FrameGraphError::MissingProducer {
                    pass: pass.name().to_string(),
                    resource,
                });
            }
        }
        produced.extend(pass.writes().iter().copied());
    }
    Ok((0..passes.len()).collect())
}
