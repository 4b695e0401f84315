//! StrandFX Data Crate
//!
//! CPU-side data processing for the renderer: strand file parsing, hair geometry
//! preparation, the typed entity/component store and procedural debug shapes.
//! This crate is GPU-agnostic; uploads happen in strandfx-gpu.

pub mod ecs;
pub mod hair;
pub mod shapes;
pub mod tfx;

pub use ecs::{Entity, Query, World};
pub use hair::{HairError, PreparedHair, StrandLayout, StrandSet, TexelExtent};
pub use shapes::{Shape, generate_sphere};
pub use tfx::{TfxError, TfxFile, TfxHeader};
