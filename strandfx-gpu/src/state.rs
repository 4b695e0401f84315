//! Draw state as a value, and the cache that diffs it against the driver.
//!
//! Passes describe the complete fixed-function state they need as a
//! [`DrawState`]. [`DrawStateCache::apply`] compares it with the last applied
//! state and issues only the backend calls for the groups that changed.

use tracing::trace;

use crate::backend::{Capability, GpuBackend, StencilFace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareFunc {
    Never,
    Less,
    Equal,
    LessOrEqual,
    Greater,
    NotEqual,
    GreaterOrEqual,
    AlwaysPass,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthState {
    pub test: CompareFunc,
    pub write: bool,
}

impl DepthState {
    /// The test is only observable when something can fail or be written.
    pub fn needs_test(&self) -> bool {
        self.test != CompareFunc::AlwaysPass || self.write
    }
}

impl Default for DepthState {
    fn default() -> Self {
        Self {
            test: CompareFunc::Less,
            write: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StencilOp {
    Keep,
    Zero,
    Replace,
    Increment,
    IncrementWrap,
    Decrement,
    DecrementWrap,
    Invert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilOps {
    pub stencil_fail: StencilOp,
    pub depth_fail: StencilOp,
    pub pass: StencilOp,
}

impl StencilOps {
    pub const KEEP: Self = Self {
        stencil_fail: StencilOp::Keep,
        depth_fail: StencilOp::Keep,
        pass: StencilOp::Keep,
    };

    /// Keep on failure, `pass` when both tests pass.
    pub fn on_pass(pass: StencilOp) -> Self {
        Self { pass, ..Self::KEEP }
    }
}

impl Default for StencilOps {
    fn default() -> Self {
        Self::KEEP
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilFaceState {
    pub test: CompareFunc,
    pub ops: StencilOps,
}

impl StencilFaceState {
    pub const NOOP: Self = Self {
        test: CompareFunc::AlwaysPass,
        ops: StencilOps::KEEP,
    };

    /// Always passes and never writes.
    pub fn is_noop(&self) -> bool {
        *self == Self::NOOP
    }
}

impl Default for StencilFaceState {
    fn default() -> Self {
        Self::NOOP
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilState {
    pub reference: u32,
    pub compare_mask: u32,
    pub write_mask: u32,
    pub front: StencilFaceState,
    pub back: StencilFaceState,
}

impl StencilState {
    /// Same test and ops on both faces.
    pub fn both(face: StencilFaceState, reference: u32, compare_mask: u32, write_mask: u32) -> Self {
        Self {
            reference,
            compare_mask,
            write_mask,
            front: face,
            back: face,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !(self.front.is_noop() && self.back.is_noop())
    }
}

impl Default for StencilState {
    fn default() -> Self {
        Self::both(StencilFaceState::NOOP, 0, 0xffff_ffff, 0xffff_ffff)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullFace {
    Front,
    Back,
    FrontAndBack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullMode {
    None,
    Front,
    Back,
    FrontAndBack,
}

impl CullMode {
    pub fn face(self) -> Option<CullFace> {
        match self {
            CullMode::None => None,
            CullMode::Front => Some(CullFace::Front),
            CullMode::Back => Some(CullFace::Back),
            CullMode::FrontAndBack => Some(CullFace::FrontAndBack),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorMask {
    pub r: bool,
    pub g: bool,
    pub b: bool,
    pub a: bool,
}

impl ColorMask {
    pub const ALL: Self = Self {
        r: true,
        g: true,
        b: true,
        a: true,
    };
    pub const NONE: Self = Self {
        r: false,
        g: false,
        b: false,
        a: false,
    };
}

impl Default for ColorMask {
    fn default() -> Self {
        Self::ALL
    }
}

/// Complete fixed-function state for a draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DrawState {
    pub depth: DepthState,
    pub stencil: StencilState,
    pub culling: CullMode,
    pub dithering: bool,
    pub color_mask: ColorMask,
}

impl Default for DrawState {
    fn default() -> Self {
        Self {
            depth: DepthState::default(),
            stencil: StencilState::default(),
            culling: CullMode::Back,
            dithering: false,
            color_mask: ColorMask::ALL,
        }
    }
}

impl DrawState {
    /// Full-screen passes: no depth, no culling.
    pub fn fullscreen() -> Self {
        Self {
            depth: DepthState {
                test: CompareFunc::AlwaysPass,
                write: false,
            },
            culling: CullMode::None,
            ..Self::default()
        }
    }

    pub fn with_depth(mut self, test: CompareFunc, write: bool) -> Self {
        self.depth = DepthState { test, write };
        self
    }

    pub fn with_stencil(mut self, stencil: StencilState) -> Self {
        self.stencil = stencil;
        self
    }

    pub fn with_culling(mut self, culling: CullMode) -> Self {
        self.culling = culling;
        self
    }

    pub fn with_color_mask(mut self, mask: ColorMask) -> Self {
        self.color_mask = mask;
        self
    }
}

/// Issue the backend calls that take the driver from `current` to `desired`.
/// `None` means the driver state is unknown and everything is set.
pub fn sync_draw_state<B: GpuBackend + ?Sized>(
    backend: &mut B,
    desired: &DrawState,
    current: Option<&DrawState>,
) -> DrawState {
    let changed = |f: &dyn Fn(&DrawState) -> bool| current.is_none_or(|c| f(c));

    if changed(&|c| c.depth != desired.depth) {
        sync_depth(backend, &desired.depth);
    }
    if changed(&|c| c.stencil != desired.stencil) {
        sync_stencil(backend, &desired.stencil);
    }
    if changed(&|c| c.dithering != desired.dithering) {
        backend.set_capability(Capability::Dither, desired.dithering);
    }
    if changed(&|c| c.culling != desired.culling) {
        match desired.culling.face() {
            None => backend.set_capability(Capability::CullFace, false),
            Some(face) => {
                backend.set_capability(Capability::CullFace, true);
                backend.cull_face(face);
            }
        }
    }
    if changed(&|c| c.color_mask != desired.color_mask) {
        backend.color_mask(desired.color_mask);
    }
    *desired
}

fn sync_depth<B: GpuBackend + ?Sized>(backend: &mut B, depth: &DepthState) {
    backend.set_capability(Capability::DepthTest, depth.needs_test());
    backend.depth_func(depth.test);
    backend.depth_mask(depth.write);
}

fn sync_stencil<B: GpuBackend + ?Sized>(backend: &mut B, stencil: &StencilState) {
    backend.set_capability(Capability::StencilTest, stencil.is_enabled());

    let (front, back) = (&stencil.front, &stencil.back);
    if front.test == back.test {
        backend.stencil_func(
            StencilFace::FrontAndBack,
            front.test,
            stencil.reference,
            stencil.compare_mask,
        );
    } else {
        backend.stencil_func(StencilFace::Front, front.test, stencil.reference, stencil.compare_mask);
        backend.stencil_func(StencilFace::Back, back.test, stencil.reference, stencil.compare_mask);
    }

    backend.stencil_mask(stencil.write_mask);

    if front.ops == back.ops {
        backend.stencil_op(StencilFace::FrontAndBack, front.ops);
    } else {
        backend.stencil_op(StencilFace::Front, front.ops);
        backend.stencil_op(StencilFace::Back, back.ops);
    }
}

/// Last state pushed to the driver.
#[derive(Debug, Default)]
pub struct DrawStateCache {
    current: Option<DrawState>,
}

impl DrawStateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply<B: GpuBackend + ?Sized>(&mut self, backend: &mut B, desired: &DrawState) {
        if self.current.as_ref() == Some(desired) {
            return;
        }
        trace!("Syncing draw state");
        self.current = Some(sync_draw_state(backend, desired, self.current.as_ref()));
    }

    /// Push every group regardless of the cached state.
    pub fn apply_forced<B: GpuBackend + ?Sized>(&mut self, backend: &mut B, desired: &DrawState) {
        self.current = Some(sync_draw_state(backend, desired, None));
    }

    pub fn current(&self) -> Option<&DrawState> {
        self.current.as_ref()
    }

    /// Forget the cached state, e.g. after external code touched the driver.
    pub fn invalidate(&mut self) {
        self.current = None;
    }
}
