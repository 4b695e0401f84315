use std::fmt;

use crate::frame_resources::TextureRole;

/// Something a pass reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GraphResource {
    Texture(TextureRole),
    Backbuffer,
}

impl GraphResource {
    /// Valid before any pass in the frame has run.
    pub fn is_persistent(self) -> bool {
        match self {
            GraphResource::Texture(role) => role.is_persistent(),
            GraphResource::Backbuffer => false,
        }
    }
}

impl From<TextureRole> for GraphResource {
    fn from(role: TextureRole) -> Self {
        GraphResource::Texture(role)
    }
}

impl fmt::Display for GraphResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphResource::Texture(role) => write!(f, "{role}"),
            GraphResource::Backbuffer => f.write_str("backbuffer"),
        }
    }
}

/// Resource state tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    Undefined,
    Read,
    Write,
    ReadWrite,
}

impl ResourceState {
    pub fn with_read(self) -> Self {
        match self {
            ResourceState::Undefined | ResourceState::Read => ResourceState::Read,
            ResourceState::Write | ResourceState::ReadWrite => ResourceState::ReadWrite,
        }
    }

    pub fn with_write(self) -> Self {
        match self {
            ResourceState::Undefined | ResourceState::Write => ResourceState::Write,
            ResourceState::Read | ResourceState::ReadWrite => ResourceState::ReadWrite,
        }
    }
}

/// Resource metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceInfo {
    pub state: ResourceState,
    pub first_used_pass: usize,
    pub last_used_pass: usize,
}

impl ResourceInfo {
    pub fn new() -> Self {
        Self {
            state: ResourceState::Undefined,
            first_used_pass: usize::MAX,
            last_used_pass: 0,
        }
    }

    pub fn touch(&mut self, pass_index: usize) {
        self.first_used_pass = self.first_used_pass.min(pass_index);
        self.last_used_pass = self.last_used_pass.max(pass_index);
    }
}

impl Default for ResourceInfo {
    fn default() -> Self {
        Self::new()
    }
}
