//! Texture unit allocation.
//!
//! Draws name the textures they sample; the table packs them into the device's
//! texture units. Textures that are already bound keep their unit between
//! calls, so consecutive draws sharing inputs issue no bind calls for them.

use std::collections::BTreeMap;

use tracing::trace;

use crate::backend::{BackendError, GpuBackend};
use crate::resource::{GpuResource, ResourceError, ResourceId, Texture};

/// Texture id to texture unit.
pub type BindingMap = BTreeMap<ResourceId, u32>;

#[derive(Debug, thiserror::Error)]
pub enum BindingError {
    #[error("Requested {requested} textures but only {max_slots} texture units exist")]
    CapacityExceeded { requested: usize, max_slots: u32 },

    #[error("No free texture unit for texture {0}")]
    NoFreeSlot(ResourceId),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Which texture occupies each unit.
#[derive(Debug)]
pub struct TextureBindingTable {
    slots: Vec<Option<ResourceId>>,
}

impl TextureBindingTable {
    pub fn new(max_slots: u32) -> Self {
        Self {
            slots: vec![None; max_slots as usize],
        }
    }

    pub fn max_slots(&self) -> u32 {
        self.slots.len() as u32
    }

    pub fn slot_of(&self, texture: ResourceId) -> Option<u32> {
        self.slots
            .iter()
            .position(|s| *s == Some(texture))
            .map(|i| i as u32)
    }

    pub fn bound(&self, slot: u32) -> Option<ResourceId> {
        self.slots.get(slot as usize).copied().flatten()
    }

    /// Bind `textures` for one draw and return where each landed.
    ///
    /// Slot 0 stays reachable for uploads, so a request must leave at least one
    /// unit spare.
    pub fn replace_textures<B: GpuBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        textures: &[&Texture],
    ) -> Result<BindingMap, BindingError> {
        for texture in textures {
            texture.ensure_valid()?;
        }
        let mut requested: Vec<ResourceId> = Vec::with_capacity(textures.len());
        for texture in textures {
            if !requested.contains(&texture.id()) {
                requested.push(texture.id());
            }
        }
        if requested.len() >= self.slots.len() {
            return Err(BindingError::CapacityExceeded {
                requested: requested.len(),
                max_slots: self.max_slots(),
            });
        }

        let mut result = BindingMap::new();
        let mut claimed = vec![false; self.slots.len()];
        for id in &requested {
            if let Some(slot) = self.slot_of(*id) {
                result.insert(*id, slot);
                claimed[slot as usize] = true;
            }
        }

        for id in requested {
            if result.contains_key(&id) {
                continue;
            }
            let slot = claimed
                .iter()
                .position(|c| !c)
                .ok_or(BindingError::NoFreeSlot(id))?;
            claimed[slot] = true;
            backend.bind_texture(slot as u32, id)?;
            trace!(texture = %id, slot, "bound texture");
            self.slots[slot] = Some(id);
            result.insert(id, slot as u32);
        }
        Ok(result)
    }

    /// Bind `texture` to unit 0, the scratch unit used for uploads and
    /// parameter changes.
    pub fn bind_single<B: GpuBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        texture: &Texture,
    ) -> Result<(), BindingError> {
        texture.ensure_valid()?;
        if self.slots.first() == Some(&Some(texture.id())) {
            return Ok(());
        }
        backend.bind_texture(0, texture.id())?;
        if let Some(slot) = self.slots.first_mut() {
            *slot = Some(texture.id());
        }
        Ok(())
    }

    /// Drop `texture` from the table, e.g. when it is destroyed.
    pub fn forget(&mut self, texture: ResourceId) {
        for slot in &mut self.slots {
            if *slot == Some(texture) {
                *slot = None;
            }
        }
    }

    pub fn reset(&mut self) {
        self.slots.fill(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DeviceLimits, GpuCall, RecordingBackend};
    use crate::resource::{TextureDesc, TextureFormat};

    fn setup(units: u32) -> (RecordingBackend, TextureBindingTable) {
        let backend = RecordingBackend::with_limits(DeviceLimits {
            max_texture_units: units,
            ..DeviceLimits::default()
        });
        (backend, TextureBindingTable::new(units))
    }

    fn textures(backend: &mut RecordingBackend, n: usize) -> Vec<Texture> {
        (0..n)
            .map(|i| {
                let texture = Texture::new(TextureDesc::new_2d(format!("t{i}"), 4, 4, TextureFormat::Rgba8));
                backend.create_texture(texture.id(), texture.desc()).unwrap();
                texture
            })
            .collect()
    }

    fn bind_count(calls: &[GpuCall]) -> usize {
        calls
            .iter()
            .filter(|c| matches!(c, GpuCall::BindTexture { .. }))
            .count()
    }

    #[test]
    fn test_mapping_is_bijective_into_slots() {
        for n in 0..8 {
            let (mut backend, mut table) = setup(8);
            let owned = textures(&mut backend, n);
            let refs: Vec<&Texture> = owned.iter().collect();
            let map = table.replace_textures(&mut backend, &refs).unwrap();
            assert_eq!(map.len(), n);
            let mut slots: Vec<u32> = map.values().copied().collect();
            slots.sort_unstable();
            slots.dedup();
            assert_eq!(slots.len(), n);
            assert!(slots.iter().all(|s| *s < 8));
        }
    }

    #[test]
    fn test_repeated_request_is_stable_and_silent() {
        let (mut backend, mut table) = setup(8);
        let owned = textures(&mut backend, 3);
        let refs: Vec<&Texture> = owned.iter().collect();
        let first = table.replace_textures(&mut backend, &refs).unwrap();
        backend.clear_calls();
        let second = table.replace_textures(&mut backend, &refs).unwrap();
        assert_eq!(first, second);
        assert_eq!(bind_count(backend.calls()), 0);
    }

    #[test]
    fn test_already_bound_texture_keeps_its_slot() {
        let (mut backend, mut table) = setup(4);
        let owned = textures(&mut backend, 4);
        let first = table
            .replace_textures(&mut backend, &[&owned[0], &owned[1]])
            .unwrap();
        backend.clear_calls();
        let second = table
            .replace_textures(&mut backend, &[&owned[2], &owned[1]])
            .unwrap();
        assert_eq!(second[&owned[1].id()], first[&owned[1].id()]);
        assert_eq!(second[&owned[2].id()], 0);
        assert_eq!(
            backend.take_calls(),
            vec![GpuCall::BindTexture {
                unit: 0,
                texture: owned[2].id()
            }]
        );
    }

    #[test]
    fn test_capacity_error() {
        let (mut backend, mut table) = setup(4);
        let owned = textures(&mut backend, 5);
        let refs: Vec<&Texture> = owned.iter().collect();
        let err = table.replace_textures(&mut backend, &refs).unwrap_err();
        assert!(matches!(
            err,
            BindingError::CapacityExceeded {
                requested: 5,
                max_slots: 4
            }
        ));
        let err = table.replace_textures(&mut backend, &refs[..4]).unwrap_err();
        assert!(matches!(err, BindingError::CapacityExceeded { .. }));
        assert!(table.replace_textures(&mut backend, &refs[..3]).is_ok());
    }

    #[test]
    fn test_duplicates_share_a_slot() {
        let (mut backend, mut table) = setup(4);
        let owned = textures(&mut backend, 1);
        let map = table
            .replace_textures(&mut backend, &[&owned[0], &owned[0], &owned[0], &owned[0]])
            .unwrap();
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_destroyed_texture_is_rejected() {
        let (mut backend, mut table) = setup(4);
        let mut owned = textures(&mut backend, 1);
        owned[0].lifetime.invalidate();
        assert!(matches!(
            table.replace_textures(&mut backend, &[&owned[0]]),
            Err(BindingError::Resource(_))
        ));
        assert!(table.bind_single(&mut backend, &owned[0]).is_err());
    }

    #[test]
    fn test_bind_single_uses_slot_zero() {
        let (mut backend, mut table) = setup(4);
        let owned = textures(&mut backend, 2);
        table.replace_textures(&mut backend, &[&owned[0]]).unwrap();
        table.bind_single(&mut backend, &owned[1]).unwrap();
        assert_eq!(table.bound(0), Some(owned[1].id()));
        assert_eq!(table.slot_of(owned[0].id()), None);
    }
}
