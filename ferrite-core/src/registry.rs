use std::collections::BTreeMap;
use std::fmt;

use crate::device::{Device, Extent2D};
use crate::uniform::Transform;
use crate::{FerriteError, FerriteResult};

/// Opaque identifier handed to the application. Never reused within one table.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Handle(u32);

impl Handle {
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub struct HandleTable<T> {
    entries: BTreeMap<Handle, T>,
    next: u32,
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self { entries: BTreeMap::new(), next: 0 }
    }
}

impl<T> HandleTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// The handle the next `insert` will return.
    pub fn next_handle(&self) -> Handle {
        Handle(self.next)
    }

    pub fn insert(&mut self, value: T) -> FerriteResult<Handle> {
        let handle = Handle(self.next);
        self.next = self.next.checked_add(1).ok_or_else(|| {
            FerriteError::ResourceCreationFailed("Handle space exhausted".to_string())
        })?;
        self.entries.insert(handle, value);
        Ok(handle)
    }

    pub fn get(&self, handle: Handle) -> FerriteResult<&T> {
        self.entries.get(&handle).ok_or(FerriteError::UnknownHandle(handle))
    }

    pub fn get_mut(&mut self, handle: Handle) -> FerriteResult<&mut T> {
        self.entries.get_mut(&handle).ok_or(FerriteError::UnknownHandle(handle))
    }

    pub fn remove(&mut self, handle: Handle) -> FerriteResult<T> {
        self.entries.remove(&handle).ok_or(FerriteError::UnknownHandle(handle))
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.entries.contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle, &T)> {
        self.entries.iter().map(|(handle, value)| (*handle, value))
    }
}

pub struct VertexBuffer<D: Device> {
    pub buffer: D::Buffer,
    pub vertex_count: u32,
}

pub struct Texture<D: Device> {
    pub texture: D::Texture,
    pub extent: Extent2D,
}

/// A drawable pairing of one vertex buffer and one texture, with its own descriptor set
/// and uniform slot. `transform` is the host copy; each frame copies it into that
/// frame's uniform region when recording.
pub struct Mesh<D: Device> {
    pub vertex_buffer: Handle,
    pub texture: Handle,
    pub descriptor_set: D::DescriptorSet,
    pub uniform_slot: u32,
    pub transform: Transform,
}

/// Field order is teardown order: meshes (descriptor sets) before the buffers and
/// textures they reference.
pub struct ResourceRegistry<D: Device> {
    pub meshes: HandleTable<Mesh<D>>,
    pub vertex_buffers: HandleTable<VertexBuffer<D>>,
    pub textures: HandleTable<Texture<D>>,
}

impl<D: Device> Default for ResourceRegistry<D> {
    fn default() -> Self {
        Self {
            meshes: HandleTable::new(),
            vertex_buffers: HandleTable::new(),
            textures: HandleTable::new(),
        }
    }
}

impl<D: Device> ResourceRegistry<D> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mesh_using_texture(&self, texture: Handle) -> Option<Handle> {
        self.meshes
            .iter()
            .find(|(_, mesh)| mesh.texture == texture)
            .map(|(handle, _)| handle)
    }

    pub fn mesh_using_vertex_buffer(&self, vertex_buffer: Handle) -> Option<Handle> {
        self.meshes
            .iter()
            .find(|(_, mesh)| mesh.vertex_buffer == vertex_buffer)
            .map(|(handle, _)| handle)
    }

    /// Every mesh with its vertex buffer, in creation order.
    pub fn draw_list(&self) -> impl Iterator<Item = (&Mesh<D>, &VertexBuffer<D>)> {
        self.meshes.iter().filter_map(|(_, mesh)| {
            self.vertex_buffers
                .get(mesh.vertex_buffer)
                .ok()
                .map(|vertex_buffer| (mesh, vertex_buffer))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn handles_are_distinct_and_never_reused() {
        let mut table = HandleTable::new();
        let mut seen = HashSet::new();
        for i in 0..100u32 {
            let handle = table.insert(i).unwrap();
            assert!(seen.insert(handle), "duplicate handle {}", handle);
        }
        assert_eq!(table.len(), 100);

        let first = Handle(0);
        assert_eq!(table.remove(first).unwrap(), 0);
        let next = table.insert(100).unwrap();
        assert!(!seen.contains(&next));
        assert_eq!(next.index(), 100);
    }

    #[test]
    fn unknown_handles_are_reported() {
        let mut table: HandleTable<&str> = HandleTable::new();
        let handle = table.insert("only").unwrap();
        table.remove(handle).unwrap();

        assert!(matches!(table.get(handle), Err(FerriteError::UnknownHandle(h)) if h == handle));
        assert!(matches!(table.remove(handle), Err(FerriteError::UnknownHandle(_))));
        assert!(table.is_empty());
    }

    #[test]
    fn iteration_follows_creation_order() {
        let mut table = HandleTable::new();
        for name in ["a", "b", "c"] {
            table.insert(name).unwrap();
        }
        let names: Vec<_> = table.iter().map(|(_, name)| *name).collect();
        assert_eq!(names, ["a", "b", "c"]);
    }
}
