//! Geometry and texture providers
//!
//! Meshes and textures are owned by the surrounding application. The core only
//! looks them up by name and binds the returned handles; it never touches their
//! contents. [`ResourceRegistry`] is the explicitly owned implementation handed
//! to the renderer each frame.

use std::collections::HashMap;

use crate::render::api::SubmeshRange;
use crate::render::resources::TextureDesc;

/// Opaque handle to a GPU texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub u64);

/// Opaque handle to a GPU buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(pub u64);

/// Vertex and index buffers of one mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshBuffers {
    /// Vertex buffer
    pub vertex_buffer: BufferHandle,
    /// Index buffer (32-bit indices)
    pub index_buffer: BufferHandle,
    /// Bytes per vertex
    pub vertex_stride: u32,
    /// Total index count
    pub index_count: u32,
}

impl MeshBuffers {
    /// Range covering every index of the mesh
    pub fn full_range(&self) -> SubmeshRange {
        SubmeshRange {
            vertex_start: 0,
            vertex_count: 0,
            index_start: 0,
            index_count: self.index_count,
        }
    }
}

/// Looks up GPU-resident meshes by stable name
pub trait GeometryProvider {
    /// Mesh registered under `name`
    fn mesh(&self, name: &str) -> Option<&MeshBuffers>;
}

/// Looks up and creates textures
pub trait TextureProvider {
    /// Texture registered under `name`
    fn texture(&self, name: &str) -> Option<TextureHandle>;

    /// Create (or recreate) a renderer-owned texture named `name`
    ///
    /// Recreating an existing name returns a fresh handle; the backend is
    /// expected to release the old one once no frame references it.
    fn create_texture(&mut self, name: &str, desc: TextureDesc) -> TextureHandle;
}

/// Name-keyed registry of meshes and textures
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    meshes: HashMap<String, MeshBuffers>,
    textures: HashMap<String, (TextureHandle, Option<TextureDesc>)>,
    next_handle: u64,
}

impl ResourceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a mesh
    pub fn register_mesh(&mut self, name: impl Into<String>, mesh: MeshBuffers) {
        let name = name.into();
        log::debug!("Registered mesh '{}' ({} indices)", name, mesh.index_count);
        self.meshes.insert(name, mesh);
    }

    /// Register an application texture (loaded elsewhere) and return its handle
    pub fn register_texture(&mut self, name: impl Into<String>) -> TextureHandle {
        let handle = self.next_texture_handle();
        self.textures.insert(name.into(), (handle, None));
        handle
    }

    /// Description of a renderer-created texture, for the backend to allocate
    pub fn texture_desc(&self, name: &str) -> Option<TextureDesc> {
        self.textures.get(name).and_then(|(_, desc)| *desc)
    }

    /// Number of registered meshes
    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    fn next_texture_handle(&mut self) -> TextureHandle {
        self.next_handle += 1;
        TextureHandle(self.next_handle)
    }
}

impl GeometryProvider for ResourceRegistry {
    fn mesh(&self, name: &str) -> Option<&MeshBuffers> {
        self.meshes.get(name)
    }
}

impl TextureProvider for ResourceRegistry {
    fn texture(&self, name: &str) -> Option<TextureHandle> {
        self.textures.get(name).map(|(handle, _)| *handle)
    }

    fn create_texture(&mut self, name: &str, desc: TextureDesc) -> TextureHandle {
        let handle = self.next_texture_handle();
        log::debug!(
            "Created texture '{}' {:?} {}x{}x{}",
            name,
            desc.format,
            desc.width,
            desc.height,
            desc.layers
        );
        self.textures.insert(name.to_string(), (handle, Some(desc)));
        handle
    }
}
