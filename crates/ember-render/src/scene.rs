//! Scene assets and the GPU state that survives swapchain rebuilds.

use std::path::{Path, PathBuf};

use ash::vk;
use ember_core::{Mesh, TextureData};
use ember_gpu::descriptors::mesh_set_layout;
use ember_gpu::shader::load_spirv;
use ember_gpu::{
    CommandPool, DescriptorSetLayout, FrameSyncManager, GpuBuffer, GpuContext, GpuResource,
    Result, Texture,
};

/// Asset paths, relative to an assets root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneAssets {
    pub model: PathBuf,
    pub texture: PathBuf,
    pub vertex_shader: PathBuf,
    pub fragment_shader: PathBuf,
}

impl Default for SceneAssets {
    fn default() -> Self {
        Self {
            model: PathBuf::from("models/viking_room.obj"),
            texture: PathBuf::from("textures/viking_room.png"),
            vertex_shader: PathBuf::from("shaders/vert.spv"),
            fragment_shader: PathBuf::from("shaders/frag.spv"),
        }
    }
}

impl SceneAssets {
    /// Read and decode every asset below `root`.
    pub fn load(&self, root: &Path) -> Result<SceneData> {
        let mesh = Mesh::load_obj(root.join(&self.model))?;
        let texture = TextureData::load(root.join(&self.texture))?;
        let vertex_shader = load_spirv(root.join(&self.vertex_shader))?;
        let fragment_shader = load_spirv(root.join(&self.fragment_shader))?;

        tracing::info!(
            "Loaded scene: {} vertices, {} indices, {}x{} texture",
            mesh.vertices.len(),
            mesh.indices.len(),
            texture.width(),
            texture.height()
        );

        Ok(SceneData {
            mesh,
            texture,
            vertex_shader,
            fragment_shader,
        })
    }
}

/// Host-side scene contents ready for upload.
pub struct SceneData {
    pub mesh: Mesh,
    pub texture: TextureData,
    pub vertex_shader: Vec<u32>,
    pub fragment_shader: Vec<u32>,
}

/// Device-local vertex and index buffers of one mesh.
pub struct MeshBuffers {
    pub vertices: GpuBuffer,
    pub indices: GpuBuffer,
    pub index_count: u32,
}

impl GpuResource for MeshBuffers {
    unsafe fn destroy(&mut self, ctx: &GpuContext) {
        self.indices.destroy(ctx);
        self.vertices.destroy(ctx);
    }
}

/// Objects created once and kept across swapchain rebuilds.
#[derive(Default)]
pub struct SceneResources {
    command_pool: CommandPool,
    sync: FrameSyncManager,
    set_layout: DescriptorSetLayout,
    texture: Texture,
    mesh: Option<MeshBuffers>,
    vertex_shader: Vec<u32>,
    fragment_shader: Vec<u32>,
}

impl SceneResources {
    /// Create the command pool and sync objects, then upload the scene.
    ///
    /// An empty mesh uploads no geometry; frames then only clear.
    ///
    /// # Safety
    /// The context must be valid.
    pub unsafe fn new(ctx: &GpuContext, data: SceneData, frames_in_flight: usize) -> Result<Self> {
        let mut resources = Self {
            vertex_shader: data.vertex_shader,
            fragment_shader: data.fragment_shader,
            ..Self::default()
        };

        if let Err(e) = resources.populate(ctx, &data.mesh, &data.texture, frames_in_flight) {
            resources.destroy(ctx);
            return Err(e);
        }
        Ok(resources)
    }

    unsafe fn populate(
        &mut self,
        ctx: &GpuContext,
        mesh: &Mesh,
        texture: &TextureData,
        frames_in_flight: usize,
    ) -> Result<()> {
        self.command_pool = CommandPool::new(ctx.device(), ctx.queue_families().graphics)?;
        self.sync = FrameSyncManager::new(ctx, frames_in_flight)?;
        self.set_layout = mesh_set_layout().build(ctx)?;
        self.texture = Texture::upload(ctx, &self.command_pool, texture)?;

        if mesh.is_empty() {
            tracing::warn!("Mesh has no geometry; frames will only clear");
        } else {
            let mut vertices = GpuBuffer::device_local_with_data(
                ctx,
                &self.command_pool,
                vk::BufferUsageFlags::VERTEX_BUFFER,
                &mesh.vertices,
            )?;
            let indices = match GpuBuffer::device_local_with_data(
                ctx,
                &self.command_pool,
                vk::BufferUsageFlags::INDEX_BUFFER,
                &mesh.indices,
            ) {
                Ok(indices) => indices,
                Err(e) => {
                    vertices.destroy(ctx);
                    return Err(e);
                }
            };
            self.mesh = Some(MeshBuffers {
                vertices,
                indices,
                index_count: mesh.index_count(),
            });
        }
        Ok(())
    }

    pub fn command_pool(&self) -> &CommandPool {
        &self.command_pool
    }

    pub fn sync(&self) -> &FrameSyncManager {
        &self.sync
    }

    pub fn set_layout(&self) -> &DescriptorSetLayout {
        &self.set_layout
    }

    pub fn texture(&self) -> &Texture {
        &self.texture
    }

    /// Uploaded geometry, or `None` for an empty mesh.
    pub fn mesh(&self) -> Option<&MeshBuffers> {
        self.mesh.as_ref()
    }

    pub fn vertex_shader(&self) -> &[u32] {
        &self.vertex_shader
    }

    pub fn fragment_shader(&self) -> &[u32] {
        &self.fragment_shader
    }
}

impl GpuResource for SceneResources {
    unsafe fn destroy(&mut self, ctx: &GpuContext) {
        if let Some(mesh) = self.mesh.as_mut() {
            mesh.destroy(ctx);
        }
        self.mesh = None;
        self.texture.destroy(ctx);
        self.set_layout.destroy(ctx);
        self.sync.destroy(ctx);
        self.command_pool.destroy(ctx);
    }
}
