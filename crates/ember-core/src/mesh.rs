//! Triangle meshes with de-duplicated vertices.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use hashbrown::HashMap;

use crate::error::{Error, Result};
use crate::vertex::{Vertex, VertexKey};

/// Color assigned to every loaded vertex.
pub const DEFAULT_COLOR: [f32; 3] = [1.0, 1.0, 1.0];

/// Indexed triangle mesh held in host memory.
///
/// Every index is smaller than `vertices.len()` and no two vertices are equal.
#[derive(Clone, Debug, Default)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl Mesh {
    /// Build a mesh from flat attribute arrays and per-corner index tuples.
    ///
    /// `positions` holds 3 floats per entry and `texcoords` 2 floats per entry.
    /// Each corner is `(position index, optional texcoord index)`. The V coordinate
    /// is flipped to `1 - v` and colors default to white.
    pub fn from_indexed<I>(positions: &[f32], texcoords: &[f32], corners: I) -> Result<Self>
    where
        I: IntoIterator<Item = (u32, Option<u32>)>,
    {
        let mut builder = MeshBuilder::default();
        builder.extend(positions, texcoords, corners)?;
        Ok(builder.finish())
    }

    /// Load a triangulated model from an OBJ file.
    pub fn load_obj(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::asset_load(path, e))?;

        let mesh = Self::from_obj_reader(&mut BufReader::new(file)).map_err(|e| match e {
            Error::AssetLoad { reason, .. } | Error::InvalidData(reason) => {
                Error::asset_load(path, reason)
            }
        })?;

        tracing::info!(
            "Loaded {}: {} vertices, {} indices",
            path.display(),
            mesh.vertices.len(),
            mesh.indices.len()
        );

        Ok(mesh)
    }

    /// Load a triangulated model from OBJ text. Material libraries are ignored.
    pub fn from_obj_reader<R: BufRead>(reader: &mut R) -> Result<Self> {
        let (models, _materials) =
            tobj::load_obj_buf(reader, &load_options(), |_| Ok(Default::default()))
                .map_err(|e| Error::asset_load("<buffer>", e))?;

        Self::from_models(&models)
    }

    fn from_models(models: &[tobj::Model]) -> Result<Self> {
        let mut builder = MeshBuilder::default();

        for model in models {
            let mesh = &model.mesh;
            let texcoord_indices = &mesh.texcoord_indices;

            let corners = mesh.indices.iter().enumerate().map(|(corner, &position)| {
                let texcoord = if texcoord_indices.is_empty() {
                    None
                } else {
                    texcoord_indices.get(corner).copied()
                };
                (position, texcoord)
            });

            builder.extend(&mesh.positions, &mesh.texcoords, corners)?;
        }

        Ok(builder.finish())
    }

    /// Whether the mesh has nothing to draw.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Number of indices, as passed to an indexed draw.
    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }
}

fn load_options() -> tobj::LoadOptions {
    tobj::LoadOptions {
        triangulate: true,
        ..Default::default()
    }
}

/// Accumulates unique vertices and the index list referencing them.
#[derive(Default)]
struct MeshBuilder {
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
    unique: HashMap<VertexKey, u32>,
}

impl MeshBuilder {
    fn extend<I>(&mut self, positions: &[f32], texcoords: &[f32], corners: I) -> Result<()>
    where
        I: IntoIterator<Item = (u32, Option<u32>)>,
    {
        for (position_index, texcoord_index) in corners {
            let p = position_index as usize * 3;
            let position = positions
                .get(p..p + 3)
                .ok_or_else(|| {
                    Error::InvalidData(format!("position index {position_index} out of range"))
                })?;

            let tex_coord = match texcoord_index {
                Some(t_index) => {
                    let t = t_index as usize * 2;
                    let uv = texcoords.get(t..t + 2).ok_or_else(|| {
                        Error::InvalidData(format!("texcoord index {t_index} out of range"))
                    })?;
                    [uv[0], 1.0 - uv[1]]
                }
                None => [0.0, 0.0],
            };

            self.push(Vertex::new(
                [position[0], position[1], position[2]],
                DEFAULT_COLOR,
                tex_coord,
            ));
        }
        Ok(())
    }

    fn push(&mut self, vertex: Vertex) {
        let next = self.vertices.len() as u32;
        let index = *self.unique.entry(vertex.key()).or_insert_with(|| {
            self.vertices.push(vertex);
            next
        });
        self.indices.push(index);
    }

    fn finish(self) -> Mesh {
        Mesh {
            vertices: self.vertices,
            indices: self.indices,
        }
    }
}
