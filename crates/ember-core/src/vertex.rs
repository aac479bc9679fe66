//! Vertex layout shared with the vertex shader.

use std::hash::{Hash, Hasher};

/// A single mesh vertex as laid out in the vertex buffer.
///
/// The layout is 32 bytes: `position` at offset 0, `color` at offset 12 and
/// `tex_coord` at offset 24.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub color: [f32; 3],
    pub tex_coord: [f32; 2],
}

impl Vertex {
    /// Size of one vertex in bytes.
    pub const STRIDE: u32 = std::mem::size_of::<Self>() as u32;

    /// Create a new vertex.
    #[inline]
    pub const fn new(position: [f32; 3], color: [f32; 3], tex_coord: [f32; 2]) -> Self {
        Self {
            position,
            color,
            tex_coord,
        }
    }

    /// Bit pattern used for exact-match de-duplication.
    ///
    /// `-0.0` and `0.0` compare equal as floats, so both map to the same key.
    pub(crate) fn key(&self) -> VertexKey {
        let mut bits = [0u32; 8];
        let components = self
            .position
            .iter()
            .chain(self.color.iter())
            .chain(self.tex_coord.iter());
        for (slot, value) in bits.iter_mut().zip(components) {
            *slot = if *value == 0.0 { 0 } else { value.to_bits() };
        }
        VertexKey(bits)
    }
}

/// Hashable identity of a [`Vertex`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct VertexKey([u32; 8]);

impl Hash for VertexKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{offset_of, size_of};

    #[test]
    fn layout_matches_shader_interface() {
        assert_eq!(size_of::<Vertex>(), 32);
        assert_eq!(Vertex::STRIDE, 32);
        assert_eq!(offset_of!(Vertex, position), 0);
        assert_eq!(offset_of!(Vertex, color), 12);
        assert_eq!(offset_of!(Vertex, tex_coord), 24);
    }

    #[test]
    fn signed_zero_shares_a_key() {
        let a = Vertex::new([0.0, 1.0, 2.0], [1.0; 3], [0.5, 0.5]);
        let b = Vertex::new([-0.0, 1.0, 2.0], [1.0; 3], [0.5, 0.5]);
        assert_eq!(a, b);
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn distinct_vertices_have_distinct_keys() {
        let a = Vertex::new([0.0, 1.0, 2.0], [1.0; 3], [0.5, 0.5]);
        let b = Vertex::new([0.0, 1.0, 2.0], [1.0; 3], [0.5, 0.25]);
        assert_ne!(a.key(), b.key());
    }
}
