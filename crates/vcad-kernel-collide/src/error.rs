//! Error types for collision detection.

use thiserror::Error;

/// Errors raised by mesh construction and configuration loading.
///
/// Numeric degeneracies (zero-area triangles, parallel cross products) are
/// never reported here; they are recovered locally.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CollideError {
    /// Index buffer length is not a multiple of three.
    #[error("index count {0} is not a multiple of 3")]
    IndicesNotTriangles(usize),

    /// A triangle references a vertex that does not exist.
    #[error("triangle {triangle} references vertex {index}, but mesh has {vertex_count} vertices")]
    IndexOutOfRange {
        /// Triangle number within the index buffer.
        triangle: usize,
        /// The offending vertex index.
        index: u32,
        /// Number of vertices in the mesh.
        vertex_count: usize,
    },

    /// A vertex coordinate is NaN or infinite.
    #[error("vertex {0} has a non-finite coordinate")]
    NonFiniteVertex(usize),

    /// Invalid primitive dimensions passed to a mesh constructor.
    #[error("invalid primitive: {0}")]
    InvalidPrimitive(String),

    /// Configuration could not be parsed or failed validation.
    #[error("invalid collision config: {0}")]
    Config(String),
}
