/// "Resources" are the middle-level objects built on top of the core: GPU
/// buffers and images, and the meshes, textures, pipelines, and scene
/// objects composed from them.

pub mod buffer;
pub mod image;
pub mod mesh;
pub mod object;
pub mod pipeline;
pub mod shader;
pub mod texture;
pub mod vertex;
