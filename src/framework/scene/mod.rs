mod animation;
mod flags;
pub mod ktx;
mod material;
mod mesh;
mod model;
mod node;
mod scene_graph;
mod skin;
mod texture;
mod vertex;

pub use animation::*;
pub use flags::{FileLoadingFlags, RenderFlags};
pub use material::{AlphaMode, Material};
pub use mesh::{Dimensions, Mesh, Primitive, UniformBlock, MAX_NUM_JOINTS};
pub use model::{Model, NODE_DESCRIPTOR_SET};
pub use node::{Node, NodeId};
pub use scene_graph::SceneGraph;
pub use skin::Skin;
pub use texture::{ImagePixels, SourceImage, Texture};
pub use vertex::{Vertex, VertexInputState};
