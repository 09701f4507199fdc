pub mod components;
pub mod distance;
pub mod summary;

pub use components::ConnectedComponents;
pub use distance::ShortestDistance;
pub use summary::{component_summary, load_vertex_values, ComponentSize};
