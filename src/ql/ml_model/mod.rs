pub mod checkpoint;
pub mod mlp_model;
pub mod model;
