// Template registry and rendering

pub mod render;
pub mod templates;

pub use render::*;
pub use templates::*;
