// Cell classification, dependency analysis and unit aggregation

pub mod aggregate;
pub mod classify;
pub mod dependencies;

pub use aggregate::*;
pub use classify::*;
pub use dependencies::*;
