//! Alignment, normalization, and windowing of a repository's monthly
//! panel into training samples.

pub mod builder;
pub mod normalizer;
pub mod windower;

pub use builder::PanelBuilder;
pub use normalizer::Normalizer;
pub use windower::SampleWindower;
