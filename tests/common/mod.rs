pub mod builders;
pub mod fixtures;

// Re-export commonly used test utilities
pub use builders::{AxisBuilder, InputBuilder};
pub use fixtures::{studio_review, studio_config};
