//! Model loading and execution.

pub mod executor;
pub mod loader;

pub use executor::infer;
pub use loader::ModelLoader;
