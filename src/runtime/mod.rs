//! Runtime state shared by a loader tree.
//!
//! Holds the per-tree context and value store, and the YAML loader for
//! loader definitions.

pub mod config_loader;
pub mod context;
pub mod values;

// Re-export key types
pub use config_loader::{
    build_processor, load_definitions_from_dir, ComposeSpec, CompositeSpec, ConfigError, FieldSpec,
    LoaderConfig, ProcessorSpec,
};
pub use context::{LoaderContext, ITEM_KEY};
pub use values::ValueStore;
