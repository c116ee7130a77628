//! # itemloader: populating records from extracted data
//!
//! An item loader collects raw values for the fields of a record, cleans
//! them with per-field *input processors* as they arrive, and reduces them
//! with per-field *output processors* when the record is loaded.
//!
//! ## Features
//!
//! - **Processor pipeline**: `Compose`, `MapCompose`, `TakeFirst`, `Join`, `Identity`, `SelectJmes`
//! - **Loader context**: processors that declare `loader_context` get the shared, mutable context
//! - **Nested loaders**: scope a loader to part of a document while sharing values and record
//! - **Record adapters**: JSON maps, `IndexMap`/`HashMap`/`BTreeMap`, and the declared-field [`Item`]
//! - **Query instrumentation**: per-rule counters through a [`StatsCollector`]
//! - **YAML definitions**: processor declarations loaded from configuration
//!
//! ## Example
//!
//! ```
//! use itemloader::processors::{MapCompose, TakeFirst};
//! use itemloader::functions::{strip, title};
//! use itemloader::{ItemLoader, JsonSelector, LoaderDefinition};
//! use serde_json::{json, Map, Value};
//! use std::rc::Rc;
//!
//! let definition = Rc::new(
//!     LoaderDefinition::new("ProductLoader")
//!         .with_input("name", MapCompose::new().then(strip()).then(title()))
//!         .with_default_output(TakeFirst::new()),
//! );
//!
//! let page = json!({"product": {"name": "  blue widget ", "price": "10.50"}});
//! let loader: ItemLoader<Map<String, Value>> = ItemLoader::builder(definition)
//!     .selector(JsonSelector::new(page))
//!     .build();
//!
//! let product = loader.nested_jmes("product").unwrap();
//! product.add_jmes("name", "name").unwrap();
//! product.add_jmes("price", "price").unwrap();
//!
//! let item = loader.load_item().unwrap();
//! assert_eq!(item["name"], json!("Blue Widget"));
//! assert_eq!(item["price"], json!("10.50"));
//! ```

// Core modules
pub mod utils;
pub mod record;
pub mod processor;
pub mod processors;
pub mod functions;
pub mod extraction;
pub mod selector;
pub mod stats;
pub mod definition;
pub mod registry;
pub mod loader;

// Per-tree state and configuration
pub mod runtime;

// Re-export key types
pub use definition::LoaderDefinition;
pub use extraction::{FieldPath, PathError};
pub use loader::{ItemLoader, LoaderBuilder, LoaderError, ProcessorStage, Query};
pub use processor::{Function, Partial, ProcessError, Processor};
pub use processors::{Compose, Identity, Join, MapCompose, SelectJmes, TakeFirst};
pub use record::{Item, Record, RecordError};
pub use registry::ProcessorRegistry;
pub use selector::{JsonSelector, QueryKind, Selector, SelectorError};
pub use stats::{MemoryStats, StatsCollector};

// Re-export runtime types
pub use runtime::{ConfigError, LoaderConfig, LoaderContext, ValueStore};
