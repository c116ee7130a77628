//! Loader definitions from YAML.
//!
//! A configuration file holds a single `loader` section:
//!
//! ```yaml
//! loader:
//!   name: ProductLoader
//!   default_output: take_first
//!   fields:
//!     name:
//!       input: {map_compose: [strip, title]}
//!       output: {join: " "}
//! ```
//!
//! Processor specs are either a bare name (`identity`, `take_first`, or a
//! function registered in the [`ProcessorRegistry`]) or a single-key mapping
//! naming a composite.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::definition::LoaderDefinition;
use crate::extraction::PathError;
use crate::processor::Processor;
use crate::processors::{Compose, Identity, Join, MapCompose, SelectJmes, TakeFirst};
use crate::registry::ProcessorRegistry;

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Config missing '{0}' field")]
    MissingSection(&'static str),

    #[error("Unknown processor '{0}'")]
    UnknownProcessor(String),

    #[error("Invalid select_jmes path: {0}")]
    InvalidPath(#[from] PathError),

    #[error("Path is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),
}

/// A processor as written in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProcessorSpec {
    /// `identity`, `take_first` or a registered function name
    Name(String),
    Composite(CompositeSpec),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositeSpec {
    Join(String),
    Compose(ComposeSpec),
    MapCompose(Vec<ProcessorSpec>),
    SelectJmes(String),
    Function(String),
}

/// `compose` steps, optionally with `stop_on_none`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ComposeSpec {
    Steps(Vec<ProcessorSpec>),
    Full {
        steps: Vec<ProcessorSpec>,
        #[serde(default = "default_stop_on_none")]
        stop_on_none: bool,
    },
}

fn default_stop_on_none() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    #[serde(default)]
    pub input: Option<ProcessorSpec>,
    #[serde(default)]
    pub output: Option<ProcessorSpec>,
}

/// The `loader` section of a configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoaderConfig {
    pub name: String,

    #[serde(default)]
    pub default_input: Option<ProcessorSpec>,

    #[serde(default)]
    pub default_output: Option<ProcessorSpec>,

    /// Field declarations, in file order
    #[serde(default)]
    pub fields: IndexMap<String, FieldSpec>,
}

impl LoaderConfig {
    /// Parse a configuration document.
    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        let yaml: serde_yaml::Value = serde_yaml::from_str(contents)?;

        let section = yaml
            .get("loader")
            .ok_or(ConfigError::MissingSection("loader"))?;

        Ok(serde_yaml::from_value(section.clone())?)
    }

    /// Load a configuration file.
    ///
    /// # Example
    /// ```ignore
    /// use itemloader::runtime::LoaderConfig;
    ///
    /// let config = LoaderConfig::load_from_file("loaders/product.yaml")?;
    /// println!("Fields: {:?}", config.fields.keys());
    /// ```
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_yaml_str(&contents)
    }

    /// Resolve every processor spec and build the definition.
    pub fn into_definition(self, registry: &ProcessorRegistry) -> Result<LoaderDefinition, ConfigError> {
        let mut definition = LoaderDefinition::new(self.name);

        if let Some(spec) = &self.default_input {
            definition.set_default_input(build_processor(spec, registry)?);
        }
        if let Some(spec) = &self.default_output {
            definition.set_default_output(build_processor(spec, registry)?);
        }

        for (field, spec) in &self.fields {
            if let Some(input) = &spec.input {
                definition.set_input(field, build_processor(input, registry)?);
            }
            if let Some(output) = &spec.output {
                definition.set_output(field, build_processor(output, registry)?);
            }
        }

        Ok(definition)
    }
}

/// Turn a spec into a processor.
pub fn build_processor(spec: &ProcessorSpec, registry: &ProcessorRegistry) -> Result<Rc<dyn Processor>, ConfigError> {
    match spec {
        ProcessorSpec::Name(name) => match name.as_str() {
            "identity" => Ok(Rc::new(Identity)),
            "take_first" => Ok(Rc::new(TakeFirst)),
            other => lookup(other, registry),
        },
        ProcessorSpec::Composite(CompositeSpec::Function(name)) => lookup(name, registry),
        ProcessorSpec::Composite(CompositeSpec::Join(separator)) => Ok(Rc::new(Join::new(separator.clone()))),
        ProcessorSpec::Composite(CompositeSpec::SelectJmes(path)) => Ok(Rc::new(SelectJmes::new(path)?)),
        ProcessorSpec::Composite(CompositeSpec::MapCompose(steps)) => {
            Ok(Rc::new(MapCompose::of(build_steps(steps, registry)?)))
        }
        ProcessorSpec::Composite(CompositeSpec::Compose(compose)) => {
            let (steps, stop_on_none) = match compose {
                ComposeSpec::Steps(steps) => (steps, true),
                ComposeSpec::Full { steps, stop_on_none } => (steps, *stop_on_none),
            };
            Ok(Rc::new(
                Compose::of(build_steps(steps, registry)?).stop_on_none(stop_on_none),
            ))
        }
    }
}

fn build_steps(steps: &[ProcessorSpec], registry: &ProcessorRegistry) -> Result<Vec<Rc<dyn Processor>>, ConfigError> {
    steps.iter().map(|step| build_processor(step, registry)).collect()
}

fn lookup(name: &str, registry: &ProcessorRegistry) -> Result<Rc<dyn Processor>, ConfigError> {
    registry
        .get(name)
        .ok_or_else(|| ConfigError::UnknownProcessor(name.to_string()))
}

/// Load every `.yaml`/`.yml` definition in a directory, keyed by loader name.
///
/// Files that fail to load are logged and skipped.
pub fn load_definitions_from_dir<P: AsRef<Path>>(
    dir_path: P,
    registry: &ProcessorRegistry,
) -> Result<IndexMap<String, LoaderDefinition>, ConfigError> {
    let dir_path = dir_path.as_ref();

    if !dir_path.is_dir() {
        return Err(ConfigError::NotADirectory(dir_path.to_path_buf()));
    }

    let entries = fs::read_dir(dir_path).map_err(|source| ConfigError::Io {
        path: dir_path.to_path_buf(),
        source,
    })?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .map(|ext| ext == "yaml" || ext == "yml")
                .unwrap_or(false)
        })
        .collect();
    paths.sort();

    let mut definitions = IndexMap::new();
    for path in paths {
        let loaded = LoaderConfig::load_from_file(&path).and_then(|config| config.into_definition(registry));
        match loaded {
            Ok(definition) => {
                tracing::debug!("Loaded {} from {}", definition.name(), path.display());
                definitions.insert(definition.name().to_string(), definition);
            }
            Err(e) => {
                tracing::warn!("Failed to load loader definition from {}: {}", path.display(), e);
            }
        }
    }

    Ok(definitions)
}
