//! Integration tests for loader definitions read from YAML

use itemloader::processor::from_fn;
use itemloader::runtime::{load_definitions_from_dir, LoaderConfig};
use itemloader::{Item, ItemLoader, JsonSelector, ProcessorRegistry};
use serde_json::{json, Value};
use std::fs;
use std::rc::Rc;
use tempfile::TempDir;

const PRODUCT_LOADER: &str = r#"
loader:
  name: ProductLoader
  default_output: take_first
  fields:
    name:
      input: {map_compose: [strip, title]}
      output: {join: " "}
    price:
      input: {map_compose: [strip, {function: dollars}]}
    tags:
      output: identity
"#;

const REVIEW_LOADER: &str = r#"
loader:
  name: ReviewLoader
  fields:
    rating:
      input: {compose: [take_first, to_int]}
"#;

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn registry() -> ProcessorRegistry {
    let mut registry = ProcessorRegistry::with_builtins();
    registry.register(
        "dollars",
        from_fn("dollars", |v: Value| {
            Ok(v.as_str().map(|s| Value::String(s.trim_start_matches('$').to_string())))
        }),
    );
    registry
}

#[test]
fn test_configured_loader_end_to_end() {
    init_logging();

    let definition = LoaderConfig::from_yaml_str(PRODUCT_LOADER)
        .unwrap()
        .into_definition(&registry())
        .unwrap();

    let page = JsonSelector::new(json!({
        "product": {
            "name": ["  blue ", " widget"],
            "price": " $10.50 ",
            "tags": ["tools", "blue"]
        }
    }));

    let loader = ItemLoader::builder(Rc::new(definition))
        .selector(page)
        .build_with(Item::new("Product"));

    let product = loader.nested_jmes("product").unwrap();
    product.add_jmes("name", "name").unwrap();
    product.add_jmes("price", "price").unwrap();
    product.add_jmes("tags", "tags").unwrap();

    let item = loader.load_item().unwrap();

    assert_eq!(item.get("name"), Some(&json!("Blue Widget")));
    assert_eq!(item.get("price"), Some(&json!("10.50")));
    assert_eq!(item.get("tags"), Some(&json!(["tools", "blue"])));
}

#[test]
fn test_load_definitions_from_dir() {
    init_logging();

    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("product.yaml"), PRODUCT_LOADER).unwrap();
    fs::write(dir.path().join("review.yml"), REVIEW_LOADER).unwrap();

    // refers to a function nobody registered
    fs::write(
        dir.path().join("unknown.yaml"),
        "loader:\n  name: Broken\n  default_input: {function: shout}\n",
    )
    .unwrap();

    let definitions = load_definitions_from_dir(dir.path(), &registry()).unwrap();

    assert_eq!(
        definitions.keys().collect::<Vec<_>>(),
        vec!["ProductLoader", "ReviewLoader"]
    );

    let review = Rc::new(definitions["ReviewLoader"].clone());
    let loader: ItemLoader<serde_json::Map<String, Value>> = ItemLoader::new(review);
    loader.add_value("rating", json!(["4", "5"])).unwrap();

    assert_eq!(loader.load_item().unwrap()["rating"], json!([4]));
}
