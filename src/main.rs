use anyhow::{Context, Result};
use nalgebra::Point3;

use detmap::category::CategoryRegistry;
use detmap::locator::Locator;
use detmap::mapping::Mapping;
use detmap::model::ModelFactory;
use detmap::settings::{self, Settings};

fn main() -> Result<()> {
    env_logger::init();

    let settings = settings::load_config()?;
    run(&settings)
}

fn run(settings: &Settings) -> Result<()> {
    let categories_text = std::fs::read_to_string(&settings.categories_file)
        .with_context(|| format!("reading category schema '{}'", settings.categories_file))?;
    let registry = CategoryRegistry::from_toml(&categories_text)?;

    let setup_text = std::fs::read_to_string(&settings.setup_file)
        .with_context(|| format!("reading model setup '{}'", settings.setup_file))?;
    let mut factory = ModelFactory::new();
    factory.load_toml(&setup_text)?;
    factory.lock()?;

    let mut mapping = Mapping::new(settings.mapping_config()?);
    mapping.build_from(&factory, &registry)?;

    let dict = mapping.dictionary();
    println!("Dictionary of geometry identifiers ({} entries):", dict.len());
    for (id, info) in dict.iter() {
        println!(
            "  {id} {} shape={} material={} at {}",
            registry.human_readable(id),
            info.shape.name(),
            info.material,
            info.world_placement
        );
    }

    if let Some([x, y, z]) = settings.locate {
        let point = Point3::new(x, y, z);
        let category = match &settings.locate_category {
            Some(name) => name.clone(),
            None => deepest_category(&registry, dict)?,
        };
        let type_id = registry.type_of(&category)?;
        let locator = Locator::for_type(dict, type_id);
        match locator.locate(&point, settings.tolerance) {
            Some(id) => println!(
                "Point ({x}, {y}, {z}) is in {id} ({})",
                registry.human_readable(id)
            ),
            None => println!("Point ({x}, {y}, {z}) is in no '{category}' volume"),
        }
    }

    Ok(())
}

/// Picks the mapped category with the most address fields as the default
/// target for locate queries.
fn deepest_category(
    registry: &CategoryRegistry,
    dict: &detmap::mapping::MappingDict,
) -> Result<String> {
    let mut best: Option<(usize, String)> = None;
    for (id, _) in dict.iter() {
        let info = registry.info_by_type(id.type_id())?;
        if best.as_ref().map(|(d, _)| info.depth() > *d).unwrap_or(true) {
            best = Some((info.depth(), info.category.clone()));
        }
    }
    best.map(|(_, name)| name)
        .context("the dictionary is empty, nothing to locate in")
}
