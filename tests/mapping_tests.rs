use std::path::Path;

use detmap::{
    category::CategoryRegistry,
    geom_id::GeomId,
    locator::Locator,
    mapping::{BuildMode, BuildState, Mapping, MappingConfig},
    model::ModelFactory,
    replication::Replication,
    settings,
    Error,
};
use nalgebra::Point3;

// Tolerance for comparing world-frame coordinates
const TOL: f64 = 1e-9;

fn read_config(filename: &str) -> String {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("config")
        .join(filename);
    std::fs::read_to_string(path).unwrap()
}

fn demo_registry() -> CategoryRegistry {
    CategoryRegistry::from_toml(&read_config("demo_categories.toml")).unwrap()
}

fn demo_factory() -> ModelFactory {
    let mut factory = ModelFactory::new();
    factory.load_toml(&read_config("demo_setup.toml")).unwrap();
    factory.lock().unwrap();
    factory
}

fn build_demo(config: MappingConfig) -> Mapping {
    let factory = demo_factory();
    let registry = demo_registry();
    let mut mapping = Mapping::new(config);
    mapping.build_from(&factory, &registry).unwrap();
    mapping
}

#[test]
fn default_config_drives_the_demo_build() {
    let settings = settings::load_default_config().unwrap();
    let root = Path::new(env!("CARGO_MANIFEST_DIR"));

    let registry = CategoryRegistry::from_toml(
        &std::fs::read_to_string(root.join(&settings.categories_file)).unwrap(),
    )
    .unwrap();
    let mut factory = ModelFactory::new();
    factory
        .load_toml(&std::fs::read_to_string(root.join(&settings.setup_file)).unwrap())
        .unwrap();
    factory.lock().unwrap();

    let mut mapping = Mapping::new(settings.mapping_config().unwrap());
    mapping.build_from(&factory, &registry).unwrap();
    assert_eq!(mapping.state(), BuildState::Built);
    assert_eq!(mapping.dictionary().len(), 26);
}

#[test]
fn demo_setup_builds_completely() {
    let mapping = build_demo(MappingConfig::new());
    assert_eq!(mapping.state(), BuildState::Built);
    let dict = mapping.dictionary();

    // world + hall + 6 modules + 18 plates
    assert_eq!(dict.len(), 26);
    assert_eq!(dict.ids_with_type(0).len(), 1);
    assert_eq!(dict.ids_with_type(100).len(), 1);
    assert_eq!(dict.ids_with_type(1000).len(), 6);
    assert_eq!(dict.ids_with_type(2000).len(), 18);

    // Every stored identifier is schema-complete.
    let registry = demo_registry();
    for (id, _) in dict.iter() {
        assert!(registry.validate(id), "bad identifier {id}");
    }
}

#[test]
fn grid_modules_land_on_centered_lattice() {
    let mapping = build_demo(MappingConfig::new());
    let dict = mapping.dictionary();

    for column in 0..2u32 {
        for row in 0..3u32 {
            let id = GeomId::new(1000, vec![0, column, row]);
            let info = dict.get(&id).unwrap();
            let t = info.world_placement.translation();
            let expected_x = -50.0 + 100.0 * column as f64;
            let expected_y = -100.0 + 100.0 * row as f64;
            assert!((t.x - expected_x).abs() < TOL, "{id}: x={}", t.x);
            assert!((t.y - expected_y).abs() < TOL, "{id}: y={}", t.y);
            assert!(t.z.abs() < TOL);
        }
    }
}

#[test]
fn stacked_plates_ascend_by_extent_plus_play() {
    let mapping = build_demo(MappingConfig::new());
    let dict = mapping.dictionary();

    // Plates are 20 thick with 5 play, stacked in z inside module (0, 0).
    let z: Vec<f64> = (0..3u32)
        .map(|plate| {
            let id = GeomId::new(2000, vec![0, 0, 0, plate]);
            dict.get(&id).unwrap().world_placement.translation().z
        })
        .collect();
    let module_z = dict
        .get(&GeomId::new(1000, vec![0, 0, 0]))
        .unwrap()
        .world_placement
        .translation()
        .z;
    assert!((z[0] - (module_z - 25.0)).abs() < TOL);
    assert!((z[1] - module_z).abs() < TOL);
    assert!((z[2] - (module_z + 25.0)).abs() < TOL);
}

#[test]
fn build_is_deterministic() {
    let first = build_demo(MappingConfig::new());
    let second = build_demo(MappingConfig::new());

    let a: Vec<_> = first.dictionary().iter().collect();
    let b: Vec<_> = second.dictionary().iter().collect();
    assert_eq!(a.len(), b.len());
    for ((id_a, info_a), (id_b, info_b)) in a.iter().zip(b.iter()) {
        assert_eq!(id_a, id_b);
        assert!(info_a.world_placement.approx_eq(&info_b.world_placement, TOL));
    }
}

#[test]
fn lazy_mode_reproduces_strict_dictionary() {
    let strict = build_demo(MappingConfig::new());
    let mut config = MappingConfig::new();
    config.build_mode = BuildMode::LazyMothership;
    let lazy = build_demo(config);

    let strict_ids: Vec<&GeomId> = strict.dictionary().iter().map(|(id, _)| id).collect();
    let lazy_ids: Vec<&GeomId> = lazy.dictionary().iter().map(|(id, _)| id).collect();
    assert_eq!(strict_ids, lazy_ids);
}

#[test]
fn depth_limit_prunes_plates() {
    let mut config = MappingConfig::new();
    config.max_depth = 2;
    let dict_len = build_demo(config).dictionary().len();
    // world + hall + 6 modules
    assert_eq!(dict_len, 8);
}

#[test]
fn locator_round_trips_module_centers() {
    let mapping = build_demo(MappingConfig::new());
    let dict = mapping.dictionary();
    let locator = Locator::for_type(dict, 1000);

    for (id, info) in dict.iter() {
        if id.type_id() != 1000 {
            continue;
        }
        let t = info.world_placement.translation();
        let center = Point3::new(t.x, t.y, t.z);
        assert_eq!(locator.locate(&center, 0.0), Some(id), "missed {id}");
    }

    // Between modules and far away.
    assert_eq!(locator.locate(&Point3::new(0.0, -50.0, 0.0), 0.0), None);
    assert_eq!(locator.locate(&Point3::new(400.0, 0.0, 0.0), 0.0), None);
}

#[test]
fn locator_finds_plates_inside_modules() {
    let mapping = build_demo(MappingConfig::new());
    let locator = Locator::for_type(mapping.dictionary(), 2000);

    // Top plate of module (1, 2) is centered 25 above the module center.
    let hit = locator.locate(&Point3::new(50.0, 100.0, 25.0), 0.0);
    assert_eq!(hit, Some(&GeomId::new(2000, vec![0, 1, 2, 2])));

    // The gap between plates belongs to no plate.
    assert_eq!(locator.locate(&Point3::new(50.0, 100.0, 12.5), 0.0), None);
}

#[test]
fn identifier_text_round_trips_through_dictionary() {
    let mapping = build_demo(MappingConfig::new());
    for (id, _) in mapping.dictionary().iter() {
        let parsed: GeomId = id.to_string().parse().unwrap();
        assert_eq!(&parsed, id);
    }
}

#[test]
fn colliding_rules_abort_the_build() {
    let setup = r#"
        [[models]]
        name = "module"
        material = "air"
        shape = { type = "box", x = 1.0, y = 1.0, z = 1.0 }

        [[models]]
        name = "world"
        material = "vacuum"
        shape = { type = "box", x = 10.0, y = 10.0, z = 10.0 }

        [[models.daughters]]
        label = "left"
        model = "module"
        mapping = "module:hall=0,column=0,row=0"
        placement = { type = "single", x = -3.0 }

        [[models.daughters]]
        label = "right"
        model = "module"
        mapping = "module:hall=0,column=0,row=0"
        placement = { type = "single", x = 3.0 }
    "#;
    let mut factory = ModelFactory::new();
    factory.load_toml(setup).unwrap();
    factory.lock().unwrap();

    let mut mapping = Mapping::new(MappingConfig::new());
    let err = mapping.build_from(&factory, &demo_registry()).unwrap_err();
    assert!(matches!(err, Error::DuplicateIdentifier { .. }));
    assert_eq!(mapping.state(), BuildState::Failed);
    assert!(mapping.dictionary().is_empty());
}

#[test]
fn consumed_registry_stays_locked() {
    let mut factory = demo_factory();
    let registry = demo_registry();
    let mut mapping = Mapping::new(MappingConfig::new());
    mapping.build_from(&factory, &registry).unwrap();
    assert!(matches!(factory.unlock(), Err(Error::RegistryConsumed)));
}

#[test]
fn default_grid_pitch_comes_from_daughter_width() {
    let setup = r#"
        [[models]]
        name = "tile"
        material = "scint"
        shape = { type = "box", x = 5.0, y = 4.0, z = 1.0 }

        [[models]]
        name = "world"
        material = "vacuum"
        shape = { type = "box", x = 100.0, y = 100.0, z = 100.0 }

        [[models.daughters]]
        label = "tiles"
        model = "tile"
        mapping = "module:column+0,row+0"
        placement = { type = "grid", plane = "xy", columns = 2, rows = 2 }
    "#;
    let mut factory = ModelFactory::new();
    factory.load_toml(setup).unwrap();
    factory.lock().unwrap();

    let world = factory.volume("world").unwrap();
    let placement = &world.physicals[0].placement;
    assert_eq!(placement.number_of_items(), 4);
    let x0 = placement.placement_at(0).translation().x;
    let x1 = placement.placement_at(1).translation().x;
    let y0 = placement.placement_at(0).translation().y;
    let y2 = placement.placement_at(2).translation().y;
    assert!((x1 - x0 - 5.0).abs() < TOL);
    assert!((y2 - y0 - 4.0).abs() < TOL);
}
