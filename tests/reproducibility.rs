// Integration test for reproducibility - verifies that simulations with the same seed produce identical results

use std::sync::Arc;
use transport_for_mc::cell::{Cell, CellFill};
use transport_for_mc::physics::{CollisionModel, SimpleCollisionSampler};
use transport_for_mc::region::Region;
use transport_for_mc::settings::Settings;
use transport_for_mc::source::IndependentSource;
use transport_for_mc::stats::EnergyDistribution;
use transport_for_mc::{
    EnergyGrid, Geometry, Material, Materials, Model, Reaction, RunResults, SimulationMode, Surface, TotalXs,
    TrackingConfig,
};

fn model(seed: Option<u64>, threads: usize, mode: SimulationMode) -> Model {
    let grid = EnergyGrid::new(vec![1e-11, 1e-3, 1.0, 20.0]).unwrap();
    let reaction = Reaction::on_grid(grid.clone(), vec![4.0, 2.0, 1.0, 0.6]).unwrap();
    let mut materials = Materials::new();
    let fuel = materials.append(Material::new("fuel").with_neutron_total(TotalXs::tabulated(Arc::new(reaction))));

    let surf = Arc::new(Surface::sphere(0.0, 0.0, 0.0, 2.0, 1));
    let geometry = Geometry::new(vec![
        Cell::new(1, Region::inside(&surf), CellFill::Material(fuel)).with_name("test_cell"),
        Cell::new(2, Region::outside(&surf), CellFill::Outside),
    ])
    .unwrap();

    let mut source = IndependentSource::new();
    source.energy = EnergyDistribution::watt(0.988, 2.249).unwrap();
    let mut settings = Settings::new(100, 10, source);
    settings.seed = seed;

    let physics = SimpleCollisionSampler::new(CollisionModel::new(0.2, 0.1, 235.0).unwrap());
    Model::new(geometry, materials, settings, Arc::new(physics))
        .with_config(TrackingConfig {
            mode,
            threads: Some(threads),
            ..TrackingConfig::default()
        })
        .with_energy_grids(Some(grid), None)
}

fn integer_counts(results: &RunResults) -> [u64; 6] {
    let c = &results.counters;
    [
        c.histories,
        c.real_collisions,
        c.virtual_collisions,
        c.captures,
        c.fissions,
        c.fission_neutrons,
    ]
}

#[test]
fn test_reproducibility_with_same_seed() {
    let first = model(Some(42), 2, SimulationMode::ExternalSource).run().unwrap();
    let second = model(Some(42), 2, SimulationMode::ExternalSource).run().unwrap();
    assert_eq!(first.leakage.batch_data, second.leakage.batch_data);
    assert_eq!(first.collisions.batch_data, second.collisions.batch_data);
    assert_eq!(integer_counts(&first), integer_counts(&second));
}

#[test]
fn test_results_independent_of_thread_count() {
    let one = model(Some(7), 1, SimulationMode::ExternalSource).run().unwrap();
    let many = model(Some(7), 5, SimulationMode::ExternalSource).run().unwrap();
    assert_eq!(integer_counts(&one), integer_counts(&many));
    assert_eq!(one.collisions.batch_data, many.collisions.batch_data);
}

#[test]
fn test_criticality_reproducible_across_threads() {
    let one = model(Some(9), 1, SimulationMode::Criticality).run().unwrap();
    let many = model(Some(9), 3, SimulationMode::Criticality).run().unwrap();
    assert_eq!(one.k_eff.unwrap().batch_data, many.k_eff.unwrap().batch_data);
}

#[test]
fn test_different_seeds_differ() {
    let a = model(Some(1), 2, SimulationMode::ExternalSource).run().unwrap();
    let b = model(Some(2), 2, SimulationMode::ExternalSource).run().unwrap();
    assert_ne!(integer_counts(&a), integer_counts(&b));
}
