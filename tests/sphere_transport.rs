// End-to-end transport in simple spheres and boxes

use approx::assert_relative_eq;
use std::sync::Arc;
use transport_for_mc::cell::{Cell, CellFill};
use transport_for_mc::geometry::BoundaryCondition;
use transport_for_mc::physics::{CollisionModel, SimpleCollisionSampler};
use transport_for_mc::region::Region;
use transport_for_mc::settings::Settings;
use transport_for_mc::source::IndependentSource;
use transport_for_mc::stats::AngularDistribution;
use transport_for_mc::tally::MaterialFluxSink;
use transport_for_mc::{
    EnergyGrid, Geometry, MaterialHandle, Material, Materials, Model, Reaction, SimulationMode, Surface,
    TotalXs, TrackingConfig,
};

fn grid() -> EnergyGrid {
    EnergyGrid::new(vec![1e-11, 1e-6, 1e-2, 1.0, 20.0]).unwrap()
}

fn material(name: &str, values: Vec<f64>) -> Material {
    let reaction = Reaction::on_grid(grid(), values).unwrap();
    Material::new(name).with_neutron_total(TotalXs::tabulated(Arc::new(reaction)))
}

/// Two concentric shells of different density inside a vacuum boundary.
fn shells() -> (Geometry, Materials) {
    let inner = Arc::new(Surface::sphere(0.0, 0.0, 0.0, 2.0, 1));
    let outer = Arc::new(Surface::sphere(0.0, 0.0, 0.0, 5.0, 2));
    let mut materials = Materials::new();
    let dense = materials.append(material("dense", vec![3.0, 2.0, 1.0, 0.8, 0.5]));
    let thin = materials.append(material("thin", vec![0.3, 0.2, 0.1, 0.08, 0.05]));
    let geometry = Geometry::new(vec![
        Cell::new(1, Region::inside(&inner), CellFill::Material(dense)),
        Cell::new(
            2,
            Region::outside(&inner).intersection(&Region::inside(&outer)),
            CellFill::Material(thin),
        ),
        Cell::new(3, Region::outside(&outer), CellFill::Outside),
    ])
    .unwrap();
    (geometry, materials)
}

fn physics() -> Arc<SimpleCollisionSampler> {
    Arc::new(SimpleCollisionSampler::new(CollisionModel::new(0.3, 0.0, 12.0).unwrap()))
}

fn run(config: TrackingConfig, particles: usize) -> transport_for_mc::RunResults {
    let (geometry, materials) = shells();
    let mut settings = Settings::new(particles, 5, IndependentSource::new());
    settings.seed = Some(3);
    Model::new(geometry, materials, settings, physics())
        .with_config(config)
        .with_energy_grids(Some(grid()), None)
        .run()
        .unwrap()
}

#[test]
fn test_every_history_terminates() {
    let results = run(TrackingConfig::default(), 400);
    let c = &results.counters;
    assert_eq!(c.histories, 2000);
    assert_eq!(c.loop_anomalies, 0);
    // Absorbing collisions plus leaked weight account for every history
    assert_relative_eq!(c.captures as f64 + c.neutron_leak_weight + c.energy_cutoffs as f64, 2000.0);
    assert!(results.leakage.mean > 0.0 && results.leakage.mean < 1.0);
}

#[test]
fn test_delta_and_surface_tracking_agree() {
    let delta = run(TrackingConfig::default(), 2000);
    let surface = run(
        TrackingConfig {
            delta_tracking: false,
            ..TrackingConfig::default()
        },
        2000,
    );
    assert!(delta.counters.delta_tracks > 0);
    assert_eq!(surface.counters.delta_tracks, 0);
    assert_eq!(surface.counters.virtual_collisions, 0);
    let sigma = (delta.leakage.std_dev.powi(2) + surface.leakage.std_dev.powi(2)).sqrt();
    assert!(
        (delta.leakage.mean - surface.leakage.mean).abs() < 4.0 * sigma + 1e-3,
        "{} vs {}",
        delta.leakage,
        surface.leakage
    );
}

#[test]
fn test_low_threshold_forces_surface_tracking_in_thin_shell() {
    // The thin shell rejects 90% of majorant samples, so a threshold of 0.5
    // sends it to surface tracking while the dense core stays on delta tracking
    let results = run(
        TrackingConfig {
            delta_tracking_threshold: 0.5,
            ..TrackingConfig::default()
        },
        500,
    );
    assert!(results.counters.surface_tracks > 0);
    assert!(results.counters.delta_tracks > 0);
}

#[test]
fn test_flux_sink_sees_both_materials() {
    let (geometry, materials) = shells();
    let mut settings = Settings::new(300, 2, IndependentSource::new());
    settings.seed = Some(8);
    let sink = MaterialFluxSink::new(2, 4);
    let model = Model::new(geometry, materials, settings, physics())
        .with_config(TrackingConfig {
            threads: Some(4),
            ..TrackingConfig::default()
        })
        .with_energy_grids(Some(grid()), None);
    model.run_with_sink(&sink).unwrap();
    let flux = sink.flux();
    assert!(flux[0] > 0.0 && flux[1] > 0.0);
    let collisions = sink.real_collisions();
    assert!(collisions[0] > collisions[1]);
}

#[test]
fn test_reflective_infinite_medium_never_leaks() {
    let cube = Arc::new(Surface::cuboid([-1.0; 3], [1.0; 3], 1));
    let geometry = Geometry::new(vec![
        Cell::new(1, Region::inside(&cube), CellFill::Material(MaterialHandle(0))),
        Cell::new(2, Region::outside(&cube), CellFill::Outside),
    ])
    .unwrap()
    .with_boundary(BoundaryCondition::Reflective, Some(cube.clone()))
    .unwrap();
    let mut materials = Materials::new();
    materials.append(material("m", vec![0.5; 5]));
    let mut source = IndependentSource::new();
    source.angle = AngularDistribution::Isotropic;
    let settings = Settings::new(200, 2, source);
    let results = Model::new(
        geometry,
        materials,
        settings,
        Arc::new(SimpleCollisionSampler::new(CollisionModel::new(0.5, 0.0, 1.0).unwrap())),
    )
    .with_config(TrackingConfig::default())
    .with_energy_grids(Some(grid()), None)
    .run()
    .unwrap();
    assert_eq!(results.counters.neutron_leak_weight, 0.0);
    assert_eq!(results.counters.captures + results.counters.energy_cutoffs, 400);
    assert!(results.counters.surface_crossings > 0);
}

#[test]
fn test_criticality_mode_k_estimate() {
    let (geometry, materials) = shells();
    let mut settings = Settings::new(500, 6, IndependentSource::new());
    settings.inactive_batches = 2;
    let fissile = SimpleCollisionSampler::new(CollisionModel::new(0.2, 0.4, 235.0).unwrap().with_nu(2.5));
    let results = Model::new(geometry, materials, settings, Arc::new(fissile))
        .with_config(TrackingConfig {
            mode: SimulationMode::Criticality,
            ..TrackingConfig::default()
        })
        .with_energy_grids(Some(grid()), None)
        .run()
        .unwrap();
    let k = results.k_eff.unwrap();
    assert_eq!(k.n_batches, 4);
    assert!(k.mean > 0.1 && k.mean < 2.5, "{k}");
    assert!(results.counters.fissions > 0);
}
