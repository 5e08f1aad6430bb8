// Majorant dominance and independence from worker scheduling

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use std::sync::Arc;
use transport_for_mc::config::FloorPolicy;
use transport_for_mc::reaction::PartialReaction;
use transport_for_mc::{EnergyGrid, MajorantBuilder, Majorants, Material, Materials, Reaction, TotalXs, TrackingConfig};

/// Materials with partials on a few different grids, some tabulated totals.
fn random_materials(rng: &mut Pcg64, count: usize) -> (Materials, EnergyGrid) {
    let grids: Vec<EnergyGrid> = (0..3)
        .map(|g| {
            let n = 6 + 3 * g;
            let mut points: Vec<f64> = (0..n)
                .map(|i| 1e-11 * 10f64.powf(12.3 * i as f64 / (n - 1) as f64) * (1.0 + 0.01 * g as f64))
                .collect();
            points.dedup();
            EnergyGrid::new(points).unwrap()
        })
        .collect();
    let union = EnergyGrid::unionize(&grids.iter().collect::<Vec<_>>()).unwrap();

    let mut materials = Materials::new();
    for m in 0..count {
        let grid = &grids[m % grids.len()];
        let values: Vec<f64> = (0..grid.len()).map(|_| rng.gen_range(0.1..10.0)).collect();
        let reaction = Arc::new(Reaction::on_grid(grid.clone(), values).unwrap());
        let material = if m % 2 == 0 {
            Material::new(&format!("m{m}")).with_neutron_total(TotalXs::tabulated(reaction))
        } else {
            let other = &grids[(m + 1) % grids.len()];
            let values: Vec<f64> = (0..other.len()).map(|_| rng.gen_range(0.0..5.0)).collect();
            let second = Arc::new(Reaction::on_grid(other.clone(), values).unwrap());
            Material::new(&format!("m{m}")).with_neutron_total(TotalXs::from_partials(vec![
                PartialReaction::new(reaction, rng.gen_range(0.1..1.0)),
                PartialReaction::new(second, 0.2).with_max_density(0.6),
            ]))
        };
        materials.append(material);
    }
    (materials, union)
}

#[test]
fn test_majorant_dominates_every_material() {
    let mut rng = Pcg64::seed_from_u64(2024);
    let (materials, grid) = random_materials(&mut rng, 12);
    let majorant = MajorantBuilder::new(&materials)
        .workers(4)
        .build_neutron(&grid, FloorPolicy::ComputedMinimum)
        .unwrap();
    for (i, e) in grid.iter().enumerate() {
        for material in materials.iter() {
            let total = material.neutron.value_at(*e);
            assert!(
                majorant.values[i] >= total * (1.0 - 1e-12),
                "{} exceeds the majorant at {e}",
                material.name
            );
        }
    }
    assert!(majorant.floor > 0.0 && majorant.floor.is_finite());
}

#[test]
fn test_claim_order_and_worker_count_do_not_matter() {
    let mut rng = Pcg64::seed_from_u64(99);
    let (materials, grid) = random_materials(&mut rng, 9);
    let reference = MajorantBuilder::new(&materials)
        .workers(1)
        .build_neutron(&grid, FloorPolicy::ComputedMinimum)
        .unwrap();
    for (workers, shuffle) in [(2, Some(1)), (3, Some(7)), (8, None), (5, Some(42))] {
        let other = MajorantBuilder::new(&materials)
            .workers(workers)
            .claim_shuffle(shuffle)
            .build_neutron(&grid, FloorPolicy::ComputedMinimum)
            .unwrap();
        assert_eq!(other.values, reference.values);
        assert_eq!(other.floor, reference.floor);
    }
}

#[test]
fn test_disabled_delta_tracking_builds_nothing() {
    let mut rng = Pcg64::seed_from_u64(5);
    let (materials, grid) = random_materials(&mut rng, 3);
    let config = TrackingConfig {
        delta_tracking: false,
        ..TrackingConfig::default()
    };
    let majorants = Majorants::build(&materials, Some(&grid), None, &config).unwrap();
    assert!(majorants.neutron.is_none());
    assert_eq!(majorants.floor(transport_for_mc::ParticleType::Neutron), 0.0);
}
