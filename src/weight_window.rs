use crate::error::{Result, TransportError};
use crate::fast_rng::FastRng;
use crate::particle::Particle;

/// Variance reduction by weight windows.
///
/// The tracker stops particles on window boundaries and calls
/// [`WeightWindow::apply`] there and at the start of every history.
pub trait WeightWindow: Send + Sync {
    /// Distance along the particle's direction to the next window boundary.
    fn distance_to_boundary(&self, _particle: &Particle) -> f64 {
        f64::INFINITY
    }

    /// Roulette or split the particle. Split copies are pushed to `splits`,
    /// possibly as a single entry with a non-zero multiplicity. Returns false
    /// when the particle is killed.
    fn apply(&self, particle: &mut Particle, rng: &mut FastRng, splits: &mut Vec<Particle>) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoWeightWindow;

impl WeightWindow for NoWeightWindow {
    fn apply(&self, _particle: &mut Particle, _rng: &mut FastRng, _splits: &mut Vec<Particle>) -> bool {
        true
    }
}

/// Windows on slabs along one coordinate axis.
#[derive(Debug, Clone)]
pub struct SlabWeightWindow {
    pub axis: usize,
    /// Ascending slab edges; bin `i` lies between `edges[i]` and `edges[i + 1]`.
    pub edges: Vec<f64>,
    /// Lower weight bound of each bin, zero disables the window there.
    pub lower: Vec<f64>,
    pub upper_ratio: f64,
    /// Weight given to roulette survivors, relative to the lower bound.
    pub survival_ratio: f64,
    pub max_split: u32,
}

impl SlabWeightWindow {
    pub fn new(axis: usize, edges: Vec<f64>, lower: Vec<f64>) -> Result<Self> {
        if axis > 2 {
            return Err(TransportError::OutOfRange {
                name: "weight window axis",
                value: axis as f64,
                reason: "must be 0, 1 or 2".to_string(),
            });
        }
        if edges.len() < 2 || lower.len() + 1 != edges.len() || edges.windows(2).any(|w| w[0] >= w[1]) {
            return Err(TransportError::OutOfRange {
                name: "weight window bins",
                value: lower.len() as f64,
                reason: "edges must ascend and number one more than the bounds".to_string(),
            });
        }
        Ok(SlabWeightWindow {
            axis,
            edges,
            lower,
            upper_ratio: 5.0,
            survival_ratio: 3.0,
            max_split: 10,
        })
    }

    fn bin(&self, x: f64) -> Option<usize> {
        if x < self.edges[0] || x >= self.edges[self.edges.len() - 1] {
            return None;
        }
        Some(self.edges.partition_point(|&e| e <= x) - 1)
    }
}

impl WeightWindow for SlabWeightWindow {
    fn distance_to_boundary(&self, particle: &Particle) -> f64 {
        let x = particle.position[self.axis];
        let u = particle.direction[self.axis];
        if u > 0.0 {
            self.edges
                .iter()
                .find(|&&e| e > x)
                .map_or(f64::INFINITY, |e| (e - x) / u)
        } else if u < 0.0 {
            self.edges
                .iter()
                .rev()
                .find(|&&e| e < x)
                .map_or(f64::INFINITY, |e| (e - x) / u)
        } else {
            f64::INFINITY
        }
    }

    fn apply(&self, particle: &mut Particle, rng: &mut FastRng, splits: &mut Vec<Particle>) -> bool {
        let Some(bin) = self.bin(particle.position[self.axis]) else {
            return true;
        };
        let wl = self.lower[bin];
        if wl <= 0.0 {
            return true;
        }
        let wu = wl * self.upper_ratio;
        if particle.weight < wl {
            let ws = wl * self.survival_ratio.min(self.upper_ratio);
            if rng.random() < particle.weight / ws {
                particle.weight = ws;
                return true;
            }
            return false;
        }
        if particle.weight > wu {
            let n = ((particle.weight / wu).ceil() as u32).clamp(2, self.max_split.max(2));
            particle.weight /= n as f64;
            let mut copy = particle.clone();
            copy.multiplicity = n - 2;
            splits.push(copy);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn window() -> SlabWeightWindow {
        SlabWeightWindow::new(0, vec![0.0, 1.0, 2.0], vec![0.5, 0.1]).unwrap()
    }

    #[test]
    fn test_distance_to_boundary() {
        let ww = window();
        let p = Particle::new([0.25, 0.0, 0.0], [0.5, 0.0, 0.8660254037844386], 1.0);
        assert_relative_eq!(ww.distance_to_boundary(&p), 1.5);
        let back = Particle::new([1.5, 0.0, 0.0], [-1.0, 0.0, 0.0], 1.0);
        assert_relative_eq!(ww.distance_to_boundary(&back), 0.5);
        let out = Particle::new([3.0, 0.0, 0.0], [1.0, 0.0, 0.0], 1.0);
        assert!(ww.distance_to_boundary(&out).is_infinite());
        assert!(NoWeightWindow.distance_to_boundary(&out).is_infinite());
    }

    #[test]
    fn test_split_uses_multiplicity() {
        let ww = window();
        let mut rng = FastRng::new(1);
        let mut splits = Vec::new();
        let mut p = Particle::new([1.5, 0.0, 0.0], [1.0, 0.0, 0.0], 1.0);
        p.weight = 2.0;
        // Upper bound 0.5 in the second bin: four copies of 0.5
        assert!(ww.apply(&mut p, &mut rng, &mut splits));
        assert_relative_eq!(p.weight, 0.5);
        assert_eq!(splits.len(), 1);
        assert_eq!(splits[0].multiplicity, 2);
    }

    #[test]
    fn test_roulette_preserves_expected_weight() {
        let ww = window();
        let mut rng = FastRng::new(4);
        let mut total = 0.0;
        let n = 20_000;
        for _ in 0..n {
            let mut p = Particle::new([0.5, 0.0, 0.0], [1.0, 0.0, 0.0], 1.0);
            p.weight = 0.3;
            if ww.apply(&mut p, &mut rng, &mut Vec::new()) {
                assert_relative_eq!(p.weight, 1.5);
                total += p.weight;
            }
        }
        assert_relative_eq!(total / n as f64, 0.3, max_relative = 0.05);
    }

    #[test]
    fn test_outside_mesh_untouched() {
        let ww = window();
        let mut p = Particle::new([-1.0, 0.0, 0.0], [1.0, 0.0, 0.0], 1.0);
        p.weight = 1e-6;
        assert!(ww.apply(&mut p, &mut FastRng::new(1), &mut Vec::new()));
        assert_eq!(p.weight, 1e-6);
        assert!(SlabWeightWindow::new(0, vec![1.0, 0.0], vec![1.0]).is_err());
    }
}
