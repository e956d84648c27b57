use firesight_common::grid::ActivityGrid;
use rand::Rng;

/// Most random lift a cell can get on top of the radial pattern.
const JITTER: f64 = 0.3;

/// Synthetic activity for cameras without history: a hot spot in the middle
/// fading linearly to zero at the nearer edge, plus jitter in `[0, 0.3)`.
/// Values never exceed 1.
pub fn generate_fallback_grid(rows: usize, cols: usize, rng: &mut impl Rng) -> ActivityGrid {
    let cx = cols as f64 / 2.0;
    let cy = rows as f64 / 2.0;
    let max_radius = cx.max(cy);

    ActivityGrid::from_fn(rows, cols, |i, j| {
        let dist = ((j as f64 - cx).powi(2) + (i as f64 - cy).powi(2)).sqrt();
        let base = (1.0 - dist / max_radius).max(0.0);
        (base + rng.gen_range(0.0..JITTER)).min(1.0)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn default_shape_and_bounds() {
        let grid = generate_fallback_grid(20, 30, &mut rand::thread_rng());
        assert_eq!(grid.rows(), 20);
        assert_eq!(grid.cols(), 30);
        assert!(grid.cells().all(|(_, _, v)| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn center_is_hot_and_corners_are_only_jitter() {
        let mut rng = StdRng::seed_from_u64(7);
        let grid = generate_fallback_grid(20, 30, &mut rng);
        assert!(grid.get(10, 15).unwrap() >= 1.0 - f64::EPSILON);
        for (r, c) in [(0, 0), (0, 29), (19, 0), (19, 29)] {
            let v = grid.get(r, c).unwrap();
            assert!(v < JITTER, "corner ({r}, {c}) = {v}");
        }
    }

    #[test]
    fn jitter_stays_within_band() {
        let mut rng = StdRng::seed_from_u64(42);
        let grid = generate_fallback_grid(20, 30, &mut rng);
        let (cx, cy) = (15.0, 10.0);
        for (i, j, v) in grid.cells() {
            let dist = ((j as f64 - cx).powi(2) + (i as f64 - cy).powi(2)).sqrt();
            let base = (1.0 - dist / 15.0).max(0.0);
            assert!(v >= base.min(1.0) - 1e-12);
            assert!(v < base + JITTER || v == 1.0);
        }
    }

    #[test]
    fn same_seed_same_grid() {
        let a = generate_fallback_grid(5, 8, &mut StdRng::seed_from_u64(1));
        let b = generate_fallback_grid(5, 8, &mut StdRng::seed_from_u64(1));
        assert_eq!(a, b);
    }

    #[test]
    fn zero_dimensions_give_empty_grid() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(generate_fallback_grid(0, 30, &mut rng).is_empty());
        assert!(generate_fallback_grid(20, 0, &mut rng).is_empty());
    }
}
