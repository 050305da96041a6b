//! Univariate slice sampling for hyperparameter inference
use rand::Rng;

/// Information from the last step of a sampler update
pub struct MhResult<T> {
    /// The final value of the Markov chain
    pub x: T,
    /// The score of `x` under the target log density
    pub score_x: f64,
}

impl<T> From<(T, f64)> for MhResult<T> {
    fn from(tuple: (T, f64)) -> MhResult<T> {
        MhResult {
            x: tuple.0,
            score_x: tuple.1,
        }
    }
}

const STEP_OUT_LIMIT: usize = 15;

fn slice_stepping_out<F>(
    ln_height: f64,
    x: f64,
    step_size: f64,
    score_fn: &F,
    r: f64,
    bounds: (f64, f64),
) -> (f64, f64)
where
    F: Fn(f64) -> f64,
{
    let x_left = {
        let mut x_left = r.mul_add(-step_size, x);
        let mut loop_counter: usize = 0;
        let mut step = step_size;
        loop {
            if x_left < bounds.0 {
                break bounds.0;
            } else if score_fn(x_left) < ln_height {
                break x_left;
            }

            x_left -= step;
            step *= 2.0;

            if loop_counter == STEP_OUT_LIMIT {
                panic!(
                    "x_left step ({}/{}) limit ({}) hit. x = {}, height = {}",
                    step_size, step, STEP_OUT_LIMIT, x, ln_height,
                )
            }
            loop_counter += 1;
        }
    };

    let x_right = {
        let mut x_right = (1.0 - r).mul_add(step_size, x);
        let mut loop_counter: usize = 0;
        let mut step = step_size;
        loop {
            if x_right > bounds.1 {
                break bounds.1;
            } else if score_fn(x_right) < ln_height {
                break x_right;
            }

            x_right += step;
            step *= 2.0;

            if loop_counter == STEP_OUT_LIMIT {
                panic!("x_right step limit ({}) hit", STEP_OUT_LIMIT)
            }
            loop_counter += 1;
        }
    };

    (x_left, x_right)
}

fn mh_slice_step<F, R>(
    x_start: f64,
    step_size: f64,
    max_iters: usize,
    score_fn: &F,
    bounds: (f64, f64),
    rng: &mut R,
) -> MhResult<f64>
where
    F: Fn(f64) -> f64,
    R: Rng,
{
    let ln_fx = score_fn(x_start);
    let ln_u = rng.gen::<f64>().ln() + ln_fx;
    let (mut x_left, mut x_right) = slice_stepping_out(
        ln_u,
        x_start,
        step_size,
        score_fn,
        rng.gen::<f64>(),
        bounds,
    );

    let mut loop_counter = 0;
    loop {
        let x = rng.gen::<f64>().mul_add(x_right - x_left, x_left);
        let ln_fx = score_fn(x);
        if ln_fx > ln_u {
            break MhResult { x, score_x: ln_fx };
        }

        if loop_counter == max_iters {
            panic!("Slice interval tuning limit ({}) hit", max_iters)
        }

        if x > x_start {
            x_right = x;
        } else {
            x_left = x;
        };

        loop_counter += 1;
    }
}

/// Uses a slice sampler w/ the stepping out method to draw from a univariate
/// distribution known up to its log density restricted to `bounds`.
///
/// # Arguments
/// - x_start: the starting value, which must score finite
/// - step_size: width of the initial stepping-out bracket
/// - n_iters: the number of burn-in slice steps
/// - max_iters: safety bound on interval-shrinking iterations per step
/// - score_fn: the target log density. Stepping out may probe values outside
///   `bounds`; the function must return `f64::NEG_INFINITY` there rather
///   than fail.
/// - bounds: the support `(lower, upper)`; either side may be infinite
/// - rng: the random number generator
///
/// # Notes
/// Under some circumstances the stepping out will hit the max iterations and
/// cause a panic. You might want to stay away from this sampler if you don't
/// know that your target is well behaved.
pub fn mh_slice<F, R>(
    x_start: f64,
    step_size: f64,
    n_iters: usize,
    max_iters: usize,
    score_fn: F,
    bounds: (f64, f64),
    rng: &mut R,
) -> MhResult<f64>
where
    F: Fn(f64) -> f64,
    R: Rng,
{
    (0..n_iters).fold(
        mh_slice_step(x_start, step_size, max_iters, &score_fn, bounds, rng),
        |acc, _| mh_slice_step(acc.x, step_size, max_iters, &score_fn, bounds, rng),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256Plus;

    fn slice_chain<F>(
        x_start: f64,
        score_fn: F,
        bounds: (f64, f64),
        n_steps: usize,
        rng: &mut Xoshiro256Plus,
    ) -> Vec<f64>
    where
        F: Fn(f64) -> f64,
    {
        let mut x = x_start;
        let mut samples: Vec<f64> = Vec::with_capacity(n_steps);
        for _ in 0..n_steps {
            x = mh_slice(x, 1.0, 1, 100, &score_fn, bounds, rng).x;
            samples.push(x);
        }
        samples
    }

    #[test]
    fn bounded_flat_target_stays_in_bounds() {
        let mut rng = Xoshiro256Plus::seed_from_u64(0xABCD);
        let score_fn = |x: f64| {
            if (0.25..=0.75).contains(&x) {
                0.0
            } else {
                f64::NEG_INFINITY
            }
        };
        let xs = slice_chain(0.5, score_fn, (0.25, 0.75), 500, &mut rng);
        assert!(xs.iter().all(|&x| (0.25..=0.75).contains(&x)));
    }

    #[test]
    fn gaussian_target_has_reasonable_moments() {
        let mut rng = Xoshiro256Plus::seed_from_u64(0x1337);
        let score_fn = |x: f64| -0.5 * x * x;
        let xs = slice_chain(
            0.0,
            score_fn,
            (f64::NEG_INFINITY, f64::INFINITY),
            2_000,
            &mut rng,
        );

        let n = xs.len() as f64;
        let mean = xs.iter().sum::<f64>() / n;
        let var = xs.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / n;

        assert!(mean.abs() < 0.25, "mean drifted: {}", mean);
        assert!((0.5..2.0).contains(&var), "variance off: {}", var);
    }

    #[test]
    fn same_seed_same_draws() {
        let score_fn = |x: f64| -0.5 * x * x;
        let mut rng_a = Xoshiro256Plus::seed_from_u64(243);
        let mut rng_b = Xoshiro256Plus::seed_from_u64(243);

        let a = mh_slice(
            0.1,
            1.0,
            10,
            1_000,
            score_fn,
            (f64::NEG_INFINITY, f64::INFINITY),
            &mut rng_a,
        );
        let b = mh_slice(
            0.1,
            1.0,
            10,
            1_000,
            score_fn,
            (f64::NEG_INFINITY, f64::INFINITY),
            &mut rng_b,
        );

        assert_eq!(a.x, b.x);
        assert_eq!(a.score_x, b.score_x);
    }
}
