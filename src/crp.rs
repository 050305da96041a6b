//! The Pitman-Yor Chinese restaurant process
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::histogram::TableHistogram;
use crate::mh::mh_slice;
use crate::rv::dist::{Beta, Gamma};
use crate::rv::traits::Rv;

/// Width of the initial slice-sampler bracket for hyperparameter updates
const SLICE_STEP_SIZE: f64 = 1.0;

fn ln_gamma(x: f64) -> f64 {
    ::special::Gamma::ln_gamma(x).0
}

/// A Pitman-Yor Chinese restaurant process over dishes of type `D`.
///
/// Tracks, per dish, how its customers are spread over tables, along with the
/// global table and customer totals, the two Pitman-Yor hyperparameters, and
/// optional hyperpriors on them. Seating (`increment`), unseating
/// (`decrement`), the predictive probability (`prob`), the marginal
/// log-likelihood of the arrangement (`ln_f_partition`), and hyperparameter
/// resampling are the operations a Gibbs sweep drives.
///
/// This structure assumes the observation likelihoods are either 1 (when
/// identical to the draw from the base distribution) or 0, which holds for
/// most discrete-count applications but not for general mixture components.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Crp<D: Eq + Hash> {
    n_tables: usize,
    n_customers: usize,
    dishes: HashMap<D, TableHistogram>,
    discount: f64,
    strength: f64,
    discount_prior: Option<Beta>,
    strength_prior: Option<Gamma>,
}

/// The ways the restaurant bookkeeping can go wrong, one flag per invariant
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatingDiagnostics {
    /// `n_customers` equals the sum of per-dish customer counts
    pub customer_sum_agrees: bool,
    /// `n_tables` equals the sum of per-dish table counts
    pub table_sum_agrees: bool,
    /// Every dish entry has at least one seated customer
    pub no_empty_dishes: bool,
    /// For every dish, `1 <= tables <= customers`
    pub tables_bounded_by_customers: bool,
    /// `0 <= discount < 1` and `strength > -discount`
    pub hyperparameters_in_domain: bool,
}

impl SeatingDiagnostics {
    /// `true` if none of the invariants is violated
    pub fn is_valid(&self) -> bool {
        self.customer_sum_agrees
            && self.table_sum_agrees
            && self.no_empty_dishes
            && self.tables_bounded_by_customers
            && self.hyperparameters_in_domain
    }
}

impl<D: Eq + Hash> Crp<D> {
    /// Create a restaurant with fixed hyperparameters and no hyperpriors
    ///
    /// # Panics
    /// If `discount` is outside `[0, 1)` or `strength <= -discount`.
    pub fn new(discount: f64, strength: f64) -> Self {
        Self::with_hyper_priors(discount, strength, None, None)
    }

    /// Create a restaurant with optional hyperpriors: a beta prior on the
    /// discount and a gamma prior on `strength + discount`. Priors left as
    /// `None` exclude the corresponding parameter from resampling.
    pub fn with_hyper_priors(
        discount: f64,
        strength: f64,
        discount_prior: Option<Beta>,
        strength_prior: Option<Gamma>,
    ) -> Self {
        let crp = Self {
            n_tables: 0,
            n_customers: 0,
            dishes: HashMap::new(),
            discount,
            strength,
            discount_prior,
            strength_prior,
        };
        crp.check_hyperparameters();
        crp
    }

    fn check_hyperparameters(&self) {
        if !(0.0..1.0).contains(&self.discount) {
            panic!("Bad discount: {}", self.discount);
        }
        if self.strength <= -self.discount {
            panic!(
                "Bad strength: {} (discount={})",
                self.strength, self.discount
            );
        }
    }

    pub fn discount(&self) -> f64 {
        self.discount
    }

    pub fn strength(&self) -> f64 {
        self.strength
    }

    pub fn set_hyperparameters(&mut self, discount: f64, strength: f64) {
        self.discount = discount;
        self.strength = strength;
        self.check_hyperparameters();
    }

    pub fn set_discount(&mut self, discount: f64) {
        self.discount = discount;
        self.check_hyperparameters();
    }

    pub fn set_strength(&mut self, strength: f64) {
        self.strength = strength;
        self.check_hyperparameters();
    }

    pub fn has_discount_prior(&self) -> bool {
        self.discount_prior.is_some()
    }

    pub fn has_strength_prior(&self) -> bool {
        self.strength_prior.is_some()
    }

    /// Total number of open tables across all dishes
    pub fn n_tables(&self) -> usize {
        self.n_tables
    }

    /// Total number of seated customers across all dishes
    pub fn n_customers(&self) -> usize {
        self.n_customers
    }

    /// Number of tables serving `dish`; 0 if the dish is unseen
    pub fn n_tables_of(&self, dish: &D) -> usize {
        self.dishes.get(dish).map_or(0, TableHistogram::n_tables)
    }

    /// Number of customers eating `dish`; 0 if the dish is unseen
    pub fn n_customers_of(&self, dish: &D) -> usize {
        self.dishes.get(dish).map_or(0, TableHistogram::n_customers)
    }

    /// Unseat everything, keeping hyperparameters and priors
    pub fn clear(&mut self) {
        self.n_tables = 0;
        self.n_customers = 0;
        self.dishes.clear();
    }

    /// Iterate over `(dish, histogram)` pairs in no particular order.
    ///
    /// A parent-level restaurant in a hierarchy seats one customer per
    /// *table* of its children, which is why tables stay distinguishable
    /// from raw customer counts here.
    pub fn iter(&self) -> impl Iterator<Item = (&D, &TableHistogram)> {
        self.dishes.iter()
    }

    /// Seat one customer labeled `dish`, with base probability `p0` of the
    /// dish under the base distribution. Returns whether a new table was
    /// opened.
    pub fn increment<R: Rng>(&mut self, dish: D, p0: f64, rng: &mut R) -> bool {
        debug_assert!(p0 >= 0.0, "negative base probability");
        let p_empty = (self.n_tables as f64).mul_add(self.discount, self.strength) * p0;
        let loc = self.dishes.entry(dish).or_default();
        let share_table = if loc.n_customers() > 0 {
            let p_share =
                (loc.n_tables() as f64).mul_add(-self.discount, loc.n_customers() as f64);
            rng.gen::<f64>() * (p_share + p_empty) < p_share
        } else {
            // a fresh dish has no table to share
            false
        };
        if share_table {
            loc.share_table(self.discount, rng);
        } else {
            loc.create_table();
            self.n_tables += 1;
        }
        self.n_customers += 1;
        !share_table
    }

    /// Unseat one customer eating `dish`, selected with probability
    /// proportional to table occupancy. Returns whether a table was closed.
    ///
    /// # Panics
    /// If `dish` has no seated customers.
    pub fn decrement<R: Rng>(&mut self, dish: &D, rng: &mut R) -> bool {
        let loc = self
            .dishes
            .get_mut(dish)
            .expect("decrement on a dish with no seated customers");
        if loc.n_customers() == 1 {
            // the last customer sits alone at the dish's only table, so the
            // general removal machinery is not needed
            self.dishes.remove(dish);
            self.n_tables -= 1;
            self.n_customers -= 1;
            true
        } else {
            let closed = loc.remove_customer(rng);
            self.n_customers -= 1;
            if closed {
                self.n_tables -= 1;
            }
            closed
        }
    }

    /// The two-parameter predictive probability of the next customer taking
    /// `dish`, given base probability `p0`
    pub fn prob(&self, dish: &D, p0: f64) -> f64 {
        let r = (self.n_tables as f64).mul_add(self.discount, self.strength);
        let z = self.n_customers as f64 + self.strength;
        match self.dishes.get(dish) {
            Some(loc) => {
                let shared =
                    (loc.n_tables() as f64).mul_add(-self.discount, loc.n_customers() as f64);
                r.mul_add(p0, shared) / z
            }
            None => r * p0 / z,
        }
    }

    /// Log joint density of the current seating arrangement under the current
    /// hyperparameters. Does not include base-distribution factors.
    pub fn ln_f_partition(&self) -> f64 {
        self.ln_f_partition_given(self.discount, self.strength)
    }

    /// Log joint density of the current seating arrangement under the given
    /// hyperparameter values, plus the hyperprior log densities when priors
    /// are present.
    pub fn ln_f_partition_given(&self, discount: f64, strength: f64) -> f64 {
        let mut lp = self
            .discount_prior
            .as_ref()
            .map_or(0.0, |prior| prior.ln_f(&discount));
        if let Some(prior) = &self.strength_prior {
            lp += prior.ln_f(&(strength + discount));
        }
        debug_assert!(lp <= 0.0, "positive hyperprior log density: {}", lp);

        if self.n_customers > 0 {
            let n = self.n_customers as f64;
            let t = self.n_tables as f64;
            if discount > 0.0 {
                let r = ln_gamma(1.0 - discount);
                if strength != 0.0 {
                    lp += ln_gamma(strength) - ln_gamma(strength / discount);
                }
                lp += t.mul_add(discount.ln(), ln_gamma(strength / discount + t))
                    - ln_gamma(strength + n);
                for hist in self.dishes.values() {
                    for (size, count) in hist.iter() {
                        lp += (ln_gamma(size as f64 - discount) - r) * count as f64;
                    }
                }
            } else if discount == 0.0 {
                // Dirichlet process
                lp += t.mul_add(strength.ln(), ln_gamma(strength)) - ln_gamma(strength + n);
                for hist in self.dishes.values() {
                    lp += ln_gamma(hist.n_tables() as f64);
                }
            } else {
                unreachable!("negative discount in seating log density");
            }
        }
        assert!(lp.is_finite(), "Non finite seating log density");
        lp
    }

    // Total over proposals: stepping out probes values outside the support
    fn slice_score(&self, discount: f64, strength: f64) -> f64 {
        if !(0.0..1.0).contains(&discount) || strength <= -discount {
            f64::NEG_INFINITY
        } else {
            self.ln_f_partition_given(discount, strength)
        }
    }

    /// Slice-resample the hyperparameters that carry a prior from the
    /// posterior given the current seating arrangement.
    ///
    /// # Arguments
    /// - rng: the random number generator
    /// - n_loops: number of strength/discount sweeps (5 is customary)
    /// - n_iters: burn-in slice steps per draw (10 is customary); the safety
    ///   bound on each draw is `100 * n_iters`
    ///
    /// # Panics
    /// If neither hyperprior is present. A no-op while no customer is seated.
    pub fn resample_hyperparameters<R: Rng>(
        &mut self,
        rng: &mut R,
        n_loops: usize,
        n_iters: usize,
    ) {
        assert!(
            self.has_discount_prior() || self.has_strength_prior(),
            "resampling hyperparameters without a hyperprior"
        );
        if self.n_customers == 0 {
            return;
        }
        let max_iters = 100 * n_iters;
        for _ in 0..n_loops {
            if self.has_strength_prior() {
                let discount = self.discount;
                let res = mh_slice(
                    self.strength,
                    SLICE_STEP_SIZE,
                    n_iters,
                    max_iters,
                    |strength| self.slice_score(discount, strength),
                    (f64::MIN_POSITIVE - self.discount, f64::INFINITY),
                    rng,
                );
                self.strength = res.x;
            }
            if self.has_discount_prior() {
                let strength = self.strength;
                let lower = if strength < 0.0 {
                    f64::MIN_POSITIVE - strength
                } else {
                    f64::MIN_POSITIVE
                };
                let res = mh_slice(
                    self.discount,
                    SLICE_STEP_SIZE,
                    n_iters,
                    max_iters,
                    |discount| self.slice_score(discount, strength),
                    (lower, 1.0),
                    rng,
                );
                self.discount = res.x;
            }
        }
        let discount = self.discount;
        let res = mh_slice(
            self.strength,
            SLICE_STEP_SIZE,
            n_iters,
            max_iters,
            |strength| self.slice_score(discount, strength),
            (-self.discount, f64::INFINITY),
            rng,
        );
        self.strength = res.x;
    }

    /// Check the bookkeeping invariants
    pub fn validate(&self) -> SeatingDiagnostics {
        let customer_sum: usize = self
            .dishes
            .values()
            .map(TableHistogram::n_customers)
            .sum();
        let table_sum: usize = self.dishes.values().map(TableHistogram::n_tables).sum();
        SeatingDiagnostics {
            customer_sum_agrees: customer_sum == self.n_customers,
            table_sum_agrees: table_sum == self.n_tables,
            no_empty_dishes: self.dishes.values().all(|h| h.n_customers() > 0),
            tables_bounded_by_customers: self
                .dishes
                .values()
                .all(|h| h.n_tables() >= 1 && h.n_tables() <= h.n_customers()),
            hyperparameters_in_domain: (0.0..1.0).contains(&self.discount)
                && self.strength > -self.discount,
        }
    }
}

impl<D: Eq + Hash + fmt::Display> fmt::Display for Crp<D> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(
            f,
            "PYP(d={}, s={}) tables={} customers={}",
            self.discount, self.strength, self.n_tables, self.n_customers
        )?;
        for (dish, hist) in &self.dishes {
            writeln!(f, "{} : {}", dish, hist)?;
        }
        Ok(())
    }
}
