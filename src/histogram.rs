//! Per-dish table-occupancy histograms
use std::collections::BTreeMap;
use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Tracks the tables serving one dish as a histogram over occupancy size.
///
/// `counts[size]` is the number of tables currently seating exactly `size`
/// customers. Bins with a zero count are absent, never present-with-zero, so
/// the likelihood sum only ever touches occupied sizes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableHistogram {
    n_tables: usize,
    n_customers: usize,
    counts: BTreeMap<usize, usize>,
}

impl TableHistogram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn n_tables(&self) -> usize {
        self.n_tables
    }

    pub fn n_customers(&self) -> usize {
        self.n_customers
    }

    /// Open a new table seating a single customer
    pub fn create_table(&mut self) {
        *self.counts.entry(1).or_insert(0) += 1;
        self.n_tables += 1;
        self.n_customers += 1;
    }

    /// Seat one customer at an existing table selected with probability
    /// proportional to `occupancy - discount`
    pub fn share_table<R: Rng>(&mut self, discount: f64, rng: &mut R) {
        assert!(self.n_customers > 0, "share_table on an empty histogram");
        let z = (self.n_tables as f64).mul_add(-discount, self.n_customers as f64);
        let mut r = rng.gen::<f64>() * z;
        // Cumulative scan over the bins; lands on the last bin if the draw
        // escapes the total through rounding.
        let mut size = 0;
        for (&bin, &count) in &self.counts {
            size = bin;
            let w = (bin as f64 - discount) * count as f64;
            if r < w {
                break;
            }
            r -= w;
        }
        self.move_table(size, size + 1);
        self.n_customers += 1;
    }

    /// Remove one customer selected uniformly at random (a table is selected
    /// with probability proportional to its occupancy). Returns whether the
    /// table it left became empty and was closed.
    pub fn remove_customer<R: Rng>(&mut self, rng: &mut R) -> bool {
        assert!(self.n_customers > 0, "remove_customer on an empty histogram");
        let mut r = rng.gen::<f64>() * self.n_customers as f64;
        let mut size = 0;
        for (&bin, &count) in &self.counts {
            size = bin;
            let w = (bin * count) as f64;
            if r < w {
                break;
            }
            r -= w;
        }
        self.n_customers -= 1;
        if size == 1 {
            self.drop_table(1);
            self.n_tables -= 1;
            true
        } else {
            self.move_table(size, size - 1);
            false
        }
    }

    /// Iterate over `(occupancy, number-of-tables-with-that-occupancy)` bins
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.counts.iter().map(|(&size, &count)| (size, count))
    }

    fn drop_table(&mut self, size: usize) {
        match self.counts.get_mut(&size) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                self.counts.remove(&size);
            }
            None => unreachable!("no table with occupancy {}", size),
        }
    }

    fn move_table(&mut self, from: usize, to: usize) {
        self.drop_table(from);
        *self.counts.entry(to).or_insert(0) += 1;
    }
}

impl fmt::Display for TableHistogram {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "tables={} customers={} [", self.n_tables, self.n_customers)?;
        for (ix, (size, count)) in self.iter().enumerate() {
            if ix > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}x{}", size, count)?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;

    fn bin_sums(hist: &TableHistogram) -> (usize, usize) {
        hist.iter()
            .fold((0, 0), |(t, c), (size, count)| (t + count, c + size * count))
    }

    #[test]
    fn create_table_seats_one_customer() {
        let mut hist = TableHistogram::new();
        hist.create_table();

        assert_eq!(hist.n_tables(), 1);
        assert_eq!(hist.n_customers(), 1);
        assert_eq!(bin_sums(&hist), (1, 1));
    }

    #[test]
    fn share_low_draw_grows_the_smallest_table() {
        // u = 0 always lands on the first bin of the scan
        let mut rng = StepRng::new(0, 0);
        let mut hist = TableHistogram::new();
        hist.create_table();
        hist.create_table();
        hist.share_table(0.5, &mut rng);

        assert_eq!(hist.n_tables(), 2);
        assert_eq!(hist.n_customers(), 3);
        let bins: Vec<(usize, usize)> = hist.iter().collect();
        assert_eq!(bins, vec![(1, 1), (2, 1)]);
    }

    #[test]
    fn share_high_draw_grows_the_largest_table() {
        let mut rng = StepRng::new(u64::MAX, 0);
        let mut hist = TableHistogram::new();
        hist.create_table();
        hist.create_table();
        // put bins at 1 and 2 first
        hist.share_table(0.5, &mut StepRng::new(0, 0));
        hist.share_table(0.5, &mut rng);

        let bins: Vec<(usize, usize)> = hist.iter().collect();
        assert_eq!(bins, vec![(1, 1), (3, 1)]);
        assert_eq!(hist.n_customers(), 4);
    }

    #[test]
    fn remove_customer_signals_when_a_table_closes() {
        let mut rng = StepRng::new(0, 0);
        let mut hist = TableHistogram::new();
        hist.create_table();
        hist.create_table();

        let closed = hist.remove_customer(&mut rng);

        assert!(closed);
        assert_eq!(hist.n_tables(), 1);
        assert_eq!(hist.n_customers(), 1);
        assert_eq!(bin_sums(&hist), (1, 1));
    }

    #[test]
    fn remove_customer_from_shared_table_keeps_it_open() {
        let mut hist = TableHistogram::new();
        hist.create_table();
        hist.share_table(0.5, &mut StepRng::new(0, 0));
        assert_eq!(hist.iter().collect::<Vec<_>>(), vec![(2, 1)]);

        let closed = hist.remove_customer(&mut StepRng::new(0, 0));

        assert!(!closed);
        assert_eq!(hist.n_tables(), 1);
        assert_eq!(hist.n_customers(), 1);
        assert_eq!(hist.iter().collect::<Vec<_>>(), vec![(1, 1)]);
    }

    #[test]
    fn bins_always_agree_with_totals() {
        let mut rng = StepRng::new(0x5555_5555_5555_5555, 0x1111_1111_1111_1111);
        let mut hist = TableHistogram::new();
        hist.create_table();
        for i in 0..100 {
            if i % 3 == 0 {
                hist.create_table();
            } else {
                hist.share_table(0.25, &mut rng);
            }
            let (tables, customers) = bin_sums(&hist);
            assert_eq!(tables, hist.n_tables());
            assert_eq!(customers, hist.n_customers());
        }
        while hist.n_customers() > 1 {
            hist.remove_customer(&mut rng);
            let (tables, customers) = bin_sums(&hist);
            assert_eq!(tables, hist.n_tables());
            assert_eq!(customers, hist.n_customers());
            assert!(hist.n_tables() >= 1);
        }
    }

    #[test]
    #[should_panic]
    fn remove_from_empty_histogram_panics() {
        let mut hist = TableHistogram::new();
        hist.remove_customer(&mut StepRng::new(0, 0));
    }

    #[test]
    fn display_lists_bins() {
        let mut hist = TableHistogram::new();
        hist.create_table();
        hist.create_table();
        hist.share_table(0.5, &mut StepRng::new(0, 0));

        assert_eq!(format!("{}", hist), "tables=2 customers=3 [1x1 2x1]");
    }
}
