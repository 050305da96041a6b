#![warn(unused_extern_crates)]
#![warn(
    clippy::all,
    clippy::imprecise_flops,
    clippy::suboptimal_flops,
    clippy::unseparated_literal_suffix,
    clippy::unreadable_literal,
    clippy::option_option,
    clippy::implicit_clone
)]
//! Bookkeeping structures for the Pitman-Yor Chinese restaurant process.
//!
//! A [`Crp`] tracks how a stream of observations ("customers"), each labeled
//! with a value ("dish"), is partitioned into seating groups ("tables"). It is
//! intended as the partition prior inside Gibbs-sampling loops for
//! nonparametric mixtures and hierarchical language models.

mod crp;
mod histogram;
pub mod mh;

pub use crp::{Crp, SeatingDiagnostics};
pub use histogram::TableHistogram;
pub use rv;
