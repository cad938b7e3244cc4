//! Small numeric helpers shared by sampling code

use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

/// Standard normal draw
pub fn normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    StandardNormal.sample(rng)
}
