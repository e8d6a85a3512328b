//! Leader selection
//!
//! The leader is the eligible candidate with the highest static rating.
//! Ratings are compared with a strict greater-than while folding left to
//! right, so among equal maxima the earliest candidate wins.

use std::sync::Arc;

/// Anything that can stand for leadership
pub trait LeaderCandidate {
    fn rating(&self) -> f64;

    /// Ready with a working pub/sub session
    fn is_eligible(&self) -> bool;
}

impl<T: LeaderCandidate + ?Sized> LeaderCandidate for Arc<T> {
    fn rating(&self) -> f64 {
        (**self).rating()
    }

    fn is_eligible(&self) -> bool {
        (**self).is_eligible()
    }
}

/// Pick the leader from a snapshot of the pool, `None` if nobody is eligible
pub fn select_leader<C: LeaderCandidate>(pool: &[C]) -> Option<&C> {
    pool.iter()
        .filter(|candidate| candidate.is_eligible())
        .fold(None, |best: Option<&C>, candidate| match best {
            Some(current) if candidate.rating() > current.rating() => Some(candidate),
            Some(current) => Some(current),
            None => Some(candidate),
        })
}
