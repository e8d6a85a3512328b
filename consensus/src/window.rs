//! Vote window for a single validation request

use quorumcast_core::{QUORUM_RATIO, VOTE_WINDOW};
use quorumcast_p2p::{ValidationRequest, Vote};
use tokio::time::Instant;

/// Outcome of a closed vote window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
}

/// Whether `tally` valid votes out of `total` ready nodes reach quorum
pub fn quorum_reached(tally: usize, total: usize) -> bool {
    if total == 0 {
        return false;
    }
    tally as f64 / total as f64 >= QUORUM_RATIO
}

/// Tally state for one request
#[derive(Debug, Clone)]
pub struct VoteWindow {
    request: ValidationRequest,
    payload: Vec<u8>,
    total: usize,
    tally: usize,
    deadline: Instant,
}

impl VoteWindow {
    /// Open a window; `total` is the ready-node count at this instant
    pub fn open(request: ValidationRequest, payload: Vec<u8>, total: usize, opened_at: Instant) -> Self {
        Self {
            request,
            payload,
            total,
            tally: 0,
            deadline: opened_at + VOTE_WINDOW,
        }
    }

    /// Count a vote received at `at`; returns whether the tally changed
    pub fn record(&mut self, vote: Vote, at: Instant) -> bool {
        if self.is_expired(at) || !vote.valid {
            return false;
        }
        self.tally += 1;
        true
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now > self.deadline
    }

    pub fn decide(&self) -> Decision {
        if quorum_reached(self.tally, self.total) {
            Decision::Approve
        } else {
            Decision::Reject
        }
    }

    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.tally as f64 / self.total as f64
        }
    }

    pub fn request(&self) -> &ValidationRequest {
        &self.request
    }

    /// Bytes the request arrived as
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn tally(&self) -> usize {
        self.tally
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn window(total: usize) -> (VoteWindow, Instant) {
        let opened = Instant::now();
        let req = ValidationRequest::new("Computer_A", "Computer_B", "Hello from A!");
        (VoteWindow::open(req, b"raw".to_vec(), total, opened), opened)
    }

    #[test]
    fn test_quorum_threshold() {
        assert!(quorum_reached(5, 5));
        assert!(!quorum_reached(4, 5));
        assert!(quorum_reached(9, 10));
        assert!(!quorum_reached(8, 10));
        assert!(!quorum_reached(0, 0));
    }

    #[test]
    fn test_all_votes_approve() {
        let (mut w, opened) = window(5);
        for i in 0..5 {
            assert!(w.record(Vote::approve(), opened + Duration::from_millis(100 * i)));
        }
        assert_eq!(w.tally(), 5);
        assert_eq!(w.ratio(), 1.0);
        assert_eq!(w.decide(), Decision::Approve);
    }

    #[test]
    fn test_four_of_five_rejects() {
        let (mut w, opened) = window(5);
        for _ in 0..4 {
            w.record(Vote::approve(), opened);
        }
        assert_eq!(w.decide(), Decision::Reject);
        assert_eq!((w.tally(), w.total()), (4, 5));
    }

    #[test]
    fn test_invalid_votes_not_counted() {
        let (mut w, opened) = window(3);
        assert!(!w.record(Vote::reject(), opened));
        assert!(w.record(Vote::approve(), opened));
        assert_eq!(w.tally(), 1);
    }

    #[test]
    fn test_late_vote_does_not_change_tally() {
        let (mut w, opened) = window(5);
        for _ in 0..4 {
            w.record(Vote::approve(), opened);
        }
        let before = w.decide();

        assert!(w.record(Vote::approve(), opened + VOTE_WINDOW));
        let late = opened + VOTE_WINDOW + Duration::from_millis(1);
        assert!(w.is_expired(late));
        assert!(!w.record(Vote::approve(), late));

        assert_eq!(w.tally(), 5);
        assert_eq!(before, Decision::Reject);
    }

    #[test]
    fn test_vote_after_boundary_matches_never_sent() {
        let (mut with_late, opened) = window(5);
        let (mut without, _) = window(5);
        for _ in 0..4 {
            with_late.record(Vote::approve(), opened);
            without.record(Vote::approve(), opened);
        }
        with_late.record(Vote::approve(), opened + VOTE_WINDOW + Duration::from_millis(1));

        assert_eq!(with_late.decide(), without.decide());
        assert_eq!(with_late.tally(), without.tally());
    }

    #[test]
    fn test_zero_total_rejects() {
        let (mut w, opened) = window(0);
        w.record(Vote::approve(), opened);
        assert_eq!(w.ratio(), 0.0);
        assert_eq!(w.decide(), Decision::Reject);
    }

    #[test]
    fn test_payload_kept_verbatim() {
        let (w, _) = window(1);
        assert_eq!(w.payload(), b"raw");
        assert_eq!(w.request().to, "Computer_B");
    }
}
