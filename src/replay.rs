//! Per-peer epoch and replay-window tracking (spec 4.2).
//!
//! Handshake records (epoch 0) use a strictly increasing sequence number
//! with no window. Application records (epoch > 0) use the RFC 6347 64-bit
//! sliding-window bitmap, bit 0 being the newest accepted sequence.

use crate::coding::{seq48_to_u64, u64_to_seq48};
use crate::error::DtlsError;

/// Outcome of checking an inbound sequence number before its MAC has been
/// verified. The caller must call `commit` or `rollback` to finish the
/// transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The record is fresh; provisionally accepted pending MAC success.
    Fresh,
}

/// A snapshot of replay state taken before a provisional update, so a
/// failed MAC check can roll the state back to exactly where it was (spec
/// 4.2, 8 property 1).
#[derive(Debug, Clone, Copy)]
pub struct Snapshot {
    remote_seq_hi: u16,
    remote_seq_lo: u32,
    sliding_window: u64,
}

pub struct EpochState {
    pub local_epoch: u16,
    pub remote_epoch: u16,
    /// Next outbound record sequence number to stamp into a framed record
    /// at the current local epoch; every call to `next_local_seq` returns
    /// the current value and increments it (spec 4.1/6: the 48-bit record
    /// sequence must strictly increase per record within an epoch).
    local_seq: u64,
    /// Highest handshake-sequence (epoch 0) we have accepted; `None` before
    /// the session has received anything.
    handshake_seq: Option<u64>,
    /// Right edge of the application-record (epoch > 0) sliding window.
    remote_seq_hi: u16,
    remote_seq_lo: u32,
    sliding_window: u64,
    /// Whether any record (therefore a right edge) has been observed yet
    /// in the current epoch.
    window_initialized: bool,
}

impl Default for EpochState {
    fn default() -> Self {
        EpochState {
            local_epoch: 0,
            remote_epoch: 0,
            local_seq: 0,
            handshake_seq: None,
            remote_seq_hi: 0,
            remote_seq_lo: 0,
            sliding_window: 0,
            window_initialized: false,
        }
    }
}

impl EpochState {
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            remote_seq_hi: self.remote_seq_hi,
            remote_seq_lo: self.remote_seq_lo,
            sliding_window: self.sliding_window,
        }
    }

    pub fn rollback(&mut self, snap: Snapshot) {
        self.remote_seq_hi = snap.remote_seq_hi;
        self.remote_seq_lo = snap.remote_seq_lo;
        self.sliding_window = snap.sliding_window;
    }

    /// Called when a CCS is received/sent: bumps the remote epoch and
    /// resets the sequence/window state for the new epoch (spec 3: "the
    /// sequence counter resets to zero on every epoch advance").
    pub fn advance_remote_epoch(&mut self) {
        self.remote_epoch += 1;
        self.remote_seq_hi = 0;
        self.remote_seq_lo = 0;
        self.sliding_window = 0;
        self.window_initialized = false;
    }

    pub fn advance_local_epoch(&mut self) {
        self.local_epoch += 1;
        self.local_seq = 0;
    }

    /// Returns the next outbound record sequence number at the current
    /// local epoch and advances the counter.
    pub fn next_local_seq(&mut self) -> u64 {
        let seq = self.local_seq;
        self.local_seq += 1;
        seq
    }

    /// Checks an inbound record's `(epoch, seq)` against replay state
    /// without committing the result. Returns `Ok(snapshot)` if the record
    /// should proceed to MAC verification, or the rejection error.
    ///
    /// `handshake_idle`: true iff the session's handshake state machine is
    /// still in its idle state, needed to special-case "epoch 0, seq 0"
    /// (spec 4.2).
    pub fn check(&mut self, epoch: u16, seq_hi: u16, seq_lo: u32, handshake_idle: bool) -> Result<Snapshot, DtlsError> {
        if epoch != self.remote_epoch {
            // Epoch mismatches happen naturally around CCS transitions;
            // the driver treats this as "continue waiting", never a
            // session-ending error, and never touches sequence state.
            return Err(DtlsError::InvalidEpoch);
        }

        let snap = self.snapshot();
        let seq = seq48_to_u64(seq_hi, seq_lo);

        if epoch == 0 {
            if seq == 0 {
                if !handshake_idle {
                    return Err(DtlsError::OutOfOrderMessage);
                }
                return Ok(snap);
            }
            match self.handshake_seq {
                Some(last) if seq <= last => Err(DtlsError::RepeatMessageReceived),
                _ => Ok(snap),
            }
        } else {
            self.check_window(seq).map(|_| snap)
        }
    }

    fn check_window(&self, seq: u64) -> Result<(), DtlsError> {
        if !self.window_initialized {
            return Ok(());
        }
        let right_edge = seq48_to_u64(self.remote_seq_hi, self.remote_seq_lo);
        if seq == right_edge {
            return Err(DtlsError::RepeatMessageReceived);
        }
        if seq > right_edge {
            return Ok(());
        }
        let delta = right_edge - seq;
        if delta >= 64 {
            return Err(DtlsError::RepeatMessageReceived);
        }
        if self.sliding_window & (1u64 << delta) != 0 {
            return Err(DtlsError::RepeatMessageReceived);
        }
        Ok(())
    }

    /// Commits a provisionally-admitted record's sequence number after its
    /// MAC has verified successfully.
    pub fn commit(&mut self, epoch: u16, seq_hi: u16, seq_lo: u32) {
        let seq = seq48_to_u64(seq_hi, seq_lo);
        if epoch == 0 {
            self.handshake_seq = Some(self.handshake_seq.map_or(seq, |last| last.max(seq)));
            return;
        }

        if !self.window_initialized {
            self.window_initialized = true;
            self.sliding_window = 1;
            let (hi, lo) = u64_to_seq48(seq);
            self.remote_seq_hi = hi;
            self.remote_seq_lo = lo;
            return;
        }

        let right_edge = seq48_to_u64(self.remote_seq_hi, self.remote_seq_lo);
        if seq > right_edge {
            let shift = seq - right_edge;
            self.sliding_window = if shift >= 64 { 1 } else { (self.sliding_window << shift) | 1 };
            let (hi, lo) = u64_to_seq48(seq);
            self.remote_seq_hi = hi;
            self.remote_seq_lo = lo;
        } else {
            let delta = right_edge - seq;
            self.sliding_window |= 1u64 << delta;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admit(state: &mut EpochState, epoch: u16, seq: u64) -> Result<(), DtlsError> {
        admit_at(state, epoch, seq, false)
    }

    fn admit_at(state: &mut EpochState, epoch: u16, seq: u64, handshake_idle: bool) -> Result<(), DtlsError> {
        let (hi, lo) = u64_to_seq48(seq);
        let snap = state.check(epoch, hi, lo, handshake_idle)?;
        // Simulate a successful MAC check; on failure the caller would
        // instead call state.rollback(snap).
        let _ = snap;
        state.commit(epoch, hi, lo);
        Ok(())
    }

    #[test]
    fn s3_window_accepts_out_of_order_and_rejects_repeat() {
        let mut state = EpochState::default();
        state.advance_remote_epoch(); // epoch -> 1
        admit(&mut state, 1, 5).unwrap();
        assert_eq!(state.sliding_window, 0b1);
        admit(&mut state, 1, 2).unwrap();
        // right edge stays 5, bit (5-2)=3 set alongside bit 0
        assert_eq!(state.sliding_window, 0b1001);
        assert_matches::assert_matches!(admit(&mut state, 1, 2), Err(DtlsError::RepeatMessageReceived));
    }

    #[test]
    fn s4_far_left_of_window_is_rejected() {
        let mut state = EpochState::default();
        state.advance_remote_epoch();
        admit(&mut state, 1, 100).unwrap();
        // delta = 100 - 36 = 64, falls off the left
        assert_matches::assert_matches!(admit(&mut state, 1, 36), Err(DtlsError::RepeatMessageReceived));
        // delta = 100 - 37 = 63, bit clear -> accepted
        admit(&mut state, 1, 37).unwrap();
    }

    #[test]
    fn property_sliding_window_correctness() {
        let mut state = EpochState::default();
        state.advance_remote_epoch();
        admit(&mut state, 1, 1000).unwrap();
        for s in 937..1000u64 {
            let delta = 1000 - s;
            let bit_clear = state.sliding_window & (1u64 << delta) == 0;
            let result = admit(&mut state, 1, s);
            assert_eq!(result.is_ok(), bit_clear, "seq {} delta {}", s, delta);
        }
    }

    #[test]
    fn handshake_epoch_has_no_window_and_rejects_non_increasing() {
        let mut state = EpochState::default();
        admit_at(&mut state, 0, 0, true).unwrap();
        admit_at(&mut state, 0, 1, false).unwrap();
        assert_matches::assert_matches!(
            admit_at(&mut state, 0, 1, false),
            Err(DtlsError::RepeatMessageReceived)
        );
        // seq 0 again, but the state machine is no longer idle.
        assert_matches::assert_matches!(
            admit_at(&mut state, 0, 0, false),
            Err(DtlsError::OutOfOrderMessage)
        );
    }

    #[test]
    fn epoch_mismatch_is_invalid_epoch_and_does_not_mutate_state() {
        let mut state = EpochState::default();
        state.advance_remote_epoch();
        let before = state.snapshot();
        let err = state.check(5, 0, 1, false).unwrap_err();
        assert_matches::assert_matches!(err, DtlsError::InvalidEpoch);
        let after = state.snapshot();
        assert_eq!(before.sliding_window, after.sliding_window);
    }

    #[test]
    fn rollback_restores_exact_prior_state() {
        let mut state = EpochState::default();
        state.advance_remote_epoch();
        admit(&mut state, 1, 10).unwrap();
        let before = state.snapshot();
        let snap = state.check(1, 0, 11, false).unwrap();
        state.commit(1, 0, 11);
        assert_ne!(state.snapshot().sliding_window, before.sliding_window);
        state.rollback(snap);
        assert_eq!(state.snapshot().sliding_window, before.sliding_window);
        assert_eq!(state.snapshot().remote_seq_lo, before.remote_seq_lo);
    }
}
