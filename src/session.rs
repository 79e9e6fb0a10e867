//! Mode and visited state shared between the frame producer and command
//! handlers (HTTP routes, key bindings).
//!
//! Everything lives behind one mutex. Update rate is at most camera rate, so a
//! coarse lock costs nothing and a status read can never see a half-updated
//! visited map.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::pose::PixelPoint;
use crate::tracker::{AlignmentReport, AlignmentTracker, AnatomicalTarget, ExamMode, VisitedState};

#[derive(Debug)]
struct SessionState {
    tracker: AlignmentTracker,
    reset_pending: bool,
    /// Bumped on every SetMode so a frame started before it can be discarded
    mode_epoch: u64,
}

/// Consistent view of the session, as served by `/status`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub mode: ExamMode,
    pub visited: VisitedState,
    pub total: usize,
    pub done: usize,
    pub progress: f32,
    #[serde(rename = "allDone")]
    pub all_done: bool,
}

/// Handed out by [`Session::start_frame`], checked again by [`Session::observe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTicket {
    pub mode: ExamMode,
    epoch: u64,
}

/// Cloneable handle to the shared session state
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<Mutex<SessionState>>,
}

impl Session {
    pub fn new(mode: ExamMode, alignment_radius: f32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SessionState {
                tracker: AlignmentTracker::new(mode, alignment_radius),
                reset_pending: false,
                mode_epoch: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn mode(&self) -> ExamMode {
        self.lock().tracker.mode()
    }

    /// Swap the target set and clear the visited record, even if `mode` is
    /// already active. Takes effect from the producer's next iteration.
    pub fn set_mode(&self, mode: ExamMode) {
        let mut state = self.lock();
        state.tracker.set_mode(mode);
        state.mode_epoch += 1;
        log::info!("[session] mode set to {mode}");
    }

    /// SetMode only if `mode` differs from the active one. Returns whether it
    /// switched.
    pub fn switch_mode(&self, mode: ExamMode) -> bool {
        let mut state = self.lock();
        if state.tracker.mode() == mode {
            return false;
        }
        state.tracker.set_mode(mode);
        state.mode_epoch += 1;
        log::info!("[session] mode switched to {mode}");
        true
    }

    pub fn toggle_mode(&self) -> ExamMode {
        let mut state = self.lock();
        let mode = state.tracker.mode().toggled();
        state.tracker.set_mode(mode);
        state.mode_epoch += 1;
        log::info!("[session] mode toggled to {mode}");
        mode
    }

    /// Queue a visited clear for the start of the next producer iteration.
    pub fn request_reset(&self) {
        self.lock().reset_pending = true;
        log::info!("[session] reset requested");
    }

    pub fn status(&self) -> StatusSnapshot {
        let state = self.lock();
        let progress = state.tracker.progress();
        StatusSnapshot {
            mode: state.tracker.mode(),
            visited: state.tracker.visited().clone(),
            total: progress.total,
            done: progress.done,
            progress: progress.percent,
            all_done: progress.all_done,
        }
    }

    /// Called by the producer at the top of each iteration: applies a pending
    /// reset and fixes the mode this frame is processed in.
    pub fn start_frame(&self) -> FrameTicket {
        let mut state = self.lock();
        if state.reset_pending {
            state.tracker.reset();
            state.reset_pending = false;
            log::debug!("[session] reset applied");
        }
        FrameTicket {
            mode: state.tracker.mode(),
            epoch: state.mode_epoch,
        }
    }

    /// Fold one frame's alignment into the visited record.
    ///
    /// Returns `None` when a SetMode landed after `ticket` was issued; the
    /// targets were computed for the old mode and are dropped.
    pub fn observe(
        &self,
        ticket: &FrameTicket,
        targets: &[AnatomicalTarget],
        hands: &[PixelPoint],
    ) -> Option<AlignmentReport> {
        let mut state = self.lock();
        if state.mode_epoch != ticket.epoch {
            return None;
        }
        Some(state.tracker.observe(targets, hands))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::Side;

    fn targets_for(mode: ExamMode) -> Vec<AnatomicalTarget> {
        mode.target_names()
            .zip(1u32..)
            .map(|(name, ordinal)| AnatomicalTarget {
                name,
                description: "",
                position: PixelPoint::new(100 * ordinal as i32, 100),
                ordinal,
                side: Side::Left,
            })
            .collect()
    }

    fn hand_on(ordinal: i32) -> PixelPoint {
        PixelPoint::new(100 * ordinal, 100)
    }

    #[test]
    fn test_status_counts() {
        let session = Session::new(ExamMode::Cardiac, 48.0);
        let ticket = session.start_frame();
        session.observe(&ticket, &targets_for(ExamMode::Cardiac), &[hand_on(1), hand_on(3)]);

        let status = session.status();
        assert_eq!(status.mode, ExamMode::Cardiac);
        assert_eq!(status.total, 5);
        assert_eq!(status.done, 2);
        assert_eq!(status.progress, 40.0);
        assert!(!status.all_done);
    }

    #[test]
    fn test_status_before_first_frame() {
        let status = Session::new(ExamMode::Lung, 48.0).status();
        assert_eq!(status.total, 7);
        assert_eq!(status.done, 0);
        assert_eq!(status.progress, 0.0);
    }

    #[test]
    fn test_status_json_shape() {
        let session = Session::new(ExamMode::Cardiac, 48.0);
        let ticket = session.start_frame();
        session.observe(&ticket, &targets_for(ExamMode::Cardiac), &[hand_on(2)]);
        let json: serde_json::Value = serde_json::to_value(session.status()).unwrap();
        assert_eq!(json["mode"], "heart");
        assert_eq!(json["visited"]["Pulmonic"], true);
        assert_eq!(json["visited"]["Aortic"], false);
        assert_eq!(json["total"], 5);
        assert_eq!(json["done"], 1);
        assert_eq!(json["progress"], 20.0);
        assert_eq!(json["allDone"], false);
    }

    #[test]
    fn test_reset_is_deferred_to_next_frame() {
        let session = Session::new(ExamMode::Cardiac, 48.0);
        let targets = targets_for(ExamMode::Cardiac);
        let ticket = session.start_frame();
        session.observe(&ticket, &targets, &[hand_on(1)]);

        session.request_reset();
        assert_eq!(session.status().done, 1);

        let ticket = session.start_frame();
        let report = session.observe(&ticket, &targets, &[]).unwrap();
        assert_eq!(report.progress.done, 0);
        assert!(report.targets.iter().all(|t| !t.visited));
    }

    #[test]
    fn test_reset_applied_once() {
        let session = Session::new(ExamMode::Cardiac, 48.0);
        let targets = targets_for(ExamMode::Cardiac);
        session.request_reset();
        let ticket = session.start_frame();
        session.observe(&ticket, &targets, &[hand_on(1)]);

        // a second frame must not clear again
        let ticket = session.start_frame();
        session.observe(&ticket, &targets, &[]);
        assert_eq!(session.status().done, 1);
    }

    #[test]
    fn test_set_same_mode_clears() {
        let session = Session::new(ExamMode::Cardiac, 48.0);
        let ticket = session.start_frame();
        session.observe(&ticket, &targets_for(ExamMode::Cardiac), &[hand_on(1)]);
        session.set_mode(ExamMode::Cardiac);
        assert_eq!(session.status().done, 0);
    }

    #[test]
    fn test_mode_switch_mid_frame_discards_update() {
        let session = Session::new(ExamMode::Cardiac, 48.0);
        let ticket = session.start_frame();
        session.set_mode(ExamMode::Lung);
        assert!(session
            .observe(&ticket, &targets_for(ExamMode::Cardiac), &[hand_on(1)])
            .is_none());

        let status = session.status();
        assert_eq!(status.mode, ExamMode::Lung);
        assert_eq!(status.total, 7);
        assert_eq!(status.done, 0);

        let ticket = session.start_frame();
        assert_eq!(ticket.mode, ExamMode::Lung);
        assert!(session.observe(&ticket, &targets_for(ExamMode::Lung), &[]).is_some());
    }

    #[test]
    fn test_switch_mode_keeps_progress_when_unchanged() {
        let session = Session::new(ExamMode::Cardiac, 48.0);
        let ticket = session.start_frame();
        session.observe(&ticket, &targets_for(ExamMode::Cardiac), &[hand_on(1)]);

        assert!(!session.switch_mode(ExamMode::Cardiac));
        assert_eq!(session.status().done, 1);
        // the in-flight frame is still valid
        assert!(session.observe(&ticket, &targets_for(ExamMode::Cardiac), &[]).is_some());

        assert!(session.switch_mode(ExamMode::Lung));
        assert_eq!(session.status().done, 0);
        assert!(session.observe(&ticket, &targets_for(ExamMode::Cardiac), &[]).is_none());
    }

    #[test]
    fn test_toggle_mode() {
        let session = Session::new(ExamMode::Lung, 48.0);
        assert_eq!(session.toggle_mode(), ExamMode::Cardiac);
        assert_eq!(session.mode(), ExamMode::Cardiac);
        assert_eq!(session.toggle_mode(), ExamMode::Lung);
    }

    #[test]
    fn test_clones_share_state() {
        let session = Session::new(ExamMode::Lung, 48.0);
        let handle = session.clone();
        handle.set_mode(ExamMode::Cardiac);
        assert_eq!(session.mode(), ExamMode::Cardiac);
    }
}
