// src/guidance/smoother.rs

use crate::types::Directive;
use tracing::debug;

/// Debounces the raw per-frame directive so the emitted command does not
/// flicker when an obstacle straddles a zone boundary.
///
/// A new raw directive must repeat for `confirm_frames` consecutive frames
/// before it replaces the emitted one. With `confirm_frames = 1` the
/// smoother is transparent and the raw sequence passes through unchanged.
pub struct DirectiveSmoother {
    confirm_frames: u32,
    emitted: Option<Directive>,
    candidate: Option<Directive>,
    streak: u32,
}

impl DirectiveSmoother {
    pub fn new(confirm_frames: u32) -> Self {
        Self {
            confirm_frames: confirm_frames.max(1),
            emitted: None,
            candidate: None,
            streak: 0,
        }
    }

    /// Feed one raw directive, get the directive to emit this frame.
    pub fn apply(&mut self, raw: Directive) -> Directive {
        let current = match self.emitted {
            // First frame of the session passes through.
            None => {
                self.emitted = Some(raw);
                return raw;
            }
            Some(current) => current,
        };

        if raw == current {
            self.candidate = None;
            self.streak = 0;
            return current;
        }

        if self.candidate == Some(raw) {
            self.streak += 1;
        } else {
            self.candidate = Some(raw);
            self.streak = 1;
        }

        if self.streak >= self.confirm_frames {
            debug!(
                "directive confirmed after {} frame(s): {} -> {}",
                self.streak, current, raw
            );
            self.emitted = Some(raw);
            self.candidate = None;
            self.streak = 0;
            raw
        } else {
            current
        }
    }

    pub fn last_emitted(&self) -> Option<Directive> {
        self.emitted
    }

    /// Clear all state (e.g., when the capture session changes).
    pub fn reset(&mut self) {
        self.emitted = None;
        self.candidate = None;
        self.streak = 0;
    }
}
