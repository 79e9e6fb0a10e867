use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::pose::PixelPoint;
use crate::tracker::anatomy::{AnatomicalTarget, ExamMode};

/// Hand-to-target distance (px) that counts as placed
pub const DEFAULT_ALIGNMENT_RADIUS: f32 = 48.0;

/// Which targets of the active mode have ever been aligned.
///
/// Entries keep target ordinal order and serialize as a JSON object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisitedState {
    entries: Vec<(&'static str, bool)>,
}

impl VisitedState {
    /// Every target of `mode`, none visited.
    pub fn for_mode(mode: ExamMode) -> Self {
        Self {
            entries: mode.target_names().map(|name| (name, false)).collect(),
        }
    }

    pub fn is_visited(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, v)| *n == name && *v)
    }

    /// Returns true if the entry flipped from unvisited to visited.
    fn mark(&mut self, name: &str) -> bool {
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, visited)) if !*visited => {
                *visited = true;
                true
            }
            _ => false,
        }
    }

    /// Make the key set equal `names`, keeping known values and dropping stale keys.
    fn resync<'a>(&mut self, names: impl Iterator<Item = &'a AnatomicalTarget>) {
        let entries: Vec<_> = names
            .map(|t| (t.name, self.is_visited(t.name)))
            .collect();
        self.entries = entries;
    }

    pub fn clear(&mut self) {
        for (_, visited) in &mut self.entries {
            *visited = false;
        }
    }

    pub fn done(&self) -> usize {
        self.entries.iter().filter(|(_, v)| *v).count()
    }

    pub fn total(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, bool)> + '_ {
        self.entries.iter().copied()
    }

    /// Name of the first unvisited target in ordinal order.
    pub fn next_unvisited(&self) -> Option<&'static str> {
        self.entries.iter().find(|(_, v)| !*v).map(|(n, _)| *n)
    }
}

impl Serialize for VisitedState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, visited) in &self.entries {
            map.serialize_entry(name, visited)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub done: usize,
    pub total: usize,
    /// Percentage rounded to one decimal
    pub percent: f32,
    pub all_done: bool,
}

impl Progress {
    pub fn from_counts(done: usize, total: usize) -> Self {
        let percent = if total > 0 {
            (done as f32 / total as f32 * 1000.0).round() / 10.0
        } else {
            0.0
        };
        Self {
            done,
            total,
            percent,
            all_done: total > 0 && done == total,
        }
    }
}

/// Alignment of one target in one frame
#[derive(Debug, Clone, PartialEq)]
pub struct TargetAlignment {
    pub name: &'static str,
    /// Anatomical landmark text shown under the active target
    pub description: &'static str,
    pub ordinal: u32,
    pub position: PixelPoint,
    /// Hand centre within the radius this frame, if any
    pub aligned_hand: Option<PixelPoint>,
    pub visited: bool,
}

impl TargetAlignment {
    pub fn aligned(&self) -> bool {
        self.aligned_hand.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentReport {
    pub mode: ExamMode,
    pub targets: Vec<TargetAlignment>,
    pub progress: Progress,
    /// Ordinal of the lowest-ordinal unvisited target
    pub next_expected: Option<u32>,
}

/// Per-frame alignment plus the persistent visited record of one exam mode.
#[derive(Debug, Clone)]
pub struct AlignmentTracker {
    mode: ExamMode,
    radius: f32,
    visited: VisitedState,
}

impl AlignmentTracker {
    pub fn new(mode: ExamMode, radius: f32) -> Self {
        Self {
            mode,
            radius,
            visited: VisitedState::for_mode(mode),
        }
    }

    pub fn mode(&self) -> ExamMode {
        self.mode
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn visited(&self) -> &VisitedState {
        &self.visited
    }

    /// Switch target set. Always clears the visited record, also for the current mode.
    pub fn set_mode(&mut self, mode: ExamMode) {
        self.mode = mode;
        self.visited = VisitedState::for_mode(mode);
    }

    pub fn reset(&mut self) {
        self.visited.clear();
    }

    pub fn progress(&self) -> Progress {
        Progress::from_counts(self.visited.done(), self.visited.total())
    }

    /// Align hand centres against this frame's targets and fold the result
    /// into the visited record.
    pub fn observe(&mut self, targets: &[AnatomicalTarget], hands: &[PixelPoint]) -> AlignmentReport {
        self.visited.resync(targets.iter());

        let mut alignments = Vec::with_capacity(targets.len());
        for target in targets {
            let aligned_hand = hands
                .iter()
                .copied()
                .find(|hand| hand.distance(&target.position) < self.radius);
            if aligned_hand.is_some() && self.visited.mark(target.name) {
                log::debug!("[tracker] {} visited", target.name);
            }
            alignments.push(TargetAlignment {
                name: target.name,
                description: target.description,
                ordinal: target.ordinal,
                position: target.position,
                aligned_hand,
                visited: self.visited.is_visited(target.name),
            });
        }

        let next_expected = alignments
            .iter()
            .filter(|a| !a.visited)
            .map(|a| a.ordinal)
            .min();

        AlignmentReport {
            mode: self.mode,
            targets: alignments,
            progress: self.progress(),
            next_expected,
        }
    }
}
