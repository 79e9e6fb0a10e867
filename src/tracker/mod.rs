pub mod alignment;
pub mod anatomy;

pub use alignment::{
    AlignmentReport, AlignmentTracker, Progress, TargetAlignment, VisitedState,
    DEFAULT_ALIGNMENT_RADIUS,
};
pub use anatomy::{
    map_targets, AnatomicalTarget, ExamMode, GeometryError, Side, StableMapper, TargetSet,
    TorsoAnchors,
};
