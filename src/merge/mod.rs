mod coordinator;
mod feature;
mod scheduler;
mod window;

pub use coordinator::MergeCoordinator;
pub use feature::{MergeBatch, MergeStatus, MergedFeature, PassReport};
pub use scheduler::{MergePhase, MergeScheduler, Scheduled};
pub use window::{MergeWindow, WindowState};
