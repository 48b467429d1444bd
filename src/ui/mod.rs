//! UI components module.
//!
//! Presentation-side listeners that react to the monitor's signals.

pub mod repo_status;

pub use repo_status::{
    ErrorCallback, RefreshCallback, RepoStatusPane, RepoStatusPaneBuilder, StatusSummary,
    StatusViewHandle, StatusViewState,
};
