//! App version and the changelog shown after an update.

pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const CHANGELOG: &[&str] = &[
    "Sign in to sync tasks across devices",
    "Quick status actions from the task menu",
    "Celebration when completing tasks",
    "Archive browser with restore and delete forever",
    "Undo for the last archived task",
];
