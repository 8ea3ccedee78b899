//! Session runtime: timeline materialization, the single-active-session
//! controller, and observer fan-out.

pub mod broadcast;
pub mod controller;
pub mod state;
pub mod timeline;

pub use broadcast::Broadcaster;
pub use controller::RuntimeController;
pub use state::SessionStateView;
pub use timeline::TimelineEntry;
