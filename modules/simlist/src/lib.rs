//! simlist: a simulated virtualized, infinite-scroll list for testing.
//!
//! Domain-agnostic rendering: any serializable row type can be listed. Only
//! a window of rows around the scroll position is rendered at a time, more
//! rows load as the window nears the end, and reads or scrolls can be made
//! to fail on schedule. Every interaction is logged so a run can be saved
//! and replayed without the list.

pub mod feed;
pub mod list;
pub mod replay;
pub mod snapshot;

pub use feed::{synthetic_following, synthetic_timeline};
pub use list::{ListShape, VirtualList};
pub use replay::ReplayViewport;
pub use snapshot::{LogEntry, PassLog};
