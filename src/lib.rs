#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

mod core;
mod error;
mod group;
pub mod history;
#[cfg(feature = "logging")]
pub mod logging;
mod node;
mod path;
mod pattern;
mod routable;
mod route;
mod router;
mod task;
mod tree;

pub use crate::core::{Hash32, Params, SearchParams};
pub use crate::error::*;
pub use crate::group::RouteGroup;
pub use crate::history::{History, MemoryHistory};
pub use crate::node::RouteNode;
pub use crate::path::{InvalidatePattern, compile_invalidate_pattern, exited_path, join};
pub use crate::pattern::{Pattern, PatternMatch};
pub use crate::routable::{Action, LoadArgs, Updater};
pub use crate::route::Route;
pub use crate::router::{
    DEFAULT_BASE_URL, LinkClick, Router, RouterBuilder, Subscriber, SubscriptionId,
};
pub use crate::task::{Snapshot, Task, task};
pub use crate::tree::Routes;
