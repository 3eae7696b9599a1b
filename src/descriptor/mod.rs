//! The descriptor tree and its build protocol (spec §3, §4.D).

pub mod builder;
pub mod cache_xml;
pub mod live_xml;
pub mod model;
pub mod scpd_xml;

pub use model::{Action, Argument, Device, Direction, Object, Service};
