//! Runtime notices: types and broadcast bus.
//!
//! This module groups the notice **data model** and the **bus** used to
//! publish/subscribe to notices emitted by the checkpoint store and the
//! multiplex manager. Notices are for observers (logs, metrics); client-facing
//! data always travels as [`Envelope`](crate::Envelope)s through a sink.
//!
//! ## Contents
//! - [`NoticeKind`], [`Notice`] classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`

mod bus;
mod notice;

pub use bus::Bus;
pub use notice::{Notice, NoticeKind};
