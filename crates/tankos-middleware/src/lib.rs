//! `tankos-middleware` – Shared-state plumbing
//!
//! Moves time-sensitive state between the continuously running loops without
//! letting any of them block the others.
//!
//! # Modules
//!
//! - [`latest`] – [`Latest<T>`][latest::Latest]: a copy-on-publish slot.
//!   One producer swaps in a fresh immutable value; any number of readers
//!   take a handle to whatever was last published.
//! - [`lifecycle`] – [`StopSignal`][lifecycle::StopSignal] for cooperative
//!   cancellation and [`ComponentHandle`][lifecycle::ComponentHandle] for
//!   joining loop threads with a deadline.

pub mod latest;
pub mod lifecycle;

pub use latest::Latest;
pub use lifecycle::{ComponentHandle, StopSignal, spawn_component};
