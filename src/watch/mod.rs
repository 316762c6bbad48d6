//! The change watcher actor.
//!
//! All watcher state lives behind a single control loop which multiplexes
//! caller commands, a periodic poll tick, and completion signals from
//! per-sink delivery tasks. Callers hold a cloneable [`Watcher`] handle and
//! communicate with the loop by message passing only.
mod delivery;
mod event;
mod subscription;
mod timer;
mod watcher;

pub use event::Liveness;
pub use watcher::Watcher;

#[cfg(test)]
mod delivery_test;
