//! Team introduction orchestration.
//!
//! Turns a click on a team member into an avatar introduction, delivered
//! either as a pre-rendered video or through a live avatar session, and keeps
//! the remote session's lifecycle tied to the surface that shows it.

pub mod coordinator;
pub mod delivery;
pub mod draft;
pub mod gateway;
pub mod models;
pub mod playback;
pub mod stage;
pub mod streaming;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Locks `mutex`, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
