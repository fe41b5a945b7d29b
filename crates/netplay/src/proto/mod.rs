//! The three small agreement protocols layered on a connection.
//!
//! - confirm: two-phase confirmation of the fleet setup, cancelable until
//!   both sides have committed.
//! - ready: one-shot barrier, completed when both sides have said Ready.
//! - reset: mutual reset of a running session, plus abort.

mod confirm;
mod ready;
mod reset;
