//! Background workflow engine that carries a meal plan from an open vote to
//! a finalized plan with a grocery list and scheduled prep tasks.
//!
//! The pure parts ([`election`], [`grocery`], [`analyzer`]) take fully
//! loaded model trees. The [`worker`]s drive them through the [`store`] and
//! [`publish`] seams.

pub mod analyzer;
pub mod election;
pub mod error;
pub mod grocery;
pub mod metrics;
pub mod publish;
pub mod store;
pub mod worker;
