//! Scenario core for repeatable dumbbell simulations
//!
//! Composes [`topology`] (dumbbell construction), [`addressing`]
//! (deterministic subnet planning), [`wiring`] (interfaces, routes and
//! engine links) and [`traffic`] (on/off senders and sinks) into a single
//! [`simulation::Simulation`] run over the [`simnet`] packet engine.

pub mod addressing;
pub mod config;
pub mod simulation;
pub mod topology;
pub mod traffic;
pub mod util;
pub mod wiring;
