//! One-shot campaign worker: plans, generates, and packages a single
//! campaign request.

pub mod config;
pub mod runner;
