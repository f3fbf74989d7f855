//! Batch job generation for parameterized simulation workflows and the
//! worker side staging protocol that runs each job.

pub mod card;
pub mod collector;
pub mod config;
pub mod dag;
pub mod error;
pub mod job;
pub mod jobspace;
pub mod naming;
pub mod params;
pub mod sandbox;
pub mod schedulers;
pub mod staging;
pub mod submit;
pub mod worker;

pub use error::RunnerError;
