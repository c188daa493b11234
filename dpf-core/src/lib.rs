//! Distributed particle filtering with DRNA-style weight exchange.
//!
//! A PE ([`local_pf::LocalParticleFilter`]) runs a bootstrap particle filter
//! in log-weight space; [`distributed_pf::DistributedPf`] drives a fleet of
//! them over a [`topology::Topology`], periodically exchanging particles
//! through a pluggable [`exchange`] recipe and renormalizing aggregated
//! weights so the fleet's estimate tracks a centralized filter's.

pub mod config;
pub mod distributed_pf;
pub mod error;
pub mod estimator;
pub mod exchange;
pub mod external;
pub mod local_pf;
pub mod mposterior;
pub mod resampling;
pub mod sensors_map;
pub mod state;
pub mod topology;

pub use config::Config;
pub use distributed_pf::DistributedPf;
pub use error::{ConfigurationError, DpfError};
pub use local_pf::{DegeneracyPolicy, LocalParticleFilter};
pub use state::{Particle, ParticleMatrix, StateLayout};
pub use topology::Topology;
