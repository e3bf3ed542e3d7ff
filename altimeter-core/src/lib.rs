// lib.rs
#![no_std]

mod macros;

pub mod altitude;
pub mod computer;
pub mod config;
pub mod filters;
pub mod log;
pub mod recovery;
pub mod scheduler;
pub mod sensors;
pub mod state_machine;
pub mod test_flight;
pub mod types;

pub use altitude::AltitudeTracker;
pub use computer::FlightComputer;
pub use config::*;
pub use filters::*;
pub use log::{ChannelLogger, FlightLogger, LogBuffer, LogChannel, LogEntry, Loggable};
pub use recovery::*;
pub use scheduler::*;
pub use sensors::*;
pub use state_machine::*;
pub use test_flight::TestFlight;
pub use types::*;
