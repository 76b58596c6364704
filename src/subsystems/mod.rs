//! Long-running subsystems: inbound comms channels and the component runtime.

pub mod comms;
pub mod runtime;
