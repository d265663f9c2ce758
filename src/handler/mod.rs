pub mod host;
pub mod participant;
