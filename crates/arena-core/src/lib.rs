pub mod agent_assertions;
pub mod config;
pub mod errors;
pub mod judge;
pub mod model;
pub mod params;
pub mod trace;
pub mod validator_api;
