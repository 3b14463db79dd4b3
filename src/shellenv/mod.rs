pub mod audit;
pub mod backup;
pub mod config;
pub mod context;
pub mod freeze;
pub mod generate;
pub mod layout;
pub mod orchestrator;
pub mod paths;
pub mod resolve;
pub mod rollback;
pub mod runs;
pub mod templates;
pub mod util;
