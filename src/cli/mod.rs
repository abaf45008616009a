//! CLI subcommand implementations for the modscout binary.

pub mod cache_cmd;
pub mod crawl_cmd;
pub mod doctor;
pub mod extract_cmd;
pub mod maintenance_cmd;
pub mod output;
pub mod search_cmd;
pub mod setup_cmd;
pub mod status_cmd;
