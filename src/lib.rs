// Stratum - MCP tool server for four-layer DAG planning
// Library exports

// Core modules
pub mod config;
pub mod dag;
pub mod engine;
pub mod feedback;
pub mod server;
pub mod tools;
