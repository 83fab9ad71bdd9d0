pub mod api;
pub mod bootstrap;
pub mod cli;
pub mod credentials;
pub mod runtime;
pub mod state;
