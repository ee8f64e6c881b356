pub mod bootstrap;
pub mod dispatcher;
pub mod refresh;
pub mod runtime;
pub mod scheduler;
pub mod service;
