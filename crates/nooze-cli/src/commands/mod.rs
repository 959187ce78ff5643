pub mod config;
pub mod next;
pub mod run;
pub mod status;
