pub mod adapter;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod usecase;
