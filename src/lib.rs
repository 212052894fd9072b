pub mod app;
pub mod config;
pub mod derivatives;
pub mod discover;
pub mod domain;
pub mod error;
pub mod output;
pub mod volume;
