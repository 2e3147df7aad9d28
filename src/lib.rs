pub mod api;
pub mod app;
pub mod breeds;
pub mod cli;
pub mod db;
pub mod entities;
pub mod error;
pub mod model;
pub mod pagination;
pub mod store;
