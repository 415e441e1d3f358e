pub mod compare;
pub mod db;
pub mod merge;
pub mod models;
pub mod price_import;
pub mod pricing;
pub mod redistribute;
pub mod service;
pub mod stores;
