//! Distillery reconciliation library - shared modules for all binaries.

pub mod geo;
pub mod index;
pub mod input;
pub mod merge;
pub mod models;
pub mod normalize;
pub mod progress;
pub mod reconcile;
pub mod safety;
pub mod similarity;
pub mod store;
