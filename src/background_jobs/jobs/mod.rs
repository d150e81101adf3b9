//! Concrete actions run by the worker's scheduler.

pub mod catalog_download;

pub use catalog_download::CatalogDownloadAction;
