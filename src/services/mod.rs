pub mod asset_resource;
pub mod bucket_resource;
pub mod edge;
pub mod glob;
pub mod graph;
pub mod integrity;
pub mod memory_store;
pub mod object_store;
pub mod provider;
pub mod reconciler;
pub mod state;
pub mod storage_service;
pub mod upload_options;
