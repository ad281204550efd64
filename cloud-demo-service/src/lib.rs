//! cloud-demo-service: demonstration routes over Cloud Storage and Firestore.
pub mod config;
pub mod dtos;
pub mod handlers;
pub mod models;
pub mod services;
pub mod startup;
