//! Backend for the student portal of an international-education
//! consultancy: application tracking, document collection, notifications
//! and a generic content API over a managed database, auth and storage
//! service.

pub mod audit;
pub mod auth;
pub mod backend;
pub mod config;
pub mod error;
pub mod extract;
pub mod router;
pub mod state;
pub mod telemetry;
pub mod workflows;
