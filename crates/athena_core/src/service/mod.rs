//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Keep UI/FFI layers decoupled from storage details.
//! - Emit change notifications after successful writes.

pub mod auth_service;
pub mod credentials;
pub mod entitlement_service;
pub mod library_service;
pub mod preferences_service;
pub(crate) mod validation;
