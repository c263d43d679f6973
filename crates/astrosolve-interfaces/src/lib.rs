//! Astrosolve Interfaces
//!
//! This crate provides the contract between the solve workflow and whatever
//! transport talks to an astrometry.net compatible plate-solving service.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Remote service gateway interfaces
pub mod gateway;

/// Re-export key types for convenient usage
pub use gateway::{
    AstrometryGateway, Calibration, GatewayError, GatewayResult, JobId, JobStatus,
    LoginResponse, SessionToken, SubmissionId, SubmissionStatus, UploadResponse,
};
