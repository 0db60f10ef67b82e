//! Fundamental types for the eKYC verification orchestrator.
//!
//! This crate defines the core types shared across every other crate in the workspace:
//! subject identifiers, phone destinations, one-time codes, document fields,
//! verification profiles, timestamps, and the tunable verification parameters.

pub mod code;
pub mod document;
pub mod error;
pub mod params;
pub mod phone;
pub mod profile;
pub mod subject;
pub mod time;

pub use code::{CaptureRef, OtpCode};
pub use document::{DocumentFields, DocumentSnapshot, FieldName, SnapshotFingerprint};
pub use error::TypeError;
pub use params::VerificationParams;
pub use phone::PhoneNumber;
pub use profile::{VerificationProfile, VerificationStage};
pub use subject::SubjectId;
pub use time::Timestamp;
