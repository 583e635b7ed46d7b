pub mod client;
pub mod coordinator;

pub use client::{HttpTranscribeClient, TranscriptionApi};
pub use coordinator::{UploadConfig, UploadCoordinator, UploadStatus};
