pub mod capture;
pub mod file;
pub mod graph;
pub mod segment;

pub use capture::{
    AudioCapture, AudioFrame, CaptureConstraints, CaptureFactory, CaptureMode, CaptureSource,
};
pub use file::{AudioFile, FileCapture};
pub use graph::{AudioGraph, AudioTuning, VolumeState};
pub use segment::{AudioSegment, SegmentConfig, SegmentRecorder};
