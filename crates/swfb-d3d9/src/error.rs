use thiserror::Error;

use crate::device::{Format, VertexProcessing};

/// Failures reported by a [`crate::Device`]. All of these are recoverable at the frame
/// level: the caller either falls back, skips the affected draw, or skips the frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("device lost")]
    Lost,
    #[error("device lost and ready to be reset")]
    NotReset,
    #[error("device creation failed: {0}")]
    CreationFailed(String),
    #[error("out of video memory")]
    OutOfVideoMemory,
    #[error("format {0} is not supported for this resource")]
    UnsupportedFormat(Format),
    #[error("invalid call: {0}")]
    InvalidCall(&'static str),
}

/// One rung of the device-creation ladder that did not produce a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreationAttempt {
    pub vertex_processing: VertexProcessing,
    pub refresh_rate: u32,
    pub error: DeviceError,
}

/// A required GPU resource could not be built.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to create {resource}: {source}")]
pub struct ResourceError {
    pub resource: &'static str,
    #[source]
    pub source: DeviceError,
}

impl ResourceError {
    pub(crate) fn of(resource: &'static str) -> impl FnOnce(DeviceError) -> Self {
        move |source| Self { resource, source }
    }
}

/// Startup failures. Nothing is rendered when construction returns one of these.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("no device configuration succeeded ({} attempts)", attempts.len())]
    NoDevice { attempts: Vec<CreationAttempt> },
    #[error("no shader model tier provides every required shader")]
    NoShaderModel,
    #[error(transparent)]
    Resource(#[from] ResourceError),
}

/// Unrecoverable mid-frame failure. Draw data has already been produced and cannot be
/// dropped, so the engine is expected to abort.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("unable to resize vertex buffer to {vertices} vertices / {indices} indices: {source}")]
    VertexBufferResize {
        vertices: usize,
        indices: usize,
        #[source]
        source: DeviceError,
    },
}
