use thiserror::Error;

/// All errors produced by amd-core.
#[derive(Debug, Error)]
pub enum AmdError {
    #[error("media not enabled on channel")]
    MediaUnavailable,

    #[error("invalid sample rate: {0} Hz")]
    InvalidSampleRate(u32),

    #[error("audio read error: {0}")]
    AudioRead(String),

    #[error("WAV decode error: {0}")]
    Wav(#[from] hound::Error),

    #[error("analysis task failed: {0}")]
    TaskFailed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AmdError>;
