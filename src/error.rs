pub type SpritecastResult<T> = Result<T, SpritecastError>;

#[derive(thiserror::Error, Debug)]
pub enum SpritecastError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("atlas error: {0}")]
    Atlas(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("evaluation error: {0}")]
    Evaluation(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SpritecastError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn atlas(msg: impl Into<String>) -> Self {
        Self::Atlas(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn evaluation(msg: impl Into<String>) -> Self {
        Self::Evaluation(msg.into())
    }
}
