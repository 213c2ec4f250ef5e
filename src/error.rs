use thiserror::Error;

/// Error type for index codec, trie and tag index operations.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("I/O Error: {0}")]
    Io(#[from] std::io::Error),

    /// A bit or byte reader ran past the end of its buffer.
    #[error("Unexpected end of data")]
    UnexpectedEof,

    #[error("Corruption detected: {details}")]
    Corruption {
        details: String,
        block: Option<&'static str>,
        tag_key_id: Option<u32>,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Tag key meta not found: tag_key_id={0}")]
    TagKeyMetaNotFound(u32),

    #[error("Tag value sequence not found: tag_key_id={0}")]
    TagValueSeqNotFound(u32),

    #[error("Tag value id not found: tag_key_id={tag_key_id}, tag_value={tag_value}")]
    TagValueIdNotFound { tag_key_id: u32, tag_value: String },

    #[error("NaN values cannot be XOR-encoded")]
    NanValue,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration Error: {0}")]
    Config(String),
}

impl IndexError {
    /// Shorthand for a corruption error without block context.
    pub fn corruption(details: impl Into<String>) -> Self {
        IndexError::Corruption {
            details: details.into(),
            block: None,
            tag_key_id: None,
        }
    }

    /// Corruption error carrying the block kind and tag key it was found in.
    pub fn corrupt_block(block: &'static str, tag_key_id: u32, details: impl Into<String>) -> Self {
        IndexError::Corruption {
            details: details.into(),
            block: Some(block),
            tag_key_id: Some(tag_key_id),
        }
    }

    /// Returns true for the not-found family, which callers treat as an expected outcome.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            IndexError::NotFound(_)
                | IndexError::TagKeyMetaNotFound(_)
                | IndexError::TagValueSeqNotFound(_)
                | IndexError::TagValueIdNotFound { .. }
        )
    }
}

impl From<config::ConfigError> for IndexError {
    fn from(err: config::ConfigError) -> Self {
        IndexError::Config(err.to_string())
    }
}

impl From<regex::Error> for IndexError {
    fn from(err: regex::Error) -> Self {
        IndexError::InvalidInput(format!("invalid regex: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_family_is_distinguished_from_corruption() {
        assert!(IndexError::TagKeyMetaNotFound(1).is_not_found());
        assert!(IndexError::TagValueIdNotFound {
            tag_key_id: 1,
            tag_value: "a".to_string()
        }
        .is_not_found());
        assert!(!IndexError::corruption("bad footer").is_not_found());
        assert!(!IndexError::UnexpectedEof.is_not_found());
    }

    #[test]
    fn corrupt_block_carries_context() {
        match IndexError::corrupt_block("tag_forward", 7, "short block") {
            IndexError::Corruption {
                details,
                block,
                tag_key_id,
            } => {
                assert_eq!(details, "short block");
                assert_eq!(block, Some("tag_forward"));
                assert_eq!(tag_key_id, Some(7));
            }
            other => panic!("expected corruption, got {other:?}"),
        }
    }
}
