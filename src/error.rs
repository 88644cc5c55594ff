use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Failed to start {tool}: {source}")]
    ToolSpawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Malformed config file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DecodeError {
    pub(crate) fn spawn(tool: impl Into<String>, source: std::io::Error) -> Self {
        DecodeError::ToolSpawn {
            tool: tool.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, DecodeError>;
