use thiserror::Error;

#[derive(Debug, Error)]
pub enum PropertiesError {
    #[error("failed to read properties file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed properties line {line} (expected KEY=VALUE)")]
    Malformed { line: usize },

    #[error("empty key at properties line {line}")]
    EmptyKey { line: usize },
}
