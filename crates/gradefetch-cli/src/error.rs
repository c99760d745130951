use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
///
/// A record that cannot be found is not an error: it is printed like any
/// other result and exits with code 3.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] gradefetch_core::ValidationError),

    #[error(transparent)]
    Config(#[from] gradefetch_core::ConfigError),

    #[error(transparent)]
    Registry(#[from] gradefetch_core::RegistryError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) | Self::Config(_) | Self::Registry(_) => 2,
            Self::Serialization(_) => 4,
            Self::Io(_) => 10,
        }
    }
}
