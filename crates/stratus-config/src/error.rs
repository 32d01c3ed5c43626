use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config directory not found")]
    ConfigDirNotFound,

    #[error(
        "Manifest not found. Looked for:\n\
        - current directory: stratus.local.yaml, .stratus.local.yaml, stratus.yaml, .stratus.yaml\n\
        - the ./.stratus/ directory\n\
        Set STRATUS_MANIFEST to point at a file directly"
    )]
    ManifestNotFound,

    #[error("Profile '{0}' is not defined in {1}")]
    ProfileNotFound(String, String),

    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
