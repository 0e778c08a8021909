use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    Database,
    Table,
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceType::Database => write!(f, "database"),
            ResourceType::Table => write!(f, "table"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GbdbErrorCode {
    Io,
    Encode,
    Decode,
    Malformed,
    Tampered,
    InvalidConfig,
    DatabaseNotFound,
    TableNotFound,
    DatabaseAlreadyExists,
    TableAlreadyExists,
    LockTimeout,
}

impl GbdbErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            GbdbErrorCode::Io => "io",
            GbdbErrorCode::Encode => "encode",
            GbdbErrorCode::Decode => "decode",
            GbdbErrorCode::Malformed => "malformed",
            GbdbErrorCode::Tampered => "tampered",
            GbdbErrorCode::InvalidConfig => "invalid_config",
            GbdbErrorCode::DatabaseNotFound => "database_not_found",
            GbdbErrorCode::TableNotFound => "table_not_found",
            GbdbErrorCode::DatabaseAlreadyExists => "database_already_exists",
            GbdbErrorCode::TableAlreadyExists => "table_already_exists",
            GbdbErrorCode::LockTimeout => "lock_timeout",
        }
    }
}

#[derive(Debug, Error)]
pub enum GbdbError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encode error: {0}")]
    Encode(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("malformed input: {0}")]
    Malformed(String),
    #[error("integrity check failed: {message}")]
    Tampered { message: String },
    #[error("invalid config: {message}")]
    InvalidConfig { message: String },
    #[error("{resource_type} '{resource_id}' not found")]
    NotFound {
        resource_type: ResourceType,
        resource_id: String,
    },
    #[error("{resource_type} '{resource_id}' already exists")]
    AlreadyExists {
        resource_type: ResourceType,
        resource_id: String,
    },
    #[error("timed out waiting for table lock: {path}")]
    LockTimeout { path: String },
}

impl GbdbError {
    pub fn code(&self) -> GbdbErrorCode {
        match self {
            GbdbError::Io(_) => GbdbErrorCode::Io,
            GbdbError::Encode(_) => GbdbErrorCode::Encode,
            GbdbError::Decode(_) => GbdbErrorCode::Decode,
            GbdbError::Malformed(_) => GbdbErrorCode::Malformed,
            GbdbError::Tampered { .. } => GbdbErrorCode::Tampered,
            GbdbError::InvalidConfig { .. } => GbdbErrorCode::InvalidConfig,
            GbdbError::NotFound { resource_type, .. } => match resource_type {
                ResourceType::Database => GbdbErrorCode::DatabaseNotFound,
                ResourceType::Table => GbdbErrorCode::TableNotFound,
            },
            GbdbError::AlreadyExists { resource_type, .. } => match resource_type {
                ResourceType::Database => GbdbErrorCode::DatabaseAlreadyExists,
                ResourceType::Table => GbdbErrorCode::TableAlreadyExists,
            },
            GbdbError::LockTimeout { .. } => GbdbErrorCode::LockTimeout,
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code().as_str()
    }

    pub(crate) fn table_not_found(db: &str, table: &str) -> Self {
        GbdbError::NotFound {
            resource_type: ResourceType::Table,
            resource_id: format!("{db}.{table}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{GbdbError, GbdbErrorCode, ResourceType};

    #[test]
    fn error_code_strings_are_stable() {
        assert_eq!(GbdbErrorCode::TableNotFound.as_str(), "table_not_found");
        assert_eq!(GbdbErrorCode::Tampered.as_str(), "tampered");
        assert_eq!(GbdbErrorCode::LockTimeout.as_str(), "lock_timeout");
    }

    #[test]
    fn error_code_str_matches_variant_mapping() {
        let err = GbdbError::NotFound {
            resource_type: ResourceType::Table,
            resource_id: "main.users".into(),
        };
        assert_eq!(err.code(), GbdbErrorCode::TableNotFound);
        assert_eq!(err.code_str(), "table_not_found");

        let err = GbdbError::AlreadyExists {
            resource_type: ResourceType::Database,
            resource_id: "main".into(),
        };
        assert_eq!(err.code_str(), "database_already_exists");
    }
}
