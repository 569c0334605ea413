//! OpenStack client error types

use nimbus_cloud::CloudError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OpenStackError {
    #[error("openstack CLI not found. Please install: pip install python-openstackclient")]
    CliNotFound,

    #[error("openstack command failed: {0}")]
    CommandFailed(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("No more floating IPs available in {0}")]
    PoolExhausted(String),

    #[error("Floating IP {0} is not available to this project")]
    AddressUnavailable(String),

    #[error("No usable external network for floating IPs: {0}")]
    NoExternalNetwork(String),

    #[error("More than one server is named '{0}'")]
    DuplicateServer(String),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, OpenStackError>;

impl From<OpenStackError> for CloudError {
    fn from(err: OpenStackError) -> Self {
        match err {
            OpenStackError::NotFound(what) => CloudError::ResourceNotFound(what),
            err @ OpenStackError::NoExternalNetwork(_) => {
                CloudError::ResourceNotFound(err.to_string())
            }
            OpenStackError::PoolExhausted(pool) => CloudError::PoolExhausted(pool),
            OpenStackError::AddressUnavailable(ip) => CloudError::AddressUnavailable(ip),
            OpenStackError::CommandFailed(stderr) => CloudError::CommandFailed(stderr),
            OpenStackError::JsonError(e) => CloudError::Json(e),
            OpenStackError::IoError(e) => CloudError::Io(e),
            other @ OpenStackError::CliNotFound => CloudError::InvalidConfig(other.to_string()),
            other @ OpenStackError::DuplicateServer(_) => CloudError::ApiError(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_exhaustion_keeps_its_kind() {
        let err: CloudError = OpenStackError::PoolExhausted("public".to_string()).into();
        assert!(matches!(err, CloudError::PoolExhausted(pool) if pool == "public"));
    }

    #[test]
    fn test_missing_external_network_is_not_found() {
        let err: CloudError = OpenStackError::NoExternalNetwork("none visible".to_string()).into();
        match err {
            CloudError::ResourceNotFound(msg) => assert!(msg.contains("external network")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_missing_cli_is_a_config_error() {
        let err: CloudError = OpenStackError::CliNotFound.into();
        assert!(matches!(err, CloudError::InvalidConfig(_)));
    }
}
