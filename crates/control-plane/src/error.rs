use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("row mapping error: {0}")]
    Mapping(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("unsupported interval unit: {0}")]
    UnsupportedIntervalUnit(String),
    #[error("service {service_id} claimed by routes {kept} and {ignored}; using {kept}")]
    AmbiguousRouteMapping {
        service_id: String,
        kept: String,
        ignored: String,
    },
}

impl From<StoreError> for ResolveError {
    fn from(err: StoreError) -> Self {
        ResolveError::StoreUnavailable(err.to_string())
    }
}
