pub mod attachment;
pub mod builder;
pub mod command;
pub mod links;
pub mod markers;
pub mod session;

pub mod errors {
    use dimgh_core::document::ElementGuid;
    use dimgh_core::store::StoreError;
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum EngineError {
        #[error("missing required field: {0}")]
        MissingField(&'static str),
        #[error("invalid field {field}: {reason}")]
        InvalidField { field: &'static str, reason: String },
        #[error("invalid parameters: {0}")]
        InvalidParameters(String),
        #[error("points too close")]
        PointsTooClose,
        #[error("hotspot {0} not found")]
        HotspotNotFound(ElementGuid),
        #[error("failed to create {what}")]
        CreateFailed {
            what: &'static str,
            #[source]
            source: StoreError,
        },
        #[error(transparent)]
        Store(#[from] StoreError),
    }
}
