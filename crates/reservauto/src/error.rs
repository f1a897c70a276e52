/// Errors produced while talking to reservauto.net
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    /// The request could not be sent, or the endpoint answered with a non-success status
    #[error("Transport failure: {0}")]
    Transport(String),

    /// The response body could not be normalized or decoded into the expected shape
    #[error("Parse failure: {0}")]
    Parse(String),

    /// A city or branch identifier was blank
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),
}
