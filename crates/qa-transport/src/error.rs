#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("missing transport credential: environment variable {var} is not set")]
    MissingCredential { var: String },
    #[error("transport request failed: {message}")]
    Request { message: String },
    #[error("failed to decode transport response: {message}")]
    Decode { message: String },
    #[error("transport API rejected the call: {description}")]
    Api { description: String },
}
