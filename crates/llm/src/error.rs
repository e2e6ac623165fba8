/// Errors from the generation service client.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// No API key is configured; no request was sent.
    #[error("generation service is not configured (missing API key)")]
    NotConfigured,

    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service returned a non-2xx status code.
    #[error("generation API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The body could not be decoded or carried no usable text.
    #[error("invalid generation response: {0}")]
    InvalidResponse(String),
}
