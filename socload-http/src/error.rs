use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse buckets for failed requests. These become the `http_error:{kind}`
/// keys in the per-kind failure counters, so the set stays small and stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum HttpTransportErrorKind {
    InvalidUrl,
    OnlyHttpSupported,
    RequestBuild,
    Header,
    Request,
    Timeout,
    BodyRead,
}

/// Everything that can go wrong issuing a trigger POST, from URL parsing
/// through reading the response body.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("only http:// URLs are supported for now: {0}")]
    OnlyHttpSupported(String),

    #[error("http request build failed: {0}")]
    RequestBuild(#[from] http::Error),

    #[error("invalid http header: {0}")]
    Header(String),

    #[error("http request failed: {0}")]
    Request(#[from] hyper_util::client::legacy::Error),

    #[error("http request timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to read response body: {0}")]
    BodyRead(#[from] hyper::Error),
}

impl Error {
    #[must_use]
    pub fn transport_error_kind(&self) -> HttpTransportErrorKind {
        match self {
            Self::InvalidUrl(_) => HttpTransportErrorKind::InvalidUrl,
            Self::OnlyHttpSupported(_) => HttpTransportErrorKind::OnlyHttpSupported,
            Self::RequestBuild(_) => HttpTransportErrorKind::RequestBuild,
            Self::Header(_) => HttpTransportErrorKind::Header,
            Self::Request(_) => HttpTransportErrorKind::Request,
            Self::Timeout(_) => HttpTransportErrorKind::Timeout,
            Self::BodyRead(_) => HttpTransportErrorKind::BodyRead,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_render_as_snake_case_counter_keys() {
        let err = Error::Header("x bad name".to_string());
        assert_eq!(err.transport_error_kind().to_string(), "header");

        let err = Error::Timeout(Duration::from_secs(5));
        assert_eq!(err.transport_error_kind().to_string(), "timeout");
    }
}
