//! Token extraction from gRPC metadata and HTTP headers.

use super::{
    AuthError, CallContext, Result, AUTHORIZATION_METADATA, BEARER_TOKEN_PREFIX,
    K8S_TOKEN_PREFIX,
};
use http::request::Parts;

/// Bearer token from the call's `authorization` metadata.
///
/// Multiple values are allowed; the first one carrying the `Bearer ` prefix wins.
pub fn extract_bearer_token(context: &CallContext) -> Result<String> {
    let metadata = context.metadata().ok_or(AuthError::MissingMetadata)?;

    let mut values = metadata.get_all(AUTHORIZATION_METADATA).iter().peekable();
    if values.peek().is_none() {
        return Err(AuthError::MissingAuthorizationHeader);
    }

    values
        .filter_map(|value| value.to_str().ok())
        .find_map(|value| value.strip_prefix(BEARER_TOKEN_PREFIX))
        .map(str::to_string)
        .ok_or(AuthError::MissingBearer)
}

/// Token from the request's `Authorization` header, with either the `Bearer `
/// or the `Istio ` prefix.
pub fn extract_request_token(request: &Parts) -> Result<String> {
    let value = request
        .headers
        .get(AUTHORIZATION_METADATA)
        .map(|value| value.to_str().map_err(|_| AuthError::MissingBearer))
        .transpose()?
        .unwrap_or_default();

    if value.is_empty() {
        return Err(AuthError::MissingAuthorizationHeader);
    }

    value
        .strip_prefix(BEARER_TOKEN_PREFIX)
        .or_else(|| value.strip_prefix(K8S_TOKEN_PREFIX))
        .map(str::to_string)
        .ok_or(AuthError::MissingBearer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::metadata::MetadataMap;

    fn context_with(values: &[&str]) -> CallContext {
        let mut metadata = MetadataMap::new();
        for value in values {
            metadata.append(AUTHORIZATION_METADATA, value.parse().unwrap());
        }
        CallContext::new().with_metadata(metadata)
    }

    fn parts_with(header: Option<&str>) -> Parts {
        let mut builder = http::Request::builder().uri("/");
        if let Some(value) = header {
            builder = builder.header("Authorization", value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_bearer_from_metadata() {
        assert_eq!(extract_bearer_token(&context_with(&["Bearer abc123"])).unwrap(), "abc123");
    }

    #[test]
    fn test_first_bearer_value_wins() {
        let context = context_with(&["Basic dXNlcg==", "Bearer first", "Bearer second"]);
        assert_eq!(extract_bearer_token(&context).unwrap(), "first");
    }

    #[test]
    fn test_metadata_errors() {
        assert_eq!(extract_bearer_token(&CallContext::new()), Err(AuthError::MissingMetadata));
        assert_eq!(
            extract_bearer_token(&CallContext::new().with_metadata(MetadataMap::new())),
            Err(AuthError::MissingAuthorizationHeader)
        );
        assert_eq!(
            extract_bearer_token(&context_with(&["Istio abc"])),
            Err(AuthError::MissingBearer)
        );
    }

    #[test]
    fn test_request_token_prefixes() {
        assert_eq!(extract_request_token(&parts_with(Some("Istio xyz"))).unwrap(), "xyz");
        assert_eq!(extract_request_token(&parts_with(Some("Bearer abc"))).unwrap(), "abc");
    }

    #[test]
    fn test_request_token_errors() {
        assert_eq!(
            extract_request_token(&parts_with(None)),
            Err(AuthError::MissingAuthorizationHeader)
        );
        assert_eq!(
            extract_request_token(&parts_with(Some(""))),
            Err(AuthError::MissingAuthorizationHeader)
        );
        assert_eq!(
            extract_request_token(&parts_with(Some("Basic dXNlcg=="))),
            Err(AuthError::MissingBearer)
        );
    }
}
