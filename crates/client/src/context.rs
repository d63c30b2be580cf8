use std::collections::BTreeMap;

use url::Url;

use common::thread::ThreadToken;

/// Header carrying the bearer token
pub const AUTHORIZATION: &str = "authorization";

/// Calling context for a request
///
/// A [`Client`](crate::Client) holds a default context; each call may pass
/// another one that is merged over it, with the call's fields winning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Context {
    /// Service endpoint
    pub host: Option<Url>,
    pub token: Option<ThreadToken>,
    /// Log frames exchanged with the service
    pub debug: Option<bool>,
    /// Extra request metadata
    pub headers: BTreeMap<String, String>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, host: Url) -> Self {
        self.host = Some(host);
        self
    }

    pub fn with_token(mut self, token: ThreadToken) -> Self {
        self.token = Some(token);
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = Some(debug);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    /// `call` layered over `self`
    pub fn merge(&self, call: &Context) -> Context {
        let mut headers = self.headers.clone();
        headers.extend(call.headers.clone());
        Context {
            host: call.host.clone().or_else(|| self.host.clone()),
            token: call.token.clone().or_else(|| self.token.clone()),
            debug: call.debug.or(self.debug),
            headers,
        }
    }

    pub fn is_debug(&self) -> bool {
        self.debug.unwrap_or(false)
    }

    /// Request metadata, including `authorization: bearer <token>` when a
    /// non-empty token is set
    pub fn metadata(&self) -> BTreeMap<String, String> {
        let mut metadata = self.headers.clone();
        if let Some(token) = self.token.as_ref().filter(|t| !t.is_empty()) {
            metadata.insert(AUTHORIZATION.to_string(), format!("bearer {}", token));
        }
        metadata
    }

    /// The token carried in `authorization` metadata, if any
    pub fn bearer(metadata: &BTreeMap<String, String>) -> Option<ThreadToken> {
        let value = metadata.get(AUTHORIZATION)?;
        let (scheme, token) = value.split_once(' ')?;
        scheme
            .eq_ignore_ascii_case("bearer")
            .then(|| ThreadToken::new(token.trim()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_fields_win() {
        let base = Context::new()
            .with_host("http://127.0.0.1:6007".parse().unwrap())
            .with_token(ThreadToken::new("base"))
            .with_header("X-Trace", "1");
        let call = Context::new()
            .with_token(ThreadToken::new("call"))
            .with_debug(true)
            .with_header("x-trace", "2");

        let merged = base.merge(&call);
        assert_eq!(merged.host, base.host);
        assert_eq!(merged.token, Some(ThreadToken::new("call")));
        assert!(merged.is_debug());
        assert_eq!(merged.headers.get("x-trace").map(String::as_str), Some("2"));

        // an empty call context changes nothing
        assert_eq!(base.merge(&Context::new()), base);
    }

    #[test]
    fn test_bearer_metadata() {
        let ctx = Context::new().with_token(ThreadToken::new("abc"));
        let metadata = ctx.metadata();
        assert_eq!(
            metadata.get(AUTHORIZATION).map(String::as_str),
            Some("bearer abc")
        );
        assert_eq!(Context::bearer(&metadata), Some(ThreadToken::new("abc")));

        let anonymous = Context::new().with_token(ThreadToken::new(""));
        assert!(anonymous.metadata().is_empty());
    }
}
