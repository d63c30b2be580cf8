use std::error::Error;
use std::path::PathBuf;

use url::Url;

use client::transport::HttpConfig;
use client::{Client, Context, Network};
use common::datastore::{DatastoreError, SqliteDatastore};
use common::keybook::KeyBook;
use common::prelude::SecretKey;

use crate::state::{AppState, StateError};

#[derive(Clone)]
pub struct OpContext {
    /// Overrides the configured host
    pub remote: Option<Url>,
    /// Optional custom config path (defaults to ~/.threads)
    pub config_path: Option<PathBuf>,
}

/// Everything a command needs to talk to the network
pub struct Session {
    pub state: AppState,
    pub network: Network<SqliteDatastore>,
}

impl Session {
    pub fn identity(&self) -> Result<SecretKey, StateError> {
        self.state.load_identity()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error("failed to open key book: {0}")]
    Keys(#[from] DatastoreError),
    #[error(transparent)]
    Client(#[from] client::Error),
}

impl OpContext {
    pub fn new(remote: Option<Url>, config_path: Option<PathBuf>) -> Self {
        Self {
            remote,
            config_path,
        }
    }

    pub fn state(&self) -> Result<AppState, StateError> {
        AppState::load(self.config_path.clone())
    }

    /// Host to call: explicit flag > config file
    pub fn host(&self, state: &AppState) -> Url {
        self.remote
            .clone()
            .unwrap_or_else(|| state.config.host.clone())
    }

    /// Load state, open the KeyBook and build a client for the configured host
    pub async fn session(&self) -> Result<Session, SessionError> {
        let state = self.state()?;
        let mut context = Context::new().with_host(self.host(&state));
        if let Some(token) = state.config.token() {
            context = context.with_token(token);
        }
        tracing::debug!("using host {}", self.host(&state));

        // duplex calls over cleartext need HTTP/2 without negotiation
        let config = HttpConfig {
            http2_prior_knowledge: context.host.as_ref().is_some_and(|url| url.scheme() == "http"),
            ..HttpConfig::default()
        };
        let client = Client::http(context, config)?;
        let store = SqliteDatastore::open(&state.keys_path).await?;
        Ok(Session {
            network: Network::new(client, KeyBook::new(store)),
            state,
        })
    }
}

#[async_trait::async_trait]
pub trait Op: Send + Sync {
    type Error: Error + Send + Sync + 'static;
    type Output;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error>;
}

#[macro_export]
macro_rules! command_enum {
    ($(($variant:ident, $type:ty)),* $(,)?) => {
        #[derive(Subcommand, Debug, Clone)]
        pub enum Command {
            $($variant($type),)*
        }

        #[derive(Debug)]
        pub enum OpOutput {
            $($variant(<$type as $crate::cli::op::Op>::Output),)*
        }

        #[derive(Debug, thiserror::Error)]
        pub enum OpError {
            $(
                #[error(transparent)]
                $variant(<$type as $crate::cli::op::Op>::Error),
            )*
        }

        #[async_trait::async_trait]
        impl $crate::cli::op::Op for Command {
            type Output = OpOutput;
            type Error = OpError;

            async fn execute(&self, ctx: &$crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
                match self {
                    $(
                        Command::$variant(op) => {
                            op.execute(ctx).await
                                .map(OpOutput::$variant)
                                .map_err(OpError::$variant)
                        },
                    )*
                }
            }
        }

        impl std::fmt::Display for OpOutput {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(
                        OpOutput::$variant(output) => write!(f, "{}", output),
                    )*
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppConfig;

    #[test]
    fn test_explicit_remote_wins() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::init(Some(dir.path().to_path_buf()), AppConfig::default()).unwrap();

        let explicit = Url::parse("http://example.com:9999").unwrap();
        let ctx = OpContext::new(Some(explicit.clone()), None);
        assert_eq!(ctx.host(&state), explicit);

        let ctx = OpContext::new(None, None);
        assert_eq!(ctx.host(&state), state.config.host);
    }
}
