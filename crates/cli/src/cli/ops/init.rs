use clap::Args;
use url::Url;

use crate::state::{AppConfig, AppState, StateError};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Network API endpoint to store in the config
    #[arg(long)]
    pub host: Option<Url>,
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Init {
    type Error = StateError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut config = AppConfig::default();
        if let Some(host) = self.host.clone().or_else(|| ctx.remote.clone()) {
            config.host = host;
        }
        let state = AppState::init(ctx.config_path.clone(), config)?;
        let identity = state.load_identity()?;

        Ok(format!(
            "Initialized threads directory at {}\nIdentity: {}\nHost: {}",
            state.threads_dir.display(),
            identity.public(),
            state.config.host
        ))
    }
}
