pub mod abi;
pub mod address;
pub mod binding;
pub mod client;
pub mod config;
pub mod controller;
pub mod error;
pub mod memory;
pub mod provider;
pub mod session;
pub mod token;
pub mod transaction;
pub mod view;

use std::sync::Arc;

use error::{BindingError, Error};

// Re-exports for convenience
pub use address::{Address, TxHash};
pub use binding::{ContractArtifact, DeploymentSource, StaticDeployments, TokenBinding};
pub use config::SessionConfig;
pub use controller::SessionController;
pub use error::WalletError;
pub use provider::{ProviderError, WalletProvider};
pub use session::{Session, SessionPhase, SessionSnapshot};
pub use token::Amount;
pub use transaction::TransferOutcome;
pub use view::{Dashboard, Screen, TokenPanel};

/// Build a controller from a compiled contract artifact and a deployment map.
///
/// This is the main entry point: the artifact supplies the contract
/// interface, the deployment map supplies its address by contract name.
pub fn controller_from_artifact(
    provider: Option<Arc<dyn WalletProvider>>,
    artifact_json: &str,
    deployments: &dyn DeploymentSource,
    config: SessionConfig,
) -> Result<SessionController, Error> {
    config.validate()?;
    let artifact = ContractArtifact::from_json(artifact_json)
        .map_err(|e| BindingError::Parse(e.to_string()))?;
    let token = TokenBinding::resolve(&artifact, deployments)?;
    Ok(SessionController::new(provider, token, config))
}
