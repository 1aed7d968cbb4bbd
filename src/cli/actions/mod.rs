pub mod server;

use anyhow::Result;

/// Actions the CLI can dispatch to.
#[derive(Debug)]
pub enum Action {
    Server(Box<server::Args>),
}

impl Action {
    /// Execute the action.
    ///
    /// # Errors
    /// Propagates errors from the underlying action.
    pub async fn execute(self) -> Result<()> {
        match self {
            Self::Server(args) => server::execute(*args).await,
        }
    }
}
