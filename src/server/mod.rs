pub mod api;

use crate::agent::TherapyAgent;
use crate::cli::Args;
use log::warn;
use std::error::Error;
use std::sync::Arc;

pub struct Server {
    addr: String,
    agent: Arc<TherapyAgent>,
    args: Args,
}

impl Server {
    pub fn new(addr: String, agent: Arc<TherapyAgent>, args: Args) -> Self {
        Self { addr, agent, args }
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        if !self.agent.is_configured() {
            warn!("Serving without a usable chat model; turns will return configuration errors.");
        }
        api::start_http_server(&self.addr, self.agent.clone(), self.args.clone()).await
    }
}
