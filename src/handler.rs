use std::sync::Arc;

use axum::http::HeaderName;
use axum::routing::{get, post};
use axum::Router;
use tera::Tera;

use crate::chain::ChainClient;
use crate::config::Config;
use crate::db::dbclient::DBClient;
use crate::views::{self, blockchain, polls};

pub struct AppData {
    pub db_client: Arc<DBClient>,
    pub templates: Tera,
    pub chain: ChainClient,
    pub auth_header: HeaderName,
}

impl AppData {
    pub fn new(db_client: DBClient, config: &Config) -> anyhow::Result<Arc<Self>> {
        let chain = ChainClient::new(&config.chain_rpc_url)?;
        let auth_header = HeaderName::from_bytes(config.auth_header.to_lowercase().as_bytes())?;

        Self::assemble(db_client, chain, auth_header)
    }

    pub fn assemble(db_client: DBClient, chain: ChainClient, auth_header: HeaderName) -> anyhow::Result<Arc<Self>> {
        Ok(Arc::new(Self {
            db_client: Arc::new(db_client),
            templates: views::load_templates()?,
            chain,
            auth_header,
        }))
    }
}

pub fn router(data: Arc<AppData>) -> Router {
    Router::new()
        .route("/polls/", get(polls::index))
        .route("/polls/new/", get(polls::new_poll_form).post(polls::new_poll))
        .route("/polls/blockchain/", get(blockchain::info).post(blockchain::lookup))
        .route("/polls/{id}/", get(polls::detail))
        .route("/polls/{id}/results/", get(polls::results))
        .route("/polls/{id}/vote/", post(polls::vote))
        .with_state(data)
}
