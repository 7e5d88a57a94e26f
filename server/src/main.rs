mod config;
mod graphql;
mod http;

use std::sync::Arc;

use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use platform_authn::RestAuthGateway;
use platform_db::{DatabaseSettings, OrmDealStore, connect};
use platform_obs::{ObsConfig, init_tracing};
use platform_rest::{RestClient, RestDealStore};
use products_crm::{
    AuthGateway, Board, DealRepository, PersistenceGateway, SessionGuard,
    memory::{InMemoryAuth, InMemoryDealStore},
};
use tracing::{info, warn};

use crate::{
    config::{AppConfig, DealsBackend},
    graphql::AppContext,
    http::AppState,
};

#[derive(Parser, Debug)]
#[command(name = "deal-tracker", version, about = "Venture deal pipeline tracker")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Run HTTP server
    Serve {
        #[arg(long, env = "BIND", default_value = "127.0.0.1:8080")]
        bind: String,
    },
    /// Print GraphQL SDL
    PrintSchema,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let _obs = init_tracing(ObsConfig::from_env())?;
    let cli = Cli::parse();

    match cli.cmd {
        Cmd::PrintSchema => {
            println!("{}", graphql::sdl());
            Ok(())
        }
        Cmd::Serve { bind } => {
            let config = AppConfig::load()?;
            let app = Arc::new(build_context(&config).await?);
            let state = AppState {
                schema: graphql::build_schema(app.clone()),
            };
            let served = http::serve(&bind, state).await;
            match Arc::try_unwrap(app) {
                Ok(app) => app.into_session().shutdown().await,
                Err(_) => warn!("context still shared at shutdown; session listener aborted on drop"),
            }
            served
        }
    }
}

async fn build_context(config: &AppConfig) -> Result<AppContext> {
    let client = match &config.rest {
        Some(rest) => Some(RestClient::new(&rest.url, rest.api_key.clone())?),
        None => None,
    };

    let store: Arc<dyn PersistenceGateway> = match config.backend {
        DealsBackend::Rest => {
            let client = client
                .clone()
                .ok_or_else(|| anyhow!("REST backend selected without gateway settings"))?;
            Arc::new(RestDealStore::for_table(client, config.table.clone()))
        }
        DealsBackend::Database => {
            let db = connect(&DatabaseSettings::from_env()).await?;
            Arc::new(OrmDealStore::new(db))
        }
        DealsBackend::Memory => Arc::new(InMemoryDealStore::new()),
    };

    let auth: Arc<dyn AuthGateway> = match (client, &config.dev_login) {
        (Some(client), _) => Arc::new(RestAuthGateway::new(client)),
        (None, Some((email, password))) => {
            warn!(%email, "using in-memory dev login");
            Arc::new(InMemoryAuth::new().with_account(email, password))
        }
        (None, None) => return Err(anyhow!("no auth backend configured")),
    };

    info!(
        backend = ?config.backend,
        table = %config.table,
        sync = ?config.sync,
        "deal tracker configured"
    );
    let session = SessionGuard::start(auth).await;
    let board = Board::new(DealRepository::new(store), config.sync);
    Ok(AppContext::new(session, board, config.team.clone()))
}
