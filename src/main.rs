use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use log::{info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod api;
mod blockchain;
mod config;
mod registry;

use blockchain::{BlockchainStorage, CancelFlag, ChainStore, Miner, VoteLedger};
use config::Config;
use registry::{CandidateRegistry, InMemoryCandidates, InMemoryVoters, VoterRegistry};

// Open the chain, from storage unless the configuration asks for memory only
fn initialize_chain(config: &Config, miner: &Miner, cancel: &CancelFlag) -> anyhow::Result<ChainStore> {
    if config.ledger.in_memory {
        warn!("Ledger is in memory only, votes will not survive a restart");
        return Ok(ChainStore::new(miner, cancel)?);
    }

    let data_dir = &config.ledger.data_dir;
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("Failed to create data directory {}", data_dir))?;

    let storage = BlockchainStorage::new(data_dir)
        .with_context(|| format!("Failed to open ledger storage at {}", data_dir))?;
    let chain = ChainStore::with_storage(storage, miner, cancel)
        .with_context(|| format!("Failed to load chain from {}", data_dir))?;

    info!("Loaded chain of {} blocks from {}", chain.len(), data_dir);
    Ok(chain)
}

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::cast_vote,
        api::handlers::verify_vote,
        api::handlers::validate_chain,
        api::handlers::get_results,
        api::handlers::get_candidates,
        api::handlers::add_candidate,
        api::handlers::get_voters,
        api::handlers::add_voter,
        api::handlers::voter_login
    ),
    components(
        schemas(
            api::schema::BlockView,
            api::schema::BlockData,
            api::schema::FailureView,
            api::handlers::VoteRequest,
            api::handlers::VoteResponse,
            api::handlers::VerifyResponse,
            api::handlers::ChainStatusResponse,
            api::handlers::BlockchainSummary,
            api::handlers::ResultsResponse,
            api::handlers::CandidatesResponse,
            api::handlers::VotersResponse,
            api::handlers::NewVoterRequest,
            api::handlers::LoginRequest,
            blockchain::Receipt,
            blockchain::ledger::CandidateResult,
            blockchain::ledger::TurnoutStats,
            blockchain::validator::ChainStats,
            registry::Candidate,
            registry::Voter
        )
    ),
    tags(
        (name = "ledger", description = "Vote ledger API endpoints")
    ),
    info(
        title = "Vote Ledger API",
        version = "0.1.0",
        description = "Proof-of-work sealed vote ledger",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    )
)]
struct ApiDoc;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = config::load_config().context("Failed to load configuration")?;

    let candidates: Arc<dyn CandidateRegistry> = Arc::new(InMemoryCandidates::with_candidates(
        config.seed.candidates.clone(),
    ));
    let voters: Arc<dyn VoterRegistry> =
        Arc::new(InMemoryVoters::with_voters(config.seed.voters.clone()));
    info!(
        "Registered {} candidates and {} voters",
        candidates.list().len(),
        voters.count()
    );

    // Ctrl-C aborts any mining in progress, genesis included
    let cancel = CancelFlag::new();
    let signal_cancel = cancel.clone();
    actix_web::rt::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested, cancelling mining");
            signal_cancel.cancel();
        }
    });

    let max_attempts = config.ledger.max_mining_attempts;
    let miner = Miner::new(config.ledger.difficulty).with_max_attempts(max_attempts);

    let chain = {
        let config = config.clone();
        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || initialize_chain(&config, &miner, &cancel))
            .await
            .context("Chain initialization task failed")??
    };

    let ledger = Arc::new(
        VoteLedger::new(chain, Arc::clone(&candidates), Arc::clone(&voters))
            .with_max_mining_attempts(max_attempts)
            .with_cancel_flag(cancel),
    );

    if let Some(at_index) = ledger.halted_at() {
        warn!(
            "Chain is invalid from block {}, vote admission is disabled until an operator intervenes",
            at_index
        );
    }

    let state = web::Data::new(api::AppState {
        ledger,
        candidates,
        voters,
    });

    let bind = (config.server.host.clone(), config.server.port);
    info!("Starting HTTP server at http://{}:{}", bind.0, bind.1);

    HttpServer::new(move || {
        // Configure CORS
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .app_data(state.clone())
            .configure(api::configure_routes)
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", ApiDoc::openapi()),
            )
    })
    .bind(bind)
    .with_context(|| format!("Failed to bind {}:{}", config.server.host, config.server.port))?
    .run()
    .await?;

    Ok(())
}
