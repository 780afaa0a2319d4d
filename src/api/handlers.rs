use std::collections::HashSet;
use std::sync::Arc;

use actix_web::{web, HttpResponse, Responder};
use log::error;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::schema::{BlockView, FailureView};
use crate::blockchain::ledger::{CandidateResult, TurnoutStats};
use crate::blockchain::validator::ChainStats;
use crate::blockchain::{Receipt, VoteError, VoteLedger};
use crate::registry::{Candidate, CandidateRegistry, RegistryError, Voter, VoterRegistry};

/// Shared state of the HTTP service
pub struct AppState {
    pub ledger: Arc<VoteLedger>,
    pub candidates: Arc<dyn CandidateRegistry>,
    pub voters: Arc<dyn VoterRegistry>,
}

pub type AppData = web::Data<AppState>;

/// Request for the vote endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct VoteRequest {
    #[serde(default)]
    pub voter_id: String,

    #[serde(default)]
    pub candidate_name: String,
}

/// Response for the vote endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct VoteResponse {
    pub message: String,
    pub block: Option<BlockView>,
    pub receipt: Receipt,
}

/// Response for a recorded vote lookup
#[derive(Serialize, Deserialize, ToSchema)]
pub struct VerifyResponse {
    pub verified: bool,
    pub block: BlockView,

    /// Whether the whole chain validates
    pub chain_valid: bool,

    /// Whether genesis up to the vote block validates
    pub chain_valid_up_to_block: bool,
}

/// Response for the chain status endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ChainStatusResponse {
    pub valid: bool,
    pub chain: Vec<BlockView>,
    pub stats: ChainStats,
    pub failures: Vec<FailureView>,
}

/// Chain summary attached to the results
#[derive(Serialize, Deserialize, ToSchema)]
pub struct BlockchainSummary {
    pub total_blocks: usize,
    pub total_votes: usize,
    pub difficulty: u8,
    pub latest_hash: Option<String>,
    pub is_valid: bool,
}

impl BlockchainSummary {
    fn new(stats: ChainStats, is_valid: bool) -> Self {
        BlockchainSummary {
            total_blocks: stats.total_blocks,
            total_votes: stats.total_votes,
            difficulty: stats.difficulty,
            latest_hash: stats.latest_hash,
            is_valid,
        }
    }
}

/// Response for the results endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ResultsResponse {
    pub results: Vec<CandidateResult>,
    pub stats: TurnoutStats,
    pub blockchain: BlockchainSummary,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct CandidatesResponse {
    pub candidates: Vec<Candidate>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct VotersResponse {
    pub voters: Vec<Voter>,
}

/// Request for the add voter endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct NewVoterRequest {
    #[serde(default)]
    pub voter_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

/// Request for the voter login endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct LoginRequest {
    #[serde(default)]
    pub voter_id: String,
}

fn error_body(message: impl Into<String>) -> serde_json::Value {
    serde_json::json!({ "error": message.into() })
}

/// Maps a vote admission failure to a response
fn vote_error_response(err: VoteError) -> HttpResponse {
    match err {
        VoteError::VoterNotFound(_) => HttpResponse::NotFound().json(error_body("Voter ID not found")),
        VoteError::CandidateNotFound(_) => {
            HttpResponse::NotFound().json(error_body("Candidate not found"))
        }
        VoteError::DuplicateVote { .. } => {
            HttpResponse::Conflict().json(error_body("You have already voted"))
        }
        VoteError::MiningAborted(err) => HttpResponse::ServiceUnavailable()
            .json(error_body(format!("Vote was not recorded, please retry: {}", err))),
        err @ (VoteError::ChainCorrupted { .. } | VoteError::ChainError(_)) => {
            error!("Vote admission failed: {}", err);
            HttpResponse::InternalServerError().json(error_body(err.to_string()))
        }
    }
}

fn registry_error_response(err: RegistryError) -> HttpResponse {
    match err {
        RegistryError::AlreadyExists(_) => HttpResponse::Conflict().json(error_body(err.to_string())),
        RegistryError::InvalidRecord(_) => HttpResponse::BadRequest().json(error_body(err.to_string())),
    }
}

/// Cast a vote
///
/// Mines the vote into a new block and returns its receipt
#[utoipa::path(
    post,
    path = "/api/vote",
    request_body = VoteRequest,
    responses(
        (status = 201, description = "Vote recorded", body = VoteResponse),
        (status = 400, description = "Missing voter_id or candidate_name"),
        (status = 404, description = "Unknown voter or candidate"),
        (status = 409, description = "Voter has already voted"),
        (status = 503, description = "Mining aborted, the request may be retried"),
        (status = 500, description = "Chain corrupted or storage failure")
    )
)]
pub async fn cast_vote(state: AppData, vote_req: web::Json<VoteRequest>) -> impl Responder {
    let VoteRequest {
        voter_id,
        candidate_name,
    } = vote_req.into_inner();

    if voter_id.trim().is_empty() || candidate_name.trim().is_empty() {
        return HttpResponse::BadRequest().json(error_body("voter_id and candidate_name are required"));
    }

    let ledger = Arc::clone(&state.ledger);
    let result = web::block(move || ledger.cast_vote(&voter_id, &candidate_name)).await;

    match result {
        Ok(Ok(receipt)) => {
            let block = state
                .ledger
                .snapshot()
                .get(receipt.block_index as usize)
                .map(BlockView::from);

            HttpResponse::Created().json(VoteResponse {
                message: "Vote cast successfully!".to_string(),
                block,
                receipt,
            })
        }
        Ok(Err(err)) => vote_error_response(err),
        Err(err) => {
            error!("Vote task failed: {}", err);
            HttpResponse::InternalServerError().json(error_body("Vote task failed"))
        }
    }
}

/// Verify a vote
///
/// Looks up the block recording the voter's vote
#[utoipa::path(
    get,
    path = "/api/verify-vote/{voter_id}",
    params(("voter_id" = String, Path, description = "Voter ID")),
    responses(
        (status = 200, description = "Vote found", body = VerifyResponse),
        (status = 404, description = "No vote found for this voter ID")
    )
)]
pub async fn verify_vote(state: AppData, voter_id: web::Path<String>) -> impl Responder {
    match state.ledger.verify_vote(&voter_id) {
        Some(verification) => HttpResponse::Ok().json(VerifyResponse {
            verified: true,
            block: BlockView::from(&verification.block),
            chain_valid: verification.chain_valid,
            chain_valid_up_to_block: verification.chain_valid_up_to_block,
        }),
        None => HttpResponse::NotFound().json(serde_json::json!({
            "verified": false,
            "message": "No vote found for this voter ID"
        })),
    }
}

/// Validate the chain
///
/// Validates every block and returns the chain with its statistics
#[utoipa::path(
    get,
    path = "/api/blockchain/validate",
    responses(
        (status = 200, description = "Chain validation status", body = ChainStatusResponse)
    )
)]
pub async fn validate_chain(state: AppData) -> impl Responder {
    let status = state.ledger.status();

    HttpResponse::Ok().json(ChainStatusResponse {
        valid: status.valid,
        chain: status.chain.iter().map(BlockView::from).collect(),
        stats: status.stats,
        failures: status.failures.iter().map(FailureView::from).collect(),
    })
}

/// Get election results
///
/// Counts the votes on the chain, with turnout
#[utoipa::path(
    get,
    path = "/api/admin/results",
    responses(
        (status = 200, description = "Results counted", body = ResultsResponse)
    )
)]
pub async fn get_results(state: AppData) -> impl Responder {
    let tally = state.ledger.tally();
    let status = state.ledger.status();

    HttpResponse::Ok().json(ResultsResponse {
        results: tally.results,
        stats: tally.stats,
        blockchain: BlockchainSummary::new(status.stats, status.valid),
    })
}

/// List candidates
#[utoipa::path(
    get,
    path = "/api/candidates",
    responses(
        (status = 200, description = "Candidates", body = CandidatesResponse)
    )
)]
pub async fn get_candidates(state: AppData) -> impl Responder {
    HttpResponse::Ok().json(CandidatesResponse {
        candidates: state.candidates.list(),
    })
}

/// Add a candidate
#[utoipa::path(
    post,
    path = "/api/admin/add-candidate",
    request_body = Candidate,
    responses(
        (status = 201, description = "Candidate added"),
        (status = 400, description = "Missing name or party"),
        (status = 409, description = "Candidate already exists")
    )
)]
pub async fn add_candidate(state: AppData, candidate: web::Json<Candidate>) -> impl Responder {
    let candidate = candidate.into_inner();

    match state.candidates.add(candidate.clone()) {
        Ok(()) => HttpResponse::Created().json(serde_json::json!({
            "message": "Candidate added successfully",
            "candidate": candidate
        })),
        Err(err) => registry_error_response(err),
    }
}

/// List voters
///
/// The `has_voted` flag is read from the chain
#[utoipa::path(
    get,
    path = "/api/admin/voters",
    responses(
        (status = 200, description = "Registered voters", body = VotersResponse)
    )
)]
pub async fn get_voters(state: AppData) -> impl Responder {
    let snapshot = state.ledger.snapshot();
    let voted: HashSet<&str> = snapshot.iter().filter_map(|b| b.voter_id()).collect();

    let voters = state
        .voters
        .list()
        .into_iter()
        .map(|mut voter| {
            voter.has_voted = voted.contains(voter.voter_id.as_str());
            voter
        })
        .collect();

    HttpResponse::Ok().json(VotersResponse { voters })
}

/// Register a voter
#[utoipa::path(
    post,
    path = "/api/admin/add-voter",
    request_body = NewVoterRequest,
    responses(
        (status = 201, description = "Voter registered"),
        (status = 400, description = "Missing fields"),
        (status = 409, description = "Voter ID already exists")
    )
)]
pub async fn add_voter(state: AppData, voter_req: web::Json<NewVoterRequest>) -> impl Responder {
    let NewVoterRequest {
        voter_id,
        name,
        email,
    } = voter_req.into_inner();

    if voter_id.trim().is_empty() || name.trim().is_empty() || email.trim().is_empty() {
        return HttpResponse::BadRequest().json(error_body("voter_id, name, and email are required"));
    }

    let voter = Voter {
        has_voted: state.ledger.has_voted(&voter_id),
        voter_id,
        name,
        email,
    };

    match state.voters.add(voter.clone()) {
        Ok(()) => HttpResponse::Created().json(serde_json::json!({
            "message": "Voter registered successfully",
            "voter": voter
        })),
        Err(err) => registry_error_response(err),
    }
}

/// Voter login
///
/// Looks up a voter by ID
#[utoipa::path(
    post,
    path = "/api/voter/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Voter found"),
        (status = 400, description = "Missing voter ID"),
        (status = 404, description = "Voter ID not found")
    )
)]
pub async fn voter_login(state: AppData, login: web::Json<LoginRequest>) -> impl Responder {
    let voter_id = login.into_inner().voter_id;

    if voter_id.trim().is_empty() {
        return HttpResponse::BadRequest().json(error_body("Voter ID is required"));
    }

    let voter = state
        .voters
        .list()
        .into_iter()
        .find(|voter| voter.voter_id == voter_id);

    match voter {
        Some(mut voter) => {
            voter.has_voted = state.ledger.has_voted(&voter.voter_id);
            HttpResponse::Ok().json(serde_json::json!({
                "message": "Login successful",
                "voter": voter
            }))
        }
        None => HttpResponse::NotFound().json(error_body("Voter ID not found")),
    }
}
