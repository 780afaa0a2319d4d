use actix_web::web;

use super::handlers;

/// Configures the API routes
///
/// # Arguments
///
/// * `cfg` - The service configuration
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/vote", web::post().to(handlers::cast_vote))
            .route("/verify-vote/{voter_id}", web::get().to(handlers::verify_vote))
            .route("/blockchain/validate", web::get().to(handlers::validate_chain))
            .route("/candidates", web::get().to(handlers::get_candidates))
            .route("/voter/login", web::post().to(handlers::voter_login))
            .route("/admin/results", web::get().to(handlers::get_results))
            .route("/admin/candidates", web::get().to(handlers::get_candidates))
            .route("/admin/add-candidate", web::post().to(handlers::add_candidate))
            .route("/admin/voters", web::get().to(handlers::get_voters))
            .route("/admin/add-voter", web::post().to(handlers::add_voter))
    );
}
