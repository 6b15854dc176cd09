//! Single binary web server for the doubles ladder: JSON API plus the scheduled formation timer.
//! Run with: cargo run --bin web
//! Listens on 0.0.0.0:8080 by default. Override with env: HOST, PORT; see `LadderConfig` for the rest.

use actix_session::{storage::CookieSessionStore, Session, SessionMiddleware};
use actix_web::{
    cookie::Key,
    delete, get, patch, post, put,
    web::{Data, Json, Path},
    App, HttpResponse, HttpServer, Responder,
};
use doubles_ladder::{Ladder, LadderConfig, LadderError, PlayerId, PositionEntry};
use log::{debug, error, info, warn};
use serde::Deserialize;
use serde_json::json;

type AppState = Data<Ladder>;

/// Admin secret, shared with the session handler.
struct AdminKey(Option<String>);

const SESSION_USER: &str = "user_id";
const SESSION_ADMIN: &str = "is_admin";

/// Verified caller identity, read from the signed session cookie.
struct Identity {
    user_id: String,
    is_admin: bool,
}

fn identity(session: &Session) -> Option<Identity> {
    let user_id = session.get::<String>(SESSION_USER).ok().flatten()?;
    let is_admin = session
        .get::<bool>(SESSION_ADMIN)
        .ok()
        .flatten()
        .unwrap_or(false);
    Some(Identity { user_id, is_admin })
}

fn unauthorized() -> HttpResponse {
    HttpResponse::Unauthorized().json(json!({ "success": false, "message": "Not signed in" }))
}

fn require_user(session: &Session) -> Result<Identity, HttpResponse> {
    identity(session).ok_or_else(unauthorized)
}

fn require_admin(session: &Session) -> Result<Identity, HttpResponse> {
    let id = require_user(session)?;
    if id.is_admin {
        Ok(id)
    } else {
        Err(HttpResponse::Forbidden().json(json!({ "success": false, "message": "Admin only" })))
    }
}

/// Map a ladder error to a `{success: false, message}` response.
fn error_response(e: LadderError) -> HttpResponse {
    if !e.is_rejection() {
        error!("Request failed: {}", e);
    }
    let message = e.to_string();
    match e {
        LadderError::PlayerNotFound(_) | LadderError::GroupNotFound(_) => {
            HttpResponse::NotFound().json(json!({ "success": false, "message": message }))
        }
        LadderError::AlreadySubmitted
        | LadderError::DuplicatePlayer
        | LadderError::FormationInProgress => {
            HttpResponse::Conflict().json(json!({ "success": false, "message": message }))
        }
        LadderError::SubmissionWindowClosed => {
            HttpResponse::Forbidden().json(json!({ "success": false, "message": message }))
        }
        LadderError::PartialFailure { applied, failures } => HttpResponse::InternalServerError()
            .json(json!({ "success": false, "message": message, "applied": applied, "failures": failures })),
        LadderError::Store(_) => HttpResponse::InternalServerError()
            .json(json!({ "success": false, "message": "Server error" })),
        _ => HttpResponse::BadRequest().json(json!({ "success": false, "message": message })),
    }
}

/// Player record of the signed-in user, or 404.
async fn own_player_id(ladder: &Ladder, user_id: &str) -> Result<PlayerId, HttpResponse> {
    match ladder.player_for_user(user_id).await {
        Ok(Some(p)) => Ok(p.id),
        Ok(None) => Err(HttpResponse::NotFound()
            .json(json!({ "success": false, "message": "Player profile not found" }))),
        Err(e) => Err(error_response(e)),
    }
}

#[derive(Deserialize)]
struct SessionBody {
    user_id: String,
    #[serde(default)]
    admin_key: Option<String>,
}

#[derive(Deserialize)]
struct RegisterBody {
    name: String,
}

#[derive(Deserialize)]
struct StatusBody {
    is_active: bool,
}

#[derive(Deserialize)]
struct RankingBody {
    position: u32,
    group_size: u32,
}

#[derive(Deserialize)]
struct AdminRankingBody {
    player_id: PlayerId,
    position: u32,
    group_size: u32,
}

#[derive(Deserialize)]
struct GroupRankingsBody {
    rankings: Vec<PositionEntry>,
}

#[derive(Deserialize)]
struct FormGroupsBody {
    #[serde(default)]
    group_size: Option<usize>,
}

#[derive(Deserialize)]
struct LifetimePointsBody {
    lifetime_points: i32,
}

#[derive(Deserialize)]
struct AddPlayerBody {
    user_id: String,
    name: String,
    #[serde(default)]
    rating: Option<i32>,
    #[serde(default)]
    lifetime_points: Option<i32>,
}

#[derive(Deserialize)]
struct AnnouncementBody {
    title: String,
    date: String,
    content: String,
}

/// Path segment: player id (e.g. /api/admin/players/{id})
#[derive(Deserialize)]
struct PlayerPath {
    id: PlayerId,
}

/// Path segment: group number (e.g. /api/admin/groups/{number}/rankings)
#[derive(Deserialize)]
struct GroupPath {
    number: u32,
}

#[get("/api/health")]
async fn api_health() -> impl Responder {
    HttpResponse::Ok().json(json!({ "ok": true, "service": "doubles-ladder" }))
}

/// Open a session for the given user id; the admin key grants the admin role.
///
/// The user id is taken as-is and nothing here checks who the caller is. This is
/// not a login: deploy it behind an identity proxy that authenticates users and
/// sets `user_id` itself, never from client input.
#[post("/api/session")]
async fn api_open_session(
    session: Session,
    admin_key: Data<AdminKey>,
    body: Json<SessionBody>,
) -> HttpResponse {
    let user_id = body.user_id.trim();
    if user_id.is_empty() {
        return HttpResponse::BadRequest()
            .json(json!({ "success": false, "message": "user_id is required" }));
    }
    let is_admin = match (&admin_key.0, &body.admin_key) {
        (Some(expected), Some(given)) => expected == given,
        _ => false,
    };
    session.renew();
    if session.insert(SESSION_USER, user_id).is_err() || session.insert(SESSION_ADMIN, is_admin).is_err() {
        return HttpResponse::InternalServerError()
            .json(json!({ "success": false, "message": "Session error" }));
    }
    info!("Session opened for {} (admin: {})", user_id, is_admin);
    HttpResponse::Ok().json(json!({ "success": true, "user_id": user_id, "is_admin": is_admin }))
}

#[delete("/api/session")]
async fn api_close_session(session: Session) -> HttpResponse {
    session.purge();
    HttpResponse::Ok().json(json!({ "success": true }))
}

/// Opt in to the ladder with a display name.
#[post("/api/players/self")]
async fn api_register_self(state: AppState, session: Session, body: Json<RegisterBody>) -> HttpResponse {
    let id = match require_user(&session) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.register_self(&id.user_id, &body.name).await {
        Ok(player) => HttpResponse::Ok().json(json!({ "success": true, "player": player })),
        Err(e) => error_response(e),
    }
}

/// The caller's own record (`player: null` when not registered).
#[get("/api/players/me")]
async fn api_my_status(state: AppState, session: Session) -> HttpResponse {
    let id = match require_user(&session) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.player_for_user(&id.user_id).await {
        Ok(player) => HttpResponse::Ok().json(json!({ "success": true, "player": player })),
        Err(e) => error_response(e),
    }
}

/// Sign up for (or drop out of) the next formation.
#[patch("/api/players/self/status")]
async fn api_set_own_status(state: AppState, session: Session, body: Json<StatusBody>) -> HttpResponse {
    let id = match require_user(&session) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let player_id = match own_player_id(&state, &id.user_id).await {
        Ok(pid) => pid,
        Err(resp) => return resp,
    };
    match state.set_active(player_id, body.is_active).await {
        Ok(player) => HttpResponse::Ok().json(json!({ "success": true, "player": player })),
        Err(e) => error_response(e),
    }
}

#[get("/api/players")]
async fn api_leaderboard(state: AppState) -> HttpResponse {
    match state.leaderboard().await {
        Ok(rows) => HttpResponse::Ok().json(json!({ "success": true, "players": rows })),
        Err(e) => error_response(e),
    }
}

#[get("/api/players/leaderboard.csv")]
async fn api_leaderboard_csv(state: AppState) -> HttpResponse {
    match state.leaderboard_csv().await {
        Ok(body) => HttpResponse::Ok()
            .content_type("text/csv; charset=utf-8")
            .insert_header(("Content-Disposition", "attachment; filename=\"leaderboard.csv\""))
            .body(body),
        Err(e) => error_response(e),
    }
}

#[get("/api/groups/current")]
async fn api_current_groups(state: AppState) -> HttpResponse {
    match state.current_groups().await {
        Ok(groups) => HttpResponse::Ok().json(json!({ "success": true, "groups": groups })),
        Err(e) => error_response(e),
    }
}

#[get("/api/groups/last")]
async fn api_last_groups(state: AppState) -> HttpResponse {
    match state.last_groups().await {
        Ok(groups) => HttpResponse::Ok().json(json!({ "success": true, "groups": groups })),
        Err(e) => error_response(e),
    }
}

/// Submit the caller's own finishing position.
#[post("/api/rankings")]
async fn api_submit_ranking(state: AppState, session: Session, body: Json<RankingBody>) -> HttpResponse {
    let id = match require_user(&session) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let player_id = match own_player_id(&state, &id.user_id).await {
        Ok(pid) => pid,
        Err(resp) => return resp,
    };
    match state.submit_ranking(player_id, body.position, body.group_size).await {
        Ok(outcome) => HttpResponse::Ok().json(json!({ "success": true, "result": outcome })),
        Err(e) => error_response(e),
    }
}

#[get("/api/announcement")]
async fn api_announcement(state: AppState) -> HttpResponse {
    match state.announcement().await {
        Ok(a) => HttpResponse::Ok().json(json!({ "success": true, "announcement": a })),
        Err(e) => error_response(e),
    }
}

#[post("/api/admin/groups/form")]
async fn api_admin_form_groups(
    state: AppState,
    session: Session,
    body: Option<Json<FormGroupsBody>>,
) -> HttpResponse {
    if let Err(resp) = require_admin(&session) {
        return resp;
    }
    let group_size = body.and_then(|b| b.group_size);
    match state.form_groups(group_size).await {
        Ok(report) => HttpResponse::Ok().json(json!({ "success": true, "message": "Groups formed successfully", "report": report })),
        Err(e) => error_response(e),
    }
}

#[post("/api/admin/rankings")]
async fn api_admin_submit_ranking(
    state: AppState,
    session: Session,
    body: Json<AdminRankingBody>,
) -> HttpResponse {
    if let Err(resp) = require_admin(&session) {
        return resp;
    }
    match state
        .admin_submit_ranking(body.player_id, body.position, body.group_size)
        .await
    {
        Ok(outcome) => HttpResponse::Ok().json(json!({ "success": true, "result": outcome })),
        Err(e) => error_response(e),
    }
}

/// Enter a whole group's results at once.
#[post("/api/admin/groups/{number}/rankings")]
async fn api_admin_group_rankings(
    state: AppState,
    session: Session,
    path: Path<GroupPath>,
    body: Json<GroupRankingsBody>,
) -> HttpResponse {
    if let Err(resp) = require_admin(&session) {
        return resp;
    }
    match state
        .admin_submit_group_rankings(path.number, &body.rankings)
        .await
    {
        Ok(report) => HttpResponse::Ok().json(json!({
            "success": report.failures.is_empty(),
            "successes": report.successes,
            "failures": report.failures,
        })),
        Err(e) => error_response(e),
    }
}

#[patch("/api/admin/players/{id}/lifetime-points")]
async fn api_admin_adjust_points(
    state: AppState,
    session: Session,
    path: Path<PlayerPath>,
    body: Json<LifetimePointsBody>,
) -> HttpResponse {
    if let Err(resp) = require_admin(&session) {
        return resp;
    }
    match state.adjust_lifetime_points(path.id, body.lifetime_points).await {
        Ok(adj) => HttpResponse::Ok().json(json!({ "success": true, "adjustment": adj })),
        Err(e) => error_response(e),
    }
}

#[post("/api/admin/players/{id}/no-show")]
async fn api_admin_no_show(state: AppState, session: Session, path: Path<PlayerPath>) -> HttpResponse {
    if let Err(resp) = require_admin(&session) {
        return resp;
    }
    match state.apply_no_show(path.id).await {
        Ok(outcome) => HttpResponse::Ok().json(json!({ "success": true, "result": outcome })),
        Err(e) => error_response(e),
    }
}

#[post("/api/admin/sweeps/no-result")]
async fn api_admin_no_result_sweep(state: AppState, session: Session) -> HttpResponse {
    if let Err(resp) = require_admin(&session) {
        return resp;
    }
    match state.apply_no_result_sweep().await {
        Ok(report) => HttpResponse::Ok().json(json!({ "success": report.failures.is_empty(), "report": report })),
        Err(e) => error_response(e),
    }
}

#[post("/api/admin/sweeps/not-playing")]
async fn api_admin_not_playing_sweep(state: AppState, session: Session) -> HttpResponse {
    if let Err(resp) = require_admin(&session) {
        return resp;
    }
    match state.apply_not_playing_sweep().await {
        Ok(report) => HttpResponse::Ok().json(json!({ "success": report.failures.is_empty(), "report": report })),
        Err(e) => error_response(e),
    }
}

#[post("/api/admin/players")]
async fn api_admin_add_player(state: AppState, session: Session, body: Json<AddPlayerBody>) -> HttpResponse {
    if let Err(resp) = require_admin(&session) {
        return resp;
    }
    match state
        .add_player(&body.user_id, &body.name, body.rating, body.lifetime_points)
        .await
    {
        Ok(player) => HttpResponse::Ok().json(json!({ "success": true, "player": player })),
        Err(e) => error_response(e),
    }
}

#[patch("/api/admin/players/{id}/status")]
async fn api_admin_set_status(
    state: AppState,
    session: Session,
    path: Path<PlayerPath>,
    body: Json<StatusBody>,
) -> HttpResponse {
    if let Err(resp) = require_admin(&session) {
        return resp;
    }
    match state.set_active(path.id, body.is_active).await {
        Ok(player) => HttpResponse::Ok().json(json!({ "success": true, "player": player })),
        Err(e) => error_response(e),
    }
}

#[delete("/api/admin/players/{id}")]
async fn api_admin_remove_player(state: AppState, session: Session, path: Path<PlayerPath>) -> HttpResponse {
    if let Err(resp) = require_admin(&session) {
        return resp;
    }
    match state.remove_player(path.id).await {
        Ok(player) => HttpResponse::Ok().json(json!({
            "success": true,
            "message": format!("Player {} removed", player.name),
        })),
        Err(e) => error_response(e),
    }
}

#[put("/api/admin/announcement")]
async fn api_admin_update_announcement(
    state: AppState,
    session: Session,
    body: Json<AnnouncementBody>,
) -> HttpResponse {
    let id = match require_admin(&session) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state
        .update_announcement(&body.title, &body.date, &body.content, &id.user_id)
        .await
    {
        Ok(a) => HttpResponse::Ok().json(json!({ "success": true, "announcement": a })),
        Err(e) => error_response(e),
    }
}

#[get("/api/admin/scheduler-status")]
async fn api_admin_scheduler_status(state: AppState, session: Session) -> HttpResponse {
    if let Err(resp) = require_admin(&session) {
        return resp;
    }
    HttpResponse::Ok().json(json!({ "success": true, "status": state.status().await }))
}

/// Cookie signing key from config, or a random one (sessions then end with the process).
fn session_key(configured: Option<&str>) -> Key {
    match configured {
        Some(k) if k.len() >= 64 => Key::from(k.as_bytes()),
        Some(_) => {
            warn!("SESSION_KEY shorter than 64 bytes, using a random key");
            Key::generate()
        }
        None => Key::generate(),
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = LadderConfig::from_env().map_err(|e| {
        error!("{}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e)
    })?;
    let ladder = Ladder::from_config(&config).map_err(|e| {
        error!("Failed to open store: {}", e);
        std::io::Error::new(std::io::ErrorKind::Other, e)
    })?;
    let state = Data::new(ladder);
    let admin_key = Data::new(AdminKey(config.admin_key.clone()));
    let key = session_key(config.session_key.as_deref());
    if config.admin_key.is_none() {
        warn!("ADMIN_KEY not set, admin endpoints are unreachable");
    }

    // Background task: form groups once the weekly window opens
    if config.schedule.enabled {
        let ladder_timer = state.clone();
        let period = config.schedule.check_interval;
        info!("Scheduled formation check every {}s", period.as_secs());
        actix_web::rt::spawn(async move {
            let mut interval = actix_web::rt::time::interval(period);
            loop {
                interval.tick().await;
                match ladder_timer.scheduled_form_groups().await {
                    Ok(Some(report)) => info!(
                        "Scheduled formation: {} group(s), {} player(s)",
                        report.groups_formed, report.total_players
                    ),
                    Ok(None) => {}
                    Err(LadderError::FormationInProgress) => debug!("Formation already running, skipping tick"),
                    Err(e) => error!("Scheduled formation failed: {}", e),
                }
            }
        });
    }

    let bind = (config.host.clone(), config.port);
    info!("Starting server at http://{}:{}", bind.0, bind.1);

    HttpServer::new(move || {
        App::new()
            .wrap(
                SessionMiddleware::builder(CookieSessionStore::default(), key.clone())
                    .cookie_secure(false)
                    .build(),
            )
            .app_data(state.clone())
            .app_data(admin_key.clone())
            .service(api_health)
            .service(api_open_session)
            .service(api_close_session)
            .service(api_leaderboard_csv)
            .service(api_my_status)
            .service(api_register_self)
            .service(api_set_own_status)
            .service(api_leaderboard)
            .service(api_current_groups)
            .service(api_last_groups)
            .service(api_submit_ranking)
            .service(api_announcement)
            .service(api_admin_form_groups)
            .service(api_admin_submit_ranking)
            .service(api_admin_group_rankings)
            .service(api_admin_adjust_points)
            .service(api_admin_no_show)
            .service(api_admin_no_result_sweep)
            .service(api_admin_not_playing_sweep)
            .service(api_admin_add_player)
            .service(api_admin_set_status)
            .service(api_admin_remove_player)
            .service(api_admin_update_announcement)
            .service(api_admin_scheduler_status)
    })
    .bind(bind)?
    .run()
    .await
}
