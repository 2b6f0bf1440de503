//! API Regression Tests
//!
//! In-process tests that build the Axum app via `build_router()` over a
//! seeded `MemoryGateway` and exercise every endpoint using
//! `tower::ServiceExt::oneshot()`. No binary spawn, no network port.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use chrono::NaiveDate;
use rpa_dashboard::api::{build_router, AppState};
use rpa_dashboard::auth::hash_password;
use rpa_dashboard::config::DashboardConfig;
use rpa_dashboard::gateway::{MemoryGateway, QueryGateway, Table};
use rpa_dashboard::YearMonth;
use serde_json::{json, Value};
use tower::ServiceExt;

const PASSWORD: &str = "s3cret";

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()
}

fn ym(offset: u32) -> i32 {
    YearMonth::new(2026, 10).unwrap().back(offset).to_int()
}

/// Agency A: `Factures` (time based, 2 minutes per unit) and `Relances`
/// (count based). Agency B: `Douane`. Month N-2 has no reporting row.
async fn seeded_gateway() -> Arc<MemoryGateway> {
    let g = MemoryGateway::new();
    g.seed(
        Table::AgencesV2,
        [
            json!({"CODE_AGENCE": "A", "LIBELLE_AGENCE": "Agence A"}),
            json!({"CODE_AGENCE": "B", "LIBELLE_AGENCE": "Agence B"}),
        ],
    )
    .await;
    g.seed(
        Table::BaremReporting,
        [
            json!({"AGENCE": "A", "NOM_ROBOT": "Factures", "SERVICE": "Compta",
                   "TYPE_UNITE": "temps", "TEMPS_PAR_UNITE": "2,0", "TYPE_GAIN": "temps"}),
            json!({"AGENCE": "A", "NOM_ROBOT": "Relances", "SERVICE": "Compta",
                   "TYPE_UNITE": "nombre", "TEMPS_PAR_UNITE": "0", "TYPE_GAIN": "nombre"}),
            json!({"AGENCE": "B", "NOM_ROBOT": "Douane", "SERVICE": "Exploitation",
                   "TYPE_UNITE": "nombre", "TEMPS_PAR_UNITE": "0", "TYPE_GAIN": "nombre"}),
            json!({"AGENCE": "A", "NOM_ROBOT": "TOUT"}),
        ],
    )
    .await;
    g.seed(
        Table::Services,
        [json!({"NOM_SERVICE": "Compta"}), json!({"NOM_SERVICE": "Exploitation"})],
    )
    .await;
    g.seed(
        Table::Statuts,
        [
            json!({"NUMERO": "1", "LABEL": "En attente"}),
            json!({"NUMERO": "2", "LABEL": "En cours"}),
        ],
    )
    .await;
    g.seed(
        Table::Citations,
        [json!({"ID": 1, "CITATION": "Rien ne sert de courir", "AUTEUR": "La Fontaine"})],
    )
    .await;

    let mut reporting = Vec::new();
    for offset in [0, 1, 3] {
        reporting.extend([
            json!({"AGENCE": "A", "NOM_ROBOT": "Factures", "ANNEE_MOIS": ym(offset),
                   "JOUR3": 5, "NB_UNITES_DEPUIS_DEBUT_DU_MOIS": "5"}),
            json!({"AGENCE": "A", "NOM_ROBOT": "Relances", "ANNEE_MOIS": ym(offset),
                   "JOUR3": "7", "NB_UNITES_DEPUIS_DEBUT_DU_MOIS": "7"}),
            json!({"AGENCE": "B", "NOM_ROBOT": "Douane", "ANNEE_MOIS": ym(offset),
                   "JOUR3": 100, "NB_UNITES_DEPUIS_DEBUT_DU_MOIS": "100"}),
        ]);
    }
    g.seed(Table::Reporting, reporting).await;

    g.seed(
        Table::Evolutions,
        [json!({
            "ID": 1,
            "INTITULE": "Export mensuel",
            "DESCRIPTION": "Ajouter un export CSV",
            "ROBOT": "Factures",
            "STATUT": "2",
            "NB_OPERATIONS_MENSUELLES": "",
            "TEMPS_CONSOMME": "45",
            "TYPE_DEMANDE": "evolution",
            "DATE_MAJ": "01/10/2026",
        })],
    )
    .await;

    g.add_user(1, "mdupont", &hash_password(PASSWORD, 1_000), &["TOUTES"], Some("Compta"))
        .await;
    Arc::new(g)
}

async fn test_app() -> (Router, Arc<MemoryGateway>) {
    let gateway = seeded_gateway().await;
    let dyn_gateway: Arc<dyn QueryGateway> = gateway.clone();
    let state = AppState::with_today(dyn_gateway, DashboardConfig::default(), today());
    (build_router(state), gateway)
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        req = req.header("authorization", format!("Bearer {token}"));
    }
    let req = match body {
        Some(body) => req
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

async fn login(app: &Router) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({"USER_NAME": "mdupont", "USER_PASSWORD": PASSWORD})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {body}");
    body["token"].as_str().unwrap().to_string()
}

async fn loaded(app: &Router) -> String {
    let token = login(app).await;
    let (status, body) = send(app, Method::POST, "/api/dashboard/load", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK, "load failed: {body}");
    token
}

fn day_value(view: &Value, day: usize) -> f64 {
    view["aggregate"]["chart"]["points"][day - 1]["value"]
        .as_f64()
        .unwrap()
}

// ============================================================================
// Authentication
// ============================================================================

#[tokio::test]
async fn test_login_success_returns_user_and_token() {
    let (app, _) = test_app().await;
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({"USER_NAME": "mdupont", "USER_PASSWORD": PASSWORD})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Authentication successful");
    assert_eq!(body["userData"]["userName"], "mdupont");
    assert_eq!(body["userData"]["userAgenceIds"], json!(["TOUTES"]));
    assert!(body["userData"].get("password_hash").is_none());

    let token = body["token"].as_str().unwrap();
    let (status, me) = send(&app, Method::GET, "/api/auth/me", Some(token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["userId"], "1");
}

#[tokio::test]
async fn test_login_errors() {
    let (app, _) = test_app().await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({"USER_NAME": "mdupont"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Username and password are required");

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({"USER_NAME": "mdupont", "USER_PASSWORD": "wrong"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid username or password");
}

#[tokio::test]
async fn test_login_storage_failure_is_500() {
    let (app, gateway) = test_app().await;
    gateway.fail_users("connection refused");
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({"USER_NAME": "mdupont", "USER_PASSWORD": PASSWORD})),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "An error occurred during login");
}

#[tokio::test]
async fn test_repeated_failures_lock_the_account() {
    let (app, _) = test_app().await;
    let bad = json!({"USER_NAME": "mdupont", "USER_PASSWORD": "wrong"});
    for _ in 0..5 {
        let (status, _) = send(&app, Method::POST, "/api/auth/login", None, Some(bad.clone())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
    let (status, _) = send(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({"USER_NAME": "mdupont", "USER_PASSWORD": PASSWORD})),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_protected_routes_require_session() {
    let (app, _) = test_app().await;
    let routes = [
        (Method::GET, "/api/sql?table=Services"),
        (Method::GET, "/api/auth/me"),
        (Method::GET, "/api/dashboard/view"),
        (Method::POST, "/api/dashboard/load"),
        (Method::GET, "/api/evolutions"),
    ];
    for (method, uri) in routes {
        let (status, body) = send(&app, method.clone(), uri, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{method} {uri}");
        assert!(body["error"].is_string());

        let (status, _) = send(&app, method.clone(), uri, Some("not-a-token"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{method} {uri} with bad token");
    }
}

#[tokio::test]
async fn test_logout_ends_session() {
    let (app, _) = test_app().await;
    let token = login(&app).await;
    let (status, _) = send(&app, Method::POST, "/api/auth/logout", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, Method::GET, "/api/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// ============================================================================
// Query Gateway
// ============================================================================

#[tokio::test]
async fn test_sql_rejects_unknown_table() {
    let (app, _) = test_app().await;
    let token = login(&app).await;
    for uri in ["/api/sql?table=Utilisateurs", "/api/sql?table=reporting", "/api/sql"] {
        let (status, body) = send(&app, Method::GET, uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body["error"], "Invalid or disallowed table parameter");
    }
}

#[tokio::test]
async fn test_sql_reads_with_filters() {
    let (app, _) = test_app().await;
    let token = login(&app).await;

    let (status, body) = send(&app, Method::GET, "/api/sql?table=Services", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);

    let uri = format!("/api/sql?table=Reporting&AnneeMois={}&Clef=A_Factures", ym(0));
    let (status, body) = send(&app, Method::GET, &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, body) = send(
        &app,
        Method::GET,
        "/api/sql?table=AgencesV2&agenceName=B",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["LIBELLE_AGENCE"], "Agence B");

    let (status, _) = send(
        &app,
        Method::GET,
        "/api/sql?table=Reporting&AnneeMois=2026-10",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_sql_citations_is_single_object() {
    let (app, _) = test_app().await;
    let token = login(&app).await;
    let (status, body) = send(&app, Method::GET, "/api/sql?table=Citations", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_object());
    assert_eq!(body["AUTEUR"], "La Fontaine");
}

#[tokio::test]
async fn test_sql_post_rules() {
    let (app, gateway) = test_app().await;
    let token = login(&app).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/sql",
        Some(&token),
        Some(json!({"table": "Services", "data": {"NOM_SERVICE": "X"}})),
    )
    .await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["error"], "POST operation not supported for this table");

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/sql",
        Some(&token),
        Some(json!({"table": "Evolutions"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Table and data are required for POST request");

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/sql",
        Some(&token),
        Some(json!({"table": "Secrets", "data": {}})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let before = gateway.row_count(Table::Reporting).await;
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/sql",
        Some(&token),
        Some(json!({"table": "Reporting", "data": {
            "NOM_ROBOT": "Factures", "AGENCE": "A", "DESCRIPTION": "rattrapage",
            "DATE_MAJ": "2026-10-18", "TYPE_UNITE": "temps", "ANNEE_MOIS": ym(2),
            "JOUR1": 4
        }})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert!(body["message"].as_str().unwrap().contains("inserted successfully"));
    assert_eq!(gateway.row_count(Table::Reporting).await, before + 1);
}

#[tokio::test]
async fn test_sql_database_error_is_500_with_details() {
    let (app, gateway) = test_app().await;
    let token = login(&app).await;
    gateway.fail_table(Table::Services, "relation does not exist");
    let (status, body) = send(&app, Method::GET, "/api/sql?table=Services", Some(&token), None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Database error");
    assert_eq!(body["details"], "relation does not exist");
}

// ============================================================================
// Dashboard
// ============================================================================

#[tokio::test]
async fn test_dashboard_load_defaults_to_all() {
    let (app, _) = test_app().await;
    let token = loaded(&app).await;

    let (status, view) = send(&app, Method::GET, "/api/dashboard/view", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["state"], "ready");
    assert_eq!(view["selection"]["agency"], "ALL");
    assert_eq!(view["selection"]["service"], "ALL");
    assert_eq!(view["selection"]["robot"], "ALL");
    assert_eq!(view["selection"]["month"], "N");
    assert_eq!(view["agencies"][0]["value"], "ALL");
    assert_eq!(view["agencies"].as_array().unwrap().len(), 3);
    // Sentinel robot rows never reach the robot list
    assert_eq!(view["robots"].as_array().unwrap().len(), 4);
    assert_eq!(view["months"][0]["label"], "Octobre");
    assert_eq!(view["months"][3]["label"], "Juillet");

    assert_eq!(view["aggregate"]["scope"], "all");
    assert_eq!(view["aggregate"]["chart"]["kind"], "series");
    assert_eq!(day_value(&view, 3), 117.0);
}

#[tokio::test]
async fn test_dashboard_agency_aggregate_day_three() {
    let (app, _) = test_app().await;
    let token = loaded(&app).await;

    let (status, view) = send(
        &app,
        Method::PUT,
        "/api/dashboard/selection",
        Some(&token),
        Some(json!({"agency": "A"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{view}");
    assert_eq!(day_value(&view, 3), 17.0);
    assert_eq!(day_value(&view, 1), 0.0);
    let aggregate = &view["aggregate"];
    assert_eq!(aggregate["member_count"], 2);
    assert_eq!(aggregate["chart"]["month_to_date"].as_f64().unwrap(), 17.0);
    assert_eq!(aggregate["month_totals"][0]["value"].as_f64().unwrap(), 17.0);
    assert_eq!(aggregate["month_totals"][2]["value"].as_f64().unwrap(), 0.0);
    assert_eq!(aggregate["gains"]["time"].as_f64().unwrap(), 10.0);
    assert_eq!(aggregate["gains"]["count"].as_f64().unwrap(), 7.0);
}

#[tokio::test]
async fn test_dashboard_robot_and_month_selection() {
    let (app, _) = test_app().await;
    let token = loaded(&app).await;

    let (status, view) = send(
        &app,
        Method::PUT,
        "/api/dashboard/selection",
        Some(&token),
        Some(json!({"agency": "A", "robot": "A_Factures"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{view}");
    assert_eq!(view["aggregate"]["scope"], "robot");
    assert_eq!(view["aggregate"]["detail"]["unit_factor"].as_f64().unwrap(), 2.0);
    assert_eq!(day_value(&view, 3), 10.0);
    assert_eq!(view["aggregate"]["chart"]["points"][2]["raw_units"].as_f64().unwrap(), 5.0);

    let (status, view) = send(
        &app,
        Method::PUT,
        "/api/dashboard/selection",
        Some(&token),
        Some(json!({"month": "N-2"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["selection"]["month"], "N-2");
    assert_eq!(view["aggregate"]["chart"]["kind"], "no_data");
    assert_eq!(view["no_data_message"], "Aucune donnée disponible");

    let (status, view) = send(
        &app,
        Method::PUT,
        "/api/dashboard/selection",
        Some(&token),
        Some(json!({"robot": "TOUT", "month": "bogus"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["selection"]["robot"], "ALL");
    assert_eq!(view["selection"]["month"], "N");
}

#[tokio::test]
async fn test_dashboard_rejects_unknown_robot_and_agency() {
    let (app, _) = test_app().await;
    let token = loaded(&app).await;

    let (status, _) = send(
        &app,
        Method::PUT,
        "/api/dashboard/selection",
        Some(&token),
        Some(json!({"robot": {"agency": "A", "robot": "Ghost"}})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        Method::PUT,
        "/api/dashboard/selection",
        Some(&token),
        Some(json!({"agency": "ZZZ"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, view) = send(&app, Method::GET, "/api/dashboard/view", Some(&token), None).await;
    assert_eq!(view["selection"]["agency"], "ALL");
    assert_eq!(view["selection"]["robot"], "ALL");
}

#[tokio::test]
async fn test_rejected_selection_update_changes_nothing() {
    let (app, _) = test_app().await;
    let token = loaded(&app).await;
    let (_, before) = send(&app, Method::GET, "/api/dashboard/view", Some(&token), None).await;

    // Factures belongs to agency A, so it is filtered out once B applies
    let (status, _) = send(
        &app,
        Method::PUT,
        "/api/dashboard/selection",
        Some(&token),
        Some(json!({"agency": "B", "robot": {"agency": "A", "robot": "Factures"}})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, after) = send(&app, Method::GET, "/api/dashboard/view", Some(&token), None).await;
    assert_eq!(after["selection"]["agency"], "ALL");
    assert_eq!(after, before);

    let (status, view) = send(
        &app,
        Method::PUT,
        "/api/dashboard/selection",
        Some(&token),
        Some(json!({"agency": "B", "month": "N-1"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["selection"]["agency"], "B");
    assert_eq!(view["selection"]["month"], "N-1");
}

#[tokio::test]
async fn test_dashboard_selection_before_load_conflicts() {
    let (app, _) = test_app().await;
    let token = login(&app).await;
    let (status, _) = send(
        &app,
        Method::PUT,
        "/api/dashboard/selection",
        Some(&token),
        Some(json!({"month": "N-1"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_dashboard_load_failure_then_retry() {
    let (app, gateway) = test_app().await;
    let token = login(&app).await;
    gateway.fail_month(YearMonth::new(2026, 8).unwrap(), "timeout");

    let (status, body) = send(&app, Method::POST, "/api/dashboard/load", Some(&token), None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Database error");

    let (_, view) = send(&app, Method::GET, "/api/dashboard/view", Some(&token), None).await;
    assert_eq!(view["state"], "not_authenticated");
    assert!(view["last_error"].is_string());
    assert!(view["aggregate"].is_null());

    gateway.clear_failures();
    let (status, view) = send(&app, Method::POST, "/api/dashboard/load", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["state"], "ready");
    assert!(view["last_error"].is_null());
}

#[tokio::test]
async fn test_sessions_are_isolated() {
    let (app, _) = test_app().await;
    let first = loaded(&app).await;
    let second = loaded(&app).await;

    send(
        &app,
        Method::PUT,
        "/api/dashboard/selection",
        Some(&first),
        Some(json!({"agency": "B"})),
    )
    .await;
    let (_, view) = send(&app, Method::GET, "/api/dashboard/view", Some(&second), None).await;
    assert_eq!(view["selection"]["agency"], "ALL");
}

// ============================================================================
// Evolutions, Citations, Health
// ============================================================================

#[tokio::test]
async fn test_evolution_history_and_submission() {
    let (app, _) = test_app().await;
    let token = login(&app).await;

    let (status, list) = send(&app, Method::GET, "/api/evolutions", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list[0]["status_label"], "En cours");
    assert_eq!(list[0]["gain"], "45");
    assert_eq!(list[0]["gain_kind"], "temps");
    assert_eq!(list[0]["requested_on"], "01/10/2026");

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/evolutions",
        Some(&token),
        Some(json!({"INTITULE": "  ", "ROBOT": "Factures"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/evolutions",
        Some(&token),
        Some(json!({"INTITULE": "x".repeat(51), "ROBOT": "Factures"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/evolutions",
        Some(&token),
        Some(json!({
            "INTITULE": "Nouveau robot",
            "ROBOT": "Douane",
            "NB_OPERATIONS_MENSUELLES": "300",
            "STATUT": "9",
            "TYPE_DEMANDE": "new"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "Evolution data inserted successfully");

    let (_, list) = send(&app, Method::GET, "/api/evolutions?robot=Douane", Some(&token), None).await;
    let list = list.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["status_label"], "Statut inconnu");
    assert_eq!(list[0]["gain_kind"], "autre");
    assert_eq!(list[0]["requested_on"], "18/10/2026");
    assert_eq!(list[0]["request_type"], "new");

    let (_, list) = send(&app, Method::GET, "/api/evolutions?agence=A", Some(&token), None).await;
    let robots: Vec<&str> = list
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|r| r["robot"].as_str())
        .collect();
    assert_eq!(robots, vec!["Factures"]);
}

#[tokio::test]
async fn test_evolution_edit_is_stored_as_new_row() {
    let (app, gateway) = test_app().await;
    let token = login(&app).await;

    let (_, list) = send(&app, Method::GET, "/api/evolutions?robot=Factures", Some(&token), None).await;
    let original_id = list[0]["id"].as_i64().unwrap();

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/evolutions",
        Some(&token),
        Some(json!({
            "ID": original_id,
            "INTITULE": "Export mensuel v2",
            "ROBOT": "Factures",
            "TYPE_DEMANDE": "edit"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "edit rejected: {body}");
    assert_eq!(gateway.row_count(Table::Evolutions).await, 2);

    let (_, list) = send(&app, Method::GET, "/api/evolutions?robot=Factures", Some(&token), None).await;
    let list = list.as_array().unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0]["request_type"], "edit");
    assert_eq!(list[0]["title"], "Export mensuel v2");
    assert_ne!(list[0]["id"].as_i64(), Some(original_id));

    // A non-edit that reuses an existing id hits the primary key
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/evolutions",
        Some(&token),
        Some(json!({"ID": original_id, "INTITULE": "Doublon", "ROBOT": "Factures"})),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Database error");
}

#[tokio::test]
async fn test_citations_is_public() {
    let (app, _) = test_app().await;
    let (status, body) = send(&app, Method::GET, "/api/citations", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["auteur"], "La Fontaine");
    assert_eq!(body["citation"], "Rien ne sert de courir");
}

#[tokio::test]
async fn test_citations_empty_is_null() {
    let gateway: Arc<dyn QueryGateway> = Arc::new(MemoryGateway::new());
    let app = build_router(AppState::with_today(gateway, DashboardConfig::default(), today()));
    let (status, body) = send(&app, Method::GET, "/api/citations", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_null());
}

#[tokio::test]
async fn test_health_reports_connectivity() {
    let (app, _) = test_app().await;
    let (status, body) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["db_connected"], true);
}
