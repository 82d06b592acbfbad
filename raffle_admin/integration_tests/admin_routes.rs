use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use raffle_admin_logic::config::AdminConfig;
use raffle_admin_logic::metadata::{MemoryMetaStore, MetaBackend};
use raffle_admin_server::{router, AppState};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

const USDT: &str = "0x48065fbbe25f71c9282ddf5e1cd6d6a887483d5e";
const WINNER: &str = "0x00000000000000000000000000000000000000b0";

fn app(config: AdminConfig) -> Router {
    router(Arc::new(AppState::from_config(config)))
}

fn app_with_memory_store() -> Router {
    let state = AppState::from_config(AdminConfig::default())
        .with_meta_store(MetaBackend::Memory(MemoryMetaStore::default()));
    router(Arc::new(state))
}

/// Config with a chain endpoint nobody listens on: enough for the routes
/// that reject a request before sending anything.
fn unreachable_chain() -> AdminConfig {
    AdminConfig {
        rpc_url: Some("http://127.0.0.1:9".into()),
        signer_rpc_url: Some("http://127.0.0.1:9".into()),
        operator: Some(Default::default()),
        ..Default::default()
    }
}

async fn send_raw(
    app: Router,
    method: Method,
    uri: &str,
    body: String,
) -> TestResult<(StatusCode, Value)> {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body))?;
    let response = app.oneshot(request).await?;
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok((status, body))
}

async fn post_json(app: Router, uri: &str, body: Value) -> TestResult<(StatusCode, Value)> {
    send_raw(app, Method::POST, uri, body.to_string()).await
}

async fn get(app: Router, uri: &str) -> TestResult<(StatusCode, Value)> {
    let request = Request::builder().uri(uri).body(Body::empty())?;
    let response = app.oneshot(request).await?;
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    Ok((status, serde_json::from_slice(&bytes)?))
}

/// Serves `reply` as a GraphQL endpoint on a free local port, counting the queries
async fn spawn_subgraph(
    hits: Arc<AtomicUsize>,
    reply: fn(&Value) -> Value,
) -> TestResult<String> {
    let subgraph = Router::new().route(
        "/",
        post(move |Json(body): Json<Value>| async move {
            hits.fetch_add(1, Ordering::SeqCst);
            Json(reply(&body))
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move { axum::serve(listener, subgraph).await });
    Ok(format!("http://{addr}"))
}

/// Bot API stand-in answering `status` to every `sendMessage`, keeping the bodies it got
async fn spawn_telegram(
    status: StatusCode,
    sent: Arc<Mutex<Vec<Value>>>,
) -> TestResult<String> {
    let bot = Router::new().route(
        "/bottoken/sendMessage",
        post(move |Json(body): Json<Value>| async move {
            sent.lock().unwrap().push(body);
            (status, Json(json!({ "ok": status.is_success() })))
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move { axum::serve(listener, bot).await });
    Ok(format!("http://{addr}"))
}

fn telegram_config(api_url: String) -> AdminConfig {
    AdminConfig {
        telegram_bot_token: Some("token".into()),
        telegram_chat_id: Some("-100".into()),
        telegram_api_url: api_url,
        ..Default::default()
    }
}

fn healthy_subgraph(body: &Value) -> Value {
    let query = body["query"].as_str().unwrap_or_default();
    if query.contains("participantJoineds") {
        if body["variables"]["cursor"].is_string() {
            return json!({ "data": { "participantJoineds": [] } });
        }
        return json!({ "data": { "participantJoineds": [
            { "id": "0x02", "roundId": "1", "tickets": "7" }
        ] } });
    }
    if query.contains("PastRaffles") {
        return json!({ "data": {
            "roundCreateds": [{
                "roundId": "1", "startTime": "100", "endTime": "1000",
                "rewardToken": USDT, "rewardPool": "5000000",
                "maxTickets": "10", "roundType": 0
            }],
            "winnerSelecteds": [{
                "roundId": "1", "winner": WINNER, "reward": "5000000", "blockTimestamp": "1200"
            }],
            "multiWinnersSelecteds": []
        } });
    }
    json!({ "data": {
        "roundCreateds": [
            { "roundId": "2", "startTime": "100", "endTime": "4102444800", "maxTickets": "100", "roundType": 1 },
            { "roundId": "1", "startTime": "100", "endTime": "1000", "maxTickets": "10", "roundType": 0 }
        ],
        "winnerSelecteds": [],
        "multiWinnersSelecteds": [],
        "raffleCloseds": [],
        "randomnessRequesteds": [{ "roundId": "1" }]
    } })
}

fn failing_subgraph(_: &Value) -> Value {
    json!({ "errors": [{ "message": "indexer unavailable" }] })
}

fn round<'a>(rounds: &'a Value, id: u64) -> &'a Value {
    rounds
        .as_array()
        .and_then(|r| r.iter().find(|r| r["id"] == id))
        .unwrap_or(&Value::Null)
}

#[tokio::test]
async fn meta_requires_round_id_and_kind() -> TestResult {
    let _ = env_logger::try_init();

    let meta = "/api/admin/raffles/meta";
    let (status, body) = post_json(app(AdminConfig::default()), meta, json!({ "roundId": 3 })).await?;
    assert_eq!(StatusCode::BAD_REQUEST, status);
    assert_eq!(json!({ "error": "roundId and kind are required" }), body);

    let (status, body) = post_json(app(AdminConfig::default()), meta, json!({ "kind": "cash" })).await?;
    assert_eq!(StatusCode::BAD_REQUEST, status);
    assert_eq!(json!({ "error": "roundId is required" }), body);

    let (status, body) =
        send_raw(app(AdminConfig::default()), Method::POST, meta, "{not json".into()).await?;
    assert_eq!(StatusCode::BAD_REQUEST, status);
    assert_eq!(json!({ "error": "Invalid request" }), body);
    Ok(())
}

#[tokio::test]
async fn meta_without_store_is_a_server_error() -> TestResult {
    let (status, body) = post_json(
        app(AdminConfig::default()),
        "/api/admin/raffles/meta",
        json!({ "roundId": 3, "kind": "cash" }),
    )
    .await?;
    assert_eq!(StatusCode::INTERNAL_SERVER_ERROR, status);
    assert_eq!(json!({ "error": "metadata store is not configured" }), body);
    Ok(())
}

#[tokio::test]
async fn meta_upsert_overwrites_the_record() -> TestResult {
    let app = app_with_memory_store();

    let first = json!({
        "roundId": "8",
        "kind": "cash",
        "cardTitle": "Weekly USDT",
        "description": "500 USDT split between three",
        "winners": 3
    });
    let (status, body) = post_json(app.clone(), "/api/admin/raffles/meta", first).await?;
    assert_eq!(StatusCode::OK, status);
    assert_eq!(json!({ "ok": true }), body);

    let second = json!({ "roundId": 8, "kind": "physical", "prizeTitle": "Phone" });
    post_json(app.clone(), "/api/admin/raffles/meta", second).await?;

    let (status, body) = get(app.clone(), "/api/admin/raffles/meta/8").await?;
    assert_eq!(StatusCode::OK, status);
    assert_eq!(
        json!({
            "roundId": 8,
            "kind": "physical",
            "cardTitle": null,
            "description": null,
            "cardImageUrl": null,
            "prizeTitle": "Phone",
            "winners": null
        }),
        body
    );

    let (status, _) = get(app, "/api/admin/raffles/meta/9").await?;
    assert_eq!(StatusCode::NOT_FOUND, status);
    Ok(())
}

#[tokio::test]
async fn raffle_started_checks_telegram_settings_first() -> TestResult {
    let (status, body) = send_raw(
        app(AdminConfig::default()),
        Method::POST,
        "/api/admin/raffle-started",
        "garbage".into(),
    )
    .await?;
    assert_eq!(StatusCode::INTERNAL_SERVER_ERROR, status);
    assert_eq!(json!({ "error": "Telegram env vars not configured" }), body);
    Ok(())
}

#[tokio::test]
async fn raffle_started_rejects_bad_bodies() -> TestResult {
    let config = AdminConfig {
        telegram_bot_token: Some("token".into()),
        telegram_chat_id: Some("-100".into()),
        ..Default::default()
    };

    let uri = "/api/admin/raffle-started";
    let (status, body) = send_raw(app(config.clone()), Method::POST, uri, "garbage".into()).await?;
    assert_eq!(StatusCode::BAD_REQUEST, status);
    assert_eq!(json!({ "error": "Invalid request" }), body);

    let (status, body) = post_json(app(config), uri, json!({ "raffleType": 1 })).await?;
    assert_eq!(StatusCode::BAD_REQUEST, status);
    assert_eq!(json!({ "error": "roundId is required" }), body);
    Ok(())
}

#[tokio::test]
async fn raffle_started_posts_the_announcement() -> TestResult {
    let _ = env_logger::try_init();
    let sent = Arc::new(Mutex::new(Vec::new()));
    let api = spawn_telegram(StatusCode::OK, sent.clone()).await?;

    let (status, body) = post_json(
        app(telegram_config(api)),
        "/api/admin/raffle-started",
        json!({ "roundId": 42, "raffleType": 0, "tokenSymbol": "USDT", "rewardHuman": "250" }),
    )
    .await?;
    assert_eq!(StatusCode::OK, status);
    assert_eq!(json!({ "ok": true }), body);

    let sent = sent.lock().unwrap();
    assert_eq!(1, sent.len());
    assert_eq!("-100", sent[0]["chat_id"]);
    assert_eq!("Markdown", sent[0]["parse_mode"]);
    assert_eq!(true, sent[0]["disable_web_page_preview"]);
    let text = sent[0]["text"].as_str().unwrap_or_default();
    assert!(text.contains("*#42*"), "{text}");
    assert!(text.contains("*250 USDT*"), "{text}");
    Ok(())
}

#[tokio::test]
async fn raffle_started_reports_a_rejected_message() -> TestResult {
    let sent = Arc::new(Mutex::new(Vec::new()));
    let api = spawn_telegram(StatusCode::FORBIDDEN, sent.clone()).await?;

    let (status, body) = post_json(
        app(telegram_config(api)),
        "/api/admin/raffle-started",
        json!({ "roundId": "7" }),
    )
    .await?;
    assert_eq!(StatusCode::INTERNAL_SERVER_ERROR, status);
    assert_eq!(
        json!({ "error": "Failed to send Telegram message", "status": 403 }),
        body
    );
    assert_eq!(1, sent.lock().unwrap().len());
    Ok(())
}

#[tokio::test]
async fn reads_fail_without_their_backend() -> TestResult {
    for uri in [
        "/api/admin/past-raffles",
        "/api/admin/rounds",
        "/api/admin/rounds/drawable",
        "/api/admin/rounds/count",
        "/api/admin/prize-nft",
        "/api/admin/rounds/1/winners",
    ] {
        let (status, body) = get(app(AdminConfig::default()), uri).await?;
        assert_eq!(StatusCode::INTERNAL_SERVER_ERROR, status, "{uri}");
        assert!(body["error"].is_string(), "{uri}");
    }
    Ok(())
}

#[tokio::test]
async fn past_raffles_from_the_subgraph() -> TestResult {
    let hits = Arc::new(AtomicUsize::new(0));
    let url = spawn_subgraph(hits.clone(), healthy_subgraph).await?;
    let config = AdminConfig {
        subgraph_url: Some(url),
        ..Default::default()
    };

    let (status, body) = get(app(config), "/api/admin/past-raffles").await?;
    assert_eq!(StatusCode::OK, status);

    let raffles = body["raffles"].as_array().cloned().unwrap_or_default();
    assert_eq!(1, raffles.len());
    let raffle = &raffles[0];
    assert_eq!(json!(1), raffle["roundId"]);
    assert_eq!(json!(WINNER), raffle["winner"]);
    assert_eq!(json!(7), raffle["totalTickets"]);
    // no chain reader configured, token metadata falls back to the placeholder
    assert_eq!(json!("???"), raffle["symbol"]);
    Ok(())
}

#[tokio::test]
async fn past_raffles_subgraph_error_is_a_bad_gateway() -> TestResult {
    let url = spawn_subgraph(Arc::new(AtomicUsize::new(0)), failing_subgraph).await?;
    let config = AdminConfig {
        subgraph_url: Some(url),
        ..Default::default()
    };

    let (status, body) = get(app(config), "/api/admin/past-raffles").await?;
    assert_eq!(StatusCode::BAD_GATEWAY, status);
    assert_eq!(json!("Subgraph error"), body["error"]);
    Ok(())
}

#[tokio::test]
async fn drawable_rounds_are_cached_until_refreshed() -> TestResult {
    let hits = Arc::new(AtomicUsize::new(0));
    let url = spawn_subgraph(hits.clone(), healthy_subgraph).await?;
    let app = app(AdminConfig {
        subgraph_url: Some(url),
        ..Default::default()
    });

    let (status, body) = get(app.clone(), "/api/admin/rounds/drawable").await?;
    assert_eq!(StatusCode::OK, status);
    let ended = round(&body["rounds"], 1);
    assert_eq!(json!(true), ended["canDraw"]);
    assert_eq!(json!(false), ended["canClose"]);
    assert_eq!(json!(7), ended["totalTickets"]);
    assert_eq!(json!("subgraph"), ended["source"]);
    let running = round(&body["rounds"], 2);
    assert_eq!(json!(false), running["canDraw"]);
    assert_eq!(json!(false), running["ended"]);

    // events, first join page, empty second join page
    let after_first = hits.load(Ordering::SeqCst);
    assert_eq!(3, after_first);

    get(app.clone(), "/api/admin/rounds/drawable").await?;
    assert_eq!(after_first, hits.load(Ordering::SeqCst));

    get(app, "/api/admin/rounds/drawable?refresh=true").await?;
    assert_eq!(2 * after_first, hits.load(Ordering::SeqCst));
    Ok(())
}

#[tokio::test]
async fn admin_rounds_list_every_round() -> TestResult {
    let url = spawn_subgraph(Arc::new(AtomicUsize::new(0)), healthy_subgraph).await?;
    let config = AdminConfig {
        subgraph_url: Some(url),
        ..Default::default()
    };

    let (status, body) = get(app(config), "/api/admin/rounds").await?;
    assert_eq!(StatusCode::OK, status);
    assert_eq!(json!(2), body["rounds"][0]["id"]);
    assert_eq!(json!(true), body["rounds"][0]["active"]);
    assert_eq!(json!(1), body["rounds"][1]["id"]);
    assert_eq!(json!("Ended"), body["rounds"][1]["endsLabel"]);
    assert_eq!(json!(1), body["rounds"][1]["participantEvents"]);
    Ok(())
}

#[tokio::test]
async fn create_round_is_validated_before_any_transaction() -> TestResult {
    let (status, body) = post_json(
        app(unreachable_chain()),
        "/api/admin/rounds",
        json!({ "raffleType": 0, "token": "USDT", "reward": "0" }),
    )
    .await?;
    assert_eq!(StatusCode::BAD_REQUEST, status);
    assert_eq!(
        json!({ "error": "Reward must be greater than 0 (unless Physical)." }),
        body
    );

    let (status, _) = post_json(
        app(unreachable_chain()),
        "/api/admin/rounds",
        json!({ "raffleType": 7, "reward": "5" }),
    )
    .await?;
    assert_eq!(StatusCode::BAD_REQUEST, status);

    let (status, _) = post_json(
        app(unreachable_chain()),
        "/api/admin/rounds",
        json!({ "raffleType": 0, "token": "USDT", "reward": "5", "durationDays": 300_000_000_000_000u64 }),
    )
    .await?;
    assert_eq!(StatusCode::BAD_REQUEST, status);

    let (status, body) = post_json(
        app(AdminConfig::default()),
        "/api/admin/rounds",
        json!({ "raffleType": 0, "token": "USDT", "reward": "5" }),
    )
    .await?;
    assert_eq!(StatusCode::INTERNAL_SERVER_ERROR, status);
    assert_eq!(json!({ "error": "rpc url is not configured" }), body);
    Ok(())
}

#[tokio::test]
async fn randomness_fee_must_be_an_integer_amount() -> TestResult {
    let (status, body) = post_json(
        app(unreachable_chain()),
        "/api/admin/rounds/4/randomness",
        json!({ "feeWei": "0.5" }),
    )
    .await?;
    assert_eq!(StatusCode::BAD_REQUEST, status);
    assert_eq!(json!({ "error": "invalid amount: 0.5" }), body);
    Ok(())
}
