#![allow(non_snake_case)]

use super::*;
use crate::model::AllocationType;
use actix_web::{
    App,
    HttpRequest,
    HttpResponse,
    HttpServer,
    dev::ServerHandle,
    http::StatusCode as ActixStatus,
    web,
};
use std::{
    collections::HashMap,
    net::TcpListener,
    sync::{
        Arc,
        Mutex,
    },
    thread::JoinHandle,
};

#[derive(Clone, Debug)]
struct RecordedRequest {
    method: String,
    path: String,
    query: String,
    body: String,
}

#[derive(Default)]
struct CannedState {
    responses: HashMap<String, (u16, String)>,
    requests: Mutex<Vec<RecordedRequest>>,
}

/// Minimal HTTP backend answering each path with a canned body.
struct CannedBackend {
    base_url: String,
    state: Arc<CannedState>,
    server_handle: ServerHandle,
    server_thread: Option<JoinHandle<()>>,
}

impl CannedBackend {
    fn start(responses: Vec<(&str, u16, Value)>) -> Self {
        let state = Arc::new(CannedState {
            responses: responses
                .into_iter()
                .map(|(path, status, body)| (path.to_string(), (status, body.to_string())))
                .collect(),
            requests: Mutex::new(Vec::new()),
        });
        let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let data = web::Data::from(state.clone());
        let server = HttpServer::new(move || {
            App::new()
                .app_data(data.clone())
                .default_service(web::to(canned_response))
        })
        .workers(1)
        .listen(listener)
        .unwrap()
        .run();
        let server_handle = server.handle();
        let server_thread = std::thread::spawn(move || {
            let sys = actix_web::rt::System::new();
            let _ = sys.block_on(server);
        });
        Self {
            base_url,
            state,
            server_handle,
            server_thread: Some(server_thread),
        }
    }

    fn client(&self) -> BackendClient {
        BackendClient::new(&self.base_url).unwrap()
    }

    fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    fn last_body(&self) -> Value {
        let requests = self.requests();
        let last = requests.last().expect("no request recorded");
        serde_json::from_str(&last.body).unwrap()
    }
}

impl Drop for CannedBackend {
    fn drop(&mut self) {
        let _ = self.server_handle.stop(true);
        if let Some(thread) = self.server_thread.take() {
            let _ = thread.join();
        }
    }
}

async fn canned_response(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<CannedState>,
) -> HttpResponse {
    let path = req.path().to_string();
    state.requests.lock().unwrap().push(RecordedRequest {
        method: req.method().to_string(),
        path: path.clone(),
        query: req.query_string().to_string(),
        body: String::from_utf8_lossy(&body).into_owned(),
    });
    match state.responses.get(&path) {
        Some((status, body)) => HttpResponse::build(
            ActixStatus::from_u16(*status).unwrap_or(ActixStatus::INTERNAL_SERVER_ERROR),
        )
        .content_type("application/json")
        .body(body.clone()),
        None => HttpResponse::NotFound().body("no canned response"),
    }
}

fn sample_request() -> CreateCrateRequest {
    CreateCrateRequest {
        investment_amount: 0.5,
        theme: "pepe".to_string(),
        num_coins: 2,
        split_type: AllocationType::Equal,
        user_public_key: "User1111".to_string(),
        tokens: vec![
            PurchaseToken {
                mint_address: "MintA".to_string(),
                token_name: "Alpha".to_string(),
                token_image: Some("a.png".to_string()),
                buy_amount_sol: 0.25,
            },
            PurchaseToken {
                mint_address: "MintB".to_string(),
                token_name: "Beta".to_string(),
                token_image: None,
                buy_amount_sol: 0.25,
            },
        ],
    }
}

#[tokio::test]
async fn cached_tokens__sends_query_and_reads_from_cache_flag() {
    // given
    let backend = CannedBackend::start(vec![(
        "/api/game/tokens/cached",
        200,
        serde_json::json!({
            "success": true,
            "fromCache": true,
            "numCoins": 2,
            "tokens": [
                {"category": "pepe", "name": "Alpha", "address": "MintA", "image": "a.png"},
                {"category": "pepe", "name": "Beta", "address": "MintB", "image": "b.png"}
            ]
        }),
    )]);

    // when
    let cached = backend
        .client()
        .cached_tokens("User1111", "pepe", 2)
        .await
        .unwrap();

    // then
    assert!(cached.from_cache);
    assert_eq!(cached.tokens.len(), 2);
    assert_eq!(cached.tokens[1].address, "MintB");
    let requests = backend.requests();
    assert_eq!(requests[0].method, "GET");
    assert!(requests[0].query.contains("userPublicKey=User1111"));
    assert!(requests[0].query.contains("category=pepe"));
    assert!(requests[0].query.contains("numCoins=2"));
}

#[tokio::test]
async fn create_crate__posts_camel_case_body_and_reads_settlement_address() {
    // given
    let backend = CannedBackend::start(vec![(
        "/api/game/create-crate",
        200,
        serde_json::json!({
            "success": true,
            "generatedWalletPublicKey": "Settle111",
            "purchaseId": "purchase-7",
            "totalInvestmentSol": 0.5,
            "tokens": [
                {"mintAddress": "MintA", "tokenName": "Alpha", "buyAmountSol": 0.25},
                {"mintAddress": "MintB", "tokenName": "Beta", "buyAmountSol": "0.25"}
            ]
        }),
    )]);

    // when
    let created = backend
        .client()
        .create_crate(&sample_request())
        .await
        .unwrap();

    // then
    assert_eq!(created.settlement_address, "Settle111");
    assert_eq!(created.purchase_id, "purchase-7");
    assert_eq!(created.tokens[1].buy_amount_sol, 0.25);
    let body = backend.last_body();
    assert_eq!(body["investmentAmount"], 0.5);
    assert_eq!(body["splitType"], "equal");
    assert_eq!(body["numCoins"], 2);
    assert_eq!(body["tokens"][0]["mintAddress"], "MintA");
    assert_eq!(body["tokens"][0]["buyAmountSol"], 0.25);
}

#[tokio::test]
async fn create_crate__surfaces_success_false_message_verbatim() {
    // given
    let backend = CannedBackend::start(vec![(
        "/api/game/create-crate",
        200,
        serde_json::json!({"success": false, "error": "Category pool exhausted", "code": "POOL"}),
    )]);

    // when
    let err = backend
        .client()
        .create_crate(&sample_request())
        .await
        .unwrap_err();

    // then
    assert_eq!(
        err,
        BackendError::Rejected("Category pool exhausted".to_string())
    );
}

#[tokio::test]
async fn request__reports_http_status_and_body_on_non_success_status() {
    // given
    let backend = CannedBackend::start(vec![(
        "/api/game/sol-price",
        503,
        serde_json::json!({"success": false, "error": "maintenance"}),
    )]);

    // when
    let err = backend.client().sol_price().await.unwrap_err();

    // then
    match err {
        BackendError::Http { status, body } => {
            assert_eq!(status, 503);
            assert!(body.contains("maintenance"));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn request__classifies_refused_connection_as_unreachable() {
    // given
    let port = {
        let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
        listener.local_addr().unwrap().port()
    };
    let client = BackendClient::new(format!("http://127.0.0.1:{port}")).unwrap();

    // when
    let err = client.game_stats().await.unwrap_err();

    // then
    assert!(matches!(err, BackendError::Unreachable(_)));
}

#[tokio::test]
async fn user_wallet__reads_grouped_and_legacy_purchase_entries() {
    // given
    let backend = CannedBackend::start(vec![(
        "/api/game/wallet/User1111",
        200,
        serde_json::json!({
            "success": true,
            "wallet": {
                "userPublicKey": "User1111",
                "generatedWalletPublicKey": "Settle111",
                "createdAt": 1_700_000_000_000u64,
                "tokenPurchases": [
                    {
                        "purchaseId": "p-1",
                        "category": "pepe",
                        "initialInvestment": "0.523",
                        "totalInvested": 0.5,
                        "totalCurrentValue": 0.6,
                        "totalPnlValue": 0.1,
                        "totalPnlPercent": 20.0,
                        "isPositive": true,
                        "tokens": [
                            {"mintAddress": "MintA", "tokenName": "Alpha", "buyAmountSol": 0.25},
                            {"mintAddress": "MintB", "tokenName": "Beta", "buyAmountSol": 0.25}
                        ]
                    },
                    {
                        "mintAddress": "MintC",
                        "tokenName": "Gamma",
                        "buyAmountSol": 0.1,
                        "purchasedAt": 1_700_000_100_000u64
                    }
                ]
            }
        }),
    )]);

    // when
    let wallet = backend
        .client()
        .user_wallet("User1111")
        .await
        .unwrap()
        .unwrap();

    // then
    assert_eq!(wallet.settlement_address.as_deref(), Some("Settle111"));
    let grouped = &wallet.purchases[0];
    assert_eq!(grouped.purchase_id, "p-1");
    assert_eq!(grouped.initial_investment, Some(0.523));
    assert_eq!(grouped.tokens.len(), 2);
    assert!(grouped.has_pnl());
    let legacy = &wallet.purchases[1];
    assert_eq!(legacy.purchase_id, "unknown");
    assert_eq!(legacy.category, "celebrities");
    assert_eq!(legacy.tokens[0].token_name, "Gamma");
    assert!(legacy.purchased_at.is_some());
}

#[tokio::test]
async fn user_wallet__returns_none_for_unknown_user() {
    // given
    let backend = CannedBackend::start(vec![(
        "/api/game/wallet/Nobody",
        200,
        serde_json::json!({"success": true, "wallet": null}),
    )]);

    // when
    let wallet = backend.client().user_wallet("Nobody").await.unwrap();

    // then
    assert!(wallet.is_none());
}

#[tokio::test]
async fn tokens_pnl__accepts_string_encoded_amounts() {
    // given
    let backend = CannedBackend::start(vec![(
        "/api/game/tokens-pnl/p-1",
        200,
        serde_json::json!({
            "success": true,
            "purchaseId": "p-1",
            "tokens": [
                {
                    "tokenName": "Alpha",
                    "mintAddress": "MintA",
                    "invested": "0.2500",
                    "currentValue": "0.3000",
                    "pnl": "+20.00%",
                    "pnlValue": "0.0500",
                    "isPositive": true
                }
            ]
        }),
    )]);

    // when
    let rows = backend.client().tokens_pnl("p-1").await.unwrap();

    // then
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].invested, 0.25);
    assert_eq!(rows[0].current_value, 0.3);
    assert_eq!(rows[0].pnl, "+20.00%");
}

#[tokio::test]
async fn sell_crate__rehydrates_instruction_descriptor() {
    // given
    let backend = CannedBackend::start(vec![(
        "/api/game/sell-crate",
        200,
        serde_json::json!({
            "success": true,
            "transactionInstruction": {
                "programId": "11111111111111111111111111111111",
                "keys": [{"pubkey": "Settle111", "isSigner": false, "isWritable": true}],
                "data": [2, 0, 0, 0]
            },
            "accounts": {},
            "userReturn": 0.9,
            "exitFee": 0.01,
            "roi": 12.5
        }),
    )]);

    // when
    let quote = backend
        .client()
        .sell_crate(3, 0.95, "User1111")
        .await
        .unwrap();

    // then
    assert_eq!(quote.instruction.keys[0].pubkey, "Settle111");
    assert!(quote.instruction.keys[0].is_writable);
    assert_eq!(quote.instruction.data, vec![2, 0, 0, 0]);
    assert_eq!(quote.user_return, 0.9);
    let body = backend.last_body();
    assert_eq!(body["crateId"], 3);
    assert_eq!(body["expectedReturn"], 0.95);
}

#[tokio::test]
async fn confirm_crate__posts_to_crate_specific_path() {
    // given
    let backend = CannedBackend::start(vec![(
        "/api/game/confirm-crate/9",
        200,
        serde_json::json!({
            "success": true,
            "transactionInstruction": {"programId": "Prog111", "keys": [], "data": []}
        }),
    )]);

    // when
    let instruction = backend
        .client()
        .confirm_crate(9, "User1111")
        .await
        .unwrap();

    // then
    assert_eq!(instruction.program_id, "Prog111");
    assert_eq!(backend.last_body()["userPublicKey"], "User1111");
}

#[tokio::test]
async fn submit_signed_transaction__requires_signature_in_response() {
    // given
    let backend = CannedBackend::start(vec![(
        "/api/game/submit-signed-transaction",
        200,
        serde_json::json!({"success": true, "message": "queued"}),
    )]);
    let submission = SignedSubmission {
        signed_transaction: "AQID".to_string(),
        blockhash: "Hash111".to_string(),
        last_valid_block_height: 900,
        purchase_id: "p-1".to_string(),
        reroll_count: 2,
    };

    // when
    let err = backend
        .client()
        .submit_signed_transaction(&submission)
        .await
        .unwrap_err();

    // then
    assert_eq!(
        err,
        BackendError::Rejected("Failed to submit signed transaction".to_string())
    );
    let body = backend.last_body();
    assert_eq!(body["rerollCount"], 2);
    assert_eq!(body["lastValidBlockHeight"], 900);
}
