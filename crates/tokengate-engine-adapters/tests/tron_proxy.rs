use std::io::Read;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use alloy::primitives::U256;
use serde_json::Value;
use tiny_http::{Response, Server};

use tokengate_engine_adapters::{AdapterConfig, TronWebAdapter};
use tokengate_engine_core::{AccountAddress, ChainClientPort, FeeOptions, TxProbe};

const ACCOUNT: &str = "TJRabPrwbZy45sbavfcjinPJC18kjpRTv8";
const USDT: &str = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t";
const TX_ID: &str = "7c2d4206c03a883dd9066d620335dc1be272a8dc733cfa3f6d10308faa37facc";

fn spawn_node_server(info_polls: Arc<AtomicUsize>) -> String {
    let server = Server::http("127.0.0.1:0").expect("bind canned tron node");
    let base_url = format!("http://{}", server.server_addr());
    std::thread::spawn(move || {
        for mut request in server.incoming_requests() {
            let mut body = String::new();
            let _ = request.as_reader().read_to_string(&mut body);
            let payload: Value = serde_json::from_str(&body).unwrap_or_default();
            let url = request.url().to_owned();
            let result = if url.ends_with("wallet/getaccount") {
                serde_json::json!({ "balance": 12_345_678u64 })
            } else if url.ends_with("wallet/triggerconstantcontract") {
                let selector = payload["function_selector"].as_str().unwrap_or_default();
                let word = if selector == "decimals()" {
                    format!("{:064x}", 6)
                } else {
                    format!("{:064x}", 250_000_000u64)
                };
                serde_json::json!({
                    "result": { "result": true },
                    "constant_result": [word],
                })
            } else if url.ends_with("wallet/triggersmartcontract") {
                serde_json::json!({
                    "result": { "result": true },
                    "transaction": { "txID": TX_ID, "raw_data": {} },
                })
            } else if url.ends_with("wallet/broadcasttransaction") {
                serde_json::json!({ "result": true })
            } else if url.ends_with("wallet/gettransactioninfobyid") {
                if info_polls.fetch_add(1, Ordering::SeqCst) == 0 {
                    serde_json::json!({})
                } else {
                    serde_json::json!({
                        "receipt": { "result": "SUCCESS" },
                        "fee": 345_000u64,
                        "blockNumber": 68_000_123u64,
                    })
                }
            } else {
                serde_json::json!({})
            };
            let _ = request.respond(Response::from_string(result.to_string()));
        }
    });
    base_url
}

#[test]
fn trongrid_shaped_proxy_round_trips() {
    let info_polls = Arc::new(AtomicUsize::new(0));
    let base_url = spawn_node_server(info_polls.clone());
    let adapter = TronWebAdapter::with_config(AdapterConfig {
        tron_proxy_url: Some(base_url),
        tron_account: Some(ACCOUNT.to_owned()),
        ..AdapterConfig::default()
    });

    let connected = adapter.connect().expect("connect");
    assert_eq!(connected.address.as_str(), ACCOUNT);

    let balance = adapter
        .native_balance(&connected.address)
        .expect("native balance");
    assert_eq!(balance, U256::from(12_345_678u64));

    let token = AccountAddress::new(USDT);
    let decimals = adapter.call(&token, "decimals", &[]).expect("decimals");
    assert_eq!(decimals, Value::String("6".to_owned()));

    let balance_of = adapter
        .call(
            &token,
            "balanceOf",
            &[Value::String(connected.address.to_string())],
        )
        .expect("balanceOf");
    assert_eq!(balance_of, Value::String("250000000".to_owned()));

    let tx_id = adapter
        .send(
            &token,
            "approve",
            &[
                Value::String(ACCOUNT.to_owned()),
                Value::String("0".to_owned()),
            ],
            &FeeOptions::default(),
        )
        .expect("send");
    assert_eq!(tx_id, TX_ID);

    assert_eq!(
        adapter.transaction_status(&tx_id).expect("status"),
        TxProbe::Pending
    );
    assert_eq!(
        adapter.transaction_status(&tx_id).expect("status"),
        TxProbe::Confirmed {
            fee_consumed: Some(U256::from(345_000u64)),
        }
    );
}

#[test]
fn unconfigured_account_fails_the_proxy_connect() {
    let adapter = TronWebAdapter::with_config(AdapterConfig {
        tron_proxy_url: Some("http://127.0.0.1:9".to_owned()),
        tron_account: None,
        ..AdapterConfig::default()
    });
    assert!(adapter.connect().is_err());
}
