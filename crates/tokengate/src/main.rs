//! Tokengate demo driver: wires the deterministic backends into the
//! workflow engine and runs a full approval (or revocation) cycle,
//! printing the engine's log stream as a terminal UI would render it.

use alloy::primitives::U256;
use eyre::{bail, WrapErr};

use tokengate_engine_adapters::{
    Eip1193Adapter, HostEnvironmentAdapter, SystemClockAdapter, TronWebAdapter,
};
use tokengate_engine_core::{
    parse_base_units, AccountAddress, ApprovalAmount, ApprovalRequest, EngineConfig, EngineEvent,
    ProviderKind, Severity, WorkflowEngine, WorkflowState,
};

const DEMO_TOKEN: &str = "0x000000000000000000000000000000000000CAFE";
const DEMO_SPENDER: &str = "0x000000000000000000000000000000000000BEEF";
const DEMO_TOKEN_TRON: &str = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t";
const DEMO_SPENDER_TRON: &str = "TN3W4H6rK2ce4vX9YnFQHwKENnHjoxb3m9";

type DemoEngine =
    WorkflowEngine<Eip1193Adapter, TronWebAdapter, HostEnvironmentAdapter, SystemClockAdapter>;

struct Options {
    revoke: bool,
    decline: bool,
    tron: bool,
    amount: ApprovalAmount,
}

fn parse_options() -> eyre::Result<Options> {
    let mut options = Options {
        revoke: false,
        decline: false,
        tron: false,
        amount: ApprovalAmount::Unlimited,
    };
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--revoke" => options.revoke = true,
            "--decline" => options.decline = true,
            "--tron" => options.tron = true,
            "--amount" => {
                let value = args
                    .next()
                    .ok_or_else(|| eyre::eyre!("--amount needs a value"))?;
                let raw = parse_base_units(&value, 6)
                    .wrap_err_with(|| format!("invalid amount: {value}"))?;
                options.amount = ApprovalAmount::Limited(raw);
            }
            "--help" | "-h" => {
                println!("usage: tokengate [--tron] [--revoke] [--decline] [--amount <decimal>]");
                std::process::exit(0);
            }
            other => bail!("unknown argument: {other}"),
        }
    }
    Ok(options)
}

fn build_engine(options: &Options) -> DemoEngine {
    let kind = if options.tron {
        ProviderKind::Tron
    } else {
        ProviderKind::Evm
    };

    let evm = Eip1193Adapter::deterministic();
    let tron = TronWebAdapter::deterministic();

    // Seed the in-memory chain so the reads have something to show.
    let chain = if options.tron {
        tron.chain_handle()
    } else {
        evm.chain_handle()
    };
    if let Some(account) = chain.first_account() {
        chain.fund_token(&account, U256::from(500_000_000u64));
        chain.fund_native(&account, U256::from(1_500_000_000_000_000_000u64));
    }
    chain.set_confirm_after_checks(3);
    chain.set_fee_per_tx(Some(if options.tron {
        U256::from(345_000u64)
    } else {
        U256::from(1_050_000_000_000_000u64)
    }));

    let host = HostEnvironmentAdapter::with_injected(kind, chain.first_account());

    let (token, spender) = if options.tron {
        (DEMO_TOKEN_TRON, DEMO_SPENDER_TRON)
    } else {
        (DEMO_TOKEN, DEMO_SPENDER)
    };
    let config = EngineConfig::for_token(AccountAddress::new(token), AccountAddress::new(spender));

    WorkflowEngine::new(evm, tron, host, SystemClockAdapter, config)
}

fn flush(engine: &mut DemoEngine) {
    for entry in engine.drain_log() {
        match entry.severity {
            Severity::Info => tracing::info!("{}", entry.message),
            Severity::Warn => tracing::warn!("{}", entry.message),
            Severity::Error => tracing::error!("{}", entry.message),
        }
    }
    for event in engine.drain_events() {
        match event {
            EngineEvent::StateChanged(t) => {
                tracing::debug!("state: {:?} -> {:?} ({})", t.from, t.to, t.reason)
            }
            EngineEvent::DeepLinkSuggested { url } => {
                tracing::info!("wallet deep link available: {url}")
            }
            EngineEvent::TransactionRecorded(tx) => tracing::info!("recorded {}", tx.tx_id),
        }
    }
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let options = parse_options()?;
    let mut engine = build_engine(&options);

    if engine.probe()?.is_none() {
        bail!("no provider detected");
    }
    engine.connect()?;
    flush(&mut engine);

    if options.revoke {
        engine.revoke()?;
    } else {
        let config = engine.config();
        let request = ApprovalRequest {
            token: config.token_contract.clone(),
            spender: config.spender.clone(),
            amount: options.amount,
        };
        engine.start(request)?;
        flush(&mut engine);
        engine.confirm(!options.decline)?;
    }
    flush(&mut engine);

    while engine.state() == WorkflowState::AwaitingOnChainConfirmation {
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        engine.tick()?;
        flush(&mut engine);
    }

    if let Some(record) = engine.last_transaction() {
        tracing::info!(
            "final transaction state: {} -> {:?}",
            record.tx_id,
            record.status
        );
    }
    Ok(())
}
