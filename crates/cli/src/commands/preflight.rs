//! Preflight validation before scheduling the keeper.
//!
//! Checks, without signing or sending anything:
//! - the network section of the config is complete
//! - the signing key loads from the environment
//! - the node answers account, position manager and oracle queries
//! - every tracked asset has a fresh oracle quote

use anyhow::Result;
use clap::Args;
use neutral_keeper_core::config_loader::DEFAULT_CONFIG_PATH;
use neutral_keeper_core::{
    AccountSource, Clock, ConfigLoader, Metrics, RetryPolicy, SystemClock,
};
use neutral_keeper_engine::{fetch_oracle_quotes, fetch_position_count, fetch_registry, FetchContext};
use neutral_keeper_terra::{LcdClient, Wallet};

#[derive(Args, Debug)]
pub struct PreflightArgs {
    /// Network to check, as named under `[networks]` in the config file
    #[arg(long)]
    pub network: String,

    /// Maximum acceptable oracle quote age in seconds
    #[arg(long, default_value_t = 300)]
    pub time_tolerance: u64,

    /// Config file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: String,
}

#[derive(Debug)]
struct CheckResult {
    name: String,
    passed: bool,
    message: String,
}

impl CheckResult {
    fn pass(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            message: message.into(),
        }
    }

    fn fail(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            message: message.into(),
        }
    }
}

pub async fn run_preflight(args: PreflightArgs) -> Result<()> {
    let config = ConfigLoader::load_from(&args.config)?;
    let mut results = Vec::new();

    let network = match config.network(&args.network) {
        Ok(network) => {
            results.push(CheckResult::pass(
                "Config",
                format!("{} ({})", args.network, network.chain_id),
            ));
            network
        }
        Err(e) => {
            results.push(CheckResult::fail("Config", e.to_string()));
            return report(&results);
        }
    };

    match Wallet::from_env(&config.keeper.private_key_env, network.keeper_address.as_str()) {
        Ok(wallet) => results.push(CheckResult::pass("Wallet", wallet.address())),
        Err(e) => results.push(CheckResult::fail("Wallet", e.to_string())),
    }

    let lcd = LcdClient::new(network.lcd_url.as_str(), config.keeper.requests_per_second);
    let clock = SystemClock;
    let metrics = Metrics::new();
    let ctx = FetchContext {
        ledger: &lcd,
        clock: &clock,
        metrics: &metrics,
        retry: RetryPolicy::from_config(&config.keeper),
        concurrency_limit: config.keeper.concurrency_limit,
    };

    match lcd.account(&network.keeper_address).await {
        Ok(account) => results.push(CheckResult::pass(
            "Account",
            format!("number {}, sequence {}", account.account_number, account.sequence),
        )),
        Err(e) => results.push(CheckResult::fail("Account", e.to_string())),
    }

    match fetch_position_count(ctx, &network.position_manager).await {
        Ok(count) => results.push(CheckResult::pass("Positions", format!("{count} ids"))),
        Err(e) => results.push(CheckResult::fail("Positions", e.to_string())),
    }

    match fetch_registry(ctx, &network.position_manager).await {
        Ok(registry) => results.push(CheckResult::pass(
            "Registry",
            format!("position code id {}", registry.position_code_id),
        )),
        Err(e) => results.push(CheckResult::fail("Registry", e.to_string())),
    }

    let quotes = fetch_oracle_quotes(ctx, &network.oracle, &network.tracked_assets).await;
    let now = clock.now();
    for asset in &network.tracked_assets {
        let name = format!("Oracle {}", asset.label);
        match quotes.get(&asset.address) {
            Some(quote) if quote.is_stale(now, args.time_tolerance) => results.push(
                CheckResult::fail(name, format!("stale, last updated {}", quote.last_updated_at)),
            ),
            Some(quote) => results.push(CheckResult::pass(
                name,
                format!("last updated {}", quote.last_updated_at),
            )),
            None => results.push(CheckResult::fail(name, "no quote")),
        }
    }

    report(&results)
}

fn report(results: &[CheckResult]) -> Result<()> {
    println!();
    for result in results {
        let mark = if result.passed { "✓" } else { "✗" };
        println!("  {mark} {:<20} {}", result.name, result.message);
    }
    println!();

    let failed = results.iter().filter(|r| !r.passed).count();
    if failed > 0 {
        anyhow::bail!("{failed} of {} preflight checks failed", results.len());
    }
    println!("All {} preflight checks passed", results.len());
    Ok(())
}
