//! One keeper pass: scan every position, rebalance the ones out of policy.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use neutral_keeper_core::config_loader::DEFAULT_CONFIG_PATH;
use neutral_keeper_core::{
    AccountInfo, AppConfig, ConfigLoader, MetricDimension, Metrics, Tolerances, TxSigner,
};
use neutral_keeper_engine::{Keeper, RunParams, SignerFactory};
use neutral_keeper_terra::{AminoSigner, FeeSchedule, LcdClient, Wallet};
use rust_decimal::Decimal;

use super::metrics_sink;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Network to run against, as named under `[networks]` in the config file
    #[arg(long)]
    pub network: String,

    /// Maximum relative drift between short and long legs
    #[arg(long)]
    pub delta_tolerance: Decimal,

    /// Maximum share of position value allowed to sit idle
    #[arg(long)]
    pub balance_tolerance: Decimal,

    /// Maximum oracle quote age in seconds
    #[arg(long)]
    pub time_tolerance: u64,

    /// Queries in flight per fetch phase [default: keeper.concurrency_limit]
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Positions per transaction [default: keeper.batch_size]
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Config file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: String,
}

pub async fn run_keeper(args: RunArgs) -> Result<()> {
    let config = ConfigLoader::load_from(&args.config)?;
    let sink = metrics_sink(&config.metrics)?;

    // Anything that stops the run from here on still exports an empty schema.
    let (params, wallet) = match prepare(&config, &args) {
        Ok(ready) => ready,
        Err(e) => {
            Metrics::new()
                .flush(sink.as_ref(), &MetricDimension::network(args.network.as_str()))
                .await;
            return Err(e);
        }
    };
    tracing::info!(
        network = %params.network,
        address = %wallet.address(),
        lcd = %params.targets.lcd_url,
        "Keeper wallet loaded"
    );

    let lcd = Arc::new(LcdClient::new(
        params.targets.lcd_url.as_str(),
        config.keeper.requests_per_second,
    ));
    let chain_id = params.targets.chain_id.clone();
    let fees = FeeSchedule::from_config(&config.keeper);
    let make_signer: SignerFactory = Box::new(move |account: &AccountInfo| {
        Box::new(AminoSigner::new(wallet, chain_id, account.account_number, fees))
            as Box<dyn TxSigner>
    });

    let keeper = Keeper::new(lcd.clone(), lcd.clone(), lcd, sink);
    let summary = keeper.run(&params, make_signer).await?;

    println!(
        "{}: {} positions, {} open, {} rebalance(s) in {} batch(es), {} included",
        params.network,
        summary.positions_total,
        summary.positions_open,
        summary.actions,
        summary.dispatch.batches.len(),
        summary.dispatch.successful_batches(),
    );
    Ok(())
}

/// Resolves run parameters and the signing wallet.
fn prepare(config: &AppConfig, args: &RunArgs) -> Result<(RunParams, Wallet)> {
    config.keeper.validate()?;

    let tolerances = Tolerances {
        delta: args.delta_tolerance,
        balance: args.balance_tolerance,
        time_secs: args.time_tolerance,
    };
    let params = RunParams::from_config(
        config,
        &args.network,
        tolerances,
        args.concurrency,
        args.batch_size,
    )?;
    params.validate()?;

    let wallet = Wallet::from_env(
        &config.keeper.private_key_env,
        params.targets.keeper_address.as_str(),
    )
    .context("Failed to load keeper wallet")?;
    Ok((params, wallet))
}
