//! KYNDA wallet CLI
//!
//! Runs scripted wallet sessions against the in-memory simulated wallets and
//! prints the presentation snapshot after each step.

use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use ethers_core::types::U256;
use rust_decimal::Decimal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kynda_wallet::account::format_address;
use kynda_wallet::network::CAMP_TESTNET_CHAIN_ID;
use kynda_wallet::provider::simulated::{
    RecordingLauncher, SimulatedEvmWallet, SimulatedPhantom, DEFAULT_EVM_ACCOUNT, DEFAULT_SOLANA_ACCOUNT,
};
use kynda_wallet::provider::{InjectedProviders, RpcError};
use kynda_wallet::{CurrencyConverter, ProviderId, WalletConfig, WalletService};

#[derive(Parser)]
#[command(name = "kynda-cli")]
#[command(about = "KYNDA wallet linking core, driven against simulated wallets")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List providers detected in the simulated environment
    Providers {
        #[command(flatten)]
        wallet: WalletArgs,
    },
    /// Link a wallet and bring it onto the required network
    Connect {
        #[command(flatten)]
        wallet: WalletArgs,
    },
    /// Link a wallet, refresh its balance and pay
    Pay {
        #[command(flatten)]
        wallet: WalletArgs,

        /// Recipient address
        #[arg(long)]
        to: String,

        /// Amount in display currency
        #[arg(long)]
        amount: Decimal,

        /// Decline the payment prompt
        #[arg(long)]
        reject_payment: bool,
    },
    /// Connect, pay, switch accounts, drift off network and disconnect
    Demo {
        #[command(flatten)]
        wallet: WalletArgs,
    },
}

#[derive(Args, Clone)]
struct WalletArgs {
    /// Wallet to link
    #[arg(long, default_value = "metamask")]
    provider: ProviderId,

    /// The wallet does not know the required network yet
    #[arg(long)]
    unregistered: bool,

    /// The wallet is not installed
    #[arg(long)]
    missing: bool,

    /// Decline the account request
    #[arg(long)]
    reject_connect: bool,

    /// Starting balance in whole native coins
    #[arg(long, default_value = "1")]
    balance: Decimal,
}

/// Simulated browser environment plus the service wired on top of it
struct Session {
    service: WalletService,
    evm: Arc<SimulatedEvmWallet>,
    launcher: Arc<RecordingLauncher>,
}

impl Session {
    fn new(config: WalletConfig, args: &WalletArgs) -> anyhow::Result<Self> {
        let decimals = config.network.decimals();
        let native_balance = CurrencyConverter::new(Decimal::ONE, decimals)?.to_native(args.balance)?;

        let mut evm = SimulatedEvmWallet::new().with_balance(DEFAULT_EVM_ACCOUNT, native_balance);
        if !args.unregistered {
            evm = evm.with_known_chain(CAMP_TESTNET_CHAIN_ID);
        }
        let evm = Arc::new(evm);

        let lamports = if native_balance > U256::from(u64::MAX) {
            u64::MAX
        } else {
            native_balance.low_u64()
        };
        let phantom = Arc::new(SimulatedPhantom::new().with_balance(DEFAULT_SOLANA_ACCOUNT, lamports));

        if args.reject_connect {
            match args.provider {
                ProviderId::Phantom => phantom.fail_next("connect", RpcError::user_rejected()),
                _ => evm.fail_next("eth_requestAccounts", RpcError::user_rejected()),
            }
        }

        let mut injected = InjectedProviders::new();
        if !args.missing {
            injected = match args.provider {
                ProviderId::MetaMask => injected.with_ethereum(evm.clone()),
                ProviderId::Binance => injected.with_binance_chain(evm.clone()),
                ProviderId::Phantom => injected.with_solana(phantom),
            };
        }

        let launcher = Arc::new(RecordingLauncher::new());
        let service = WalletService::new(config, injected, launcher.clone())?;
        service.select_provider(args.provider);

        Ok(Self {
            service,
            evm,
            launcher,
        })
    }

    fn print(&self, step: &str) -> anyhow::Result<()> {
        println!("== {}", step);
        println!("{}", serde_json::to_string_pretty(&self.service.snapshot())?);
        Ok(())
    }

    async fn connect(&self) -> anyhow::Result<bool> {
        let connected = match self.service.connect().await {
            Ok(state) => {
                info!(status = ?state.status, "connect finished");
                true
            }
            Err(e) if e.is_reentrancy() => {
                info!(error = %e, "connect already running");
                false
            }
            Err(e) => {
                warn!(error = %e, "connect failed");
                false
            }
        };
        for (provider, url) in self.launcher.opened() {
            println!("install page requested for {}: {}", provider, url);
        }
        if let Some(account) = self.service.snapshot().connection.account {
            println!("linked account: {}", format_address(&account));
        }
        self.print("connect")?;
        Ok(connected)
    }

    async fn pay(&self, to: &str, amount: Decimal) -> anyhow::Result<()> {
        if let Err(e) = self.service.refresh_balance().await {
            warn!(error = %e, "balance refresh failed");
        }
        match self.service.pay(to, amount).await {
            Ok(entry) => {
                let hash = entry.tx_hash.as_deref().unwrap_or_default();
                info!(id = %entry.id, hash, "payment submitted");
                if let Some(url) = self.service.explorer_url(hash) {
                    println!("explorer: {}", url);
                }
            }
            Err(e) => warn!(error = %e, "payment failed"),
        }
        self.print("pay")
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = WalletConfig::from_env()?;

    match cli.command {
        Commands::Providers { wallet } => {
            let session = Session::new(config, &wallet)?;
            for provider in session.service.available_providers() {
                println!("{} ({:?})", provider, provider.family());
            }
        }
        Commands::Connect { wallet } => {
            let session = Session::new(config, &wallet)?;
            session.connect().await?;
        }
        Commands::Pay {
            wallet,
            to,
            amount,
            reject_payment,
        } => {
            let session = Session::new(config, &wallet)?;
            if reject_payment {
                session.evm.fail_next("eth_sendTransaction", RpcError::user_rejected());
            }
            if session.connect().await? {
                session.pay(&to, amount).await?;
            }
        }
        Commands::Demo { wallet } => run_demo(config, wallet).await?,
    }

    Ok(())
}

async fn run_demo(config: WalletConfig, wallet: WalletArgs) -> anyhow::Result<()> {
    let session = Session::new(config, &wallet)?;
    if !session.connect().await? {
        return Ok(());
    }
    session.pay("0xabc", Decimal::from(100)).await?;

    if wallet.provider != ProviderId::Phantom {
        let other = "0x8ba1f109551bD432803012645Ac136ddd64DBA72";
        session.evm.emit_accounts_changed(&[other]);
        session.service.process_events().await;
        session.print("accounts changed")?;

        session.evm.emit_chain_changed(1);
        session.service.process_events().await;
        session.print("chain changed")?;

        if let Err(e) = session.service.controller().ensure_network().await {
            warn!(error = %e, "network switch failed");
        }
        session.print("network restored")?;

        let sent = session.evm.sent_transfers();
        info!(transfers = sent.len(), balance = %session.evm.balance_of(DEFAULT_EVM_ACCOUNT), "wallet totals");
    }

    session.service.disconnect().await;
    session.print("disconnect")
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
