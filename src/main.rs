//! AUTOTRADER — daily equity auto-trader for the KIS brokerage API.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! discovers brokerage accounts, restores today's scalp positions and runs
//! the fixed-time scheduler with graceful shutdown. A few one-shot
//! subcommands (quote, manual buy/sell, run the daily job now) reuse the
//! same wiring.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info, warn};

use autotrader::accounts::{masked, AccountRegistry};
use autotrader::analysis::{HoldAnalyst, NoContext};
use autotrader::broker::registry::SessionRegistry;
use autotrader::broker::transport::ReqwestTransport;
use autotrader::broker::Brokerage;
use autotrader::clock::{Clock, SystemClock};
use autotrader::config::AppConfig;
use autotrader::dashboard::{self, AppState, DashboardState};
use autotrader::engine::daily::DailyJob;
use autotrader::engine::positions::PositionBook;
use autotrader::engine::scalper::{ScalpEngine, ScalpSettings, ScanOutcome};
use autotrader::engine::schedule::{Job, Schedule};
use autotrader::notify::{ApprovalDesk, LogNotifier, Notification, Notifier, WebhookNotifier};
use autotrader::storage::PositionStore;
use autotrader::types::{Mode, OrderSide};

const BANNER: &str = r#"
    _         _        _____              _
   / \  _   _| |_ ___ |_   _| __ __ _  __| | ___ _ __
  / _ \| | | | __/ _ \  | || '__/ _` |/ _` |/ _ \ '__|
 / ___ \ |_| | || (_) | | || | | (_| | (_| |  __/ |
/_/   \_\__,_|\__\___/  |_||_|  \__,_|\__,_|\___|_|

  v0.1.0 — KIS daily trader + momentum scalper
"#;

/// Daily equity auto-trader.
#[derive(Parser)]
#[command(name = "autotrader")]
#[command(about = "Daily equity auto-trader with approval-gated momentum scalping", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Override trading mode (real | paper)
    #[arg(short, long)]
    mode: Option<String>,

    /// Real account number to trade (overrides trading.real_account)
    #[arg(short, long)]
    account: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler (default)
    Run,

    /// Run the daily job once and exit
    RunNow,

    /// Print a domestic quote
    Price {
        /// Six-digit instrument code
        code: String,
    },

    /// Place a market buy
    Buy {
        code: String,
        #[arg(short, long, default_value_t = 1)]
        qty: u64,
    },

    /// Place a market sell
    Sell {
        code: String,
        #[arg(short, long, default_value_t = 1)]
        qty: u64,
    },

    /// List discovered brokerage profiles
    Accounts,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();
    let cli = Cli::parse();

    let mut cfg = AppConfig::load(&cli.config)?;
    if let Some(mode) = &cli.mode {
        cfg.trading.mode = mode.parse()?;
    }
    if cli.account.is_some() {
        cfg.trading.real_account = cli.account.clone();
    }

    init_logging();

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let accounts = AccountRegistry::from_env(&cfg.broker.real_base_url, &cfg.broker.paper_base_url);
    let transport = Arc::new(ReqwestTransport::new(Duration::from_secs(cfg.broker.request_timeout_secs))?);
    let sessions = SessionRegistry::new(accounts, transport, clock.clone(), cfg.trading.data_dir.clone());

    if let Some(number) = &cfg.trading.real_account {
        if !sessions.select_real_account(number) {
            bail!("Configured real account {} was not discovered", masked(number));
        }
    }

    if let Some(Commands::Accounts) = cli.command {
        print_accounts(sessions.accounts());
        return Ok(());
    }

    let client = sessions
        .client(cfg.trading.mode, None)
        .with_context(|| format!("No {} brokerage profile available", cfg.trading.mode))?;
    let account = masked(client.account_number());
    let broker: Arc<dyn Brokerage> = client;

    let notifier: Arc<dyn Notifier> = match cfg.webhook_url() {
        Some(url) => Arc::new(WebhookNotifier::new(url)?),
        None => {
            warn!("No webhook configured — notifications go to the log only");
            Arc::new(LogNotifier)
        }
    };

    let halted = Arc::new(AtomicBool::new(false));
    let daily = Arc::new(DailyJob::new(
        broker.clone(),
        Arc::new(NoContext),
        Arc::new(HoldAnalyst),
        notifier.clone(),
        clock.clone(),
        cfg.risk.clone(),
        halted.clone(),
    ));

    match cli.command {
        Some(Commands::RunNow) => {
            info!("Running daily job immediately");
            daily.run().await?;
            return Ok(());
        }
        Some(Commands::Price { code }) => {
            let quote = broker.get_quote(&code).await?;
            println!("{code}: {} ({:+} / {:+}%)", quote.price, quote.change_amount, quote.change_rate);
            return Ok(());
        }
        Some(Commands::Buy { code, qty }) => {
            let receipt = broker.place_order(OrderSide::Buy, &code, qty, Decimal::ZERO).await?;
            println!("Buy {code} x{qty} sent, order {}", receipt.order_id);
            return Ok(());
        }
        Some(Commands::Sell { code, qty }) => {
            let receipt = broker.place_order(OrderSide::Sell, &code, qty, Decimal::ZERO).await?;
            println!("Sell {code} x{qty} sent, order {}", receipt.order_id);
            return Ok(());
        }
        Some(Commands::Accounts) | Some(Commands::Run) | None => {}
    }

    println!("{BANNER}");
    info!(
        mode = %cfg.trading.mode,
        account = %account,
        scalp = cfg.scalp.enabled,
        "AUTOTRADER starting up"
    );

    // -- Restore state -----------------------------------------------------

    let book = Arc::new(PositionBook::restore(
        PositionStore::new(&cfg.trading.data_dir),
        clock.today(),
    ));
    if !book.is_empty().await {
        info!(count = book.len().await, "Resumed today's scalp positions");
    }

    let approvals = Arc::new(ApprovalDesk::new(notifier.clone(), clock.clone()));
    let scalper = Arc::new(ScalpEngine::new(
        broker.clone(),
        book.clone(),
        notifier.clone(),
        approvals.clone(),
        clock.clone(),
        ScalpSettings::from_config(&cfg.scalp, &cfg.risk),
    ));

    let dashboard_token = cfg.dashboard_token();
    if cfg.dashboard.enabled && dashboard_token.is_none() {
        warn!("No dashboard token configured, approval and halt routes are locked");
    }
    let dashboard_state: AppState = Arc::new(
        DashboardState::new(
            cfg.trading.mode,
            clock.now(),
            halted.clone(),
            book.clone(),
            approvals.clone(),
        )
        .with_control_token(dashboard_token),
    );
    if cfg.dashboard.enabled {
        dashboard::spawn_dashboard(dashboard_state.clone(), &cfg.dashboard.bind, cfg.dashboard.port)
            .await?;
    }

    notifier
        .notify(Notification::SystemStart {
            mode: cfg.trading.mode,
            at: clock.now(),
        })
        .await;

    // -- Main loop -------------------------------------------------------

    let jobs = Arc::new(Jobs {
        daily,
        scalper,
        notifier,
        dashboard: dashboard_state,
        halted,
        running: Mutex::new(HashSet::new()),
    });
    let mut schedule = Schedule::new(&cfg.schedule, &cfg.scalp);
    let mut interval = tokio::time::interval(Duration::from_secs(cfg.schedule.tick_secs.max(1)));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        daily_at = %cfg.schedule.daily_job_at,
        scan_every_mins = cfg.schedule.scan_interval_mins,
        liquidate_at = %cfg.schedule.liquidate_at,
        "Entering scheduler loop. Press Ctrl+C to stop."
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                for job in schedule.due(clock.now()) {
                    jobs.launch(job);
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    info!(open_positions = book.len().await, "AUTOTRADER shut down cleanly.");
    Ok(())
}

fn print_accounts(accounts: &AccountRegistry) {
    for mode in [Mode::Paper, Mode::Real] {
        for profile in accounts.list(mode) {
            println!("{mode:<5} {:<8} {}", profile.id, masked(&profile.account_number));
        }
    }
}

// ---------------------------------------------------------------------------
// Job runner
// ---------------------------------------------------------------------------

/// Spawns scheduled jobs, one run per job kind at a time.
struct Jobs {
    daily: Arc<DailyJob>,
    scalper: Arc<ScalpEngine>,
    notifier: Arc<dyn Notifier>,
    dashboard: AppState,
    halted: Arc<AtomicBool>,
    running: Mutex<HashSet<Job>>,
}

impl Jobs {
    fn launch(self: &Arc<Self>, job: Job) {
        {
            let mut running = self.running.lock().unwrap_or_else(|p| p.into_inner());
            if !running.insert(job) {
                warn!(job = %job, "Previous run still in progress, skipping");
                return;
            }
        }

        let jobs = Arc::clone(self);
        tokio::spawn(async move {
            info!(job = %job, "Job starting");
            jobs.run(job).await;
            jobs.running
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .remove(&job);
        });
    }

    async fn run(&self, job: Job) {
        match job {
            Job::Daily => {
                // Failures are already notified by the job.
                if let Ok(summary) = self.daily.run().await {
                    *self.dashboard.last_report.write().await = Some(summary.report);
                }
            }
            Job::Scan if self.halted.load(Ordering::SeqCst) => {
                info!("Trading halted, scan skipped");
            }
            Job::Scan => match self.scalper.scan_and_dispatch().await {
                Ok((ScanOutcome::AwaitingApproval(proposal), Some(handle))) => {
                    let code = proposal.instrument_code;
                    tokio::spawn(async move {
                        match handle.await {
                            Ok(exec) => info!(code = %code, outcome = ?exec, "Scalp decision settled"),
                            Err(e) => error!(code = %code, error = %e, "Scalp decision task failed"),
                        }
                    });
                }
                Ok((outcome, _)) => info!(outcome = ?outcome, "Scan finished"),
                Err(e) => {
                    error!(error = %e, "Scan failed");
                    self.notifier
                        .notify(Notification::Error {
                            context: "scalp scan".into(),
                            message: e.to_string(),
                        })
                        .await;
                }
            },
            Job::Liquidate => {
                let lines = self.scalper.liquidate().await;
                let failed = lines.iter().filter(|l| l.result.is_err()).count();
                info!(closed = lines.len() - failed, failed, "Liquidation finished");
            }
        }
    }
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("autotrader=info"));

    let json_logging = std::env::var("AUTOTRADER_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
