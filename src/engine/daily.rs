//! Daily job — collect → sell → buy → report.
//!
//! Runs once per trading day. The phases are strictly sequential; any error
//! that escapes a phase stops the run and is reported once as an `Error`
//! notification. Nothing is retried.

use anyhow::{Context, Result};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{info, warn};

use super::accountant::{Accountant, DailyReport};
use super::executor::{ExecutionReport, Executor};
use crate::analysis::{AnalysisContext, ContextSource, TradeAnalyst};
use crate::broker::Brokerage;
use crate::clock::Clock;
use crate::config::RiskConfig;
use crate::notify::{Notification, Notifier};
use crate::strategy::{OrderPlanner, Skipped};

/// Headlines requested from the context source per run.
pub const NEWS_ITEMS: usize = 10;

/// What one run did.
#[derive(Debug, Clone)]
pub struct DailySummary {
    pub sells: ExecutionReport,
    pub buys: ExecutionReport,
    pub skipped: Vec<Skipped>,
    pub report: DailyReport,
}

pub struct DailyJob {
    broker: Arc<dyn Brokerage>,
    context: Arc<dyn ContextSource>,
    analyst: Arc<dyn TradeAnalyst>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    planner: OrderPlanner,
    executor: Executor,
}

impl DailyJob {
    pub fn new(
        broker: Arc<dyn Brokerage>,
        context: Arc<dyn ContextSource>,
        analyst: Arc<dyn TradeAnalyst>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        risk: RiskConfig,
        halted: Arc<AtomicBool>,
    ) -> Self {
        let executor = Executor::new(broker.clone(), notifier.clone(), halted);
        Self {
            broker,
            context,
            analyst,
            notifier,
            clock,
            planner: OrderPlanner::new(risk),
            executor,
        }
    }

    /// Run every phase. A failure is notified before it is returned.
    pub async fn run(&self) -> Result<DailySummary> {
        info!(broker = self.broker.name(), analyst = self.analyst.name(), "Daily job starting");
        match self.run_phases().await {
            Ok(summary) => {
                info!(
                    sold = summary.sells.executed.len(),
                    bought = summary.buys.executed.len(),
                    failed = summary.sells.failed.len() + summary.buys.failed.len(),
                    skipped = summary.skipped.len(),
                    "Daily job complete"
                );
                Ok(summary)
            }
            Err(e) => {
                warn!(error = %format!("{e:#}"), "Daily job failed");
                self.notifier
                    .notify(Notification::Error {
                        context: "daily job".into(),
                        message: format!("{e:#}"),
                    })
                    .await;
                Err(e)
            }
        }
    }

    async fn run_phases(&self) -> Result<DailySummary> {
        // 1. Collect
        let ctx = self.collect().await?;

        // 2. Sell side
        let sell_decisions = self
            .analyst
            .sell_decisions(&ctx)
            .await
            .context("sell analysis failed")?;
        let sell_plan = self.planner.plan_sells(&ctx.portfolio, sell_decisions);
        let sells = self.executor.execute_batch(&sell_plan.orders).await;

        // 3. Buy side
        let buy_decisions = self
            .analyst
            .buy_decisions(&ctx)
            .await
            .context("buy analysis failed")?;
        let buy_plan = self.planner.plan_buys(self.broker.as_ref(), buy_decisions).await;
        let buys = self.executor.execute_batch(&buy_plan.orders).await;

        // 4. Report
        let balance = self
            .broker
            .get_balance()
            .await
            .context("balance refresh for report failed")?;
        let report = Accountant::daily_report(&balance, self.broker.mode(), self.clock.now());
        self.notifier
            .notify(Notification::DailyReport(report.clone()))
            .await;

        let mut skipped = sell_plan.skipped;
        skipped.extend(buy_plan.skipped);
        Ok(DailySummary {
            sells,
            buys,
            skipped,
            report,
        })
    }

    /// Portfolio is required; market and news are best effort.
    async fn collect(&self) -> Result<AnalysisContext> {
        let portfolio = self
            .broker
            .get_balance()
            .await
            .context("balance lookup failed")?;

        let market = self.context.market_snapshot().await.unwrap_or_else(|e| {
            warn!(error = %e, "Market snapshot unavailable");
            Default::default()
        });
        let news = self.context.news(NEWS_ITEMS).await.unwrap_or_else(|e| {
            warn!(error = %e, "News unavailable");
            Vec::new()
        });

        info!(
            holdings = portfolio.holdings.len(),
            cash = %portfolio.cash_available,
            news = news.len(),
            "Context collected"
        );
        Ok(AnalysisContext {
            cash_available: portfolio.cash_available,
            portfolio,
            market,
            news,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
