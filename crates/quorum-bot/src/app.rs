//! Application wiring and cycle orchestration.
//!
//! One cycle: account snapshot → prompt assembly → sequential source
//! collection → consensus merge → execution → report. The enclosing
//! scheduler (continuous mode) only decides when cycles run; a cycle
//! always runs to completion.

use crate::config::AppConfig;
use crate::error::AppResult;
use crate::sources::SourceClient;
use chrono::{DateTime, Utc};
use quorum_consensus::ConsensusMerger;
use quorum_core::{ExecutionSummary, TradeProposal};
use quorum_engine::ExecutionEngine;
use quorum_exchange::{FuturesApi, SignedRequestClient};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Result of one trading cycle.
#[derive(Debug)]
pub struct CycleOutcome {
    /// Proposals collected across all sources.
    pub proposals: usize,
    /// Decisions that reached consensus.
    pub decisions: usize,
    /// Execution summary (empty when no decision reached consensus).
    pub summary: ExecutionSummary,
}

/// Top-level application.
pub struct Application {
    config: AppConfig,
    engine: ExecutionEngine,
    merger: ConsensusMerger,
    sources: SourceClient,
    user_instruction: String,
    suffix: String,
    started_at: DateTime<Utc>,
    cycle_count: u64,
}

impl Application {
    /// Wire up the application from configuration.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let client = Arc::new(SignedRequestClient::new(config.exchange.resolve())?);
        let api = FuturesApi::new(client);
        let engine = ExecutionEngine::new(api, config.trading.confidence_threshold);
        let merger = ConsensusMerger::new(config.sources.len());
        let sources = SourceClient::new()?;

        let user_instruction = config.prompts.load("user_instruction.txt");
        let suffix = config.prompts.load("suffix.txt");

        let cycle_count = std::fs::read_to_string(&config.trading.cycle_count_file)
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0);

        info!(
            sources = config.sources.len(),
            instruments = ?config.instruments,
            confidence_threshold = config.trading.confidence_threshold,
            cycle_count,
            "Application wired"
        );

        Ok(Self {
            config,
            engine,
            merger,
            sources,
            user_instruction,
            suffix,
            started_at: Utc::now(),
            cycle_count,
        })
    }

    /// Run one trading cycle.
    pub async fn run_single_cycle(&mut self) -> AppResult<CycleOutcome> {
        self.cycle_count += 1;
        self.persist_cycle_count();

        info!(cycle = self.cycle_count, "Starting trading cycle");

        // Account state feeds both position sizing and the prompt.
        let snapshot = self.engine.api().account_snapshot().await?;
        info!(
            available_cash = %snapshot.available_cash,
            wallet_balance = %snapshot.total_wallet_balance,
            unrealized_pnl = %snapshot.total_unrealized_pnl,
            "Account snapshot"
        );

        let user_prompt = self.build_user_prompt(&snapshot.available_cash.to_string());

        // Sources are consulted sequentially; a failing source contributes
        // nothing and blocks nobody.
        let mut proposals: Vec<TradeProposal> = Vec::new();
        for source in &self.config.sources {
            let fetched = self
                .sources
                .fetch_proposals(source, &self.user_instruction, &user_prompt)
                .await;
            info!(source = %source.name, proposals = fetched.len(), "Source consulted");
            proposals.extend(fetched);
        }

        let decisions = self.merger.merge(&proposals);
        if decisions.is_empty() {
            info!("No consensus trades this cycle");
            return Ok(CycleOutcome {
                proposals: proposals.len(),
                decisions: 0,
                summary: ExecutionSummary::new(0),
            });
        }

        let summary = self
            .engine
            .execute(&decisions, snapshot.available_cash)
            .await;

        info!(
            total = summary.total,
            executed = summary.executed,
            skipped = summary.skipped_low_confidence,
            failed = summary.failed,
            "Cycle result"
        );
        info!("{}", self.engine.ledger().summary());

        Ok(CycleOutcome {
            proposals: proposals.len(),
            decisions: decisions.len(),
            summary,
        })
    }

    /// Run cycles until interrupted.
    pub async fn run_continuous(&mut self) -> AppResult<()> {
        let interval = Duration::from_secs(self.config.trading.interval_minutes * 60);
        info!(
            interval_minutes = self.config.trading.interval_minutes,
            "Entering continuous mode"
        );

        loop {
            // A failed cycle is reported and the loop keeps going.
            if let Err(e) = self.run_single_cycle().await {
                error!(error = %e, "Cycle failed");
            }

            info!(
                wait_minutes = self.config.trading.interval_minutes,
                "Cycle complete, waiting"
            );
            tokio::time::sleep(interval).await;
        }
    }

    /// Assemble the per-cycle user prompt: runtime prefix, account
    /// overview, configured suffix.
    fn build_user_prompt(&self, available_cash: &str) -> String {
        let elapsed_minutes = (Utc::now() - self.started_at).num_minutes();

        let mut prompt = format!(
            "It has been {elapsed_minutes} minutes since you started trading. \
             The current time is {} and you've been invoked {} times.\n\n",
            Utc::now(),
            self.cycle_count
        );
        prompt.push_str(&format!("Available cash: {available_cash}\n"));
        prompt.push_str(&self.engine.ledger().summary());
        prompt.push('\n');
        prompt.push_str(&self.suffix);
        prompt.push('\n');
        prompt
    }

    /// Persist the cycle counter; failure is logged, never fatal.
    fn persist_cycle_count(&self) {
        if let Err(e) = std::fs::write(
            &self.config.trading.cycle_count_file,
            self.cycle_count.to_string(),
        ) {
            warn!(
                file = %self.config.trading.cycle_count_file,
                error = %e,
                "Could not persist cycle counter"
            );
        }
    }
}
