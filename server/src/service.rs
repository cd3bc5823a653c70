//! Draw generation orchestration.
//!
//! [`DrawService::generate`] is the only write path for results. For one [`DrawKey`]:
//!
//! 1. take the in-process [`DrawLock`] (a held lock answers [`DrawOutcome::InProgress`]);
//! 2. return [`DrawOutcome::AlreadyGenerated`] if a result is already stored;
//! 3. aggregate the slot's sales in bounded batches, yielding between batches;
//! 4. run the settlement pipeline with the configured policy and RNG;
//! 5. persist through the store's exactly-once insert.
//!
//! Steps 2-4 run under the execution timeout. The save in step 5 is never cancelled: it
//! runs to completion while the lock is held and commits only if the execution deadline
//! has not passed. Every store call runs on the blocking pool.

use crate::config::{LocalClock, ServerConfig};
use crate::lock::DrawLock;
use crate::metrics::DrawMetrics;
use crate::store::{DrawStore, SaveOutcome};
use anyhow::Context;
use chrono::{NaiveDate, Utc};
use lotto_execution::{
    compute_draw, resolve_priority, DrawInput, SalesAggregator, SalesTotals,
};
use lotto_types::{
    parse_draw_date, DrawKey, DrawResult, SelectionStrategy, SellerId, SlotLabel,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum DrawError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("sales aggregation for {key} exceeded {limit_ms} ms")]
    AggregationTimeout { key: DrawKey, limit_ms: u64 },
    #[error("draw generation for {key} exceeded {limit_ms} ms")]
    ExecutionTimeout { key: DrawKey, limit_ms: u64 },
    #[error(transparent)]
    Engine(#[from] lotto_execution::DrawError),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl DrawError {
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            DrawError::AggregationTimeout { .. } | DrawError::ExecutionTimeout { .. }
        )
    }
}

/// A validated trigger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawRequest {
    pub key: DrawKey,
    /// Manual priority override: settle this seller's tickets first.
    pub login_id: Option<SellerId>,
}

impl DrawRequest {
    pub fn new(draw_date: NaiveDate, draw_slot: SlotLabel, login_id: Option<SellerId>) -> Self {
        Self {
            key: DrawKey::new(draw_date, draw_slot),
            login_id,
        }
    }

    /// Validate raw trigger fields. Both date and time are required.
    pub fn parse(
        draw_date: Option<&str>,
        draw_time: Option<&str>,
        login_id: Option<SellerId>,
    ) -> Result<Self, DrawError> {
        let (Some(draw_date), Some(draw_time)) = (draw_date, draw_time) else {
            return Err(DrawError::InvalidInput(
                "both drawTime and drawDate are required".to_string(),
            ));
        };
        let draw_date =
            parse_draw_date(draw_date).map_err(|err| DrawError::InvalidInput(err.to_string()))?;
        let draw_slot = draw_time
            .parse::<SlotLabel>()
            .map_err(|err| DrawError::InvalidInput(err.to_string()))?;
        Ok(Self::new(draw_date, draw_slot, login_id))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum DrawOutcome {
    Generated(DrawResult),
    AlreadyGenerated(DrawKey),
    InProgress(DrawKey),
}

pub struct DrawService {
    store: DrawStore,
    lock: DrawLock,
    config: Arc<ServerConfig>,
    clock: LocalClock,
    metrics: Arc<DrawMetrics>,
}

impl DrawService {
    pub fn new(store: DrawStore, config: Arc<ServerConfig>, clock: LocalClock) -> Self {
        Self {
            store,
            lock: DrawLock::new(config.lock_ttl()),
            config,
            clock,
            metrics: Arc::new(DrawMetrics::default()),
        }
    }

    pub fn store(&self) -> &DrawStore {
        &self.store
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn clock(&self) -> LocalClock {
        self.clock
    }

    pub fn metrics(&self) -> &DrawMetrics {
        &self.metrics
    }

    /// Generate and persist the result for one draw, at most once.
    pub async fn generate(&self, request: DrawRequest) -> Result<DrawOutcome, DrawError> {
        let key = request.key;
        let Some(_guard) = self.lock.try_acquire(key) else {
            info!(draw = %key, "draw generation already in progress");
            self.metrics.inc_in_progress();
            return Ok(DrawOutcome::InProgress(key));
        };

        let started = Instant::now();
        let limit = self.config.execution_timeout();
        let deadline = started + limit;
        let outcome = match tokio::time::timeout(limit, self.prepare(request)).await {
            Ok(Ok(Some(result))) => self.persist(result, deadline).await,
            Ok(Ok(None)) => Ok(DrawOutcome::AlreadyGenerated(key)),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(self.execution_timeout(key)),
        };
        self.metrics.record_duration(started.elapsed());

        match &outcome {
            Ok(DrawOutcome::Generated(result)) => {
                self.metrics.inc_generated();
                if result.strategy == SelectionStrategy::NoSales {
                    self.metrics.inc_no_sales();
                }
                info!(
                    draw = %key,
                    strategy = %result.strategy,
                    payout = result.total_payout(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "draw generated"
                );
            }
            Ok(DrawOutcome::AlreadyGenerated(_)) => {
                self.metrics.inc_already_generated();
                info!(draw = %key, "draw already generated");
            }
            Ok(DrawOutcome::InProgress(_)) => self.metrics.inc_in_progress(),
            Err(err) if err.is_timeout() => {
                self.metrics.inc_timed_out();
                warn!(draw = %key, %err, "draw generation timed out");
            }
            Err(err) => {
                self.metrics.inc_failed();
                error!(draw = %key, %err, "draw generation failed");
            }
        }
        outcome
    }

    /// Compute the result to store, or `None` when one is stored already.
    async fn prepare(&self, request: DrawRequest) -> Result<Option<DrawResult>, DrawError> {
        let key = request.key;
        if self.blocking(move |store| store.find_existing(&key)).await?.is_some() {
            return Ok(None);
        }

        let totals = self.aggregate(key).await?;
        if totals.skipped_records > 0 {
            self.metrics.add_skipped_records(totals.skipped_records as u64);
            warn!(
                draw = %key,
                skipped = totals.skipped_records,
                "tickets skipped during aggregation"
            );
        }
        let win_percent = self.blocking(|store| store.latest_win_percent()).await?;
        let flagged = match request.login_id {
            Some(_) => Vec::new(),
            None => self.blocking(|store| store.priority_sellers()).await?,
        };
        let priority = resolve_priority(&flagged, request.login_id);

        let computation = {
            let mut rng = self.rng_for(&key);
            compute_draw(
                DrawInput {
                    totals: &totals,
                    win_percent,
                    priority: &priority,
                },
                &self.config.draw_options(),
                &mut rng,
            )?
        };

        Ok(Some(DrawResult {
            draw_date: key.draw_date,
            draw_slot: key.draw_slot,
            winning_numbers: computation.winning_numbers,
            total_points: computation.total_points,
            strategy: computation.strategy,
            created_at: Utc::now(),
        }))
    }

    /// Save outside the cancellable part of generation; the store enforces `deadline`.
    async fn persist(
        &self,
        result: DrawResult,
        deadline: Instant,
    ) -> Result<DrawOutcome, DrawError> {
        let key = result.key();
        let to_save = result.clone();
        match self
            .blocking(move |store| store.save_before(&to_save, deadline))
            .await?
        {
            SaveOutcome::Inserted => Ok(DrawOutcome::Generated(result)),
            SaveOutcome::AlreadyExists => Ok(DrawOutcome::AlreadyGenerated(key)),
            SaveOutcome::DeadlinePassed => Err(self.execution_timeout(key)),
        }
    }

    fn execution_timeout(&self, key: DrawKey) -> DrawError {
        DrawError::ExecutionTimeout {
            key,
            limit_ms: self.config.execution_timeout().as_millis() as u64,
        }
    }

    /// Fold every ticket of the draw's business day into sales totals for its slot.
    async fn aggregate(&self, key: DrawKey) -> Result<SalesTotals, DrawError> {
        let (start, end) = self.clock.day_bounds(key.draw_date);
        let limit = self.config.aggregation_timeout();
        let batch_size = self.config.batch_size;
        let started = Instant::now();

        let mut aggregator = SalesAggregator::new(key.draw_slot);
        let mut after_id = 0u64;
        loop {
            ensure_within(started, limit, key)?;
            let batch = self
                .blocking(move |store| store.load_ticket_batch(start, end, after_id, batch_size))
                .await?;
            let Some(last) = batch.last() else {
                break;
            };
            after_id = last.id;
            let summary = aggregator.ingest(&batch);
            debug!(
                draw = %key,
                scanned = summary.scanned,
                matched = summary.matched,
                skipped = summary.skipped,
                "ticket batch aggregated"
            );
            if batch.len() < batch_size {
                break;
            }
            tokio::task::yield_now().await;
        }
        ensure_within(started, limit, key)?;
        Ok(aggregator.finish())
    }

    fn rng_for(&self, key: &DrawKey) -> StdRng {
        match self.config.deterministic_seed {
            Some(seed) => StdRng::seed_from_u64(seed ^ key.seed_material()),
            None => StdRng::from_entropy(),
        }
    }

    /// Run a store call on the blocking pool.
    async fn blocking<T, F>(&self, f: F) -> Result<T, DrawError>
    where
        F: FnOnce(&DrawStore) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.store.clone();
        let joined = tokio::task::spawn_blocking(move || f(&store))
            .await
            .context("store task failed")?;
        Ok(joined?)
    }

    /// Results of a day in slot order.
    pub async fn list_for_date(&self, date: NaiveDate) -> Result<Vec<DrawResult>, DrawError> {
        self.blocking(move |store| store.list_for_date(date)).await
    }

    pub async fn find(&self, key: DrawKey) -> Result<Option<DrawResult>, DrawError> {
        self.blocking(move |store| store.find_existing(&key)).await
    }

    pub async fn latest_for_date(
        &self,
        date: NaiveDate,
        slot: Option<SlotLabel>,
    ) -> Result<Option<DrawResult>, DrawError> {
        self.blocking(move |store| store.latest_for_date(date, slot)).await
    }

    pub async fn toggle_seller_priority(&self, seller: SellerId) -> Result<Option<bool>, DrawError> {
        self.blocking(move |store| store.toggle_seller_priority(seller))
            .await
    }

    pub async fn record_win_percent(&self, percentage: f64) -> Result<(), DrawError> {
        let at = Utc::now();
        self.blocking(move |store| store.record_win_percent(percentage, at))
            .await
    }
}

fn ensure_within(started: Instant, limit: Duration, key: DrawKey) -> Result<(), DrawError> {
    if started.elapsed() >= limit {
        return Err(DrawError::AggregationTimeout {
            key,
            limit_ms: limit.as_millis() as u64,
        });
    }
    Ok(())
}
