//! Fires draws at minutes 00/15/30/45 of the business day's draw hours.
//!
//! Each tick maps local wall-clock time to the slot whose start lies within the current
//! quarter hour. A slot fires once per process; anything already generated elsewhere
//! comes back as `AlreadyGenerated` from the service.

use crate::config::LocalClock;
use crate::service::{DrawOutcome, DrawRequest, DrawService};
use chrono::{NaiveDate, NaiveDateTime, Timelike};
use lotto_types::{DrawKey, SlotLabel, SLOT_MINUTES};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// The slot due at local time `now`, if `now` falls in a draw's quarter hour.
pub fn due_slot(now: NaiveDateTime) -> Option<(NaiveDate, SlotLabel)> {
    let time = now.time();
    let floored = time.with_minute(time.minute() - time.minute() % SLOT_MINUTES)?;
    let floored = floored.with_second(0)?.with_nanosecond(0)?;
    SlotLabel::from_time(floored).map(|slot| (now.date(), slot))
}

/// What one scheduler tick did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickAction {
    /// No draw is due at this time.
    Idle,
    /// The due draw already fired from this process.
    AlreadyFired(DrawKey),
    /// Generation ran for the due draw.
    Attempted(DrawKey),
}

/// Per-process scheduler state: fires each due draw until one attempt settles it.
pub struct Scheduler {
    service: Arc<DrawService>,
    last_fired: Option<DrawKey>,
}

impl Scheduler {
    pub fn new(service: Arc<DrawService>) -> Self {
        Self {
            service,
            last_fired: None,
        }
    }

    /// Fire the draw due at local time `now`, unless it already fired.
    pub async fn tick(&mut self, now: NaiveDateTime) -> TickAction {
        let Some((date, slot)) = due_slot(now) else {
            return TickAction::Idle;
        };
        let request = DrawRequest::new(date, slot, None);
        if self.last_fired == Some(request.key) {
            return TickAction::AlreadyFired(request.key);
        }
        match self.service.generate(request).await {
            Ok(DrawOutcome::InProgress(key)) => {
                info!(draw = %key, "scheduled draw already running");
            }
            Ok(outcome) => {
                self.last_fired = Some(request.key);
                if let DrawOutcome::AlreadyGenerated(key) = outcome {
                    info!(draw = %key, "scheduled draw was already generated");
                }
            }
            Err(err) => {
                // retried on later ticks while the quarter hour lasts
                warn!(draw = %request.key, %err, "scheduled draw failed");
            }
        }
        TickAction::Attempted(request.key)
    }
}

/// Run the scheduler loop until the runtime shuts down.
pub fn spawn(service: Arc<DrawService>, clock: LocalClock, tick: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut scheduler = Scheduler::new(service);
        info!(tick_ms = tick.as_millis() as u64, "draw scheduler started");
        loop {
            interval.tick().await;
            scheduler.tick(clock.now().naive_local()).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DrawStore, ServerConfig};

    fn at(raw: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").expect("datetime")
    }

    #[test]
    fn maps_quarter_hours_to_slots() {
        let (date, slot) = due_slot(at("2025-01-10 14:00:05")).expect("due");
        assert_eq!(date.to_string(), "2025-01-10");
        assert_eq!(slot.to_string(), "02:00 PM");

        let (_, slot) = due_slot(at("2025-01-10 09:44:59")).expect("due");
        assert_eq!(slot.to_string(), "09:30 AM");

        let (_, slot) = due_slot(at("2025-01-10 23:59:00")).expect("due");
        assert_eq!(slot.to_string(), "11:45 PM");
    }

    #[test]
    fn nothing_due_outside_draw_hours() {
        assert_eq!(due_slot(at("2025-01-10 08:59:59")), None);
        assert_eq!(due_slot(at("2025-01-10 00:00:00")), None);
    }

    fn service(config: ServerConfig) -> Arc<DrawService> {
        let clock = config.clock().expect("clock");
        let store = DrawStore::open_in_memory().expect("store");
        Arc::new(DrawService::new(store, Arc::new(config), clock))
    }

    #[tokio::test]
    async fn due_draw_fires_once() {
        let service = service(ServerConfig {
            deterministic_seed: Some(11),
            ..ServerConfig::default()
        });
        let mut scheduler = Scheduler::new(service.clone());

        assert_eq!(scheduler.tick(at("2025-01-10 08:30:00")).await, TickAction::Idle);
        let TickAction::Attempted(key) = scheduler.tick(at("2025-01-10 14:00:05")).await else {
            panic!("expected the 02:00 PM draw to fire");
        };
        assert_eq!(key.draw_slot.to_string(), "02:00 PM");
        assert_eq!(
            scheduler.tick(at("2025-01-10 14:00:35")).await,
            TickAction::AlreadyFired(key)
        );

        let snapshot = service.metrics().snapshot();
        assert_eq!(snapshot.generated, 1);
        assert_eq!(snapshot.already_generated, 0);
        assert!(service.find(key).await.expect("find").is_some());
    }

    #[tokio::test]
    async fn failed_draw_is_retried_on_the_next_tick() {
        let service = service(ServerConfig {
            aggregation_timeout_ms: 0,
            ..ServerConfig::default()
        });
        let mut scheduler = Scheduler::new(service.clone());

        let first = scheduler.tick(at("2025-01-10 14:00:05")).await;
        let second = scheduler.tick(at("2025-01-10 14:00:35")).await;
        assert!(matches!(first, TickAction::Attempted(_)));
        assert_eq!(first, second);
        assert_eq!(service.metrics().snapshot().timed_out, 2);
    }

    #[tokio::test]
    async fn next_quarter_hour_fires_the_next_draw() {
        let service = service(ServerConfig {
            deterministic_seed: Some(11),
            ..ServerConfig::default()
        });
        let mut scheduler = Scheduler::new(service.clone());

        scheduler.tick(at("2025-01-10 14:00:05")).await;
        let TickAction::Attempted(key) = scheduler.tick(at("2025-01-10 14:15:05")).await else {
            panic!("expected the 02:15 PM draw to fire");
        };
        assert_eq!(key.draw_slot.to_string(), "02:15 PM");
        assert_eq!(service.metrics().snapshot().generated, 2);
    }
}
