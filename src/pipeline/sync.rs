// src/pipeline/sync.rs

//! Sync orchestration for one external source.
//!
//! Drives the fetch → extract → detect → persist → dispatch cycle and
//! records the outcome on the source. A failed run leaves the stored
//! snapshot and departure untouched: stale-but-valid data beats a
//! corrupted write from a partial fetch.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};

use crate::error::{AppError, Result};
use crate::models::{
    ChangeEvent, ChangeKind, Config, Departure, DepartureStatus, ExternalSource,
    FetchedAvailability, FieldValue, SourceKind, SyncOutcome,
};
use crate::services::{
    detector, extractor, NotificationDelivery, NotificationDispatcher, SourceFetcher,
    SubscriptionIndex,
};
use crate::storage::EngineStore;

/// Shared dependencies for sync runs.
#[derive(Clone)]
pub struct SyncContext {
    pub config: Arc<Config>,
    pub store: Arc<dyn EngineStore>,
    pub fetcher: SourceFetcher,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub delivery: Arc<dyn NotificationDelivery>,
}

/// What a successful run produced.
#[derive(Debug, Default, Clone, Copy)]
struct RunSummary {
    events: usize,
    emitted: usize,
}

/// Run one full sync cycle for a source.
///
/// Never returns an error to the caller: failures become an error
/// outcome recorded on the source, and the scheduler only ever observes
/// a finished run.
pub async fn run_sync(ctx: &SyncContext, source: &ExternalSource) -> SyncOutcome {
    log::debug!("sync {}: fetching {}", source.id, source.url);
    let outcome = finish_run(source, sync_once(ctx, source).await);
    record_outcome(ctx, source, &outcome).await;
    outcome
}

async fn sync_once(ctx: &SyncContext, source: &ExternalSource) -> Result<RunSummary> {
    // fetching
    let raw = ctx.fetcher.fetch(source).await?;
    // extracting
    let fetched = extractor::extract(&raw, &source.rules, &ctx.config.extraction)?;
    // detecting → persisting → dispatching
    apply_fetched(ctx, source, &fetched).await
}

fn finish_run(source: &ExternalSource, result: Result<RunSummary>) -> SyncOutcome {
    match result {
        Ok(summary) => {
            log::info!(
                "sync {}: ok, {} event(s), {} notification(s)",
                source.id,
                summary.events,
                summary.emitted
            );
            SyncOutcome::success(&source.id, summary.events, summary.emitted)
        }
        Err(error) => {
            if let AppError::Extraction { excerpt, .. } = &error {
                log::warn!("sync {}: failing content: {}", source.id, excerpt);
            }
            log::warn!("sync {} failed: {}", source.id, error);
            SyncOutcome::error(&source.id, error.to_string())
        }
    }
}

async fn record_outcome(ctx: &SyncContext, source: &ExternalSource, outcome: &SyncOutcome) {
    if let Err(e) = ctx.store.record_sync_outcome(&source.id, outcome).await {
        log::error!("sync {}: failed to record outcome: {}", source.id, e);
    }
}

/// Apply a fetched availability to the source's circuit.
///
/// Shared by scheduled syncs and operator-entered manual readings.
async fn apply_fetched(
    ctx: &SyncContext,
    source: &ExternalSource,
    fetched: &FetchedAvailability,
) -> Result<RunSummary> {
    fetched.validate()?;

    let departures = ctx.store.departures_for_circuit(&source.circuit_id).await?;
    let today = Utc::now().date_naive();
    let departure = select_target(departures, fetched.next_departure_date, today).ok_or_else(
        || {
            AppError::validation(format!(
                "circuit {} has no upcoming departure to sync",
                source.circuit_id
            ))
        },
    )?;

    let previous = ctx.store.load_snapshot(&departure.id).await?;
    let now = Utc::now();

    let snapshot = detector::merge_snapshot(previous.as_ref(), fetched, now);
    // A fetch carrying only available_seats can still contradict the
    // capacity we know from earlier syncs
    if let (Some(available), Some(total)) = (snapshot.available_seats, snapshot.total_seats) {
        if available > total {
            return Err(AppError::validation(format!(
                "available_seats {available} exceeds known total_seats {total}"
            )));
        }
    }

    let updated = updated_departure(&departure, fetched)?;
    let events = detector::detect(
        previous.as_ref(),
        fetched,
        &departure.id,
        &source.circuit_id,
        now,
    );

    ctx.store.save_snapshot(&departure.id, &snapshot).await?;
    ctx.store.save_departure(&updated).await?;

    let summary = dispatch_events(ctx, &source.circuit_id, &events).await?;
    Ok(RunSummary {
        events: events.len(),
        emitted: summary,
    })
}

/// Pick the departure a fetched availability applies to.
///
/// The fetched next-departure date wins when it names a known,
/// non-cancelled departure; otherwise the circuit's earliest upcoming
/// non-cancelled departure is the target.
fn select_target(
    departures: Vec<Departure>,
    fetched_date: Option<NaiveDate>,
    today: NaiveDate,
) -> Option<Departure> {
    if let Some(date) = fetched_date {
        if let Some(matched) = departures
            .iter()
            .find(|d| d.start_date == date && d.status != DepartureStatus::Cancelled)
        {
            return Some(matched.clone());
        }
    }
    departures
        .into_iter()
        .filter(|d| d.status != DepartureStatus::Cancelled && d.start_date >= today)
        .min_by_key(|d| d.start_date)
}

/// Compute the departure row after applying the fields present in a fetch.
///
/// `booked = total - available` when both are known; with only
/// `available` known the stored capacity is kept and bookings derive
/// against it. Contradictions are validation errors, never clamped.
fn updated_departure(departure: &Departure, fetched: &FetchedAvailability) -> Result<Departure> {
    let mut updated = departure.clone();

    if let Some(total) = fetched.total_seats {
        updated.total_seats = total;
    }
    if let Some(available) = fetched.available_seats {
        if available > updated.total_seats {
            return Err(AppError::validation(format!(
                "available_seats {} exceeds total_seats {} on departure {}",
                available, updated.total_seats, departure.id
            )));
        }
        updated.booked_seats = updated.total_seats - available;
    }
    if let Some(status) = fetched.status {
        updated.status = status;
    }

    updated.validate()?;
    Ok(updated)
}

async fn dispatch_events(
    ctx: &SyncContext,
    circuit_id: &str,
    events: &[ChangeEvent],
) -> Result<usize> {
    if events.is_empty() {
        return Ok(0);
    }
    let subscriptions = ctx.store.load_subscriptions(circuit_id).await?;
    let index = SubscriptionIndex::new(subscriptions);
    let summary = ctx
        .dispatcher
        .dispatch(events, &index, ctx.delivery.as_ref(), Utc::now())
        .await;
    Ok(summary.emitted)
}

/// Operator-initiated re-check.
///
/// Runs the same state machine synchronously and returns the outcome to
/// the caller as well as recording it.
pub async fn trigger_manual_sync(ctx: &SyncContext, source_id: &str) -> Result<SyncOutcome> {
    let source = load_source(ctx, source_id).await?;
    if source.kind == SourceKind::Manual {
        return Err(AppError::config(format!(
            "source {source_id} holds operator-entered values; record a manual reading instead"
        )));
    }
    Ok(run_sync(ctx, &source).await)
}

/// Record an operator-entered availability for a manual source.
///
/// The extractor is never involved; the human-entered value is applied
/// through the same detect → persist → dispatch path as a fetch.
pub async fn apply_manual_reading(
    ctx: &SyncContext,
    source_id: &str,
    fetched: &FetchedAvailability,
) -> Result<SyncOutcome> {
    let source = load_source(ctx, source_id).await?;
    let outcome = finish_run(&source, apply_fetched(ctx, &source, fetched).await);
    record_outcome(ctx, &source, &outcome).await;
    Ok(outcome)
}

/// Record an internal reservation and notify booking watchers.
///
/// Bypasses fetch/extract/detect entirely; the availability snapshot is
/// not touched, so the next external sync still compares against the
/// last external baseline.
pub async fn on_internal_booking(
    ctx: &SyncContext,
    departure_id: &str,
    seats_delta: i64,
) -> Result<()> {
    let departure = ctx
        .store
        .load_departure(departure_id)
        .await?
        .ok_or_else(|| AppError::validation(format!("unknown departure: {departure_id}")))?;

    let old_booked = departure.booked_seats;
    let new_booked = i64::from(old_booked) + seats_delta;
    if new_booked < 0 {
        return Err(AppError::validation(format!(
            "booking delta {seats_delta} would make booked seats negative"
        )));
    }

    let mut updated = departure;
    updated.booked_seats = new_booked as u32;
    updated.validate()?;
    ctx.store.save_departure(&updated).await?;

    let event = ChangeEvent {
        kind: ChangeKind::NewBooking,
        departure_id: departure_id.to_string(),
        circuit_id: updated.circuit_id.clone(),
        old: FieldValue::Seats(old_booked),
        new: FieldValue::Seats(updated.booked_seats),
        at: Utc::now(),
    };
    dispatch_events(ctx, &updated.circuit_id, &[event]).await?;
    Ok(())
}

async fn load_source(ctx: &SyncContext, source_id: &str) -> Result<ExternalSource> {
    ctx.store
        .load_source(source_id)
        .await?
        .ok_or_else(|| AppError::validation(format!("unknown source: {source_id}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        DispatcherConfig, ExtractionRules, FetcherConfig, NotificationIntent, SyncFrequency,
        SyncStatus, WatchlistSubscription,
    };
    use crate::services::DeliveryResult;
    use crate::storage::LocalStore;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    struct RecordingDelivery {
        intents: StdMutex<Vec<NotificationIntent>>,
    }

    impl RecordingDelivery {
        fn new() -> Self {
            Self {
                intents: StdMutex::new(Vec::new()),
            }
        }

        fn recorded(&self) -> Vec<NotificationIntent> {
            self.intents.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl NotificationDelivery for RecordingDelivery {
        async fn deliver(&self, intent: &NotificationIntent) -> DeliveryResult {
            self.intents.lock().unwrap().push(intent.clone());
            DeliveryResult::Sent
        }
    }

    fn departure(id: &str, start: NaiveDate, status: DepartureStatus) -> Departure {
        Departure {
            id: id.to_string(),
            circuit_id: "circuit-1".to_string(),
            start_date: start,
            total_seats: 16,
            booked_seats: 10,
            price_cents: None,
            status,
        }
    }

    fn manual_source(id: &str) -> ExternalSource {
        ExternalSource {
            id: id.to_string(),
            circuit_id: "circuit-1".to_string(),
            url: String::new(),
            kind: SourceKind::Manual,
            frequency: SyncFrequency::Manual,
            rules: ExtractionRules::default(),
            active: true,
            last_sync_at: None,
            last_sync_status: None,
            last_sync_error: None,
        }
    }

    async fn test_context(dir: &std::path::Path) -> (SyncContext, Arc<RecordingDelivery>) {
        let config = Arc::new(Config::default());
        let delivery = Arc::new(RecordingDelivery::new());
        let ctx = SyncContext {
            fetcher: SourceFetcher::new(&FetcherConfig::default()).unwrap(),
            store: Arc::new(LocalStore::new(dir)),
            dispatcher: Arc::new(NotificationDispatcher::new(&DispatcherConfig::default())),
            delivery: delivery.clone(),
            config,
        };
        (ctx, delivery)
    }

    async fn seed(ctx: &SyncContext) {
        ctx.store
            .save_departure(&departure(
                "dep-1",
                NaiveDate::from_ymd_opt(2099, 9, 15).unwrap(),
                DepartureStatus::Open,
            ))
            .await
            .unwrap();
    }

    fn upcoming(days: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2099, 1, 1)
            .unwrap()
            .checked_add_days(chrono::Days::new(days as u64))
            .unwrap()
    }

    #[test]
    fn test_select_target_prefers_fetched_date() {
        let departures = vec![
            departure("early", upcoming(10), DepartureStatus::Open),
            departure("late", upcoming(40), DepartureStatus::Open),
        ];
        let today = upcoming(0);
        let picked = select_target(departures, Some(upcoming(40)), today).unwrap();
        assert_eq!(picked.id, "late");
    }

    #[test]
    fn test_select_target_falls_back_to_earliest_upcoming() {
        let departures = vec![
            departure("past", upcoming(0), DepartureStatus::Open),
            departure("cancelled", upcoming(5), DepartureStatus::Cancelled),
            departure("next", upcoming(10), DepartureStatus::Open),
        ];
        let today = upcoming(1);
        let picked = select_target(departures, None, today).unwrap();
        assert_eq!(picked.id, "next");
    }

    #[test]
    fn test_select_target_none_when_everything_is_past() {
        let departures = vec![departure("past", upcoming(0), DepartureStatus::Open)];
        assert!(select_target(departures, None, upcoming(1)).is_none());
    }

    #[test]
    fn test_updated_departure_derives_booked() {
        let base = departure("dep-1", upcoming(10), DepartureStatus::Open);
        let fetched = FetchedAvailability {
            available_seats: Some(4),
            ..FetchedAvailability::default()
        };
        // Only available known: capacity kept, booked derived against it
        let updated = updated_departure(&base, &fetched).unwrap();
        assert_eq!(updated.total_seats, 16);
        assert_eq!(updated.booked_seats, 12);

        let fetched = FetchedAvailability {
            available_seats: Some(4),
            total_seats: Some(20),
            ..FetchedAvailability::default()
        };
        let updated = updated_departure(&base, &fetched).unwrap();
        assert_eq!(updated.total_seats, 20);
        assert_eq!(updated.booked_seats, 16);
    }

    #[test]
    fn test_updated_departure_rejects_contradiction() {
        let base = departure("dep-1", upcoming(10), DepartureStatus::Open);
        let fetched = FetchedAvailability {
            available_seats: Some(30),
            ..FetchedAvailability::default()
        };
        assert!(updated_departure(&base, &fetched).is_err());
    }

    #[tokio::test]
    async fn test_manual_reading_establishes_baseline_then_detects() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, delivery) = test_context(dir.path()).await;
        let local = LocalStore::new(dir.path());
        local.save_sources(&[manual_source("src-1")]).await.unwrap();
        seed(&ctx).await;
        local
            .save_subscriptions(&[WatchlistSubscription {
                agency_id: "agency-1".to_string(),
                circuit_id: "circuit-1".to_string(),
                notify_on_booking: false,
                notify_on_availability_change: true,
                notify_on_price_change: false,
            }])
            .await
            .unwrap();

        // First reading: baseline only, no events
        let first = FetchedAvailability {
            available_seats: Some(6),
            total_seats: Some(16),
            ..FetchedAvailability::default()
        };
        let outcome = apply_manual_reading(&ctx, "src-1", &first).await.unwrap();
        assert!(outcome.is_success());
        assert_eq!(outcome.events_emitted, 0);
        assert!(delivery.recorded().is_empty());

        // Second reading: seats dropped, one event reaches the watcher
        let second = FetchedAvailability {
            available_seats: Some(4),
            ..FetchedAvailability::default()
        };
        let outcome = apply_manual_reading(&ctx, "src-1", &second).await.unwrap();
        assert!(outcome.is_success());
        assert_eq!(outcome.events_emitted, 1);
        let recorded = delivery.recorded();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].event.kind, ChangeKind::AvailabilityDecreased);

        // Departure and snapshot both reflect the new value
        let dep = ctx.store.load_departure("dep-1").await.unwrap().unwrap();
        assert_eq!(dep.booked_seats, 12);
        let snap = ctx.store.load_snapshot("dep-1").await.unwrap().unwrap();
        assert_eq!(snap.available_seats, Some(4));
        // total carried forward from the first reading
        assert_eq!(snap.total_seats, Some(16));
    }

    #[tokio::test]
    async fn test_failed_run_leaves_state_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, delivery) = test_context(dir.path()).await;
        let local = LocalStore::new(dir.path());
        local.save_sources(&[manual_source("src-1")]).await.unwrap();
        seed(&ctx).await;

        let baseline = FetchedAvailability {
            available_seats: Some(6),
            total_seats: Some(16),
            ..FetchedAvailability::default()
        };
        apply_manual_reading(&ctx, "src-1", &baseline).await.unwrap();
        let dep_before = ctx.store.load_departure("dep-1").await.unwrap().unwrap();
        let snap_before = ctx.store.load_snapshot("dep-1").await.unwrap().unwrap();

        // available > known total: validation failure
        let bad = FetchedAvailability {
            available_seats: Some(30),
            ..FetchedAvailability::default()
        };
        let outcome = apply_manual_reading(&ctx, "src-1", &bad).await.unwrap();
        assert_eq!(outcome.status, SyncStatus::Error);
        assert_eq!(outcome.events_emitted, 0);

        // Bit-for-bit unchanged, and nothing was notified for the failure
        let dep_after = ctx.store.load_departure("dep-1").await.unwrap().unwrap();
        let snap_after = ctx.store.load_snapshot("dep-1").await.unwrap().unwrap();
        assert_eq!(dep_before, dep_after);
        assert_eq!(snap_before, snap_after);
        assert!(delivery.recorded().is_empty());

        // The operator sees the error on the source
        let source = ctx.store.load_source("src-1").await.unwrap().unwrap();
        assert_eq!(source.last_sync_status, Some(SyncStatus::Error));
        assert!(source.last_sync_error.is_some());
    }

    #[tokio::test]
    async fn test_internal_booking_notifies_booking_watchers() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, delivery) = test_context(dir.path()).await;
        seed(&ctx).await;
        let local = LocalStore::new(dir.path());
        local
            .save_subscriptions(&[
                WatchlistSubscription {
                    agency_id: "booking-watcher".to_string(),
                    circuit_id: "circuit-1".to_string(),
                    notify_on_booking: true,
                    notify_on_availability_change: false,
                    notify_on_price_change: false,
                },
                WatchlistSubscription {
                    agency_id: "price-watcher".to_string(),
                    circuit_id: "circuit-1".to_string(),
                    notify_on_booking: false,
                    notify_on_availability_change: false,
                    notify_on_price_change: true,
                },
            ])
            .await
            .unwrap();

        on_internal_booking(&ctx, "dep-1", 2).await.unwrap();

        let dep = ctx.store.load_departure("dep-1").await.unwrap().unwrap();
        assert_eq!(dep.booked_seats, 12);

        let recorded = delivery.recorded();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].agency_id, "booking-watcher");
        assert_eq!(recorded[0].event.kind, ChangeKind::NewBooking);

        // Snapshot untouched: bookings are not an external observation
        assert!(ctx.store.load_snapshot("dep-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_internal_booking_rejects_overbooking() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _delivery) = test_context(dir.path()).await;
        seed(&ctx).await;

        assert!(on_internal_booking(&ctx, "dep-1", 10).await.is_err());
        let dep = ctx.store.load_departure("dep-1").await.unwrap().unwrap();
        assert_eq!(dep.booked_seats, 10);
    }

    #[tokio::test]
    async fn test_trigger_manual_sync_rejects_manual_kind() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _delivery) = test_context(dir.path()).await;
        let local = LocalStore::new(dir.path());
        local.save_sources(&[manual_source("src-1")]).await.unwrap();

        assert!(trigger_manual_sync(&ctx, "src-1").await.is_err());
        assert!(trigger_manual_sync(&ctx, "no-such-source").await.is_err());
    }
}
