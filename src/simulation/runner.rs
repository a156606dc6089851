//! SimulationRunner — orchestrates one generation run.
//!
//! CohortReader → ProfileAssigner → MeasurementScheduler → VitalSignGenerator
//! → BatchWriter, tracked by [`RunState`]:
//! `Init → ReadingCohort → Generating → Writing → Done | Failed`.
//!
//! Readings are produced lazily, subject by subject, so memory stays bounded
//! by the batch size (plus one chunk of subjects when `workers > 1`).

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

use chrono::{Local, NaiveDateTime};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rusqlite::Connection;
use uuid::Uuid;

use super::circadian::CircadianModel;
use super::error::SimulationError;
use super::profile::ProfileAssigner;
use super::report::{RunSummary, SummaryAccumulator};
use super::scheduler::MeasurementScheduler;
use super::store::{SqliteCohortReader, SqliteReadingStore};
use super::traits::{CohortReader, ReadingStore};
use super::types::*;
use super::vitals::VitalSignGenerator;
use super::writer::{readings_per_second, BatchWriter};
use crate::models::{Reading, RiskProfile};

/// Subjects handed to the worker pool at a time.
const SUBJECTS_PER_WORKER_CHUNK: usize = 8;

pub struct SimulationRunner {
    reader: Box<dyn CohortReader>,
    store: Box<dyn ReadingStore>,
    config: SimulationConfig,
    cancel: Arc<AtomicBool>,
    state: RunState,
}

impl SimulationRunner {
    pub fn new(
        reader: Box<dyn CohortReader>,
        store: Box<dyn ReadingStore>,
        config: SimulationConfig,
    ) -> Self {
        Self {
            reader,
            store,
            config,
            cancel: Arc::new(AtomicBool::new(false)),
            state: RunState::Init,
        }
    }

    /// Runner over the SQLite cohort and readings tables.
    pub fn sqlite(config: SimulationConfig) -> Self {
        Self::new(
            Box::new(SqliteCohortReader::new()),
            Box::new(SqliteReadingStore::new()),
            config,
        )
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Setting this flag stops the run before its next batch. It is never
    /// reset by the runner.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    fn transition(&mut self, next: RunState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        tracing::debug!(from = %self.state, to = %next, "Run state");
        self.state = next;
    }

    fn fail(
        &mut self,
        err: SimulationError,
        progress: Option<&dyn Fn(ProgressEvent)>,
    ) -> SimulationError {
        tracing::error!(state = %self.state, error = %err, "Run failed");
        self.transition(RunState::Failed);
        if let Some(progress) = progress {
            progress(ProgressEvent::Failed { error: err.to_string() });
        }
        err
    }

    /// Delete readings in the configured subject range (all when unset).
    pub fn clear(&self, conn: &Connection) -> Result<usize, SimulationError> {
        self.store.clear(conn, self.config.subject_range)
    }

    /// Execute one full run. The runner can be reused; each call starts
    /// again from `Init`.
    pub fn run(
        &mut self,
        conn: &Connection,
        progress: Option<&dyn Fn(ProgressEvent)>,
    ) -> Result<RunSummary, SimulationError> {
        let start = Instant::now();
        let run_id = Uuid::new_v4().to_string();
        self.state = RunState::Init;

        if let Err(e) = self.config.validate() {
            return Err(self.fail(e, progress));
        }

        let now = self.config.now.unwrap_or_else(default_now);
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        // ── Cohort ──
        self.transition(RunState::ReadingCohort);
        let cohort = match self.reader.read_cohort(conn, self.config.subject_range, now.date()) {
            Ok(c) => c,
            Err(e) => return Err(self.fail(e, progress)),
        };

        // ── Profiles and generators ──
        self.transition(RunState::Generating);
        if cohort.is_empty() {
            return Err(self.fail(SimulationError::EmptyCohort, progress));
        }

        let assigner = ProfileAssigner::new();
        let assignments: Vec<ProfileAssignment> = cohort
            .into_iter()
            .map(|subject| {
                let profile = assigner.assign(&subject, &mut rng);
                ProfileAssignment { subject, profile }
            })
            .collect();
        // One seed per subject keeps output independent of the worker count.
        let seeds: Vec<u64> = assignments.iter().map(|_| rng.gen()).collect();

        log_distribution(&assignments);
        tracing::info!(
            run_id = %run_id,
            subjects = assignments.len(),
            history_days = self.config.history_days,
            workers = self.config.workers,
            seeded = self.config.seed.is_some(),
            "Generation started"
        );
        if let Some(progress) = progress {
            progress(ProgressEvent::Started {
                run_id: run_id.clone(),
                subject_count: assignments.len(),
            });
        }

        let generator = VitalSignGenerator::new(
            self.config.profiles.clone(),
            CircadianModel::new(self.config.circadian.clone()),
            self.config.capture.clone(),
        );
        let scheduler = MeasurementScheduler::new(
            self.config.schedule.clone(),
            self.config.profiles.clone(),
            self.config.history_days,
            now,
        );
        let mut summary =
            SummaryAccumulator::new(&assignments, |a| scheduler.window_start(&a.subject), now);

        // ── Write ──
        self.transition(RunState::Writing);
        if self.config.clear_first {
            if let Err(e) = self.store.clear(conn, self.config.subject_range) {
                return Err(self.fail(e, progress));
            }
        }

        let workers = self.config.workers;
        let chunk_len = workers * SUBJECTS_PER_WORKER_CHUNK;
        let readings = (0..assignments.len()).step_by(chunk_len).flat_map(|from| {
            let to = (from + chunk_len).min(assignments.len());
            generate_chunk(&generator, &scheduler, &assignments[from..to], &seeds[from..to], workers)
        });

        let writer = BatchWriter::new(self.store.as_ref(), self.config.batch_size)
            .with_cancel_flag(self.cancel.clone());
        let outcome = writer.write(conn, readings, &mut |batch| summary.observe(batch), progress);

        let outcome = match outcome {
            Ok(o) => o,
            Err(e) => return Err(self.fail(e, progress)),
        };

        self.transition(RunState::Done);
        let elapsed = start.elapsed();
        let summary = summary.finish(
            run_id,
            RunState::Done,
            self.config.seed,
            outcome.batches,
            elapsed.as_millis() as u64,
            readings_per_second(outcome.written, elapsed),
        );

        tracing::info!(
            run_id = %summary.run_id,
            readings = summary.readings_written,
            batches = summary.batches_committed,
            elapsed_ms = summary.elapsed_ms,
            invariant_failures = summary.invariant_failures,
            "Generation complete"
        );
        if let Some(progress) = progress {
            progress(ProgressEvent::Completed {
                total_written: summary.readings_written,
                elapsed_ms: summary.elapsed_ms,
            });
        }

        Ok(summary)
    }
}

/// All readings for one subject, from its own seeded RNG.
fn simulate_subject(
    generator: &VitalSignGenerator,
    scheduler: &MeasurementScheduler,
    assignment: &ProfileAssignment,
    seed: u64,
) -> Vec<Reading> {
    let mut rng = StdRng::seed_from_u64(seed);
    let schedule = scheduler.schedule(&assignment.subject, assignment.profile, &mut rng);
    generator.generate_timeline(assignment, &schedule, &mut rng)
}

/// Generate a chunk of subjects, in subject order, across up to `workers`
/// scoped threads.
fn generate_chunk(
    generator: &VitalSignGenerator,
    scheduler: &MeasurementScheduler,
    assignments: &[ProfileAssignment],
    seeds: &[u64],
    workers: usize,
) -> Vec<Reading> {
    if workers <= 1 || assignments.len() <= 1 {
        return assignments
            .iter()
            .zip(seeds)
            .flat_map(|(a, &seed)| simulate_subject(generator, scheduler, a, seed))
            .collect();
    }

    let per_worker = assignments.len().div_ceil(workers);
    std::thread::scope(|scope| {
        let handles: Vec<_> = assignments
            .chunks(per_worker)
            .zip(seeds.chunks(per_worker))
            .map(|(part, part_seeds)| {
                scope.spawn(move || {
                    part.iter()
                        .zip(part_seeds)
                        .flat_map(|(a, &seed)| simulate_subject(generator, scheduler, a, seed))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        handles
            .into_iter()
            .flat_map(|h| match h.join() {
                Ok(readings) => readings,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    })
}

fn log_distribution(assignments: &[ProfileAssignment]) {
    let count = |p: RiskProfile| assignments.iter().filter(|a| a.profile == p).count();
    tracing::info!(
        healthy = count(RiskProfile::Healthy),
        moderate_risk = count(RiskProfile::ModerateRisk),
        pathological = count(RiskProfile::Pathological),
        "Profiles assigned"
    );
}

/// Current local time as the default end of the history window.
pub fn default_now() -> NaiveDateTime {
    Local::now().naive_local()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{
        get_readings_for_subject, insert_cohort_member, insert_device, open_memory_database,
        CohortMember, DatabaseError, MemberIds, SubjectRange,
    };
    use crate::models::Sex;
    use chrono::{Duration, NaiveDate};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 6, 15).unwrap().and_hms_opt(12, 0, 0).unwrap()
    }

    fn elderly_multimorbid() -> CohortMember {
        CohortMember {
            date_of_birth: NaiveDate::from_ymd_opt(1956, 1, 10).unwrap(),
            sex: Some(Sex::Male),
            smoker: Some(false),
            diabetic: Some(true),
            hypertensive: Some(false),
            cardiac_history: Some(true),
            device_serial: String::new(),
            device_bound_at: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap().and_hms_opt(8, 0, 0).unwrap(),
            device_active: Some(true),
        }
    }

    fn seed_cohort(conn: &Connection, n: usize) -> Vec<MemberIds> {
        (0..n)
            .map(|i| {
                let mut m = elderly_multimorbid();
                m.device_serial = format!("SW-{i:04}");
                insert_cohort_member(conn, &m).unwrap()
            })
            .collect()
    }

    fn config(batch_size: usize) -> SimulationConfig {
        SimulationConfig {
            history_days: 30,
            batch_size,
            seed: Some(2026),
            now: Some(now()),
            ..Default::default()
        }
    }

    /// Store wrapper that counts insert calls and can fail a given batch.
    struct CountingStore {
        inner: SqliteReadingStore,
        inserts: Arc<AtomicUsize>,
        fail_at: Option<usize>,
    }

    impl CountingStore {
        fn new(inserts: Arc<AtomicUsize>, fail_at: Option<usize>) -> Self {
            Self { inner: SqliteReadingStore::new(), inserts, fail_at }
        }
    }

    impl ReadingStore for CountingStore {
        fn insert_batch(&self, conn: &Connection, readings: &[Reading]) -> Result<usize, DatabaseError> {
            let n = self.inserts.fetch_add(1, Ordering::SeqCst);
            if Some(n) == self.fail_at {
                return Err(DatabaseError::ConstraintViolation("disk full".into()));
            }
            self.inner.insert_batch(conn, readings)
        }

        fn clear(&self, conn: &Connection, range: Option<SubjectRange>) -> Result<usize, SimulationError> {
            self.inner.clear(conn, range)
        }

        fn count(&self, conn: &Connection, range: Option<SubjectRange>) -> Result<i64, SimulationError> {
            self.inner.count(conn, range)
        }
    }

    fn counting_runner(config: SimulationConfig, fail_at: Option<usize>) -> (SimulationRunner, Arc<AtomicUsize>) {
        let inserts = Arc::new(AtomicUsize::new(0));
        let runner = SimulationRunner::new(
            Box::new(SqliteCohortReader::new()),
            Box::new(CountingStore::new(inserts.clone(), fail_at)),
            config,
        );
        (runner, inserts)
    }

    fn all_readings(conn: &Connection, ids: &[MemberIds]) -> Vec<Reading> {
        ids.iter()
            .flat_map(|m| get_readings_for_subject(conn, m.subject_id).unwrap())
            .collect()
    }

    #[test]
    fn empty_cohort_fails_without_writing() {
        let conn = open_memory_database().unwrap();
        let (mut runner, inserts) = counting_runner(config(500), None);

        let err = runner.run(&conn, None).unwrap_err();

        assert!(matches!(err, SimulationError::EmptyCohort));
        assert!(err.is_config());
        assert_eq!(runner.state(), RunState::Failed);
        assert_eq!(inserts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn invalid_config_fails_before_reading() {
        let conn = open_memory_database().unwrap();
        seed_cohort(&conn, 1);
        let (mut runner, inserts) = counting_runner(SimulationConfig { batch_size: 0, ..config(1) }, None);

        let err = runner.run(&conn, None).unwrap_err();
        assert!(matches!(err, SimulationError::Config(_)));
        assert_eq!(runner.state(), RunState::Failed);
        assert_eq!(inserts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn elderly_multimorbid_scenario_completes() {
        let conn = open_memory_database().unwrap();
        let ids = seed_cohort(&conn, 40);
        let mut runner = SimulationRunner::sqlite(config(500));

        let summary = runner.run(&conn, None).unwrap();

        assert_eq!(runner.state(), RunState::Done);
        assert_eq!(summary.state, RunState::Done);
        assert_eq!(summary.subjects, 40);
        assert!(summary.readings_written > 40 * 30 * 10);
        assert_eq!(summary.invariant_failures, 0);
        assert_eq!(summary.batches_committed, summary.readings_written.div_ceil(500));

        let healthy = summary.profile_share(RiskProfile::Healthy).unwrap();
        assert!(healthy.percentage < 30.0, "healthy share {}", healthy.percentage);

        let stored = all_readings(&conn, &ids);
        assert_eq!(stored.len(), summary.readings_written);
        let window_start = now() - Duration::days(30);
        for r in &stored {
            let violations = r.invariant_violations(window_start, now());
            assert!(violations.is_empty(), "{violations:?} in {r:?}");
        }
    }

    #[test]
    fn failed_batch_keeps_committed_batches() {
        let conn = open_memory_database().unwrap();
        let ids = seed_cohort(&conn, 5);
        let (mut runner, _) = counting_runner(config(200), Some(2));

        let err = runner.run(&conn, None).unwrap_err();

        match err {
            SimulationError::Persistence { batch_index, offset, .. } => {
                assert_eq!(batch_index, 2);
                assert_eq!(offset, 400);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(runner.state(), RunState::Failed);
        assert_eq!(all_readings(&conn, &ids).len(), 400);
    }

    #[test]
    fn cancellation_stops_between_batches() {
        let conn = open_memory_database().unwrap();
        let ids = seed_cohort(&conn, 5);
        let mut runner = SimulationRunner::sqlite(config(100));
        let flag = runner.cancel_flag();
        let progress = move |e: ProgressEvent| {
            if matches!(e, ProgressEvent::BatchCommitted { .. }) {
                flag.store(true, Ordering::Relaxed);
            }
        };

        let err = runner.run(&conn, Some(&progress)).unwrap_err();

        assert!(matches!(err, SimulationError::Cancelled { committed: 100 }));
        assert_eq!(runner.state(), RunState::Failed);
        assert_eq!(all_readings(&conn, &ids).len(), 100);
    }

    #[test]
    fn seeded_runs_are_reproducible_across_worker_counts() {
        let run = |workers: usize| {
            let conn = open_memory_database().unwrap();
            let ids = seed_cohort(&conn, 12);
            let mut runner = SimulationRunner::sqlite(SimulationConfig { workers, ..config(300) });
            runner.run(&conn, None).unwrap();
            all_readings(&conn, &ids)
        };

        let first = run(1);
        assert!(!first.is_empty());
        assert_eq!(first, run(1));
        assert_eq!(first, run(4));
    }

    #[test]
    fn clear_first_replaces_previous_run() {
        let conn = open_memory_database().unwrap();
        let ids = seed_cohort(&conn, 3);
        let mut runner = SimulationRunner::sqlite(SimulationConfig { clear_first: true, ..config(1000) });

        runner.run(&conn, None).unwrap();
        let second = runner.run(&conn, None).unwrap();

        assert_eq!(all_readings(&conn, &ids).len(), second.readings_written);
    }

    #[test]
    fn replaced_device_measured_once_through_newest() {
        let conn = open_memory_database().unwrap();
        let ids = seed_cohort(&conn, 1);
        let replaced_at = NaiveDate::from_ymd_opt(2026, 6, 10).unwrap().and_hms_opt(9, 0, 0).unwrap();
        let newest = insert_device(&conn, ids[0].subject_id, "SW-NEW", replaced_at, Some(true)).unwrap();
        let mut runner = SimulationRunner::sqlite(config(500));

        let summary = runner.run(&conn, None).unwrap();

        assert_eq!(summary.subjects, 1);
        assert_eq!(summary.profiles.iter().map(|p| p.subjects).sum::<usize>(), 1);
        assert_eq!(summary.invariant_failures, 0);
        let stored = all_readings(&conn, &ids);
        assert_eq!(stored.len(), summary.readings_written);
        assert!(stored.iter().all(|r| r.device_id == newest && r.timestamp >= replaced_at));
    }

    #[test]
    fn subject_range_limits_run_and_clear() {
        let conn = open_memory_database().unwrap();
        let ids = seed_cohort(&conn, 4);
        let range = SubjectRange { from: ids[1].subject_id, to: ids[2].subject_id };
        let mut runner =
            SimulationRunner::sqlite(SimulationConfig { subject_range: Some(range), ..config(1000) });

        let summary = runner.run(&conn, None).unwrap();
        assert_eq!(summary.subjects, 2);
        assert!(get_readings_for_subject(&conn, ids[0].subject_id).unwrap().is_empty());
        assert!(!get_readings_for_subject(&conn, ids[1].subject_id).unwrap().is_empty());

        assert_eq!(runner.clear(&conn).unwrap(), summary.readings_written);
        assert_eq!(runner.clear(&conn).unwrap(), 0);
    }

    #[test]
    fn progress_events_bracket_the_run() {
        let conn = open_memory_database().unwrap();
        seed_cohort(&conn, 2);
        let events = std::sync::Mutex::new(Vec::new());
        let progress = |e: ProgressEvent| events.lock().unwrap().push(e);
        let mut runner = SimulationRunner::sqlite(config(3000));

        runner.run(&conn, Some(&progress)).unwrap();

        let events = events.into_inner().unwrap();
        assert!(matches!(events.first(), Some(ProgressEvent::Started { subject_count: 2, .. })));
        assert!(matches!(events.last(), Some(ProgressEvent::Completed { .. })));
    }
}
