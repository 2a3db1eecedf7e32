//! Live attendance session.
//!
//! Three stages:
//!
//! - capture thread: reads the source, thins it to every `skip_frames + 1`-th
//!   frame and feeds a small bounded [`FrameQueue`];
//! - recognition thread: detects, embeds and matches faces against the
//!   gallery;
//! - recorder (the calling thread): owns the tracker and writes attendance.
//!
//! A slow recognizer never stalls a live camera: when the queue is full the
//! oldest waiting frame is evicted, so recognition always works on the most
//! recent frames.

use crate::analyzer::FaceAnalyzer;
use crate::config::Config;
use crate::error::EngineError;
use crate::queue::{FrameQueue, Push};
use crate::tracker::{AttendanceTracker, Decision, WriteOutcome};
use chrono::{Local, NaiveDateTime, NaiveTime, Timelike};
use rollcall_core::{EnrolledFace, MatchMetric, Matcher};
use rollcall_hw::FrameSource;
use rollcall_store::{AttendanceRecord, AttendanceStatus, Store};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub skip_frames: usize,
    pub frame_queue: usize,
    /// Evict the oldest queued frame when the queue is full (live camera)
    /// rather than wait for the recognizer (replay).
    pub drop_when_full: bool,
    pub metric: MatchMetric,
    pub threshold: f32,
    pub cooldown: Duration,
    pub late_after: Option<NaiveTime>,
    pub recorded_by: String,
    /// Stop after this many frames have been read.
    pub max_frames: Option<u64>,
    /// Stop after this much wall time.
    pub duration: Option<Duration>,
    /// Source of the local date and time stamped on attendance rows.
    pub clock: fn() -> NaiveDateTime,
}

impl SessionOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            skip_frames: config.skip_frames,
            frame_queue: config.frame_queue,
            drop_when_full: true,
            metric: config.match_metric,
            threshold: config.threshold(),
            cooldown: config.cooldown(),
            late_after: config.late_after,
            recorded_by: config.recorded_by.clone(),
            max_frames: None,
            duration: None,
            clock: local_now,
        }
    }

    fn status_at(&self, time: NaiveTime) -> AttendanceStatus {
        match self.late_after {
            Some(cutoff) if time > cutoff => AttendanceStatus::Late,
            _ => AttendanceStatus::Present,
        }
    }
}

fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Something the recorder did, streamed to an optional observer.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Marked {
        student_id: String,
        name: String,
        status: AttendanceStatus,
        time: NaiveTime,
        score: f32,
    },
    Suppressed {
        student_id: String,
        name: String,
        reason: Decision,
    },
    Unknown {
        score: f32,
    },
    WriteFailed {
        student_id: String,
        error: String,
    },
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionSummary {
    pub frames_read: u64,
    pub frames_skipped: u64,
    pub frames_dropped: u64,
    pub dark_frames: u64,
    pub frames_analyzed: u64,
    pub faces_seen: u64,
    pub unknown_faces: u64,
    /// Students marked by this session, in order.
    pub marked: Vec<String>,
    pub suppressed: u64,
    pub write_failures: u64,
    pub analyze_errors: u64,
}

/// Asks a running session to wind down. The session finishes the frames
/// already queued before returning.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

enum Sighting {
    Known {
        student_id: String,
        name: String,
        score: f32,
    },
    Unknown {
        score: f32,
    },
}

#[derive(Default)]
struct CaptureStats {
    read: u64,
    skipped: u64,
    dropped: u64,
    dark: u64,
}

#[derive(Default)]
struct RecognitionStats {
    analyzed: u64,
    faces: u64,
    unknown: u64,
    errors: u64,
}

pub struct AttendanceSession<'a, S, A> {
    source: S,
    analyzer: A,
    store: &'a Store,
    options: SessionOptions,
    events: Option<mpsc::UnboundedSender<SessionEvent>>,
    stop: StopHandle,
}

impl<'a, S, A> AttendanceSession<'a, S, A>
where
    S: FrameSource + Send,
    A: FaceAnalyzer + Send,
{
    pub fn new(source: S, analyzer: A, store: &'a Store, options: SessionOptions) -> Self {
        Self {
            source,
            analyzer,
            store,
            options,
            events: None,
            stop: StopHandle::default(),
        }
    }

    pub fn with_events(mut self, tx: mpsc::UnboundedSender<SessionEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Share an existing stop flag, e.g. one wired to Ctrl-C before the
    /// session was built.
    pub fn with_stop(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Run until the source ends or the session is stopped.
    ///
    /// Blocks the calling thread; from async code call it inside
    /// `spawn_blocking`.
    pub fn run(self) -> Result<SessionSummary, EngineError> {
        let Self {
            source,
            analyzer,
            store,
            options,
            events,
            stop,
        } = self;

        let gallery = store.load_gallery()?;
        if gallery.is_empty() {
            return Err(EngineError::EmptyGallery);
        }

        let today = (options.clock)().date();
        let tracker = AttendanceTracker::new(today, store.marked_on(today)?, options.cooldown);
        let matcher = options.metric.matcher();

        tracing::info!(
            faces = gallery.len(),
            metric = %options.metric,
            threshold = options.threshold,
            skip_frames = options.skip_frames,
            queue = options.frame_queue,
            "attendance session starting"
        );

        let frames = FrameQueue::new(options.frame_queue);
        let (sighting_tx, sighting_rx) = mpsc::unbounded_channel::<Sighting>();

        let mut recorder = Recorder {
            store,
            tracker,
            options: &options,
            events,
            summary: SessionSummary::default(),
        };

        let (capture, recognition) = std::thread::scope(|scope| {
            let options = &options;
            let stop = &stop;
            let gallery = gallery.as_slice();
            let matcher = &*matcher;
            let frames = &frames;

            let capture = std::thread::Builder::new()
                .name("rollcall-capture".into())
                .spawn_scoped(scope, move || capture_loop(source, frames, options, stop))
                .map_err(|source| EngineError::Spawn {
                    name: "capture",
                    source,
                })?;

            let recognition = std::thread::Builder::new()
                .name("rollcall-recognition".into())
                .spawn_scoped(scope, move || {
                    recognition_loop(analyzer, frames, sighting_tx, gallery, matcher, options.threshold)
                })
                .map_err(|source| {
                    frames.close();
                    EngineError::Spawn {
                        name: "recognition",
                        source,
                    }
                })?;

            recorder.drain(sighting_rx);

            let capture = capture
                .join()
                .map_err(|_| EngineError::ThreadPanicked("capture"))?;
            let recognition = recognition
                .join()
                .map_err(|_| EngineError::ThreadPanicked("recognition"))?;
            Ok::<_, EngineError>((capture, recognition))
        })?;

        let mut summary = recorder.summary;
        summary.frames_analyzed = recognition.analyzed;
        summary.faces_seen = recognition.faces;
        summary.unknown_faces = recognition.unknown;
        summary.analyze_errors = recognition.errors;

        let capture = capture?;
        summary.frames_read = capture.read;
        summary.frames_skipped = capture.skipped;
        summary.frames_dropped = capture.dropped;
        summary.dark_frames = capture.dark;

        tracing::info!(
            frames = summary.frames_read,
            analyzed = summary.frames_analyzed,
            dropped = summary.frames_dropped,
            faces = summary.faces_seen,
            marked = summary.marked.len(),
            "attendance session finished"
        );
        Ok(summary)
    }
}

fn capture_loop<S: FrameSource>(
    mut source: S,
    frames: &FrameQueue,
    options: &SessionOptions,
    stop: &StopHandle,
) -> Result<CaptureStats, EngineError> {
    let _close = frames.close_on_drop();
    let started = Instant::now();
    let stride = options.skip_frames as u64 + 1;
    let mut stats = CaptureStats::default();

    loop {
        if stop.is_stopped() {
            tracing::debug!("stop requested");
            break;
        }
        if options.max_frames.is_some_and(|max| stats.read >= max) {
            break;
        }
        if options.duration.is_some_and(|d| started.elapsed() >= d) {
            tracing::debug!("session duration reached");
            break;
        }

        let Some(frame) = source.next_frame()? else {
            tracing::debug!(frames = stats.read, "end of stream");
            break;
        };
        let index = stats.read;
        stats.read += 1;

        if index % stride != 0 {
            stats.skipped += 1;
            continue;
        }
        if frame.is_dark {
            stats.dark += 1;
            continue;
        }

        let pushed = if options.drop_when_full {
            frames.push_latest(frame)
        } else {
            frames.push_wait(frame)
        };
        match pushed {
            Push::Queued => {}
            Push::Evicted => stats.dropped += 1,
            Push::Closed => break,
        }
    }
    Ok(stats)
}

fn recognition_loop<A: FaceAnalyzer>(
    mut analyzer: A,
    frames: &FrameQueue,
    tx: mpsc::UnboundedSender<Sighting>,
    gallery: &[EnrolledFace],
    matcher: &dyn Matcher,
    threshold: f32,
) -> RecognitionStats {
    let _close = frames.close_on_drop();
    let mut stats = RecognitionStats::default();

    while let Some(frame) = frames.pop() {
        stats.analyzed += 1;
        let faces = match analyzer.analyze(&frame) {
            Ok(faces) => faces,
            Err(e) => {
                stats.errors += 1;
                tracing::warn!(seq = frame.sequence, error = %e, "frame analysis failed");
                continue;
            }
        };

        for face in faces {
            stats.faces += 1;
            let result = matcher.compare(&face.embedding, gallery, threshold);
            let sighting = match (result.matched, result.student_id, result.name) {
                (true, Some(student_id), Some(name)) => Sighting::Known {
                    student_id,
                    name,
                    score: result.score,
                },
                _ => {
                    stats.unknown += 1;
                    Sighting::Unknown {
                        score: result.score,
                    }
                }
            };
            if tx.send(sighting).is_err() {
                return stats;
            }
        }
    }
    stats
}

struct Recorder<'s, 'o> {
    store: &'s Store,
    tracker: AttendanceTracker,
    options: &'o SessionOptions,
    events: Option<mpsc::UnboundedSender<SessionEvent>>,
    summary: SessionSummary,
}

impl Recorder<'_, '_> {
    fn drain(&mut self, mut rx: mpsc::UnboundedReceiver<Sighting>) {
        while let Some(sighting) = rx.blocking_recv() {
            match sighting {
                Sighting::Known {
                    student_id,
                    name,
                    score,
                } => self.sighted(student_id, name, score),
                Sighting::Unknown { score } => {
                    tracing::debug!(score, "unknown face");
                    self.emit(SessionEvent::Unknown { score });
                }
            }
        }
    }

    fn sighted(&mut self, student_id: String, name: String, score: f32) {
        let now = (self.options.clock)();
        let instant = Instant::now();

        let decision = self.tracker.check(&student_id, now.date(), instant);
        if decision != Decision::Mark {
            tracing::debug!(%student_id, ?decision, "sighting suppressed");
            self.suppressed(student_id, name, decision);
            return;
        }

        let status = self.options.status_at(now.time());
        let time = now.time().with_nanosecond(0).unwrap_or(now.time());
        let record = AttendanceRecord {
            student_id: student_id.clone(),
            date: now.date(),
            time,
            status,
            recorded_by: Some(self.options.recorded_by.clone()),
            notes: None,
        };

        match self.store.mark_attendance(&record) {
            Ok(true) => {
                self.tracker.record(&student_id, instant, WriteOutcome::Inserted);
                tracing::info!(%student_id, %name, %status, score, "attendance marked");
                self.summary.marked.push(student_id.clone());
                self.emit(SessionEvent::Marked {
                    student_id,
                    name,
                    status,
                    time,
                    score,
                });
            }
            Ok(false) => {
                self.tracker.record(&student_id, instant, WriteOutcome::Duplicate);
                self.suppressed(student_id, name, Decision::AlreadyMarked);
            }
            Err(e) => {
                self.tracker.record(&student_id, instant, WriteOutcome::Failed);
                tracing::warn!(%student_id, error = %e, "attendance write failed");
                self.summary.write_failures += 1;
                self.emit(SessionEvent::WriteFailed {
                    student_id,
                    error: e.to_string(),
                });
            }
        }
    }

    fn suppressed(&mut self, student_id: String, name: String, reason: Decision) {
        self.summary.suppressed += 1;
        self.emit(SessionEvent::Suppressed {
            student_id,
            name,
            reason,
        });
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        face, frame, FlakyAnalyzer, RecordingAnalyzer, ScriptedAnalyzer, ScriptedSource,
    };
    use chrono::NaiveDate;
    use rollcall_core::Embedding;
    use rollcall_hw::{Frame, SourceError};
    use rollcall_store::NewStudent;
    use std::path::PathBuf;

    fn morning() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(8, 45, 12)
            .unwrap()
    }

    fn options() -> SessionOptions {
        SessionOptions {
            skip_frames: 0,
            frame_queue: 2,
            drop_when_full: false,
            metric: MatchMetric::Euclidean,
            threshold: 1.10,
            cooldown: Duration::from_secs(300),
            late_after: None,
            recorded_by: "face_recognition".into(),
            max_frames: None,
            duration: None,
            clock: morning,
        }
    }

    fn store_with_ada() -> Store {
        let mut store = Store::open_in_memory().unwrap();
        let student = NewStudent {
            student_id: "S1".into(),
            name: "Ada".into(),
            department: Some("CS".into()),
            ..Default::default()
        };
        store
            .register(&student, &Embedding::new(vec![1.0, 0.0]))
            .unwrap();
        store
    }

    fn drain(mut rx: mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(e) = rx.try_recv() {
            events.push(e);
        }
        events
    }

    #[test]
    fn test_marks_once_and_suppresses_repeats() {
        let store = store_with_ada();
        let analyzer = ScriptedAnalyzer::repeating(vec![face(0.9, &[0.9, 0.1])], 3);
        let (tx, rx) = mpsc::unbounded_channel();

        let summary = AttendanceSession::new(ScriptedSource::new(3), analyzer, &store, options())
            .with_events(tx)
            .run()
            .unwrap();

        assert_eq!(summary.frames_read, 3);
        assert_eq!(summary.frames_analyzed, 3);
        assert_eq!(summary.faces_seen, 3);
        assert_eq!(summary.marked, vec!["S1".to_string()]);
        assert_eq!(summary.suppressed, 2);

        let day = morning().date();
        let rows = store.attendance_between(day, day).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, AttendanceStatus::Present);
        assert_eq!(rows[0].time, NaiveTime::from_hms_opt(8, 45, 12).unwrap());
        assert_eq!(rows[0].recorded_by.as_deref(), Some("face_recognition"));

        let events = drain(rx);
        assert!(matches!(&events[0], SessionEvent::Marked { student_id, .. } if student_id == "S1"));
        assert!(events[1..].iter().all(|e| matches!(
            e,
            SessionEvent::Suppressed { reason: Decision::AlreadyMarked, .. }
        )));
    }

    #[test]
    fn test_late_after_cutoff() {
        let store = store_with_ada();
        let opts = SessionOptions {
            late_after: NaiveTime::from_hms_opt(8, 30, 0),
            ..options()
        };
        let analyzer = ScriptedAnalyzer::repeating(vec![face(0.9, &[1.0, 0.0])], 1);
        AttendanceSession::new(ScriptedSource::new(1), analyzer, &store, opts)
            .run()
            .unwrap();

        let day = morning().date();
        let rows = store.attendance_between(day, day).unwrap();
        assert_eq!(rows[0].status, AttendanceStatus::Late);
    }

    #[test]
    fn test_already_marked_in_store_is_not_rewritten() {
        let store = store_with_ada();
        let day = morning().date();
        store
            .mark_attendance(&AttendanceRecord {
                student_id: "S1".into(),
                date: day,
                time: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
                status: AttendanceStatus::Present,
                recorded_by: Some("manual".into()),
                notes: None,
            })
            .unwrap();

        let analyzer = ScriptedAnalyzer::repeating(vec![face(0.9, &[1.0, 0.0])], 2);
        let summary = AttendanceSession::new(ScriptedSource::new(2), analyzer, &store, options())
            .run()
            .unwrap();

        assert!(summary.marked.is_empty());
        assert_eq!(summary.suppressed, 2);
        let rows = store.attendance_between(day, day).unwrap();
        assert_eq!(rows[0].recorded_by.as_deref(), Some("manual"));
    }

    #[test]
    fn test_unknown_faces_are_counted() {
        let store = store_with_ada();
        let analyzer = ScriptedAnalyzer::new(vec![vec![face(0.9, &[0.0, 1.0])]]);
        let (tx, rx) = mpsc::unbounded_channel();

        let summary = AttendanceSession::new(ScriptedSource::new(1), analyzer, &store, options())
            .with_events(tx)
            .run()
            .unwrap();

        assert_eq!(summary.unknown_faces, 1);
        assert!(summary.marked.is_empty());
        let events = drain(rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], SessionEvent::Unknown { score } if score > 1.10));
    }

    #[test]
    fn test_skips_frames_and_dark_frames() {
        let store = store_with_ada();
        let mut frames: Vec<_> = (0..7).map(|i| frame(i, false)).collect();
        frames[3] = frame(3, true);
        let opts = SessionOptions {
            skip_frames: 2,
            ..options()
        };

        let summary = AttendanceSession::new(
            ScriptedSource::from_frames(frames),
            ScriptedAnalyzer::new(vec![]),
            &store,
            opts,
        )
        .run()
        .unwrap();

        // Frames 0, 3 and 6 are selected; 3 is dark.
        assert_eq!(summary.frames_read, 7);
        assert_eq!(summary.frames_skipped, 4);
        assert_eq!(summary.dark_frames, 1);
        assert_eq!(summary.frames_analyzed, 2);
    }

    #[test]
    fn test_max_frames_and_stop() {
        let store = store_with_ada();
        let opts = SessionOptions {
            max_frames: Some(4),
            ..options()
        };
        let summary = AttendanceSession::new(
            ScriptedSource::new(10),
            ScriptedAnalyzer::new(vec![]),
            &store,
            opts,
        )
        .run()
        .unwrap();
        assert_eq!(summary.frames_read, 4);

        let session = AttendanceSession::new(
            ScriptedSource::new(10),
            ScriptedAnalyzer::new(vec![]),
            &store,
            options(),
        );
        session.stop_handle().stop();
        let summary = session.run().unwrap();
        assert_eq!(summary.frames_read, 0);
    }

    #[test]
    fn test_dropping_accounts_for_every_frame() {
        let store = store_with_ada();
        let opts = SessionOptions {
            skip_frames: 1,
            frame_queue: 1,
            drop_when_full: true,
            ..options()
        };
        let summary = AttendanceSession::new(
            ScriptedSource::new(40),
            ScriptedAnalyzer::new(vec![]),
            &store,
            opts,
        )
        .run()
        .unwrap();

        assert_eq!(summary.frames_read, 40);
        assert_eq!(summary.frames_skipped, 20);
        assert_eq!(summary.frames_analyzed + summary.frames_dropped, 20);
    }

    #[test]
    fn test_full_queue_keeps_newest_frame() {
        let store = store_with_ada();
        let opts = SessionOptions {
            frame_queue: 1,
            drop_when_full: true,
            ..options()
        };
        let analyzer = RecordingAnalyzer::new(Duration::from_millis(50));
        let seen = analyzer.seen();

        let summary = AttendanceSession::new(ScriptedSource::new(5), analyzer, &store, opts)
            .run()
            .unwrap();

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.last(), Some(&4));
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(summary.frames_analyzed as usize, seen.len());
        assert_eq!(summary.frames_analyzed + summary.frames_dropped, 5);
    }

    /// Deletes the student through its own connection when the first frame
    /// is read, after the session has already loaded the gallery.
    struct RemovingSource {
        inner: ScriptedSource,
        db: PathBuf,
        student_id: &'static str,
        removed: bool,
    }

    impl FrameSource for RemovingSource {
        fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
            if !self.removed {
                let store = Store::open(&self.db).unwrap();
                assert!(store.remove_student(self.student_id).unwrap());
                self.removed = true;
            }
            self.inner.next_frame()
        }
    }

    #[test]
    fn test_failed_write_reports_then_cools_down() {
        let db = std::env::temp_dir().join(format!("rollcall-session-{}.db", std::process::id()));
        let _ = std::fs::remove_file(&db);
        let mut store = Store::open(&db).unwrap();
        store
            .register(
                &NewStudent {
                    student_id: "S1".into(),
                    name: "Ada".into(),
                    ..Default::default()
                },
                &Embedding::new(vec![1.0, 0.0]),
            )
            .unwrap();

        let source = RemovingSource {
            inner: ScriptedSource::new(2),
            db: db.clone(),
            student_id: "S1",
            removed: false,
        };
        let analyzer = ScriptedAnalyzer::repeating(vec![face(0.9, &[1.0, 0.0])], 2);
        let (tx, rx) = mpsc::unbounded_channel();

        let summary = AttendanceSession::new(source, analyzer, &store, options())
            .with_events(tx)
            .run()
            .unwrap();

        assert_eq!(summary.write_failures, 1);
        assert_eq!(summary.suppressed, 1);
        assert!(summary.marked.is_empty());

        let events = drain(rx);
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], SessionEvent::WriteFailed { student_id, .. } if student_id == "S1"));
        assert!(matches!(
            &events[1],
            SessionEvent::Suppressed { reason: Decision::CoolingDown, .. }
        ));

        drop(store);
        std::fs::remove_file(&db).unwrap();
    }

    fn at(h: u32, m: u32, s: u32, ms: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_milli_opt(h, m, s, ms)
            .unwrap()
    }

    #[test]
    fn test_late_cutoff_uses_sub_second_time() {
        let store = store_with_ada();
        let opts = SessionOptions {
            late_after: NaiveTime::from_hms_opt(8, 30, 0),
            clock: || at(8, 30, 0, 400),
            ..options()
        };
        let analyzer = ScriptedAnalyzer::repeating(vec![face(0.9, &[1.0, 0.0])], 1);
        AttendanceSession::new(ScriptedSource::new(1), analyzer, &store, opts)
            .run()
            .unwrap();

        let day = morning().date();
        let rows = store.attendance_between(day, day).unwrap();
        assert_eq!(rows[0].status, AttendanceStatus::Late);
        assert_eq!(rows[0].time, NaiveTime::from_hms_opt(8, 30, 0).unwrap());
    }

    #[test]
    fn test_empty_gallery_refuses_to_start() {
        let store = Store::open_in_memory().unwrap();
        let err = AttendanceSession::new(
            ScriptedSource::new(1),
            ScriptedAnalyzer::new(vec![]),
            &store,
            options(),
        )
        .run()
        .unwrap_err();
        assert!(matches!(err, EngineError::EmptyGallery));
    }

    #[test]
    fn test_capture_error_ends_session_after_draining() {
        let store = store_with_ada();
        let analyzer = ScriptedAnalyzer::repeating(vec![face(0.9, &[1.0, 0.0])], 1);
        let source = ScriptedSource::new(1).failing_at_end();

        let err = AttendanceSession::new(source, analyzer, &store, options())
            .run()
            .unwrap_err();
        assert!(matches!(err, EngineError::Source(_)));
        assert!(store.is_marked("S1", morning().date()).unwrap());
    }

    #[test]
    fn test_analyzer_errors_do_not_abort() {
        let store = store_with_ada();
        let summary = AttendanceSession::new(
            ScriptedSource::new(2),
            FlakyAnalyzer::new(1, vec![face(0.9, &[1.0, 0.0])]),
            &store,
            options(),
        )
        .run()
        .unwrap();
        assert_eq!(summary.analyze_errors, 1);
        assert_eq!(summary.marked, vec!["S1".to_string()]);
    }
}
