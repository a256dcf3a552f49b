//! Pipeline coordinator
//!
//! Owns the producer threads and the drain loop. One OS thread per capture
//! source pushes raw frames into its queue; the coordinator thread
//! try-pops, gates startup until both sources are live, runs the
//! normalizing stages, and forwards the merged stream to the sink. No
//! queue operation blocks; the coordinator polls and parks briefly when a
//! full pass moves nothing (busy-wait traded for simplicity and latency).
//!
//! Shutdown is fast rather than complete: on cancel the producers are
//! joined first, then everything still queued is discarded, not flushed.

use log::{debug, error, info, warn};
use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::cfr::CfrVideoBuffer;
use super::error::PipelineError;
use super::health::PipelineHealth;
use super::merger::StreamMerger;
use super::packetizer::AudioPacketizer;
use super::queue::FrameQueue;
use super::state::PipelineState;
use super::types::{ClockDomain, MediaFrame, MediaKind, cmp_normalized};
use crate::config::{self, PipelineConfig};
use crate::resample::Resampler;
use crate::sink::{OutputSink, SinkStatus};
use crate::source::{CaptureSource, SourceError};
use crate::utils::sos::SignalOfStop;

/// One capture producer thread and its handoff state
struct Producer {
    alive: Arc<AtomicBool>,
    error: Arc<Mutex<Option<SourceError>>>,
    handle: JoinHandle<()>,
}

impl Producer {
    fn spawn(
        name: &str,
        mut source: Box<dyn CaptureSource>,
        queue: Arc<FrameQueue>,
        sos: SignalOfStop,
    ) -> std::io::Result<Self> {
        let alive = Arc::new(AtomicBool::new(true));
        let error = Arc::new(Mutex::new(None));
        let thread_alive = Arc::clone(&alive);
        let thread_error = Arc::clone(&error);
        let thread_name = name.to_string();

        let handle = std::thread::Builder::new().name(name.to_string()).spawn(move || {
            while !sos.cancelled() {
                // The device read is the only place this thread may block
                match source.next_frame() {
                    Ok(Some(frame)) => queue.push(frame),
                    Ok(None) => {
                        if !source.has_next() {
                            info!("{}: end of stream", thread_name);
                            break;
                        }
                        // Device had nothing yet; back off briefly
                        std::thread::sleep(Duration::from_millis(1));
                    }
                    Err(e) => {
                        error!("{}: {}", thread_name, e);
                        *thread_error.lock().unwrap() = Some(e);
                        break;
                    }
                }
            }
            thread_alive.store(false, AtomicOrdering::Release);
        })?;

        Ok(Self {
            alive,
            error,
            handle,
        })
    }

    fn is_alive(&self) -> bool {
        self.alive.load(AtomicOrdering::Acquire)
    }

    fn take_error(&self) -> Option<SourceError> {
        self.error.lock().unwrap().take()
    }
}

/// Everything the coordinator thread owns while running
struct Engine {
    video_clock: ClockDomain,
    audio_clock: ClockDomain,
    video_queue: Arc<FrameQueue>,
    audio_queue: Arc<FrameQueue>,
    cfr: CfrVideoBuffer,
    packetizer: AudioPacketizer,
    merger: StreamMerger,
    resampler: Box<dyn Resampler>,
    sink: Box<dyn OutputSink>,
    health: Arc<PipelineHealth>,
    state: PipelineState,
    video_seen: bool,
    audio_seen: bool,
    /// First forwarded timestamp per stream; both streams are rebased so
    /// sink timestamps start near zero
    video_rebase: Option<i64>,
    audio_rebase: Option<i64>,
    /// Frame the sink refused with NotReady, offered again before any pop
    pending: Option<MediaFrame>,
}

impl Engine {
    fn new(
        config: &PipelineConfig,
        video_clock: ClockDomain,
        audio_clock: ClockDomain,
        video_queue: Arc<FrameQueue>,
        audio_queue: Arc<FrameQueue>,
        resampler: Box<dyn Resampler>,
        sink: Box<dyn OutputSink>,
        health: Arc<PipelineHealth>,
    ) -> Self {
        Self {
            video_clock,
            audio_clock,
            video_queue,
            audio_queue,
            cfr: CfrVideoBuffer::new(config.video.pts_interval()),
            packetizer: AudioPacketizer::new(config.packetizer_config()),
            merger: StreamMerger::new(config.merger_config()),
            resampler,
            sink,
            health,
            state: PipelineState::Idle,
            video_seen: false,
            audio_seen: false,
            video_rebase: None,
            audio_rebase: None,
            pending: None,
        }
    }

    fn gate_open(&self) -> bool {
        self.state.is_running()
    }

    /// Drain the raw queues, always taking the earlier normalized head
    /// first so neither queue grows unbounded relative to the other.
    /// Frames seen before the startup gate opens are discarded.
    fn intake(&mut self) -> Result<bool, PipelineError> {
        let mut moved = false;
        loop {
            let audio_head = self.audio_queue.head_pts();
            let video_head = self.video_queue.head_pts();
            let pick = match (audio_head, video_head) {
                (None, None) => break,
                (Some(_), None) => MediaKind::Audio,
                (None, Some(_)) => MediaKind::Video,
                (Some(a), Some(v)) => {
                    let cmp = cmp_normalized(
                        a,
                        self.audio_clock.rate,
                        v,
                        self.video_clock.rate,
                    );
                    if cmp != Ordering::Greater {
                        MediaKind::Audio
                    } else {
                        MediaKind::Video
                    }
                }
            };

            // Only this thread pops, so a seen head cannot vanish
            let Some(frame) = (match pick {
                MediaKind::Audio => self.audio_queue.pop_front(),
                MediaKind::Video => self.video_queue.pop_front(),
            }) else {
                break;
            };
            moved = true;

            if !self.gate_open() {
                match frame.kind {
                    MediaKind::Video => self.video_seen = true,
                    MediaKind::Audio => self.audio_seen = true,
                }
                self.health.record_gate_discard();
                if self.video_seen
                    && self.audio_seen
                    && self.state == PipelineState::WaitingForSources
                {
                    self.state = PipelineState::Running {
                        started_at: Instant::now(),
                    };
                    info!("coordinator: both sources live, gate open");
                }
                continue; // discarded: no lead-in biased toward the faster source
            }

            match frame.kind {
                MediaKind::Video => self.forward_video(frame),
                MediaKind::Audio => self.forward_audio(frame),
            }
        }
        Ok(moved)
    }

    fn forward_video(&mut self, mut frame: MediaFrame) {
        let rebase = *self.video_rebase.get_or_insert(frame.pts);
        frame.pts -= rebase;
        self.cfr.consume(frame);
        while let Some(normalized) = self.cfr.get_next() {
            self.merger.push_video(normalized);
        }
    }

    fn forward_audio(&mut self, mut frame: MediaFrame) {
        let rebase = *self.audio_rebase.get_or_insert(frame.pts);
        frame.pts -= rebase;
        match self.packetizer.push(frame) {
            Ok(()) => {}
            Err(PipelineError::OrderingViolation { got, last }) => {
                // Rejected frame, pipeline continues
                warn!("coordinator: audio ordering violation ({} after {})", got, last);
            }
            Err(e) => warn!("coordinator: audio frame rejected: {}", e),
        }
    }

    /// Pull finished audio frames out of the packetizer into the merger
    fn pump_audio(&mut self) -> Result<bool, PipelineError> {
        let mut moved = false;
        while let Some(frame) = self.packetizer.next_frame(self.resampler.as_mut())? {
            self.merger.push_audio(frame);
            moved = true;
        }
        Ok(moved)
    }

    /// Forward merged frames to the sink in global order.
    ///
    /// A lone head is held back while the other stream can still deliver
    /// earlier data (the audio window and pool add latency); once a stream
    /// has ended the survivor drains freely. A NotReady frame parks in
    /// `pending` and is offered again before anything else is popped.
    fn pump_sink(&mut self, video_ended: bool, audio_ended: bool) -> Result<bool, PipelineError> {
        let mut moved = false;
        loop {
            let frame = match self.pending.take() {
                Some(frame) => frame,
                None => {
                    let (audio_queued, video_queued) = self.merger.sizes();
                    let both_present = audio_queued > 0 && video_queued > 0;
                    let sole_survivor = (audio_queued > 0 && video_ended)
                        || (video_queued > 0 && audio_ended);
                    if !both_present && !sole_survivor {
                        break;
                    }
                    match self.merger.pop_next() {
                        Some(frame) => frame,
                        None => break,
                    }
                }
            };

            let wallclock = match frame.kind {
                MediaKind::Audio => self.audio_clock.rate.ticks_to_micros(frame.pts),
                MediaKind::Video => self.video_clock.rate.ticks_to_micros(frame.pts),
            };
            let size = frame.size();
            // Payload is refcounted; the clone keeps a retry copy cheap
            let status = match frame.kind {
                MediaKind::Video => self.sink.push_video_frame(frame.clone(), wallclock)?,
                MediaKind::Audio => self.sink.push_audio_frame(frame.clone(), wallclock)?,
            };
            match status {
                SinkStatus::Accepted => {
                    self.health.record_merged_frame(size);
                    moved = true;
                }
                SinkStatus::NotReady => {
                    debug!("coordinator: sink not ready, holding frame");
                    self.pending = Some(frame);
                    break;
                }
            }
        }
        Ok(moved)
    }

    /// One full non-blocking pass over the pipeline. Returns whether
    /// anything moved.
    fn drain_step(&mut self, video_alive: bool, audio_alive: bool) -> Result<bool, PipelineError> {
        let mut moved = self.intake()?;
        moved |= self.pump_audio()?;

        let video_ended =
            !video_alive && !self.video_queue.has_next() && !self.cfr.has_next();
        let audio_ended =
            !audio_alive && !self.audio_queue.has_next() && !self.packetizer.has_next();
        moved |= self.pump_sink(video_ended, audio_ended)?;

        let (duplicated, dropped) = self.cfr.stats();
        self.health.set_video_stats(duplicated, dropped);
        let (resyncs, violations) = self.packetizer.stats();
        self.health.set_audio_stats(resyncs, violations);
        Ok(moved)
    }

    /// Whether everything forwardable has been forwarded
    fn is_drained(&self) -> bool {
        self.pending.is_none()
            && !self.video_queue.has_next()
            && !self.audio_queue.has_next()
            && !self.merger.has_next()
            && !self.cfr.has_next()
            && !self.packetizer.has_next()
    }

    /// Discard everything still queued. Fast shutdown beats completeness.
    fn discard_remaining(&mut self) {
        let mut discarded = self.video_queue.clear() + self.audio_queue.clear();
        discarded += self.merger.clear();
        if self.pending.take().is_some() {
            discarded += 1;
        }
        // The CFR tail and sub-frame audio pool go down with their stages
        self.health.record_shutdown_discards(discarded as u64);
        if discarded > 0 {
            info!("coordinator: discarded {} frames at shutdown", discarded);
        }
    }
}

/// Starts and stops the producers, gates startup, and drains the merged
/// stream to the sink
pub struct PipelineCoordinator {
    sos: SignalOfStop,
    health: Arc<PipelineHealth>,
    handle: Option<JoinHandle<()>>,
}

impl PipelineCoordinator {
    /// Spawn the producer threads and the coordinator thread.
    ///
    /// `video_source` and `audio_source` must produce the media kind their
    /// name says; the sources' clock domains configure every cross-stream
    /// comparison downstream.
    pub fn launch(
        pipeline_config: PipelineConfig,
        video_source: Box<dyn CaptureSource>,
        audio_source: Box<dyn CaptureSource>,
        resampler: Box<dyn Resampler>,
        sink: Box<dyn OutputSink>,
    ) -> anyhow::Result<Self> {
        config::init();

        if video_source.media_kind() != MediaKind::Video {
            anyhow::bail!("video source produces {}", video_source.media_kind());
        }
        if audio_source.media_kind() != MediaKind::Audio {
            anyhow::bail!("audio source produces {}", audio_source.media_kind());
        }

        let sos = SignalOfStop::new();
        let health = Arc::new(PipelineHealth::new());
        let video_queue = Arc::new(FrameQueue::new());
        let audio_queue = Arc::new(FrameQueue::new());

        let video_clock = video_source.clock();
        let audio_clock = audio_source.clock();

        let video_producer = Producer::spawn(
            "video-capture",
            video_source,
            Arc::clone(&video_queue),
            sos.clone(),
        )?;
        let audio_producer = Producer::spawn(
            "audio-capture",
            audio_source,
            Arc::clone(&audio_queue),
            sos.clone(),
        )?;

        let mut engine = Engine::new(
            &pipeline_config,
            video_clock,
            audio_clock,
            video_queue,
            audio_queue,
            resampler,
            sink,
            Arc::clone(&health),
        );

        let loop_sos = sos.clone();
        let handle = std::thread::Builder::new()
            .name("coordinator".to_string())
            .spawn(move || {
                run_loop(&mut engine, video_producer, audio_producer, loop_sos);
            })?;

        Ok(Self {
            sos,
            health,
            handle: Some(handle),
        })
    }

    pub fn health(&self) -> Arc<PipelineHealth> {
        Arc::clone(&self.health)
    }

    /// Request shutdown and join every pipeline thread
    pub fn close(&mut self) {
        self.sos.cancel();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("coordinator thread panicked");
            }
        }
    }
}

impl Drop for PipelineCoordinator {
    fn drop(&mut self) {
        self.close();
    }
}

fn run_loop(engine: &mut Engine, video: Producer, audio: Producer, sos: SignalOfStop) {
    engine.state = PipelineState::WaitingForSources;
    info!("coordinator: waiting for both sources");

    while !sos.cancelled() {
        let video_alive = video.is_alive();
        let audio_alive = audio.is_alive();

        match engine.drain_step(video_alive, audio_alive) {
            Ok(true) => continue,
            Ok(false) => {}
            Err(e) => {
                // Sole escalation point for hard failures
                error!("coordinator: {}", e);
                break;
            }
        }

        // Nothing moved; deal with dead producers before parking
        if !video_alive || !audio_alive {
            if let Some(e) = video.take_error() {
                error!("coordinator: video source fatal: {}", e);
            }
            if let Some(e) = audio.take_error() {
                error!("coordinator: audio source fatal: {}", e);
            }
            if !engine.state.is_running() {
                // The gate can still open if the dead source delivered
                // anything at all; a source that died without producing
                // leaves it closed forever.
                let video_hopeless =
                    !video_alive && !engine.video_seen && !engine.video_queue.has_next();
                let audio_hopeless =
                    !audio_alive && !engine.audio_seen && !engine.audio_queue.has_next();
                if video_hopeless || audio_hopeless {
                    error!("coordinator: a source ended before producing; aborting");
                    break;
                }
            } else if !video_alive && !audio_alive && engine.is_drained() {
                info!("coordinator: both sources ended, output drained");
                break;
            }
            // One stream survives: keep draining it
        }

        sos.wait_cancellation_timeout(Duration::from_millis(1));
    }

    // Join producers before any teardown
    sos.cancel();
    engine.state = PipelineState::Draining;
    if video.handle.join().is_err() {
        error!("video producer panicked");
    }
    if audio.handle.join().is_err() {
        error!("audio producer panicked");
    }

    engine.discard_remaining();
    if let Err(e) = engine.sink.close() {
        error!("coordinator: sink close failed: {}", e);
    }
    engine.state = PipelineState::Stopped;
    info!("coordinator: stopped. {}", engine.health.summary());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AudioStreamConfig, VideoStreamConfig};
    use crate::pipeline::types::{SampleFormat, TickRate};
    use crate::resample::PcmResampler;
    use crate::sink::{CountingSink, SinkError};
    use bytes::Bytes;
    use std::collections::VecDeque;

    fn test_config() -> PipelineConfig {
        PipelineConfig {
            video: VideoStreamConfig {
                width: 4,
                height: 4,
                fps_out: 30,
                tick_rate: TickRate::per_second(1000),
            },
            audio: AudioStreamConfig {
                sample_rate: 48000,
                channels: 1,
                samples_per_frame: 256,
                reorder_window: 2,
                tick_rate: TickRate::per_second(48000),
            },
        }
    }

    fn video_frame(pts: i64) -> MediaFrame {
        MediaFrame::video(Bytes::from_static(&[0u8; 16]), pts, 4, 4)
    }

    fn audio_chunk(pts: i64, samples: usize) -> MediaFrame {
        MediaFrame::audio(
            Bytes::from(vec![0u8; samples * 4]),
            pts,
            48000,
            1,
            SampleFormat::F32,
        )
    }

    /// Sink handle whose counters outlive the engine
    #[derive(Clone)]
    struct SharedSink(Arc<Mutex<CountingSink>>);

    impl SharedSink {
        fn new() -> Self {
            Self(Arc::new(Mutex::new(CountingSink::new())))
        }
    }

    impl OutputSink for SharedSink {
        fn push_video_frame(
            &mut self,
            frame: MediaFrame,
            wallclock_micros: i64,
        ) -> Result<SinkStatus, SinkError> {
            self.0.lock().unwrap().push_video_frame(frame, wallclock_micros)
        }

        fn push_audio_frame(
            &mut self,
            frame: MediaFrame,
            wallclock_micros: i64,
        ) -> Result<SinkStatus, SinkError> {
            self.0.lock().unwrap().push_audio_frame(frame, wallclock_micros)
        }
    }

    /// Sink that refuses every other frame with NotReady
    struct FlakySink {
        inner: SharedSink,
        calls: u64,
    }

    impl OutputSink for FlakySink {
        fn push_video_frame(
            &mut self,
            frame: MediaFrame,
            wallclock_micros: i64,
        ) -> Result<SinkStatus, SinkError> {
            self.calls += 1;
            if self.calls % 2 == 1 {
                return Ok(SinkStatus::NotReady);
            }
            self.inner.push_video_frame(frame, wallclock_micros)
        }

        fn push_audio_frame(
            &mut self,
            frame: MediaFrame,
            wallclock_micros: i64,
        ) -> Result<SinkStatus, SinkError> {
            self.calls += 1;
            if self.calls % 2 == 1 {
                return Ok(SinkStatus::NotReady);
            }
            self.inner.push_audio_frame(frame, wallclock_micros)
        }
    }

    fn test_engine(sink: Box<dyn OutputSink>) -> Engine {
        let config = test_config();
        let mut engine = Engine::new(
            &config,
            ClockDomain::new(MediaKind::Video, config.video.tick_rate),
            ClockDomain::new(MediaKind::Audio, config.audio.tick_rate),
            Arc::new(FrameQueue::new()),
            Arc::new(FrameQueue::new()),
            Box::new(PcmResampler::new()),
            sink,
            Arc::new(PipelineHealth::new()),
        );
        engine.state = PipelineState::WaitingForSources;
        engine
    }

    #[test]
    fn test_gate_discards_until_both_sources_produce() {
        let sink = SharedSink::new();
        let mut engine = test_engine(Box::new(sink.clone()));

        // Five video frames before the first audio frame: all discarded
        for i in 0..5 {
            engine.video_queue.push(video_frame(i * 33));
        }
        engine.drain_step(true, true).unwrap();
        assert!(!engine.gate_open());
        assert_eq!(engine.health.summary().gate_discards, 5);
        assert_eq!(engine.cfr.size(), 0);

        // Audio's first frame opens the gate but is itself discarded
        engine.audio_queue.push(audio_chunk(0, 256));
        engine.drain_step(true, true).unwrap();
        assert!(engine.gate_open());
        assert_eq!(engine.health.summary().gate_discards, 6);

        // Video's sixth frame is forwarded into the CFR stage
        engine.video_queue.push(video_frame(198));
        engine.drain_step(true, true).unwrap();
        assert_eq!(engine.cfr.size(), 1);
        assert_eq!(engine.health.summary().gate_discards, 6);
    }

    #[test]
    fn test_interrupted_before_gate_discards_everything() {
        let sink = SharedSink::new();
        let mut engine = test_engine(Box::new(sink.clone()));

        engine.video_queue.push(video_frame(0));
        engine.discard_remaining();
        assert_eq!(engine.health.summary().shutdown_discards, 1);
        assert_eq!(sink.0.lock().unwrap().video_frames, 0);
    }

    #[test]
    fn test_steady_state_forwards_in_global_order() {
        let sink = SharedSink::new();
        let mut engine = test_engine(Box::new(sink.clone()));

        // Open the gate
        engine.video_queue.push(video_frame(0));
        engine.audio_queue.push(audio_chunk(0, 256));
        engine.drain_step(true, true).unwrap();
        assert!(engine.gate_open());

        // Interleaved jittered video and audio
        for i in 0..12 {
            engine.video_queue.push(video_frame(i * 33 + (i % 3)));
        }
        for i in 0..8 {
            engine.audio_queue.push(audio_chunk(i * 256, 256));
        }
        engine.drain_step(true, true).unwrap();

        // Both streams ended: everything left drains
        engine.drain_step(false, false).unwrap();

        let counts = sink.0.lock().unwrap();
        assert!(counts.video_frames > 0, "no video reached the sink");
        assert!(counts.audio_frames > 0, "no audio reached the sink");
        assert_eq!(counts.out_of_order(), 0);
    }

    #[test]
    fn test_lone_merger_head_is_held_back_while_other_stream_lives() {
        let sink = SharedSink::new();
        let mut engine = test_engine(Box::new(sink.clone()));

        engine.video_queue.push(video_frame(0));
        engine.audio_queue.push(audio_chunk(0, 256));
        engine.drain_step(true, true).unwrap();

        // Video alone after the gate: normalized frames stack up in the
        // merger but none may reach the sink while audio can still
        // deliver earlier timestamps.
        for i in 1..6 {
            engine.video_queue.push(video_frame(i * 33));
        }
        engine.drain_step(true, true).unwrap();
        assert_eq!(sink.0.lock().unwrap().video_frames, 0);
        let (_, video_queued) = engine.merger.sizes();
        assert!(video_queued > 0);

        // Audio catches up: the merge proceeds in global order
        for i in 0..4 {
            engine.audio_queue.push(audio_chunk(i * 256, 256));
        }
        engine.drain_step(true, true).unwrap();
        let counts = sink.0.lock().unwrap();
        assert!(counts.video_frames > 0);
        assert_eq!(counts.out_of_order(), 0);
    }

    #[test]
    fn test_not_ready_sink_loses_nothing() {
        let sink = SharedSink::new();
        let flaky = FlakySink {
            inner: sink.clone(),
            calls: 0,
        };
        let mut engine = test_engine(Box::new(flaky));

        engine.video_queue.push(video_frame(0));
        engine.audio_queue.push(audio_chunk(0, 256));
        engine.drain_step(true, true).unwrap();

        for i in 1..5 {
            engine.video_queue.push(video_frame(i * 33));
            engine.audio_queue.push(audio_chunk((i - 1) * 256, 256));
        }
        // Several passes: every NotReady parks the frame, the next pass
        // offers it again
        for _ in 0..20 {
            engine.drain_step(false, false).unwrap();
        }

        let counts = sink.0.lock().unwrap();
        assert!(counts.video_frames + counts.audio_frames > 0);
        assert_eq!(counts.out_of_order(), 0);
    }

    // ── Threaded end-to-end, scripted sources ───────────────────

    /// Source that warms up, plays a fixed script, then ends or fails
    struct ScriptedSource {
        kind: MediaKind,
        rate: TickRate,
        frames: VecDeque<MediaFrame>,
        fail_at_end: bool,
        opened: bool,
    }

    impl CaptureSource for ScriptedSource {
        fn media_kind(&self) -> MediaKind {
            self.kind
        }

        fn clock(&self) -> ClockDomain {
            ClockDomain::new(self.kind, self.rate)
        }

        fn has_next(&self) -> bool {
            !self.frames.is_empty() || self.fail_at_end
        }

        fn next_frame(&mut self) -> Result<Option<MediaFrame>, SourceError> {
            if !self.opened {
                // Device warm-up: gives the sibling producer time to spawn
                std::thread::sleep(Duration::from_millis(10));
                self.opened = true;
            }
            match self.frames.pop_front() {
                Some(frame) => Ok(Some(frame)),
                None if self.fail_at_end => Err(SourceError::Disconnected),
                None => Ok(None),
            }
        }
    }

    fn scripted_video(count: i64, fail_at_end: bool) -> Box<ScriptedSource> {
        Box::new(ScriptedSource {
            kind: MediaKind::Video,
            rate: TickRate::per_second(1000),
            frames: (0..count).map(|i| video_frame(i * 33 + (i % 4))).collect(),
            fail_at_end,
            opened: false,
        })
    }

    fn scripted_audio(count: i64, fail_at_end: bool) -> Box<ScriptedSource> {
        Box::new(ScriptedSource {
            kind: MediaKind::Audio,
            rate: TickRate::per_second(48000),
            frames: (0..count).map(|i| audio_chunk(i * 256, 256)).collect(),
            fail_at_end,
            opened: false,
        })
    }

    fn wait_for<F: Fn() -> bool>(predicate: F) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !predicate() {
            assert!(Instant::now() < deadline, "timed out waiting for pipeline");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_end_to_end_threaded() {
        let sink = SharedSink::new();
        let mut coordinator = PipelineCoordinator::launch(
            test_config(),
            scripted_video(30, false),
            scripted_audio(40, false),
            Box::new(PcmResampler::new()),
            Box::new(sink.clone()),
        )
        .unwrap();

        let health = coordinator.health();
        wait_for(|| health.frames_merged() >= 20);
        coordinator.close();

        let counts = sink.0.lock().unwrap();
        assert!(counts.video_frames > 0);
        assert!(counts.audio_frames > 0);
        assert_eq!(counts.out_of_order(), 0);
        assert!(health.summary().gate_discards >= 2);
    }

    #[test]
    fn test_video_death_continues_single_stream() {
        let sink = SharedSink::new();
        let mut coordinator = PipelineCoordinator::launch(
            test_config(),
            scripted_video(5, true),
            scripted_audio(60, false),
            Box::new(PcmResampler::new()),
            Box::new(sink.clone()),
        )
        .unwrap();

        let health = coordinator.health();
        // Audio keeps flowing after the video source disconnects
        wait_for(|| health.frames_merged() >= 30);
        coordinator.close();

        let counts = sink.0.lock().unwrap();
        assert!(counts.audio_frames >= 30);
        assert_eq!(counts.out_of_order(), 0);
    }

    #[test]
    fn test_source_dead_before_gate_aborts() {
        let sink = SharedSink::new();
        let mut coordinator = PipelineCoordinator::launch(
            test_config(),
            scripted_video(0, true), // fails before producing anything
            scripted_audio(20, false),
            Box::new(PcmResampler::new()),
            Box::new(sink.clone()),
        )
        .unwrap();

        // Coordinator aborts on its own; close() only joins
        wait_for(|| sink.0.lock().unwrap().audio_frames == 0);
        coordinator.close();
        assert_eq!(coordinator.health().frames_merged(), 0);
    }
}
