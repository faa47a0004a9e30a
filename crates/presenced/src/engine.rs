//! The tick loop: frame → faces → identities → emotions → sessions → events.

use crate::dataset::DatasetExtender;
use crate::events::{EmitError, Event, EventEmitter};
use crate::overlay::OverlayWriter;
use crate::shutdown::Shutdown;
use image::imageops::FilterType;
use image::RgbImage;
use presence_core::detector::DetectorError;
use presence_core::emotion::ClassifierError;
use presence_core::identity::GalleryError;
use presence_core::recognizer::RecognizerError;
use presence_core::{
    BoundingBox, EmotionRecognizer, EmotionTracker, EmotionTracking, FaceEmbedder, FaceLocator,
    IdentityMatcher, Person, SessionDiff, SessionDiffer,
};
use presence_hw::{CaptureError, FrameFeed};
use std::io::Write;
use std::time::{Duration, Instant};
use thiserror::Error;

/// A failure confined to one tick. The tick is skipped and the loop goes on.
#[derive(Error, Debug)]
pub enum TickError {
    #[error("frame capture failed: {0}")]
    Capture(#[from] CaptureError),
    #[error("face location failed: {0}")]
    Locate(#[from] DetectorError),
    #[error("face embedding failed: {0}")]
    Embed(#[from] RecognizerError),
    #[error("identity match failed: {0}")]
    Match(#[from] GalleryError),
    #[error("emotion classification failed: {0}")]
    Classify(#[from] ClassifierError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Initializing,
    Running,
    Draining,
    Stopped,
}

/// The model-backed collaborators, in the order a tick uses them.
pub struct Pipeline {
    pub locator: Box<dyn FaceLocator>,
    pub embedder: Box<dyn FaceEmbedder>,
    pub matcher: IdentityMatcher,
    pub classifier: Box<dyn EmotionRecognizer>,
}

/// What one frame contained, before any cross-tick state is touched.
pub struct Observation {
    pub processed: RgbImage,
    pub faces: Vec<BoundingBox>,
    pub people: Vec<Person>,
}

impl Pipeline {
    pub fn observe(&mut self, frame: &RgbImage, process_width: u32) -> Result<Observation, TickError> {
        let processed = resize_to_width(frame, process_width);
        let faces = self.locator.locate(&processed)?;

        let mut people = Vec::with_capacity(faces.len());
        for face in &faces {
            let embedding = self.embedder.embed(&processed, face)?;
            let matched = self.matcher.match_face(&embedding)?;
            let emotion = self.classifier.classify(&processed, face)?;
            tracing::debug!(
                name = %matched.name,
                known = matched.is_known(),
                distance = ?matched.distance,
                %emotion,
                top = face.top,
                left = face.left,
                "face"
            );
            people.push(Person {
                name: matched.name,
                emotion,
            });
        }

        Ok(Observation {
            processed,
            faces,
            people,
        })
    }
}

fn resize_to_width(frame: &RgbImage, width: u32) -> RgbImage {
    let (w, h) = frame.dimensions();
    if w == width || w == 0 {
        return frame.clone();
    }
    let height = ((h as u64 * width as u64) / w as u64).max(1) as u32;
    image::imageops::resize(frame, width, height, FilterType::Triangle)
}

/// Cross-tick state, owned by the loop and handed to each tick.
pub struct TickContext {
    pub sessions: SessionDiffer,
    pub emotions: EmotionTracker,
}

/// Everything a tick decided to report.
#[derive(Debug, Default, PartialEq)]
pub struct TickUpdate {
    /// Faces whose emotion changed, in evaluation order.
    pub emotions: Vec<Person>,
    pub sessions: SessionDiff,
}

impl TickContext {
    pub fn new(tracking: EmotionTracking) -> Self {
        Self {
            sessions: SessionDiffer::new(),
            emotions: EmotionTracker::new(tracking),
        }
    }

    /// Fold one tick's people into the state and report what changed.
    pub fn advance(&mut self, people: &[Person]) -> TickUpdate {
        let emotions = people
            .iter()
            .filter(|p| self.emotions.observe(&p.name, p.emotion))
            .cloned()
            .collect();
        let names: Vec<String> = people.iter().map(|p| p.name.clone()).collect();
        TickUpdate {
            emotions,
            sessions: self.sessions.observe(&names),
        }
    }
}

/// Optional per-tick outputs besides the event stream.
#[derive(Default)]
pub struct Outputs {
    pub dataset: Option<DatasetExtender>,
    pub overlay: Option<OverlayWriter>,
}

/// Ticks counted and wall time spent between `Running` and `Stopped`.
#[derive(Debug, Clone, Copy)]
pub struct RunSummary {
    pub ticks: u64,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn fps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.ticks as f64 / secs
        } else {
            0.0
        }
    }
}

pub struct MainLoop<F: FrameFeed, W: Write> {
    feed: F,
    pipeline: Pipeline,
    outputs: Outputs,
    emitter: EventEmitter<W>,
    shutdown: Shutdown,
    context: TickContext,
    interval: Duration,
    process_width: u32,
    state: LoopState,
}

impl<F: FrameFeed, W: Write> MainLoop<F, W> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        feed: F,
        pipeline: Pipeline,
        outputs: Outputs,
        emitter: EventEmitter<W>,
        shutdown: Shutdown,
        tracking: EmotionTracking,
        interval: Duration,
        process_width: u32,
    ) -> Self {
        Self {
            feed,
            pipeline,
            outputs,
            emitter,
            shutdown,
            context: TickContext::new(tracking),
            interval,
            process_width,
            state: LoopState::Initializing,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn into_emitter(self) -> EventEmitter<W> {
        self.emitter
    }

    /// Tick until shutdown is requested, then release the feed and report.
    ///
    /// Only a failure to write an event ends the loop early; every other
    /// failure is reported as a `status` event and the next tick proceeds.
    pub fn run(&mut self) -> Result<RunSummary, EmitError> {
        self.state = LoopState::Running;
        tracing::info!(
            method = %self.pipeline.locator.method(),
            interval_ms = self.interval.as_millis() as u64,
            process_width = self.process_width,
            "main loop running"
        );

        let started = Instant::now();
        let mut ticks = 0u64;
        let result = loop {
            if let Err(e) = self.tick() {
                break Err(e);
            }
            ticks += 1;

            if self.shutdown.is_requested() || !self.shutdown.sleep(self.interval) {
                break Ok(());
            }
        };

        self.state = LoopState::Draining;
        self.feed.release();
        let summary = RunSummary {
            ticks,
            elapsed: started.elapsed(),
        };
        tracing::info!(
            ticks,
            events = self.emitter.emitted(),
            elapsed_secs = summary.elapsed.as_secs_f64(),
            fps = summary.fps(),
            "main loop drained"
        );

        let report = result.and_then(|()| {
            self.emitter.emit(&Event::status(format!(
                "elapsed time: {:.2}",
                summary.elapsed.as_secs_f64()
            )))?;
            self.emitter
                .emit(&Event::status(format!("approx. FPS: {:.2}", summary.fps())))
        });
        self.state = LoopState::Stopped;
        report.map(|()| summary)
    }

    fn tick(&mut self) -> Result<(), EmitError> {
        let observed = self
            .feed
            .next_frame()
            .map_err(TickError::from)
            .and_then(|frame| {
                let observation = self.pipeline.observe(&frame.image, self.process_width)?;
                Ok((frame, observation))
            });

        let (frame, observation) = match observed {
            Ok(ok) => ok,
            Err(e) => {
                tracing::warn!(error = %e, "tick skipped");
                return self.emitter.emit(&Event::status(e.to_string()));
            }
        };

        let update = self.context.advance(&observation.people);

        for person in update.emotions {
            self.emitter.emit(&Event::Emotion { person })?;
        }

        if let Some(overlay) = &self.outputs.overlay {
            if let Err(e) = overlay.write(&observation.processed, &observation.faces) {
                tracing::warn!(error = %e, "overlay not updated");
            }
        }

        if let Some(dataset) = &self.outputs.dataset {
            for name in &update.sessions.logins {
                if let Err(e) = dataset.save(name, &frame.image) {
                    tracing::warn!(error = %e, name, "dataset not extended");
                    self.emitter
                        .emit(&Event::status(format!("failed to extend dataset: {e}")))?;
                }
            }
        }

        let SessionDiff { logins, logouts } = update.sessions;
        if !logins.is_empty() {
            self.emitter.emit(&Event::Login { names: logins })?;
        }
        if !logouts.is_empty() {
            self.emitter.emit(&Event::Logout { names: logouts })?;
        }
        Ok(())
    }
}
