//! Per-document progress for sync runs.

use std::fmt;
use std::sync::Arc;

/// Step of a sync run an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    CorpusCreated,
    CorpusReused,
    /// Copying a source document into object storage
    Mirror,
    /// Registering a mirror with the corpus
    Ingest,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::CorpusCreated => "created",
            Phase::CorpusReused => "reusing",
            Phase::Mirror => "mirror",
            Phase::Ingest => "ingest",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of a sync run.
///
/// `subject` is the corpus id for corpus phases, the source URI while
/// mirroring and the object name while ingesting. Corpus events carry
/// `current == 0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub phase: Phase,
    pub current: usize,
    pub total: usize,
    pub subject: String,
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.phase {
            Phase::CorpusCreated | Phase::CorpusReused => {
                write!(f, "[corpus] {} {}", self.phase, self.subject)
            }
            Phase::Mirror | Phase::Ingest => write!(
                f,
                "[{}/{}] {} {}",
                self.current, self.total, self.phase, self.subject
            ),
        }
    }
}

pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Forwards run events to an optional callback and to the debug log.
#[derive(Clone, Default)]
pub struct ProgressReporter {
    callback: Option<ProgressCallback>,
}

impl ProgressReporter {
    pub fn new(callback: ProgressCallback) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    pub fn noop() -> Self {
        Self::default()
    }

    fn emit(&self, phase: Phase, current: usize, total: usize, subject: &str) {
        tracing::debug!(phase = %phase, current, total, subject, "Sync progress");

        if let Some(callback) = &self.callback {
            callback(ProgressEvent {
                phase,
                current,
                total,
                subject: subject.to_string(),
            });
        }
    }

    pub fn corpus(&self, corpus_id: &str, created: bool, total: usize) {
        let phase = if created {
            Phase::CorpusCreated
        } else {
            Phase::CorpusReused
        };
        self.emit(phase, 0, total, corpus_id);
    }

    pub fn mirror(&self, current: usize, total: usize, uri: &str) {
        self.emit(Phase::Mirror, current, total, uri);
    }

    pub fn ingest(&self, current: usize, total: usize, object_name: &str) {
        self.emit(Phase::Ingest, current, total, object_name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn capture() -> (ProgressReporter, Arc<Mutex<Vec<ProgressEvent>>>) {
        let events: Arc<Mutex<Vec<ProgressEvent>>> = Arc::default();
        let sink = events.clone();
        let reporter = ProgressReporter::new(Arc::new(move |event: ProgressEvent| {
            sink.lock().unwrap().push(event);
        }));
        (reporter, events)
    }

    #[test]
    fn document_events_show_position() {
        let (reporter, events) = capture();
        reporter.mirror(1, 4, "https://example.org/a.pdf");
        reporter.ingest(1, 4, "documents/0123456789abcdef-a.pdf");

        let events = events.lock().unwrap();
        assert_eq!(events[0].phase, Phase::Mirror);
        assert_eq!(events[0].to_string(), "[1/4] mirror https://example.org/a.pdf");
        assert_eq!(
            events[1].to_string(),
            "[1/4] ingest documents/0123456789abcdef-a.pdf"
        );
    }

    #[test]
    fn corpus_event_names_the_outcome() {
        let (reporter, events) = capture();
        reporter.corpus("projects/p/locations/l/ragCorpora/1", false, 2);

        let events = events.lock().unwrap();
        assert_eq!(events[0].phase, Phase::CorpusReused);
        assert_eq!(events[0].current, 0);
        assert_eq!(
            events[0].to_string(),
            "[corpus] reusing projects/p/locations/l/ragCorpora/1"
        );
    }

    #[test]
    fn noop_reporter_accepts_events() {
        ProgressReporter::noop().corpus("projects/p/locations/l/ragCorpora/1", true, 0);
    }
}
