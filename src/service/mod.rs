pub mod engine;
pub mod http;
pub mod link_checker;
pub mod processor;
pub mod renderer;
pub mod submission;

pub use engine::{AnalysisEngine, Analyzer, EngineSettings};
pub use link_checker::LinkChecker;
pub use processor::{
    BroadcastNotifier, JobOutcome, JobProcessor, JobQueue, Notifier, NotifierEvent, WorkerPool,
    WorkerPoolHandle, STATUS_EVENT,
};
pub use renderer::{ChromeRenderer, HttpRenderer, PageRenderer, RenderedPage, RendererKind};
pub use submission::{validate_url, AnalysisService};
