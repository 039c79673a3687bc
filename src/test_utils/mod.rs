//! Shared test utilities and fixtures

pub mod fixtures {
    use crate::domain::models::*;
    use sqlx::SqlitePool;

    /// Creates an in-memory SQLite database with migrations applied
    pub async fn setup_test_db() -> SqlitePool {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create test database");
        sqlx::migrate!()
            .run(&pool)
            .await
            .expect("Failed to run migrations");
        pool
    }

    /// A plausible finished audit
    pub fn sample_audit() -> AuditResult {
        AuditResult {
            html_version: HtmlVersion::Html5,
            page_title: "Sample".into(),
            heading_counts: HeadingCounts {
                h1: 1,
                h2: 3,
                ..Default::default()
            },
            internal_links: 2,
            external_links: 1,
            broken_links: vec![BrokenLink::http_status("https://sample.test/gone", 404)],
            working_links: vec![
                WorkingLink {
                    link: "https://sample.test/".into(),
                    status_code: 200,
                },
                WorkingLink {
                    link: "https://other.test/".into(),
                    status_code: 301,
                },
            ],
            has_login_form: false,
        }
    }
}

pub mod mocks {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::domain::models::{AuditResult, StatusEvent};
    use crate::error::AnalysisError;
    use crate::service::engine::Analyzer;
    use crate::service::processor::Notifier;

    /// Creates a standard HTML page for testing
    pub fn basic_html_page(title: &str, h1: &str, hrefs: &[&str]) -> String {
        let anchors: String = hrefs
            .iter()
            .map(|href| format!(r#"<a href="{}">link</a>"#, href))
            .collect();
        format!(
            r#"<!DOCTYPE html>
            <html>
                <head><title>{}</title></head>
                <body>
                    <h1>{}</h1>
                    {}
                </body>
            </html>"#,
            title, h1, anchors
        )
    }

    /// Accepts connections and never answers. Returns its base URL.
    pub async fn silent_server() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind silent server");
        let addr = listener.local_addr().expect("No local address");
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        format!("http://{}", addr)
    }

    /// Analyzer with a canned answer.
    pub struct StubAnalyzer {
        outcome: Result<AuditResult, AnalysisError>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl StubAnalyzer {
        pub fn succeeding(audit: AuditResult) -> Self {
            Self {
                outcome: Ok(audit),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn failing(error: AnalysisError) -> Self {
            Self {
                outcome: Err(error),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Analyzer for StubAnalyzer {
        async fn analyze(&self, _url: &str) -> Result<AuditResult, AnalysisError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.outcome.clone()
        }
    }

    /// Keeps every emitted event in memory.
    #[derive(Default)]
    pub struct RecordingNotifier {
        events: Mutex<Vec<(String, StatusEvent)>>,
    }

    impl RecordingNotifier {
        pub fn events(&self) -> Vec<StatusEvent> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .map(|(_, payload)| payload.clone())
                .collect()
        }

        pub fn events_for(&self, record_id: &str) -> Vec<StatusEvent> {
            self.events()
                .into_iter()
                .filter(|e| e.id == record_id)
                .collect()
        }

        pub fn names(&self) -> Vec<String> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .map(|(name, _)| name.clone())
                .collect()
        }
    }

    impl Notifier for RecordingNotifier {
        fn emit(&self, event: &str, payload: &StatusEvent) {
            self.events
                .lock()
                .unwrap()
                .push((event.to_string(), payload.clone()));
        }
    }
}
