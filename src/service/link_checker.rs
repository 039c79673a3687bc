//! Liveness probing for extracted links.

use std::time::Duration;

use futures::stream::{self, StreamExt};
use rquest::Client;
use tracing::debug;

use crate::domain::models::{BrokenLink, LinkStatus, WorkingLink};
use crate::error::AnalysisError;
use crate::service::http::{create_client, describe_error, ClientType};

/// Issues HEAD requests and sorts links into broken and working.
///
/// Probing is sequential unless `concurrency > 1`, in which case up to that
/// many requests are in flight at once. Results keep the input order either way.
pub struct LinkChecker {
    client: Client,
    concurrency: usize,
}

impl LinkChecker {
    pub fn new(probe_timeout: Duration, concurrency: usize) -> Result<Self, AnalysisError> {
        let client = create_client(ClientType::Standard, probe_timeout)
            .map_err(|e| AnalysisError::Client(format!("{:#}", e)))?;
        Ok(Self {
            client,
            concurrency: concurrency.max(1),
        })
    }

    /// Any response is a valid answer; only >= 400 marks the link broken.
    /// Transport failures are broken with no status code.
    pub async fn probe(&self, link: &str) -> LinkStatus {
        match self.client.head(link).send().await {
            Ok(response) => {
                let status_code = response.status().as_u16();
                if status_code >= 400 {
                    LinkStatus::Broken(BrokenLink::http_status(link, status_code))
                } else {
                    LinkStatus::Working(WorkingLink {
                        link: link.to_string(),
                        status_code,
                    })
                }
            }
            Err(e) => LinkStatus::Broken(BrokenLink::network(link, describe_error(&e))),
        }
    }

    pub async fn check_all(&self, links: &[String]) -> (Vec<BrokenLink>, Vec<WorkingLink>) {
        let total = links.len();
        let statuses: Vec<LinkStatus> = stream::iter(links.iter().enumerate())
            .map(|(index, link)| async move {
                debug!(link = %link, "Probing link {}/{}", index + 1, total);
                self.probe(link).await
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut broken = Vec::new();
        let mut working = Vec::new();
        for status in statuses {
            match status {
                LinkStatus::Broken(link) => broken.push(link),
                LinkStatus::Working(link) => working.push(link),
            }
        }
        (broken, working)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    async fn server_with_statuses() -> mockito::ServerGuard {
        let mut server = Server::new_async().await;
        for (path, status) in [("/ok", 200), ("/moved", 204), ("/missing", 404), ("/boom", 500)] {
            server
                .mock("HEAD", path)
                .with_status(status)
                .create_async()
                .await;
        }
        server
    }

    #[tokio::test]
    async fn classifies_by_status_code() {
        let server = server_with_statuses().await;
        let checker = LinkChecker::new(Duration::from_secs(5), 1).unwrap();

        let ok = checker.probe(&format!("{}/ok", server.url())).await;
        assert!(matches!(ok, LinkStatus::Working(WorkingLink { status_code: 200, .. })));

        let missing = checker.probe(&format!("{}/missing", server.url())).await;
        match missing {
            LinkStatus::Broken(link) => {
                assert_eq!(link.status_code, Some(404));
                assert!(link.error_message.is_none());
            }
            other => panic!("expected broken link, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn network_failure_is_broken_without_status() {
        let checker = LinkChecker::new(Duration::from_secs(2), 1).unwrap();
        match checker.probe("http://127.0.0.1:1/nothing-here").await {
            LinkStatus::Broken(link) => {
                assert_eq!(link.status_code, None);
                assert!(!link.error_message.unwrap_or_default().is_empty());
            }
            other => panic!("expected broken link, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn hanging_link_is_broken_without_status() {
        let base = crate::test_utils::mocks::silent_server().await;
        let checker = LinkChecker::new(Duration::from_secs(1), 1).unwrap();

        match checker.probe(&format!("{}/stall", base)).await {
            LinkStatus::Broken(link) => {
                assert_eq!(link.status_code, None);
                assert!(!link.error_message.unwrap_or_default().is_empty());
            }
            other => panic!("expected broken link, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn check_all_partitions_and_keeps_order() {
        let server = server_with_statuses().await;
        let links: Vec<String> = ["/missing", "/ok", "/boom", "/moved", "/ok"]
            .iter()
            .map(|p| format!("{}{}", server.url(), p))
            .collect();

        for concurrency in [1, 4] {
            let checker = LinkChecker::new(Duration::from_secs(5), concurrency).unwrap();
            let (broken, working) = checker.check_all(&links).await;

            let broken_codes: Vec<Option<u16>> = broken.iter().map(|l| l.status_code).collect();
            assert_eq!(broken_codes, vec![Some(404), Some(500)]);

            let working_links: Vec<&str> = working.iter().map(|l| l.link.as_str()).collect();
            assert_eq!(
                working_links,
                vec![links[1].as_str(), links[3].as_str(), links[4].as_str()]
            );
            assert_eq!(broken.len() + working.len(), links.len());
        }
    }
}
