//! Contest-service client seam and its HTTP/JSON implementation.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use super::types::{Contest, Participant, Submission, SubmitRequest};
use crate::error::{ContestError, mentions_contest_ended};

/// Boxed future returned by [`ContestService`] methods.
pub type ContestFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ContestError>> + Send + 'a>>;

/// The contest-service operations an agent consumes.
pub trait ContestService: Send + Sync {
    fn get_contest<'a>(&'a self, contest_id: &'a str) -> ContestFuture<'a, Contest>;

    /// Submissions of one participant, optionally narrowed to one problem.
    fn get_submissions<'a>(
        &'a self,
        contest_id: &'a str,
        participant_id: &'a str,
        problem_id: Option<&'a str>,
    ) -> ContestFuture<'a, Vec<Submission>>;

    fn submit_solution<'a>(&'a self, request: &'a SubmitRequest) -> ContestFuture<'a, Submission>;

    fn get_leaderboard<'a>(&'a self, contest_id: &'a str) -> ContestFuture<'a, Vec<Participant>>;
}

/// Builds a [`ContestService`] client for a host at agent-creation time.
pub trait ContestConnector: Send + Sync {
    fn connect(&self, host: &str) -> Result<Arc<dyn ContestService>, ContestError>;
}

// ── HTTP implementation ────────────────────────────────────────────

/// JSON-over-HTTP contest-service client.
///
/// | Operation | Route |
/// |-----------|-------|
/// | get contest | `GET /contests/{id}` |
/// | get submissions | `GET /contests/{id}/submissions?participant_id=&problem_id=` |
/// | submit | `POST /contests/{id}/submissions` |
/// | leaderboard | `GET /contests/{id}/leaderboard` |
pub struct HttpContestClient {
    client: reqwest::Client,
    base: Url,
}

impl HttpContestClient {
    /// Build a client for `host`. `host` may omit the scheme (`http://` is
    /// assumed). No request is made here.
    pub fn connect(host: &str, timeout: Duration) -> Result<Self, ContestError> {
        let connect_err = |reason: String| ContestError::Connect {
            host: host.to_string(),
            reason,
        };

        let trimmed = host.trim();
        if trimmed.is_empty() {
            return Err(connect_err("empty host".into()));
        }
        let with_scheme = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("http://{trimmed}")
        };
        let base = Url::parse(&with_scheme).map_err(|e| connect_err(e.to_string()))?;
        if base.host_str().is_none() || base.cannot_be_a_base() {
            return Err(connect_err("not a usable base URL".into()));
        }

        let client = reqwest::Client::builder()
            .user_agent("contest-agent/0.4")
            .timeout(timeout)
            .build()
            .map_err(|e| connect_err(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn url(&self, segments: &[&str]) -> Result<Url, ContestError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ContestError::InvalidResponse("base URL cannot take a path".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T, ContestError> {
        let resp = request.send().await.map_err(transport_error)?;
        let status = resp.status();
        let text = resp.text().await.map_err(transport_error)?;
        trace!("Contest service HTTP {status}: {text}");

        if !status.is_success() {
            return Err(classify_failure(status, &text));
        }
        serde_json::from_str(&text).map_err(|e| ContestError::InvalidResponse(e.to_string()))
    }
}

impl ContestService for HttpContestClient {
    fn get_contest<'a>(&'a self, contest_id: &'a str) -> ContestFuture<'a, Contest> {
        Box::pin(async move {
            let url = self.url(&["contests", contest_id])?;
            debug!("GET {url}");
            self.send(self.client.get(url))
                .await
                .map_err(contest_lookup_failure)
        })
    }

    fn get_submissions<'a>(
        &'a self,
        contest_id: &'a str,
        participant_id: &'a str,
        problem_id: Option<&'a str>,
    ) -> ContestFuture<'a, Vec<Submission>> {
        Box::pin(async move {
            let mut url = self.url(&["contests", contest_id, "submissions"])?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("participant_id", participant_id);
                if let Some(problem_id) = problem_id {
                    query.append_pair("problem_id", problem_id);
                }
            }
            debug!("GET {url}");
            self.send(self.client.get(url)).await
        })
    }

    fn submit_solution<'a>(&'a self, request: &'a SubmitRequest) -> ContestFuture<'a, Submission> {
        Box::pin(async move {
            let url = self.url(&["contests", &request.contest_id, "submissions"])?;
            debug!(
                "POST {url} (problem {}, {}, {} bytes)",
                request.problem_id,
                request.language,
                request.code.len()
            );
            self.send(self.client.post(url).json(request)).await
        })
    }

    fn get_leaderboard<'a>(&'a self, contest_id: &'a str) -> ContestFuture<'a, Vec<Participant>> {
        Box::pin(async move {
            let url = self.url(&["contests", contest_id, "leaderboard"])?;
            debug!("GET {url}");
            self.send(self.client.get(url)).await
        })
    }
}

fn transport_error(e: reqwest::Error) -> ContestError {
    ContestError::Transport(e.to_string())
}

#[derive(Deserialize, Default)]
struct ErrorBody {
    code: Option<String>,
    message: Option<String>,
    error: Option<String>,
}

const CONTEST_NOT_FOUND: &str = "contest not found";

/// Map a failed response to a typed error.
///
/// The structured `code` field wins. Without one, only a 404 naming the
/// contest is [`ContestError::NotFound`]; a missing problem or submission is
/// an ordinary rejection. Other messages are matched against the
/// contest-ended phrases.
pub(crate) fn classify_failure(status: StatusCode, body: &str) -> ContestError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed
        .message
        .or(parsed.error)
        .unwrap_or_else(|| body.trim().to_string());

    match parsed.code.map(|c| c.to_ascii_lowercase()).as_deref() {
        Some("contest_ended") | Some("contest_finished") => {
            return ContestError::ContestEnded(message);
        }
        Some("contest_not_found") => return ContestError::NotFound(message),
        _ => {}
    }

    if status == StatusCode::NOT_FOUND && message.to_lowercase().contains(CONTEST_NOT_FOUND) {
        ContestError::NotFound(message)
    } else if mentions_contest_ended(&message) {
        ContestError::ContestEnded(message)
    } else {
        ContestError::Rejected {
            status: status.as_u16(),
            message,
        }
    }
}

/// A bare 404 from `GET /contests/{id}` can only mean the contest is gone.
fn contest_lookup_failure(e: ContestError) -> ContestError {
    match e {
        ContestError::Rejected {
            status: 404,
            message,
        } => ContestError::NotFound(message),
        other => other,
    }
}

/// [`ContestConnector`] producing [`HttpContestClient`]s.
#[derive(Debug, Clone)]
pub struct HttpContestConnector {
    timeout: Duration,
}

impl HttpContestConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl ContestConnector for HttpContestConnector {
    fn connect(&self, host: &str) -> Result<Arc<dyn ContestService>, ContestError> {
        Ok(Arc::new(HttpContestClient::connect(host, self.timeout)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_without_scheme_gets_http() {
        let client = HttpContestClient::connect("localhost:50051", Duration::from_secs(5)).unwrap();
        assert_eq!(client.base_url().as_str(), "http://localhost:50051/");
    }

    #[test]
    fn empty_host_is_a_connect_error() {
        assert!(matches!(
            HttpContestClient::connect("  ", Duration::from_secs(5)),
            Err(ContestError::Connect { .. })
        ));
        assert!(matches!(
            HttpContestClient::connect("http://", Duration::from_secs(5)),
            Err(ContestError::Connect { .. })
        ));
    }

    #[test]
    fn urls_are_built_from_segments() {
        let client =
            HttpContestClient::connect("http://judge:8080/api", Duration::from_secs(5)).unwrap();
        let url = client.url(&["contests", "c 1", "leaderboard"]).unwrap();
        assert_eq!(url.as_str(), "http://judge:8080/api/contests/c%201/leaderboard");
    }

    #[test]
    fn structured_code_wins() {
        let err = classify_failure(
            StatusCode::CONFLICT,
            r#"{"code": "CONTEST_ENDED", "message": "submissions closed"}"#,
        );
        assert!(matches!(err, ContestError::ContestEnded(ref m) if m == "submissions closed"));
    }

    #[test]
    fn legacy_phrase_still_classified() {
        let err = classify_failure(
            StatusCode::BAD_REQUEST,
            r#"{"error": "Contest has ended"}"#,
        );
        assert!(err.is_contest_ended());

        let plain = classify_failure(StatusCode::BAD_REQUEST, "contest is finished");
        assert!(plain.is_contest_ended());
    }

    #[test]
    fn not_found_and_rejected() {
        assert!(matches!(
            classify_failure(StatusCode::NOT_FOUND, r#"{"message": "contest not found: c9"}"#),
            ContestError::NotFound(_)
        ));
        assert!(matches!(
            classify_failure(StatusCode::NOT_FOUND, r#"{"code": "contest_not_found"}"#),
            ContestError::NotFound(_)
        ));
        assert!(matches!(
            classify_failure(StatusCode::BAD_REQUEST, r#"{"message": "code too large"}"#),
            ContestError::Rejected { status: 400, ref message } if message == "code too large"
        ));
    }

    #[test]
    fn missing_problem_is_not_a_contest_end() {
        let err = classify_failure(
            StatusCode::NOT_FOUND,
            r#"{"message": "problem p9 not found"}"#,
        );
        assert!(
            matches!(err, ContestError::Rejected { status: 404, ref message } if message == "problem p9 not found")
        );
        assert!(!err.is_contest_ended());

        let coded = classify_failure(
            StatusCode::NOT_FOUND,
            r#"{"code": "not_found", "message": "submission s4 not found"}"#,
        );
        assert!(!coded.is_contest_ended());
    }

    #[test]
    fn bare_404_on_contest_lookup_means_gone() {
        let bare = classify_failure(StatusCode::NOT_FOUND, "");
        assert!(!bare.is_contest_ended());
        assert!(contest_lookup_failure(bare).is_contest_ended());

        let transport = contest_lookup_failure(ContestError::Transport("refused".into()));
        assert!(matches!(transport, ContestError::Transport(_)));
    }
}
