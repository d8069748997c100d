use crate::body::Body;
use crate::host::{switch_authority, REQUEST_ID_HEADER};
use crate::retry::{RetryConfig, RetryState};
use bytes::Bytes;
use coskit_auth::Credential;
use coskit_core::{ErrorKind, HttpSend, Result, Signer};
use http::header::HOST;
use http::Uri;
use log::{debug, warn};
use std::sync::Arc;

/// Transport decorates outgoing requests with a valid authorization header
/// and drives the retry/failover policy around the raw send primitive.
///
/// The caller's request is never mutated: each attempt is rebuilt from the
/// prototype pieces, so a prototype can be reused concurrently.
#[derive(Debug, Clone)]
pub(crate) struct Transport {
    http: Arc<dyn HttpSend>,
    signer: Signer<Credential>,
    retry: RetryConfig,
}

impl Transport {
    pub(crate) fn new(
        http: Arc<dyn HttpSend>,
        signer: Signer<Credential>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            http,
            signer,
            retry,
        }
    }

    pub(crate) async fn send(&self, req: http::Request<Body>) -> Result<http::Response<Bytes>> {
        let (parts, body) = req.into_parts();
        let (payload, replayable) = body.into_payload().await?;
        if !replayable {
            debug!("request body is single-use, retry disabled for this call");
        }

        let mut current_uri = parts.uri;
        let mut state = RetryState::new();

        loop {
            state.attempts_made += 1;

            let mut attempt = {
                let (p, _) = http::Request::builder()
                    .method(parts.method.clone())
                    .uri(current_uri.clone())
                    .body(())?
                    .into_parts();
                p
            };
            attempt.headers = parts.headers.clone();
            // The host header follows the authority; drop any stale one so
            // the signer derives it fresh, failover included.
            attempt.headers.remove(HOST);

            // Signing failures are configuration or credential trouble and
            // must never enter the retry loop.
            self.signer.sign(&mut attempt, None).await?;

            let request = http::Request::from_parts(attempt, payload.clone());
            match self.http.http_send(request).await {
                Ok(resp) => {
                    if resp.headers().contains_key(REQUEST_ID_HEADER) {
                        state.saw_request_id = true;
                    }
                    let status = resp.status();

                    if status.is_server_error() {
                        warn!(
                            "attempt {} answered {status}, retriable",
                            state.attempts_made
                        );
                        if !replayable || !state.can_retry(&self.retry) {
                            return Ok(resp);
                        }
                        self.maybe_failover(&mut state, &mut current_uri);
                        tokio::time::sleep(self.retry.interval).await;
                        continue;
                    }

                    // A redirect that never reached the service (no request
                    // id) points at a broken network path; try the backup
                    // domain once.
                    if status.is_redirection()
                        && !resp.headers().contains_key(REQUEST_ID_HEADER)
                        && self.retry.enable_failover
                        && !state.switched
                        && replayable
                        && state.can_retry(&self.retry)
                    {
                        if let Some(next) = switch_uri(&current_uri) {
                            warn!("redirect without request id, switching host to {next}");
                            current_uri = next;
                            state.switched = true;
                            continue;
                        }
                    }

                    return Ok(resp);
                }
                Err(err) => {
                    if err.kind() != ErrorKind::Unexpected {
                        return Err(err);
                    }
                    warn!("attempt {} failed: {err}", state.attempts_made);
                    state.record_error(err);
                    if !replayable || !state.can_retry(&self.retry) {
                        return Err(state.aggregate());
                    }
                    self.maybe_failover(&mut state, &mut current_uri);
                    tokio::time::sleep(self.retry.interval).await;
                }
            }
        }
    }

    fn maybe_failover(&self, state: &mut RetryState, current_uri: &mut Uri) {
        if !state.should_failover(&self.retry) {
            return;
        }
        if let Some(next) = switch_uri(current_uri) {
            warn!("failure persists without a request id, switching host to {next}");
            *current_uri = next;
            state.switched = true;
        }
    }
}

fn switch_uri(uri: &Uri) -> Option<Uri> {
    let authority = uri.authority()?;
    let switched = switch_authority(authority)?;

    let mut parts = uri.clone().into_parts();
    parts.authority = Some(switched);
    Uri::from_parts(parts).ok()
}
