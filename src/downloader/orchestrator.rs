// Resilient resolver - identity rotation, bounded attempts and backoff
//
// For each attempt cycle, every client identity gets one timeout-bounded
// call. The first success is returned immediately. A failure matching the
// authentication-challenge signature delays the next attempt by
// min(base * 2^n, max), where n counts earlier challenges in this
// resolution. After the last attempt the last error is returned.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use super::errors::{DownloadError, ResolveError};
use super::extractors::{is_auth_challenge, HeaderProfile, StreamExtractor};
use super::models::{AttemptOutcome, ResolvedVideo, RetryAttempt};
use super::utils::run_with_timeout;
use crate::config::ResolverConfig;

/// Resolver wrapping an extraction capability
pub struct ResilientResolver {
    extractor: Arc<dyn StreamExtractor>,
    profile: HeaderProfile,
    config: ResolverConfig,
}

impl ResilientResolver {
    pub fn new(extractor: Arc<dyn StreamExtractor>, profile: HeaderProfile, config: ResolverConfig) -> Self {
        Self {
            extractor,
            profile,
            config,
        }
    }

    pub fn profile(&self) -> &HeaderProfile {
        &self.profile
    }

    pub fn extractor(&self) -> &Arc<dyn StreamExtractor> {
        &self.extractor
    }

    /// Resolve `url`, returning the first success or the last error
    pub async fn resolve(&self, url: &str) -> Result<ResolvedVideo, ResolveError> {
        let total = self.config.max_attempts();
        let mut attempts: Vec<RetryAttempt> = Vec::with_capacity(total as usize);
        let mut last_error = DownloadError::Transport("no client identities configured".to_string());
        let mut challenges = 0u32;

        for cycle in 1..=self.config.max_cycles {
            for identity in &self.config.identities {
                let attempt = attempts.len() as u32 + 1;
                let started = Instant::now();

                let result = run_with_timeout(
                    self.config.timeout,
                    self.extractor.resolve(url, identity, &self.profile),
                )
                .await;
                let elapsed = started.elapsed();

                match result {
                    Ok(video) => {
                        attempts.push(RetryAttempt {
                            attempt,
                            identity: identity.name,
                            elapsed,
                            outcome: AttemptOutcome::Success,
                        });
                        debug!(
                            "[Resolver] ✓ {} resolved via {} (attempt {}/{}, cycle {}, {:?})",
                            video.id, identity, attempt, total, cycle, elapsed
                        );
                        return Ok(video);
                    }
                    Err(e) => {
                        let outcome = if matches!(e, DownloadError::Timeout { .. }) {
                            AttemptOutcome::Timeout
                        } else {
                            AttemptOutcome::Error
                        };
                        attempts.push(RetryAttempt {
                            attempt,
                            identity: identity.name,
                            elapsed,
                            outcome,
                        });
                        warn!(
                            "[Resolver] ✗ {} failed (attempt {}/{}, cycle {}): {}",
                            identity, attempt, total, cycle, e
                        );

                        // a malformed URL fails the same way for every identity
                        if matches!(e, DownloadError::InvalidUrl(_)) {
                            return Err(ResolveError { last: e, attempts });
                        }

                        let challenged = is_auth_challenge(&e.to_string());
                        last_error = e;

                        if challenged && attempt < total {
                            let delay = self.config.backoff_for(challenges);
                            challenges += 1;
                            debug!("[Resolver] Authentication challenge, backing off {:?}", delay);
                            tokio::time::sleep(delay).await;
                        }
                    }
                }
            }
        }

        warn!(
            "[Resolver] All {} attempts failed for {}: {}",
            attempts.len(),
            url,
            last_error
        );
        Err(ResolveError {
            last: last_error,
            attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::extractors::{ClientIdentity, ErrorClass, RemoteStream, StreamTarget};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    enum Step {
        Ok,
        Fail(DownloadError),
        Hang,
    }

    /// Extractor replaying scripted outcomes and recording which identity
    /// each call used
    struct ScriptedExtractor {
        steps: Mutex<VecDeque<Step>>,
        calls: Mutex<Vec<&'static str>>,
    }

    impl ScriptedExtractor {
        fn new(steps: Vec<Step>) -> Arc<Self> {
            Arc::new(Self {
                steps: Mutex::new(steps.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    fn video() -> ResolvedVideo {
        ResolvedVideo {
            id: "dQw4w9WgXcQ".to_string(),
            title: "t".to_string(),
            author: "a".to_string(),
            thumbnail: String::new(),
            duration_seconds: 1,
            formats: Vec::new(),
        }
    }

    #[async_trait]
    impl StreamExtractor for ScriptedExtractor {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn resolve(
            &self,
            _url: &str,
            identity: &ClientIdentity,
            _profile: &HeaderProfile,
        ) -> Result<ResolvedVideo, DownloadError> {
            self.calls.lock().unwrap().push(identity.name);
            let step = self.steps.lock().unwrap().pop_front();
            match step {
                Some(Step::Ok) => Ok(video()),
                Some(Step::Fail(e)) => Err(e),
                Some(Step::Hang) => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(video())
                }
                None => Err(DownloadError::Transport("script exhausted".to_string())),
            }
        }

        async fn open(
            &self,
            _video: &ResolvedVideo,
            _target: &StreamTarget,
            _profile: &HeaderProfile,
        ) -> Result<RemoteStream, DownloadError> {
            Err(DownloadError::Transport("not used".to_string()))
        }
    }

    fn resolver(extractor: Arc<ScriptedExtractor>) -> ResilientResolver {
        ResilientResolver::new(extractor, HeaderProfile::default(), ResolverConfig::default())
    }

    fn transport(msg: &str) -> DownloadError {
        DownloadError::Transport(msg.to_string())
    }

    #[tokio::test]
    async fn test_first_success_wins() {
        let extractor = ScriptedExtractor::new(vec![Step::Ok, Step::Ok]);
        let video = resolver(extractor.clone()).resolve("https://youtu.be/dQw4w9WgXcQ").await.unwrap();
        assert_eq!(video.id, "dQw4w9WgXcQ");
        assert_eq!(extractor.calls(), vec!["ANDROID_VR"]);
    }

    #[tokio::test]
    async fn test_rotates_identities_until_success() {
        let extractor = ScriptedExtractor::new(vec![
            Step::Fail(transport("reset")),
            Step::Fail(transport("reset")),
            Step::Fail(transport("reset")),
            Step::Fail(transport("reset")),
            Step::Ok,
            Step::Ok,
        ]);
        resolver(extractor.clone()).resolve("https://youtu.be/dQw4w9WgXcQ").await.unwrap();
        assert_eq!(
            extractor.calls(),
            vec!["ANDROID_VR", "WEB_EMBEDDED", "IOS", "ANDROID_VR", "WEB_EMBEDDED"]
        );
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let mut steps: Vec<Step> = (0..8).map(|_| Step::Fail(transport("reset"))).collect();
        steps.push(Step::Fail(DownloadError::Parse("missing streamingData".to_string())));
        let extractor = ScriptedExtractor::new(steps);

        let err = resolver(extractor.clone())
            .resolve("https://youtu.be/dQw4w9WgXcQ")
            .await
            .unwrap_err();
        assert_eq!(extractor.calls().len(), 9);
        assert_eq!(err.attempts.len(), 9);
        assert!(matches!(err.last, DownloadError::Parse(_)));
        assert_eq!(err.class(), ErrorClass::PageStructureChanged);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_moves_to_next_identity() {
        let extractor = ScriptedExtractor::new(vec![Step::Hang, Step::Ok]);
        let started = tokio::time::Instant::now();
        resolver(extractor.clone()).resolve("https://youtu.be/dQw4w9WgXcQ").await.unwrap();
        assert_eq!(extractor.calls(), vec!["ANDROID_VR", "WEB_EMBEDDED"]);
        assert!(started.elapsed() >= Duration::from_millis(12_000));
        assert!(started.elapsed() < Duration::from_secs(3600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_timeouts_classify_as_timeout() {
        let extractor = ScriptedExtractor::new((0..3).map(|_| Step::Hang).collect());
        let config = ResolverConfig::default()
            .with_max_cycles(1)
            .with_timeout(Duration::from_millis(100));
        let err = ResilientResolver::new(extractor, HeaderProfile::default(), config)
            .resolve("https://youtu.be/dQw4w9WgXcQ")
            .await
            .unwrap_err();
        assert!(err.attempts.iter().all(|a| a.outcome == AttemptOutcome::Timeout));
        assert_eq!(err.class(), ErrorClass::UpstreamTimeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_only_after_challenges() {
        let challenge = || DownloadError::Unplayable("Sign in to confirm you're not a bot".to_string());
        let extractor = ScriptedExtractor::new(vec![
            Step::Fail(challenge()),
            Step::Fail(challenge()),
            Step::Fail(transport("reset")),
            Step::Ok,
        ]);
        let started = tokio::time::Instant::now();
        resolver(extractor.clone()).resolve("https://youtu.be/dQw4w9WgXcQ").await.unwrap();
        // 2s after the first challenge, 4s after the second, none after the reset
        assert!(started.elapsed() >= Duration::from_secs(6));
        assert!(started.elapsed() < Duration::from_secs(8));
        assert_eq!(extractor.calls().len(), 4);
    }

    #[tokio::test]
    async fn test_invalid_url_stops_immediately() {
        let extractor = ScriptedExtractor::new(vec![Step::Fail(DownloadError::InvalidUrl("x".to_string()))]);
        let err = resolver(extractor.clone()).resolve("x").await.unwrap_err();
        assert_eq!(extractor.calls().len(), 1);
        assert_eq!(err.class(), ErrorClass::InvalidInput);
    }
}
