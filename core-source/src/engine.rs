//! # Resolution Engine
//!
//! Turns an ordered list of track variants into a playable URL.
//!
//! Candidates are tried one at a time in the order given. A source id is
//! added to the attempt's tried-set before its plugin is called, so a plugin
//! that always fails is asked at most once per attempt. A rate-limit failure
//! ends the attempt immediately; any other failure moves on to the next
//! candidate.

use core_runtime::config::ResolverConfig;
use core_runtime::events::{CoreEvent, EventBus, SourceEvent};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, SourceError};
use crate::gate::{GateState, InitGate};
use crate::model::{MusicUrl, Quality, Resolution, Track};
use crate::registry::SourceRegistry;

/// Per-call resolution state.
///
/// Keep the attempt after a failure to continue with the same tried-set.
#[derive(Debug, Clone, Default)]
pub struct ResolutionAttempt {
    candidates: VecDeque<Track>,
    tried: Vec<String>,
    quality: Option<Quality>,
}

impl ResolutionAttempt {
    pub fn new(candidates: impl IntoIterator<Item = Track>, quality: Option<Quality>) -> Self {
        Self {
            candidates: candidates.into_iter().collect(),
            tried: Vec::new(),
            quality,
        }
    }

    /// Seeds the tried-set, e.g. with sources that failed in an earlier call.
    pub fn with_tried(mut self, tried: impl IntoIterator<Item = String>) -> Self {
        for source in tried {
            if !self.tried.contains(&source) {
                self.tried.push(source);
            }
        }
        self
    }

    /// Adds more candidates to the end of the queue.
    pub fn extend(&mut self, candidates: impl IntoIterator<Item = Track>) {
        self.candidates.extend(candidates);
    }

    /// Source ids already tried, in the order they were tried.
    pub fn tried(&self) -> &[String] {
        &self.tried
    }

    pub fn remaining(&self) -> usize {
        self.candidates.len()
    }

    pub fn quality(&self) -> Option<Quality> {
        self.quality
    }

    /// Pops the next candidate whose source has not been tried and marks
    /// that source as tried.
    fn next_candidate(&mut self) -> Option<Track> {
        while let Some(candidate) = self.candidates.pop_front() {
            if self.tried.contains(&candidate.platform) {
                continue;
            }
            self.tried.push(candidate.platform.clone());
            return Some(candidate);
        }
        None
    }
}

pub struct ResolutionEngine {
    registry: Arc<SourceRegistry>,
    gate: InitGate,
    config: ResolverConfig,
    default_quality: Quality,
    event_bus: Option<EventBus>,
}

impl ResolutionEngine {
    pub fn new(
        registry: Arc<SourceRegistry>,
        gate: InitGate,
        config: ResolverConfig,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| SourceError::Internal(e.to_string()))?;
        let default_quality = Quality::from_name(&config.default_quality).ok_or_else(|| {
            SourceError::Internal(format!(
                "unknown default quality {}",
                config.default_quality
            ))
        })?;

        Ok(Self {
            registry,
            gate,
            config,
            default_quality,
            event_bus: None,
        })
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn default_quality(&self) -> Quality {
        self.default_quality
    }

    /// Resolves the first playable URL among `candidates`.
    ///
    /// `on_source_switch` is called with each candidate right before its
    /// plugin is asked. `None` quality means the configured default.
    pub async fn resolve<F>(
        &self,
        candidates: Vec<Track>,
        quality: Option<Quality>,
        on_source_switch: F,
    ) -> Result<Resolution>
    where
        F: FnMut(&Track),
    {
        let mut attempt = ResolutionAttempt::new(candidates, quality);
        self.resolve_attempt(&mut attempt, on_source_switch).await
    }

    /// Runs (or continues) an attempt. The attempt keeps its tried-set when
    /// this returns an error.
    #[instrument(skip(self, attempt, on_source_switch), fields(candidates = attempt.remaining()))]
    pub async fn resolve_attempt<F>(
        &self,
        attempt: &mut ResolutionAttempt,
        mut on_source_switch: F,
    ) -> Result<Resolution>
    where
        F: FnMut(&Track),
    {
        if let Err(e) = self.await_ready().await {
            self.report_failure(&e);
            return Err(e);
        }

        let requested = attempt.quality.unwrap_or(self.default_quality);

        while let Some(candidate) = attempt.next_candidate() {
            let Some(quality) = self.negotiate(&candidate, requested) else {
                debug!(
                    platform = %candidate.platform,
                    track_id = %candidate.id,
                    quality = %requested,
                    "Quality unavailable, skipping source"
                );
                continue;
            };

            on_source_switch(&candidate);
            self.emit(SourceEvent::SourceSwitched {
                platform: candidate.platform.clone(),
                track_id: candidate.id.clone(),
                quality: quality.to_string(),
            });

            match self.call_plugin(&candidate, quality).await {
                Ok(music_url) => {
                    info!(
                        platform = %candidate.platform,
                        track_id = %candidate.id,
                        quality = %music_url.quality,
                        "Resolved music URL"
                    );
                    self.emit(SourceEvent::Resolved {
                        platform: candidate.platform.clone(),
                        track_id: candidate.id.clone(),
                        quality: music_url.quality.to_string(),
                    });
                    return Ok(Resolution {
                        url: music_url.url,
                        actual_quality: music_url.quality,
                        source_track: candidate,
                    });
                }
                Err(e) if e.is_rate_limited() => {
                    warn!(platform = %candidate.platform, error = %e, "Source rate limited");
                    self.report_failure(&e);
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        platform = %candidate.platform,
                        track_id = %candidate.id,
                        error = %e,
                        "Source failed, trying next"
                    );
                }
            }
        }

        let e = SourceError::AllSourcesExhausted {
            tried: attempt.tried.clone(),
        };
        self.report_failure(&e);
        Err(e)
    }

    async fn await_ready(&self) -> Result<()> {
        match self.gate.wait_timeout(self.config.init_timeout()).await {
            GateState::Open => Ok(()),
            GateState::Pending => Err(SourceError::NotReady(
                "timed out waiting for source plugins to load".to_string(),
            )),
            GateState::Abandoned => Err(SourceError::NotReady(
                "source plugin startup did not complete".to_string(),
            )),
        }
    }

    /// Quality to request from the candidate's source, or `None` to skip it.
    fn negotiate(&self, candidate: &Track, requested: Quality) -> Option<Quality> {
        if candidate.qualities.supports(requested) {
            Some(requested)
        } else if self.config.allow_quality_downgrade {
            candidate.qualities.best_at_or_below(requested)
        } else {
            None
        }
    }

    async fn call_plugin(&self, candidate: &Track, quality: Quality) -> Result<MusicUrl> {
        let plugin = self
            .registry
            .get(&candidate.platform)
            .ok_or_else(|| SourceError::PluginNotFound(candidate.platform.clone()))?;
        let resolver = plugin
            .resolver()
            .ok_or_else(|| SourceError::ResolverMissing(plugin.id().to_string()))?;

        resolver.get_music_url(candidate, quality).await
    }

    fn report_failure(&self, error: &SourceError) {
        self.emit(SourceEvent::ResolutionFailed {
            message: error.to_string(),
            rate_limited: error.is_rate_limited(),
        });
    }

    fn emit(&self, event: SourceEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Source(event)).ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::{MockMusicUrlResolver, PluginInfo, SourcePlugin};
    use crate::script::ScriptHost;
    use core_runtime::config::ScriptConfig;
    use std::time::Duration;

    fn registry() -> Arc<SourceRegistry> {
        Arc::new(SourceRegistry::new(ScriptHost::new(
            &ScriptConfig::default(),
            "too many requests",
        )))
    }

    fn open_gate() -> InitGate {
        let gate = InitGate::new();
        gate.open();
        gate
    }

    fn add(registry: &SourceRegistry, id: &str, resolver: MockMusicUrlResolver) {
        registry.insert(SourcePlugin::new(
            PluginInfo::new(id),
            "",
            Some(Arc::new(resolver)),
        ));
    }

    fn ok_resolver(times: usize) -> MockMusicUrlResolver {
        let mut resolver = MockMusicUrlResolver::new();
        resolver
            .expect_get_music_url()
            .times(times)
            .returning(|track, quality| {
                Ok(MusicUrl {
                    url: format!("https://{}.example.com/{}", track.platform, track.id),
                    quality,
                })
            });
        resolver
    }

    fn failing_resolver(times: usize) -> MockMusicUrlResolver {
        let mut resolver = MockMusicUrlResolver::new();
        resolver
            .expect_get_music_url()
            .times(times)
            .returning(|track, _| {
                Err(SourceError::ResolveFailed {
                    platform: track.platform.clone(),
                    track_id: track.id.clone(),
                    reason: "boom".to_string(),
                })
            });
        resolver
    }

    #[test]
    fn test_attempt_marks_sources_before_returning() {
        let mut attempt = ResolutionAttempt::new(
            vec![
                Track::new("a", "1"),
                Track::new("a", "2"),
                Track::new("b", "3"),
            ],
            None,
        )
        .with_tried(vec!["b".to_string()]);

        assert_eq!(attempt.next_candidate().unwrap().id, "1");
        assert_eq!(attempt.tried(), ["b", "a"]);
        assert!(attempt.next_candidate().is_none());
    }

    #[tokio::test]
    async fn test_default_quality_is_used() {
        let registry = registry();
        let mut resolver = MockMusicUrlResolver::new();
        resolver
            .expect_get_music_url()
            .withf(|_, quality| *quality == Quality::Standard)
            .times(1)
            .returning(|_, quality| {
                Ok(MusicUrl {
                    url: "https://a.example.com/x".to_string(),
                    quality,
                })
            });
        add(&registry, "a", resolver);

        let engine =
            ResolutionEngine::new(registry, open_gate(), ResolverConfig::default()).unwrap();
        let resolution = engine
            .resolve(
                vec![Track::new("a", "x").with_quality(Quality::Standard)],
                None,
                |_| {},
            )
            .await
            .unwrap();
        assert_eq!(resolution.actual_quality, Quality::Standard);
    }

    #[tokio::test]
    async fn test_downgrade_when_allowed() {
        let registry = registry();
        let mut resolver = MockMusicUrlResolver::new();
        resolver
            .expect_get_music_url()
            .withf(|_, quality| *quality == Quality::High)
            .times(1)
            .returning(|_, quality| {
                Ok(MusicUrl {
                    url: "https://a.example.com/x".to_string(),
                    quality,
                })
            });
        add(&registry, "a", resolver);

        let engine = ResolutionEngine::new(
            registry,
            open_gate(),
            ResolverConfig::default().with_quality_downgrade(true),
        )
        .unwrap();

        let track = Track::new("a", "x")
            .with_quality(Quality::Standard)
            .with_quality(Quality::High);
        let resolution = engine
            .resolve(vec![track], Some(Quality::Lossless), |_| {})
            .await
            .unwrap();
        assert_eq!(resolution.actual_quality, Quality::High);
    }

    #[tokio::test]
    async fn test_missing_plugin_is_skipped() {
        let registry = registry();
        add(&registry, "b", ok_resolver(1));

        let engine =
            ResolutionEngine::new(registry, open_gate(), ResolverConfig::default()).unwrap();
        let resolution = engine
            .resolve(
                vec![
                    Track::new("ghost", "1").with_quality(Quality::Standard),
                    Track::new("b", "2").with_quality(Quality::Standard),
                ],
                None,
                |_| {},
            )
            .await
            .unwrap();
        assert_eq!(resolution.source_track.platform, "b");
    }

    #[tokio::test]
    async fn test_attempt_continues_across_calls() {
        let registry = registry();
        add(&registry, "a", failing_resolver(1));
        add(&registry, "b", ok_resolver(1));

        let engine =
            ResolutionEngine::new(registry, open_gate(), ResolverConfig::default()).unwrap();

        let mut attempt = ResolutionAttempt::new(
            vec![Track::new("a", "1").with_quality(Quality::Standard)],
            None,
        );
        let err = engine.resolve_attempt(&mut attempt, |_| {}).await.unwrap_err();
        assert!(matches!(err, SourceError::AllSourcesExhausted { .. }));

        attempt.extend(vec![
            Track::new("a", "1").with_quality(Quality::Standard),
            Track::new("b", "2").with_quality(Quality::Standard),
        ]);
        let resolution = engine.resolve_attempt(&mut attempt, |_| {}).await.unwrap();
        assert_eq!(resolution.source_track.platform, "b");
        assert_eq!(attempt.tried(), ["a", "b"]);
    }

    #[tokio::test]
    async fn test_abandoned_gate_is_not_ready() {
        let gate = InitGate::new();
        gate.abandon();
        let engine = ResolutionEngine::new(registry(), gate, ResolverConfig::default()).unwrap();

        let err = engine
            .resolve(vec![Track::new("a", "1")], None, |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::NotReady(_)));
    }

    #[tokio::test]
    async fn test_init_timeout_is_not_ready() {
        let engine = ResolutionEngine::new(
            registry(),
            InitGate::new(),
            ResolverConfig::default().with_init_timeout(Duration::from_millis(10)),
        )
        .unwrap();

        let err = engine
            .resolve(vec![Track::new("a", "1")], None, |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::NotReady(_)));
    }

    #[test]
    fn test_rejects_invalid_config() {
        let result = ResolutionEngine::new(
            registry(),
            InitGate::new(),
            ResolverConfig::default().with_default_quality("lossless"),
        );
        assert!(result.is_err());
    }
}
