//! Waiting on asynchronous video generation jobs.
//!
//! A job moves `submitted -> polling -> done | failed | timed out`. Time is
//! read and spent through [`Clock`] so the schedule can be driven without
//! real waits.

use super::{AiService, JobHandle, JobStatus};
use crate::error::{Result, VideoError};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Source of monotonic time plus the ability to wait.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Time elapsed since an arbitrary fixed origin.
    fn now(&self) -> Duration;

    async fn sleep(&self, duration: Duration);
}

/// Wall clock backed by the tokio timer.
#[derive(Debug, Clone)]
pub struct TokioClock {
    origin: tokio::time::Instant,
}

impl Default for TokioClock {
    fn default() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }
}

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Exponential delay between polls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    pub initial: Duration,
    pub factor: f64,
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(5),
            factor: 1.5,
            max: Duration::from_secs(30),
        }
    }
}

impl Backoff {
    /// Delay before poll number `attempt + 1`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let scaled = self.initial.as_secs_f64() * self.factor.powi(attempt.min(64) as i32);
        Duration::from_secs_f64(scaled.min(self.max.as_secs_f64()))
    }
}

/// How long and how patiently to wait for a job.
#[derive(Debug, Clone, Copy)]
pub struct WaitPolicy {
    pub timeout: Duration,
    pub backoff: Backoff,
    /// Consecutive poll errors tolerated before giving up.
    pub poll_retries: u32,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(600),
            backoff: Backoff::default(),
            poll_retries: 3,
        }
    }
}

#[derive(Debug)]
enum JobState {
    Submitted,
    Polling { attempt: u32 },
    Done(String),
    Failed(String),
    TimedOut,
}

/// Poll `handle` until it finishes, then download the clip.
pub async fn await_video_job(
    service: &dyn AiService,
    handle: &JobHandle,
    policy: &WaitPolicy,
    clock: &dyn Clock,
) -> Result<Vec<u8>> {
    let started = clock.now();
    let mut poll_errors = 0u32;
    let mut state = JobState::Submitted;

    loop {
        state = match state {
            JobState::Submitted => {
                info!("Waiting for video job {}", handle);
                JobState::Polling { attempt: 0 }
            }
            JobState::Polling { attempt } => {
                let elapsed = clock.now().saturating_sub(started);
                if elapsed >= policy.timeout {
                    JobState::TimedOut
                } else {
                    let remaining = policy.timeout - elapsed;
                    match service.poll_video_job(handle).await {
                        Ok(JobStatus::Done(location)) => JobState::Done(location),
                        Ok(JobStatus::Failed(reason)) => JobState::Failed(reason),
                        Ok(status) => {
                            poll_errors = 0;
                            debug!("Video job {} is {:?} (poll {})", handle, status, attempt + 1);
                            clock.sleep(policy.backoff.delay(attempt).min(remaining)).await;
                            JobState::Polling { attempt: attempt + 1 }
                        }
                        Err(e) => {
                            poll_errors += 1;
                            if poll_errors > policy.poll_retries {
                                return Err(e);
                            }
                            warn!(
                                "Polling video job {} failed ({}/{}): {}",
                                handle, poll_errors, policy.poll_retries, e
                            );
                            clock.sleep(policy.backoff.delay(attempt).min(remaining)).await;
                            JobState::Polling { attempt: attempt + 1 }
                        }
                    }
                }
            }
            JobState::Done(location) => {
                info!("Video job {} finished, downloading", handle);
                return service.download_video(&location).await;
            }
            JobState::Failed(reason) => {
                return Err(VideoError::service(format!(
                    "video job {} failed: {}",
                    handle, reason
                )));
            }
            JobState::TimedOut => {
                warn!("Abandoning video job {} after {:?}", handle, policy.timeout);
                return Err(VideoError::Timeout(format!(
                    "video job {} not finished after {}s",
                    handle,
                    policy.timeout.as_secs()
                )));
            }
        };
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::api::{VideoRequest, VoiceProfile};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Clock whose time only moves when something sleeps on it.
    #[derive(Default)]
    pub(crate) struct ManualClock {
        now: Mutex<Duration>,
        pub sleeps: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Clock for ManualClock {
        fn now(&self) -> Duration {
            *self.now.lock().unwrap()
        }

        async fn sleep(&self, duration: Duration) {
            *self.now.lock().unwrap() += duration;
            self.sleeps.lock().unwrap().push(duration);
        }
    }

    struct ScriptedJob {
        polls: Mutex<VecDeque<Result<JobStatus>>>,
        downloads: Mutex<Vec<String>>,
    }

    impl ScriptedJob {
        fn new(polls: Vec<Result<JobStatus>>) -> Self {
            Self {
                polls: Mutex::new(polls.into()),
                downloads: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl AiService for ScriptedJob {
        async fn generate_text(&self, _: &str, _: bool) -> Result<String> {
            unreachable!()
        }

        async fn synthesize_speech(&self, _: &str, _: VoiceProfile) -> Result<Vec<u8>> {
            unreachable!()
        }

        async fn submit_video_job(&self, _: VideoRequest<'_>) -> Result<JobHandle> {
            unreachable!()
        }

        async fn poll_video_job(&self, _: &JobHandle) -> Result<JobStatus> {
            self.polls
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(JobStatus::Running))
        }

        async fn download_video(&self, location: &str) -> Result<Vec<u8>> {
            self.downloads.lock().unwrap().push(location.to_string());
            Ok(b"clip".to_vec())
        }
    }

    fn fixed(secs: u64) -> Backoff {
        Backoff {
            initial: Duration::from_secs(secs),
            factor: 1.0,
            max: Duration::from_secs(secs),
        }
    }

    #[test]
    fn backoff_grows_and_caps() {
        let backoff = Backoff {
            initial: Duration::from_secs(2),
            factor: 2.0,
            max: Duration::from_secs(10),
        };
        assert_eq!(backoff.delay(0), Duration::from_secs(2));
        assert_eq!(backoff.delay(1), Duration::from_secs(4));
        assert_eq!(backoff.delay(2), Duration::from_secs(8));
        assert_eq!(backoff.delay(3), Duration::from_secs(10));
        assert_eq!(backoff.delay(1000), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn downloads_after_job_completes() {
        let service = ScriptedJob::new(vec![
            Ok(JobStatus::Pending),
            Ok(JobStatus::Running),
            Ok(JobStatus::Done("files/abc".into())),
        ]);
        let clock = ManualClock::default();
        let policy = WaitPolicy {
            backoff: fixed(5),
            ..WaitPolicy::default()
        };

        let bytes = await_video_job(&service, &JobHandle("op/1".into()), &policy, &clock)
            .await
            .unwrap();

        assert_eq!(bytes, b"clip");
        assert_eq!(*service.downloads.lock().unwrap(), vec!["files/abc".to_string()]);
        assert_eq!(clock.now(), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn failed_job_is_a_service_error() {
        let service = ScriptedJob::new(vec![Ok(JobStatus::Failed("unsafe prompt".into()))]);
        let clock = ManualClock::default();

        let err = await_video_job(&service, &JobHandle("op/2".into()), &WaitPolicy::default(), &clock)
            .await
            .unwrap_err();

        assert!(matches!(err, VideoError::Service(ref m) if m.contains("unsafe prompt")));
        assert!(service.downloads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn finished_without_video_is_reported_without_repolling() {
        let service = ScriptedJob::new(vec![
            Ok(JobStatus::Failed("finished without a video".into())),
            Ok(JobStatus::Done("files/late".into())),
        ]);
        let clock = ManualClock::default();

        let err = await_video_job(&service, &JobHandle("op/3".into()), &WaitPolicy::default(), &clock)
            .await
            .unwrap_err();

        assert!(matches!(err, VideoError::Service(ref m) if m.contains("without a video")));
        assert!(clock.sleeps.lock().unwrap().is_empty());
        assert_eq!(service.polls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn gives_up_when_timeout_elapses() {
        let service = ScriptedJob::new(vec![]);
        let clock = ManualClock::default();
        let policy = WaitPolicy {
            timeout: Duration::from_secs(60),
            backoff: fixed(25),
            poll_retries: 3,
        };

        let err = await_video_job(&service, &JobHandle("op/3".into()), &policy, &clock)
            .await
            .unwrap_err();

        assert!(matches!(err, VideoError::Timeout(_)));
        assert_eq!(clock.now(), Duration::from_secs(60));
        // last sleep is clipped to the remaining budget
        assert_eq!(clock.sleeps.lock().unwrap().last(), Some(&Duration::from_secs(10)));
    }

    #[tokio::test]
    async fn tolerates_transient_poll_errors() {
        let service = ScriptedJob::new(vec![
            Err(VideoError::service("502")),
            Err(VideoError::service("502")),
            Ok(JobStatus::Done("files/ok".into())),
        ]);
        let clock = ManualClock::default();
        let policy = WaitPolicy {
            poll_retries: 2,
            ..WaitPolicy::default()
        };

        let bytes = await_video_job(&service, &JobHandle("op/4".into()), &policy, &clock)
            .await
            .unwrap();
        assert_eq!(bytes, b"clip");
    }

    #[tokio::test]
    async fn surfaces_persistent_poll_errors() {
        let service = ScriptedJob::new(vec![
            Err(VideoError::service("502")),
            Err(VideoError::service("503")),
        ]);
        let clock = ManualClock::default();
        let policy = WaitPolicy {
            poll_retries: 1,
            ..WaitPolicy::default()
        };

        let err = await_video_job(&service, &JobHandle("op/5".into()), &policy, &clock)
            .await
            .unwrap_err();
        assert!(matches!(err, VideoError::Service(ref m) if m == "503"));
    }
}
