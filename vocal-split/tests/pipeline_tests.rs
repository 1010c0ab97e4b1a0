//! End-to-end tests of the job pipeline with fake tools.
//!
//! Every test drives a real `JobManager` (queue, workers, cache, event log)
//! over temporary directories; only the fetcher and strategies are faked.

mod common;

use std::sync::Arc;

use common::*;
use vocal_split::Error;
use vocal_split::cache::fingerprint;
use vocal_split::jobs::{JobStatus, LOG_SENTINEL, Track};
use vocal_split::pipeline::CANCELLED_MESSAGE;
use vocal_split::separation::SeparationStrategy;

mod fallback_tests {
    use super::*;

    #[tokio::test]
    async fn test_falls_back_to_next_strategy() {
        let first = FakeStrategy::new("first", Behaviour::Fail);
        let second = FakeStrategy::new("second", Behaviour::Succeed);
        let strategies: Vec<Arc<dyn SeparationStrategy>> = vec![first.clone(), second.clone()];
        let h = harness(strategies).await;

        let job = h.manager.submit_remote(URL).unwrap();
        let record = wait_terminal(&h.manager, &job.id).await;

        assert_eq!(record.status, JobStatus::Completed);
        assert_eq!(record.progress, 100);
        assert_eq!(record.strategy.as_deref(), Some("second"));
        assert_eq!(record.title.as_deref(), Some("Me at the zoo"));
        assert!(!record.from_cache);
        assert_eq!(first.calls(), 1);
        assert_eq!(second.calls(), 1);

        let log = messages(&wait_log_finished(&h.manager, &job.id).await);
        let tried_first = log.iter().position(|m| m == "Trying strategy first...");
        let failed_first = log.iter().position(|m| m.starts_with("Strategy first failed"));
        let tried_second = log.iter().position(|m| m == "Trying strategy second...");
        assert!(tried_first.is_some());
        assert!(tried_first < failed_first);
        assert!(failed_first < tried_second);
        assert_eq!(log.last().map(String::as_str), Some(LOG_SENTINEL));
    }

    #[tokio::test]
    async fn test_exhausted_chain_fails_the_job() {
        let strategies: Vec<Arc<dyn SeparationStrategy>> = vec![
            FakeStrategy::new("first", Behaviour::Fail),
            FakeStrategy::new("second", Behaviour::Fail),
        ];
        let h = harness(strategies).await;

        let job = h.manager.submit_remote(URL).unwrap();
        let record = wait_terminal(&h.manager, &job.id).await;

        assert_eq!(record.status, JobStatus::Error);
        assert!(record.message.contains("second"), "{}", record.message);
        assert!(record.vocal_url.is_none());

        let err = h
            .manager
            .artifact(&job.id, Track::Instrumental)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotCompleted(_)));

        let stats = h.manager.cache_stats().await.unwrap();
        assert_eq!(stats.count, 0);
    }

    #[tokio::test]
    async fn test_fetch_failure_fails_the_job() {
        let strategy = FakeStrategy::new("only", Behaviour::Succeed);
        let strategies: Vec<Arc<dyn SeparationStrategy>> = vec![strategy.clone()];
        let h = harness_with(strategies, FakeFetcher::failing(), 1).await;

        let job = h.manager.submit_remote(URL).unwrap();
        let record = wait_terminal(&h.manager, &job.id).await;

        assert_eq!(record.status, JobStatus::Error);
        assert_eq!(record.progress, 10);
        assert_eq!(strategy.calls(), 0);
        let log = messages(&wait_log_finished(&h.manager, &job.id).await);
        assert!(log.iter().any(|m| m.starts_with("Processing failed")));
    }

    #[tokio::test]
    async fn test_background_only_result_is_completed_but_not_cached() {
        let strategies: Vec<Arc<dyn SeparationStrategy>> =
            vec![FakeStrategy::new("phase", Behaviour::BackgroundOnly)];
        let h = harness(strategies).await;

        let job = h.manager.submit_remote(URL).unwrap();
        let record = wait_terminal(&h.manager, &job.id).await;

        assert_eq!(record.status, JobStatus::Completed);
        assert!(record.vocal_url.is_none());
        assert_eq!(
            record.instrumental_url,
            Some(format!("/download/{}/instrumental", job.id))
        );
        assert!(matches!(
            h.manager.artifact(&job.id, Track::Vocals).await,
            Err(Error::ArtifactMissing(_))
        ));
        assert!(h.manager.artifact(&job.id, Track::Instrumental).await.is_ok());
        assert_eq!(h.manager.cache_stats().await.unwrap().count, 0);
    }
}

mod cache_tests {
    use super::*;

    #[tokio::test]
    async fn test_second_submission_is_served_from_cache() {
        let strategy = FakeStrategy::new("only", Behaviour::Succeed);
        let strategies: Vec<Arc<dyn SeparationStrategy>> = vec![strategy.clone()];
        let h = harness(strategies).await;

        let first = h.manager.submit_remote(URL).unwrap();
        let first = wait_terminal(&h.manager, &first.id).await;
        assert_eq!(first.status, JobStatus::Completed);

        let second = h.manager.submit_remote(URL).unwrap();
        let second = wait_terminal(&h.manager, &second.id).await;
        assert_eq!(second.status, JobStatus::Completed);
        assert!(second.from_cache);
        assert_eq!(second.title.as_deref(), Some("Me at the zoo"));

        assert_eq!(h.fetcher.calls(), 1);
        assert_eq!(strategy.calls(), 1);

        for track in Track::ALL {
            let a = h.manager.artifact(&first.id, track).await.unwrap();
            let b = h.manager.artifact(&second.id, track).await.unwrap();
            assert_eq!(
                tokio::fs::read(&a).await.unwrap(),
                tokio::fs::read(&b).await.unwrap()
            );
        }

        let log = messages(&wait_log_finished(&h.manager, &second.id).await);
        assert!(log.iter().any(|m| m.starts_with("Cache hit")));
        assert!(!log.iter().any(|m| m == "Downloading audio..."));
    }

    #[tokio::test]
    async fn test_deleting_entry_forces_reprocessing() {
        let strategy = FakeStrategy::new("only", Behaviour::Succeed);
        let strategies: Vec<Arc<dyn SeparationStrategy>> = vec![strategy.clone()];
        let h = harness(strategies).await;

        let job = h.manager.submit_remote(URL).unwrap();
        wait_terminal(&h.manager, &job.id).await;

        let stats = h.manager.cache_stats().await.unwrap();
        assert_eq!(stats.count, 1);
        assert_eq!(stats.entries[0].fingerprint, fingerprint(URL));
        assert_eq!(stats.entries[0].source, URL);

        h.manager.cache_delete(&fingerprint(URL)).await.unwrap();
        assert!(matches!(
            h.manager.cache_delete(&fingerprint(URL)).await,
            Err(Error::NotFound { .. })
        ));

        let again = h.manager.submit_remote(URL).unwrap();
        let again = wait_terminal(&h.manager, &again.id).await;
        assert!(!again.from_cache);
        assert_eq!(h.fetcher.calls(), 2);
        assert_eq!(strategy.calls(), 2);

        assert_eq!(h.manager.cache_clear().await.unwrap(), 1);
        assert_eq!(h.manager.cache_stats().await.unwrap().count, 0);
    }

    #[tokio::test]
    async fn test_url_is_fingerprinted_as_submitted() {
        let strategy = FakeStrategy::new("only", Behaviour::Succeed);
        let strategies: Vec<Arc<dyn SeparationStrategy>> = vec![strategy.clone()];
        let h = harness(strategies).await;

        let lower = "https://www.youtube.com/watch?v=jNQXAC9IVRw";
        let upper = "https://WWW.YOUTUBE.COM/watch?v=jNQXAC9IVRw";
        let first = h.manager.submit_remote(lower).unwrap();
        wait_terminal(&h.manager, &first.id).await;

        let second = h.manager.submit_remote(upper).unwrap();
        assert_eq!(second.source.identifier(), upper);
        let second = wait_terminal(&h.manager, &second.id).await;
        assert_eq!(second.status, JobStatus::Completed);
        assert!(!second.from_cache);
        assert_eq!(strategy.calls(), 2);

        let stats = h.manager.cache_stats().await.unwrap();
        assert_eq!(stats.count, 2);
        for url in [lower, upper] {
            assert!(
                stats
                    .entries
                    .iter()
                    .any(|e| e.fingerprint == fingerprint(url) && e.source == url)
            );
        }

        // Surrounding whitespace is not part of the identifier.
        let padded = h.manager.submit_remote(&format!("  {lower}\n")).unwrap();
        assert_eq!(padded.source.identifier(), lower);
        let padded = wait_terminal(&h.manager, &padded.id).await;
        assert!(padded.from_cache);
    }

    #[tokio::test]
    async fn test_cache_write_failure_still_completes() {
        let strategies: Vec<Arc<dyn SeparationStrategy>> =
            vec![FakeStrategy::new("only", Behaviour::Succeed)];
        let h = harness(strategies).await;

        // A regular file where the cache root should be.
        let cache_root = h.dir.path().join("cache");
        std::fs::remove_dir_all(&cache_root).unwrap();
        std::fs::write(&cache_root, b"not a directory").unwrap();

        let job = h.manager.submit_remote(URL).unwrap();
        let record = wait_terminal(&h.manager, &job.id).await;
        assert_eq!(record.status, JobStatus::Completed);
        assert!(!record.from_cache);
        assert!(h.manager.artifact(&job.id, Track::Vocals).await.is_ok());

        let log = messages(&wait_log_finished(&h.manager, &job.id).await);
        assert!(log.iter().any(|m| m.starts_with("Failed to cache result")), "{log:?}");
        assert!(!log.iter().any(|m| m == "Result cached"));
        assert_eq!(log[log.len() - 2], "Processing complete!");
    }
}

mod upload_tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_without_audio_type_is_rejected() {
        let strategies: Vec<Arc<dyn SeparationStrategy>> =
            vec![FakeStrategy::new("only", Behaviour::Succeed)];
        let h = harness(strategies).await;

        let err = h
            .manager
            .submit_upload("track", Some("text/plain"), b"not audio")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSource(_)));

        let err = h
            .manager
            .submit_upload("track.flac", Some("audio/flac"), b"")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSource(_)));
        assert!(h.manager.list().is_empty());
    }

    #[tokio::test]
    async fn test_upload_is_processed_without_fetching_or_caching() {
        let strategy = FakeStrategy::new("only", Behaviour::Succeed);
        let strategies: Vec<Arc<dyn SeparationStrategy>> = vec![strategy.clone()];
        let h = harness(strategies).await;

        let job = h
            .manager
            .submit_upload("track.flac", Some("audio/flac"), b"fLaC....")
            .await
            .unwrap();
        let record = wait_terminal(&h.manager, &job.id).await;

        assert_eq!(record.status, JobStatus::Completed);
        assert_eq!(record.source.identifier(), "track.flac");
        assert_eq!(h.fetcher.calls(), 0);
        assert_eq!(strategy.calls(), 1);
        assert_eq!(h.manager.cache_stats().await.unwrap().count, 0);

        let log = messages(&wait_log_finished(&h.manager, &job.id).await);
        assert!(!log.iter().any(|m| m == "Checking cache..."));
    }
}

mod stop_tests {
    use super::*;

    #[tokio::test]
    async fn test_stop_running_job() {
        let strategies: Vec<Arc<dyn SeparationStrategy>> =
            vec![FakeStrategy::new("slow", Behaviour::Hang)];
        let h = harness(strategies).await;

        let job = h.manager.submit_remote(URL).unwrap();
        wait_until(&h.manager, &job.id, |r| r.status == JobStatus::Separating).await;

        let (record, stopped) = h.manager.stop(&job.id).unwrap();
        assert!(stopped);
        assert_eq!(record.status, JobStatus::Error);
        assert_eq!(record.message, CANCELLED_MESSAGE);

        let log = messages(&wait_log_finished(&h.manager, &job.id).await);
        let requested = log.iter().position(|m| m == "Stop requested by user");
        let stopped = log.iter().position(|m| m == "Job stopped");
        assert!(requested.is_some() && stopped.is_some(), "{log:?}");
        assert!(requested < stopped);

        // The worker must not overwrite the stopped record.
        let record = h.manager.status(&job.id).unwrap();
        assert_eq!(record.status, JobStatus::Error);
        assert_eq!(record.message, CANCELLED_MESSAGE);
    }

    #[tokio::test]
    async fn test_stop_queued_job() {
        let strategies: Vec<Arc<dyn SeparationStrategy>> =
            vec![FakeStrategy::new("slow", Behaviour::Hang)];
        let h = harness_with(strategies, FakeFetcher::default(), 1).await;

        let busy = h.manager.submit_remote(URL).unwrap();
        wait_until(&h.manager, &busy.id, |r| r.status == JobStatus::Separating).await;

        let queued = h
            .manager
            .submit_remote("https://youtu.be/dQw4w9WgXcQ")
            .unwrap();
        let (record, stopped) = h.manager.stop(&queued.id).unwrap();
        assert!(stopped);
        assert_eq!(record.status, JobStatus::Error);

        let log = messages(&wait_log_finished(&h.manager, &queued.id).await);
        assert_eq!(log.first().map(String::as_str), Some("Job created: https://youtu.be/dQw4w9WgXcQ"));
        assert!(!log.iter().any(|m| m == "Downloading audio..."));

        h.manager.stop(&busy.id).unwrap();
        wait_log_finished(&h.manager, &busy.id).await;
        assert_eq!(h.fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_stop_terminal_job_is_noop() {
        let strategies: Vec<Arc<dyn SeparationStrategy>> =
            vec![FakeStrategy::new("only", Behaviour::Succeed)];
        let h = harness(strategies).await;

        let job = h.manager.submit_remote(URL).unwrap();
        wait_terminal(&h.manager, &job.id).await;
        let before = wait_log_finished(&h.manager, &job.id).await.len();

        let (record, stopped) = h.manager.stop(&job.id).unwrap();
        assert!(!stopped);
        assert_eq!(record.status, JobStatus::Completed);
        let (lines, _) = h.manager.tail_logs(&job.id, 0).unwrap();
        assert_eq!(lines.len(), before);
        assert!(!messages(&lines).iter().any(|m| m == "Stop requested by user"));
    }

    #[tokio::test]
    async fn test_stop_unknown_job() {
        let h = harness(Vec::new()).await;
        assert!(matches!(
            h.manager.stop("missing"),
            Err(Error::NotFound { .. })
        ));
    }
}

mod log_tests {
    use super::*;

    #[tokio::test]
    async fn test_early_and_late_readers_see_the_same_log() {
        let strategies: Vec<Arc<dyn SeparationStrategy>> =
            vec![FakeStrategy::new("only", Behaviour::Succeed)];
        let h = harness(strategies).await;

        let job = h.manager.submit_remote(URL).unwrap();

        // Follow the log incrementally from the moment of submission.
        let mut cursor = 0;
        let mut early = Vec::new();
        tokio::time::timeout(std::time::Duration::from_secs(10), async {
            loop {
                let (lines, next) = h.manager.tail_logs(&job.id, cursor).unwrap();
                cursor = next;
                let done = lines.iter().any(|l| l.is_sentinel());
                early.extend(lines);
                if done {
                    break;
                }
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let late = wait_log_finished(&h.manager, &job.id).await;
        assert_eq!(messages(&early), messages(&late));
        assert_eq!(
            late.iter().filter(|l| l.is_sentinel()).count(),
            1,
            "sentinel must appear exactly once"
        );
        assert_eq!(messages(&late)[0], format!("Job created: {URL}"));
    }
}

mod history_tests {
    use super::*;

    #[tokio::test]
    async fn test_history_lists_completed_jobs_and_delete_removes_them() {
        let strategies: Vec<Arc<dyn SeparationStrategy>> =
            vec![FakeStrategy::new("only", Behaviour::Succeed)];
        let h = harness(strategies).await;

        let first = h.manager.submit_remote(URL).unwrap();
        wait_terminal(&h.manager, &first.id).await;
        let second = h
            .manager
            .submit_remote("https://youtu.be/dQw4w9WgXcQ")
            .unwrap();
        wait_terminal(&h.manager, &second.id).await;

        let history = h.manager.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, second.id);

        let first_dir = h.dir.path().join("work").join(&first.id);
        assert!(first_dir.is_dir());
        h.manager.delete_history(&first.id).await.unwrap();
        assert!(!first_dir.exists());
        assert!(h.dir.path().join("work").join(&second.id).is_dir());
        assert!(matches!(
            h.manager.status(&first.id),
            Err(Error::NotFound { .. })
        ));
        assert!(h.manager.tail_logs(&first.id, 0).is_err());
        assert_eq!(h.manager.history().len(), 1);
        // Cached results outlive the job.
        assert_eq!(h.manager.cache_stats().await.unwrap().count, 2);
    }

    #[tokio::test]
    async fn test_active_job_cannot_be_deleted() {
        let strategies: Vec<Arc<dyn SeparationStrategy>> =
            vec![FakeStrategy::new("slow", Behaviour::Hang)];
        let h = harness(strategies).await;

        let job = h.manager.submit_remote(URL).unwrap();
        wait_until(&h.manager, &job.id, |r| r.status == JobStatus::Separating).await;

        assert!(matches!(
            h.manager.delete_history(&job.id).await,
            Err(Error::JobActive(_))
        ));
        h.manager.stop(&job.id).unwrap();
        wait_log_finished(&h.manager, &job.id).await;
        h.manager.delete_history(&job.id).await.unwrap();
    }
}
