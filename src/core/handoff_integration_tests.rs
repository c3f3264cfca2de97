//! Script handoff channel integration tests
//!
//! Exercises the mailbox protocol end to end against a real watched
//! temporary directory and a stubbed scripting runtime.

#[cfg(test)]
mod tests {
    use crate::core::backoff::ProbePolicy;
    use crate::core::handoff::{
        HandoffConfig, HandoffError, ScriptHandoffChannel, REQUEST_FILENAME, RESULT_FILENAME,
    };
    use crate::core::test_support::StubScriptHost;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn make_channel(host: Arc<StubScriptHost>) -> (ScriptHandoffChannel, TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = HandoffConfig {
            mailbox_dir: dir.path().to_path_buf(),
            settle_delay: Duration::from_millis(50),
            probe: ProbePolicy {
                attempts: 5,
                delay: Duration::from_millis(20),
            },
        };
        let channel = ScriptHandoffChannel::new(config, host);
        channel.start().expect("start handoff channel");
        (channel, dir)
    }

    #[tokio::test]
    async fn stale_mailbox_files_are_cleared_on_start() {
        let dir = tempfile::tempdir().expect("tempdir");
        let request = dir.path().join(REQUEST_FILENAME);
        let result = dir.path().join(RESULT_FILENAME);
        std::fs::write(&request, "leftover").expect("write stale request");
        std::fs::write(&result, "leftover").expect("write stale result");

        let config = HandoffConfig {
            mailbox_dir: dir.path().to_path_buf(),
            settle_delay: Duration::from_millis(50),
            probe: ProbePolicy::default(),
        };
        let channel = ScriptHandoffChannel::new(config, Arc::new(StubScriptHost::new()));
        channel.start().expect("start");

        assert!(!request.exists());
        assert!(!result.exists());
    }

    #[tokio::test]
    async fn invoke_round_trips_through_the_mailbox() {
        let host = Arc::new(StubScriptHost::new());
        host.enqueue_ok("2");
        let (channel, dir) = make_channel(host.clone());

        let raw = channel
            .invoke("1 + 1", Duration::from_secs(5))
            .await
            .expect("invoke");
        assert_eq!(raw, "2");
        assert_eq!(host.calls(), vec!["1 + 1".to_string()]);

        // The request was consumed; the result was left for the backend side.
        assert!(!dir.path().join(REQUEST_FILENAME).exists());
        let result = std::fs::read_to_string(dir.path().join(RESULT_FILENAME)).expect("result");
        assert_eq!(result, "2");
    }

    #[tokio::test]
    async fn non_request_filenames_are_ignored() {
        let host = Arc::new(StubScriptHost::new());
        let (_channel, dir) = make_channel(host.clone());

        std::fs::write(dir.path().join("other.txt"), "not a request").expect("write");
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(host.call_count(), 0);
    }

    #[tokio::test]
    async fn second_invoke_while_outstanding_is_refused() {
        let host = Arc::new(StubScriptHost::new().with_delay(Duration::from_millis(400)));
        let (channel, _dir) = make_channel(host);
        let channel = Arc::new(channel);

        let first = {
            let channel = channel.clone();
            tokio::spawn(async move { channel.invoke("slow", Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;

        let second = channel.invoke("eager", Duration::from_secs(1)).await;
        assert!(matches!(second, Err(HandoffError::RequestOutstanding)));

        let first = first.await.expect("join").expect("first invoke");
        assert_eq!(first, "true");
    }

    #[tokio::test]
    async fn timed_out_invoke_releases_the_slot() {
        let host = Arc::new(StubScriptHost::new().with_delay(Duration::from_millis(500)));
        let (channel, _dir) = make_channel(host.clone());

        let timed_out = channel.invoke("slow", Duration::from_millis(100)).await;
        assert!(matches!(timed_out, Err(HandoffError::Timeout(_))));

        // Let the watcher finish chewing on the first request.
        tokio::time::sleep(Duration::from_millis(800)).await;

        let raw = channel
            .invoke("next", Duration::from_secs(5))
            .await
            .expect("second invoke");
        assert_eq!(raw, "true");
    }

    #[tokio::test]
    async fn eval_failure_surfaces_as_error_and_is_written_back() {
        let host = Arc::new(StubScriptHost::failing("gateway down"));
        let (channel, dir) = make_channel(host);

        let result = channel.invoke("anything", Duration::from_secs(5)).await;
        assert!(matches!(result, Err(HandoffError::Eval(_))));

        let written =
            std::fs::read_to_string(dir.path().join(RESULT_FILENAME)).expect("result file");
        assert!(written.starts_with("Error: "));
    }

    #[tokio::test]
    async fn verify_runtime_passes_all_three_probes() {
        let host = Arc::new(StubScriptHost::new());
        host.enqueue_ok("25.0");
        let (channel, _dir) = make_channel(host.clone());

        channel.verify_runtime().await.expect("verified");

        let calls = host.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls[0].contains("$.version"));
        assert!(calls[1].contains("$._ext"));
        assert!(calls[2].contains("importVideoToSource"));
    }

    #[tokio::test]
    async fn verify_runtime_retries_the_configured_number_of_times() {
        let host = Arc::new(StubScriptHost::failing("not reachable"));
        let (channel, _dir) = make_channel(host.clone());

        let result = channel.verify_runtime().await;
        assert!(matches!(result, Err(HandoffError::RuntimeUnavailable(_))));
        // Five attempts, each failing at the first probe.
        assert_eq!(host.call_count(), 5);
    }

    #[tokio::test]
    async fn verify_runtime_rejects_missing_namespace() {
        let host = Arc::new(StubScriptHost::new());
        for _ in 0..5 {
            host.enqueue_ok("25.0"); // runtime probe answers
            host.enqueue_ok("false"); // namespace probe says absent
        }
        let (channel, _dir) = make_channel(host.clone());

        let result = channel.verify_runtime().await;
        assert!(matches!(result, Err(HandoffError::RuntimeUnavailable(_))));
        // Each attempt stops at the namespace probe.
        assert_eq!(host.call_count(), 10);
    }
}
