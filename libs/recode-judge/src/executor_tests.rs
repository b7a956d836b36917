/// Tests for the collaborator-facing client
///
/// These run the whole stack above the protocol against the scripted
/// in-memory backend:
/// 1. Language resolution feeds the submitted request
/// 2. Single executions are graded and normalized
/// 3. Waited submits fall back to polling when needed
/// 4. Batches keep input order on both paths

#[cfg(test)]
mod client_tests {
    use crate::error::JudgeError;
    use crate::executor::JudgeClient;
    use crate::testing::{FakeBackend, FakeJob};
    use recode_common::config::JudgeConfig;
    use recode_common::types::ExecutionRequest;
    use std::sync::Arc;
    use std::time::Duration;

    fn client(backend: &Arc<FakeBackend>) -> JudgeClient {
        let config = JudgeConfig {
            poll_jitter_ms: 0,
            ..Default::default()
        };
        JudgeClient::with_backend(backend.clone(), &config)
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_one_grades_output() {
        let backend = Arc::new(FakeBackend::with_script(|_| {
            FakeJob::accepted("0.30000000000000004\n").with_pending_reads(2)
        }));
        let request = ExecutionRequest::new("print(0.1 + 0.2)", 71).with_expected_output("0.3");

        let result = client(&backend).execute_one(&request).await.unwrap();

        assert!(result.success);
        assert_eq!(result.status_id, Some(3));
        assert_eq!(result.status_description, "Accepted");
        assert_eq!(result.language_id, 71);
        assert!(result.token.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wrong_answer_is_not_success() {
        let backend = Arc::new(FakeBackend::with_script(|_| FakeJob::accepted("41\n")));
        let request = ExecutionRequest::new("print(41)", 71).with_expected_output("42");

        let result = client(&backend).execute_one(&request).await.unwrap();
        assert!(!result.success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retired_language_is_swapped_before_submit() {
        let backend = Arc::new(FakeBackend::new());
        let request = ExecutionRequest::new("print(input())", 28).with_stdin("hi");

        let result = client(&backend).execute_one(&request).await.unwrap();

        assert_eq!(backend.submitted()[0].language_id, 92);
        assert_eq!(result.language_id, 92);
        assert_eq!(result.stdout.as_deref(), Some("hi"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_source_is_rejected_locally() {
        let backend = Arc::new(FakeBackend::new());
        let request = ExecutionRequest::new("   ", 71);

        let err = client(&backend).execute_one(&request).await.unwrap_err();

        assert!(matches!(err, JudgeError::InvalidRequest(_)));
        assert_eq!(backend.stats().submit_calls, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_waited_uses_single_call() {
        let backend = Arc::new(FakeBackend::with_script(|_| {
            FakeJob::accepted("7\n").with_pending_reads(4)
        }));
        let request = ExecutionRequest::new("print(7)", 71).with_expected_output("7");

        let result = client(&backend).execute_waited(&request).await.unwrap();

        assert!(result.success);
        assert_eq!(backend.stats().submit_wait_calls, 1);
        assert_eq!(backend.stats().submit_calls, 0);
        // only the hydration read for the empty stderr
        assert_eq!(backend.stats().fetch_calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stdout() {
        let backend = Arc::new(FakeBackend::new());
        let request = ExecutionRequest::new("print(input())", 71).with_stdin("echo");

        let stdout = client(&backend).run_stdout(&request).await.unwrap();
        assert_eq!(stdout.as_deref(), Some("echo"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_many_small_and_large_agree() {
        for count in [3usize, 15] {
            let backend = Arc::new(FakeBackend::new());
            let requests: Vec<ExecutionRequest> = (0..count)
                .map(|i| {
                    ExecutionRequest::new("print(input())", 71)
                        .with_stdin(format!("line {}", i))
                        .with_expected_output(format!("line {}", i))
                })
                .collect();

            let outcomes = client(&backend).execute_many(&requests).await.unwrap();

            assert_eq!(outcomes.len(), count);
            for (i, outcome) in outcomes.iter().enumerate() {
                let result = outcome.as_ref().unwrap();
                assert_eq!(result.stdout.as_deref(), Some(format!("line {}", i).as_str()));
                assert!(result.success);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_many_within_deadline() {
        let backend = Arc::new(FakeBackend::with_script(|_| {
            FakeJob::accepted("slow").with_pending_reads(u32::MAX)
        }));
        let requests: Vec<ExecutionRequest> = (0..2)
            .map(|_| ExecutionRequest::new("while True: pass", 71))
            .collect();

        let outcomes = client(&backend)
            .execute_many_within(&requests, Some(Duration::from_secs(2)))
            .await
            .unwrap();

        assert!(outcomes
            .iter()
            .all(|o| matches!(o, Err(e) if e.is_timeout())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_catalog_passthrough() {
        let backend = Arc::new(FakeBackend::new());
        let client = client(&backend);

        let languages = client.get_languages().await.unwrap();
        let statuses = client.get_statuses().await.unwrap();
        client.get_languages().await.unwrap();

        assert!(languages.iter().any(|l| l.id == 71));
        assert!(statuses.iter().any(|s| s.id == 3));
        assert_eq!(backend.stats().language_calls, 1);
    }
}
