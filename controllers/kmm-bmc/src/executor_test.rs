//! Unit tests for the command executor

#[cfg(test)]
mod tests {
    use crate::error::EngineError;
    use crate::executor::{CommandExecutor, HELPER_CONTAINER};
    use crate::test_utils::*;
    use cluster_client::mock::helpers::helper_pod;
    use cluster_client::{ExecOutput, ExecStatus, MockClusterClient};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::Instant;

    #[tokio::test]
    async fn test_empty_command_rejected_without_cluster_calls() {
        let mock = MockClusterClient::new();
        add_helper(&mock, "helper-0", "worker-0");
        let executor = CommandExecutor::new(Arc::new(mock.clone()), HELPER_NAMESPACE);

        let err = executor.run("worker-0", &[]).await.unwrap_err();

        assert!(matches!(err, EngineError::ExecFailed { .. }));
        assert!(mock.exec_calls().is_empty());
    }

    #[tokio::test]
    async fn test_no_helper_pod_on_node() {
        let mock = MockClusterClient::new();
        add_helper(&mock, "helper-1", "worker-1");
        let executor = CommandExecutor::new(Arc::new(mock), HELPER_NAMESPACE);

        let err = executor.run("worker-0", &["lsmod"]).await.unwrap_err();

        assert!(matches!(err, EngineError::NoHelperPod { node } if node == "worker-0"));
    }

    #[tokio::test]
    async fn test_selection_skips_unready_and_pending_pods() {
        let mock = MockClusterClient::new();

        let mut pending = helper_pod("helper-pending", HELPER_NAMESPACE, "worker-0");
        pending.phase = Some("Pending".to_string());
        mock.add_pod(pending, HELPER_LABELS);

        let mut unready = helper_pod("helper-unready", HELPER_NAMESPACE, "worker-0");
        unready.containers[0].ready = false;
        mock.add_pod(unready, HELPER_LABELS);

        let mut wrong_container = helper_pod("helper-other", HELPER_NAMESPACE, "worker-0");
        wrong_container.containers[0].name = "sidecar".to_string();
        mock.add_pod(wrong_container, HELPER_LABELS);

        add_helper(&mock, "helper-good", "worker-0");
        mock.on_exec(|_| Ok(ExecOutput::success("ok")));

        let executor = CommandExecutor::new(Arc::new(mock.clone()), HELPER_NAMESPACE);
        let output = executor.run("worker-0", &["true"]).await.unwrap();

        assert_eq!(output, b"ok".to_vec());
        let calls = mock.exec_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].pod, "helper-good");
        assert_eq!(calls[0].container, HELPER_CONTAINER);
    }

    #[tokio::test]
    async fn test_output_combines_stdout_and_stderr() {
        let mock = MockClusterClient::new();
        add_helper(&mock, "helper-0", "worker-0");
        mock.on_exec(|_| {
            Ok(ExecOutput {
                stdout: b"out ".to_vec(),
                stderr: b"err".to_vec(),
                status: ExecStatus::Success,
            })
        });
        let executor = CommandExecutor::new(Arc::new(mock), HELPER_NAMESPACE);

        let output = executor.run("worker-0", &["dmesg"]).await.unwrap();

        assert_eq!(output, b"out err".to_vec());
    }

    #[tokio::test]
    async fn test_non_zero_exit_carries_output() {
        let mock = MockClusterClient::new();
        add_helper(&mock, "helper-0", "worker-0");
        mock.on_exec(|_| Ok(ExecOutput::exit_code(1, "modinfo: ERROR: Module nope not found.")));
        let executor = CommandExecutor::new(Arc::new(mock), HELPER_NAMESPACE);

        let err = executor
            .run("worker-0", &["chroot", "/host", "modinfo", "nope"])
            .await
            .unwrap_err();

        match err {
            EngineError::NonZeroExit { code, output, command, .. } => {
                assert_eq!(code, Some(1));
                assert!(output.contains("not found"));
                assert_eq!(command, "chroot /host modinfo nope");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_exec_api_error_is_exec_failed() {
        let mock = MockClusterClient::new();
        add_helper(&mock, "helper-0", "worker-0");
        mock.on_exec(|_| Err(cluster_client::ClusterError::Exec("stream reset".to_string())));
        let executor = CommandExecutor::new(Arc::new(mock), HELPER_NAMESPACE);

        let err = executor.run("worker-0", &["lsmod"]).await.unwrap_err();

        assert!(matches!(err, EngineError::ExecFailed { message, .. } if message.contains("stream reset")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_helper_times_out_with_helper_not_ready() {
        let mock = MockClusterClient::new();
        let executor = CommandExecutor::new(Arc::new(mock), HELPER_NAMESPACE);
        let start = Instant::now();

        let err = executor
            .acquire_helper("worker-0", Duration::from_secs(60))
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::HelperNotReady { .. }));
        assert_eq!(start.elapsed(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_helper_picks_up_late_pod() {
        let mock = MockClusterClient::new();
        let executor = CommandExecutor::new(Arc::new(mock.clone()), HELPER_NAMESPACE);

        let late = mock.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(12)).await;
            add_helper(&late, "helper-late", "worker-0");
        });

        let helper = executor
            .acquire_helper("worker-0", Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(helper.name, "helper-late");
    }
}
