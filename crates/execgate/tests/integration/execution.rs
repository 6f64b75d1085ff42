use std::time::Instant;

use execgate::types::{ExecutionRequest, ExecutionStatus, Identity};
use execgate::{DockerRunner, ExecutionService, Sandbox};

use super::{fixture_source, test_config};

#[tokio::test]
#[ignore = "requires docker"]
async fn test_python_prints_hi() {
    let service = ExecutionService::new(test_config());
    let request = ExecutionRequest::new("python", "print(\"hi\")");

    let result = service
        .execute(&Identity::Anonymous, &request)
        .await
        .expect("request rejected");

    assert_eq!(result.status, ExecutionStatus::Success);
    assert_eq!(result.stdout, "hi\n");
    assert_eq!(result.stderr, "");
    assert!(result.exec_time_ms > 0);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_stdin_is_delivered() {
    let service = ExecutionService::new(test_config());
    let request =
        ExecutionRequest::new("python", fixture_source("echo.py")).with_stdin("first\nsecond\n");

    let result = service
        .execute(&Identity::Anonymous, &request)
        .await
        .expect("request rejected");

    assert_eq!(result.status, ExecutionStatus::Success);
    assert_eq!(result.stdout, "first\nsecond\n");
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_cpp_compile_and_run() {
    let service = ExecutionService::new(test_config());
    let request = ExecutionRequest::new("cpp", fixture_source("hello.cpp"));

    let result = service
        .execute(&Identity::Anonymous, &request)
        .await
        .expect("request rejected");

    assert_eq!(result.status, ExecutionStatus::Success);
    assert!(result.stdout.contains("Hello, World!"));
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_cpp_compile_error_reports_diagnostics() {
    let service = ExecutionService::new(test_config());
    let request = ExecutionRequest::new("cpp", fixture_source("compile_error.cpp"));

    let result = service
        .execute(&Identity::Anonymous, &request)
        .await
        .expect("request rejected");

    assert_eq!(result.status, ExecutionStatus::CompileError);
    assert!(result.stderr.contains("error"), "{}", result.stderr);
    assert!(!result.stdout.contains("missing semicolon"));
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_runtime_error() {
    let service = ExecutionService::new(test_config());
    let request = ExecutionRequest::new("python", fixture_source("runtime_error.py"));

    let result = service
        .execute(&Identity::Anonymous, &request)
        .await
        .expect("request rejected");

    assert_eq!(result.status, ExecutionStatus::RuntimeError);
    assert_eq!(result.stdout, "before\n");
    assert!(result.stderr.contains("ValueError: boom"));
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_infinite_loop_times_out() {
    let config = test_config();
    let overall = config.sandbox.overall_timeout_seconds;
    let service = ExecutionService::new(config);
    let request = ExecutionRequest::new("python", fixture_source("infinite_loop.py"));

    let started = Instant::now();
    let result = service
        .execute(&Identity::Anonymous, &request)
        .await
        .expect("request rejected");

    assert_eq!(result.status, ExecutionStatus::Timeout);
    // Overall cutoff plus the removal and output grace bounds
    assert!(started.elapsed().as_secs() <= overall + 5);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_large_output_is_truncated_not_deadlocked() {
    let mut config = test_config();
    config.sandbox.max_output_bytes = 64 * 1024;
    let runner = DockerRunner::new(&config);
    let language = config.enabled_language("python").expect("python not found");

    let result = runner
        .run(language, &fixture_source("flood.py"), None)
        .await
        .expect("sandbox failed");

    assert_eq!(result.status, ExecutionStatus::Success);
    assert_eq!(result.stdout.len(), 64 * 1024);
}
