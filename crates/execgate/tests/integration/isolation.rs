use std::process::Command;

use execgate::ExecutionService;
use execgate::runner::CONTAINER_PREFIX;
use execgate::types::{ExecutionRequest, ExecutionStatus, Identity};

use super::{fixture_source, test_config};

#[tokio::test]
#[ignore = "requires docker"]
async fn test_runs_do_not_share_a_filesystem() {
    let service = ExecutionService::new(test_config());

    let write = ExecutionRequest::new("python", fixture_source("write_marker.py"));
    let result = service
        .execute(&Identity::Anonymous, &write)
        .await
        .expect("request rejected");
    assert_eq!(result.status, ExecutionStatus::Success);
    assert_eq!(result.stdout, "written\n");

    let read = ExecutionRequest::new("python", fixture_source("read_marker.py"));
    let result = service
        .execute(&Identity::Anonymous, &read)
        .await
        .expect("request rejected");
    assert_eq!(result.status, ExecutionStatus::Success);
    assert_eq!(result.stdout, "absent\n");
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_network_is_disabled() {
    let service = ExecutionService::new(test_config());
    let source = "import socket\nsocket.create_connection((\"1.1.1.1\", 53), timeout=1)\n";
    let request = ExecutionRequest::new("python", source);

    let result = service
        .execute(&Identity::Anonymous, &request)
        .await
        .expect("request rejected");
    assert_eq!(result.status, ExecutionStatus::RuntimeError);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_no_container_left_after_timeout() {
    let service = ExecutionService::new(test_config());
    let request = ExecutionRequest::new("python", fixture_source("infinite_loop.py"));

    let result = service
        .execute(&Identity::Anonymous, &request)
        .await
        .expect("request rejected");
    assert_eq!(result.status, ExecutionStatus::Timeout);

    let output = Command::new("docker")
        .args(["ps", "-a", "--format", "{{.Names}}"])
        .output()
        .expect("failed to list containers");
    let names = String::from_utf8_lossy(&output.stdout);
    assert!(
        !names.lines().any(|n| n.starts_with(CONTAINER_PREFIX)),
        "leftover containers: {names}"
    );
}
