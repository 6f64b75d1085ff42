use std::sync::Arc;

use execgate::types::{ExecutionRequest, ExecutionStatus, Identity};
use execgate::{ExecuteError, ExecutionService, SubmitError};

use super::{fixture_source, test_config};

#[tokio::test]
#[ignore = "requires docker"]
async fn test_third_concurrent_request_of_one_identity_is_rejected() {
    let service = Arc::new(ExecutionService::new(test_config()));
    let user = Identity::User("alice".to_owned());
    let request = ExecutionRequest::new("python", fixture_source("sleep.py"));

    let running: Vec<_> = (0..2)
        .map(|_| {
            let service = Arc::clone(&service);
            let user = user.clone();
            let request = request.clone();
            tokio::spawn(async move { service.execute(&user, &request).await })
        })
        .collect();

    // Both are admitted long before either container finishes
    while service.dispatcher().in_flight(&user) < 2 {
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    let err = service.execute(&user, &request).await.unwrap_err();
    assert!(matches!(
        err,
        ExecuteError::Rejected(SubmitError::TooManyInFlight { limit: 2, .. })
    ));
    assert_eq!(err.retry_after_secs(), Some(2));

    for handle in running {
        let result = handle.await.unwrap().expect("request rejected");
        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(result.stdout, "done\n");
    }
    assert_eq!(service.dispatcher().in_flight(&user), 0);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_many_identities_run_concurrently() {
    let service = Arc::new(ExecutionService::new(test_config()));
    let request = ExecutionRequest::new("python", fixture_source("hello.py"));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let service = Arc::clone(&service);
            let request = request.clone();
            tokio::spawn(async move {
                service
                    .execute(&Identity::User(i.to_string()), &request)
                    .await
            })
        })
        .collect();

    for handle in handles {
        let result = handle.await.unwrap().expect("request rejected");
        assert_eq!(result.status, ExecutionStatus::Success);
    }
    assert_eq!(service.dispatcher().available_permits(), 6);
}
