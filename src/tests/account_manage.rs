use super::*;

use axum::http;
use hyper::{Request, StatusCode};
use serial_test::serial;
use tower::ServiceExt;

use cira_shared::account::handle::manage::*;

#[serial]
#[tokio::test]
async fn role_requests_are_listed() {
    reset_all();

    let app = crate::router();
    push_account_requesting(
        1,
        "perez.maria.23",
        Role::Student,
        Some(RequestedRole::ClassRepresentative),
    );
    push_account(2, "santos.jose.23", Role::Student);
    let admin_token = push_account(3, "facilities.admin", Role::Admin);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/account/manage/role-requests")
                .method("POST")
                .header("Token", &admin_token)
                .header("AccountId", 3)
                .body(hyper::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let response_json: serde_json::Value =
        serde_json::from_slice(&hyper::body::to_bytes(response.into_body()).await.unwrap())
            .unwrap();
    let requests = response_json["requests"].as_array().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0]["account_id"].as_u64().unwrap(), 1);
    assert_eq!(
        requests[0]["requested_role"].as_str().unwrap(),
        "class-representative"
    );
}

#[serial]
#[tokio::test]
async fn approving_grants_the_requested_role() {
    reset_all();

    let app = crate::router();
    push_account_requesting(
        1,
        "perez.maria.23",
        Role::Student,
        Some(RequestedRole::ClassRepresentative),
    );
    let admin_token = push_account(3, "facilities.admin", Role::Admin);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/account/manage/review-role")
                .method("POST")
                .header(http::header::CONTENT_TYPE, mime::APPLICATION_JSON.as_ref())
                .header("Token", &admin_token)
                .header("AccountId", 3)
                .body(
                    serde_json::to_vec(&ReviewRoleDescriptor {
                        account_id: 1,
                        variant: ReviewRoleVariant::Approve,
                    })
                    .unwrap()
                    .into(),
                )
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let b = crate::account::INSTANCE.inner().read();
    let index = *crate::account::INSTANCE.index().get(&1).unwrap();
    match &*b[index].read() {
        Account::Verified { profile, .. } => {
            assert_eq!(profile.role, Role::ClassRepresentative);
            assert!(profile.requested_role.is_none());
        }
        _ => unreachable!(),
    };
}

#[serial]
#[tokio::test]
async fn rejecting_keeps_the_role_and_clears_the_request() {
    reset_all();

    let app = crate::router();
    push_account_requesting(
        1,
        "perez.maria.23",
        Role::Student,
        Some(RequestedRole::ClassRepresentative),
    );
    let admin_token = push_account(3, "facilities.admin", Role::Admin);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/account/manage/review-role")
                .method("POST")
                .header(http::header::CONTENT_TYPE, mime::APPLICATION_JSON.as_ref())
                .header("Token", &admin_token)
                .header("AccountId", 3)
                .body(
                    serde_json::to_vec(&ReviewRoleDescriptor {
                        account_id: 1,
                        variant: ReviewRoleVariant::Reject,
                    })
                    .unwrap()
                    .into(),
                )
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let b = crate::account::INSTANCE.inner().read();
    let index = *crate::account::INSTANCE.index().get(&1).unwrap();
    match &*b[index].read() {
        Account::Verified { profile, .. } => {
            assert_eq!(profile.role, Role::Student);
            assert!(profile.requested_role.is_none());
        }
        _ => unreachable!(),
    };
}

#[serial]
#[tokio::test]
async fn reviewing_roles_requires_the_admin_role() {
    reset_all();

    let app = crate::router();
    push_account_requesting(
        1,
        "perez.maria.23",
        Role::Student,
        Some(RequestedRole::ClassRepresentative),
    );
    let rep_token = push_account(2, "santos.jose.23", Role::ClassRepresentative);

    assert_eq!(
        app.clone()
            .oneshot(
                Request::builder()
                    .uri("/api/account/manage/role-requests")
                    .method("POST")
                    .header("Token", &rep_token)
                    .header("AccountId", 2)
                    .body(hyper::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
            .status(),
        StatusCode::FORBIDDEN
    );

    assert_eq!(
        app.oneshot(
            Request::builder()
                .uri("/api/account/manage/review-role")
                .method("POST")
                .header(http::header::CONTENT_TYPE, mime::APPLICATION_JSON.as_ref())
                .header("Token", &rep_token)
                .header("AccountId", 2)
                .body(
                    serde_json::to_vec(&ReviewRoleDescriptor {
                        account_id: 1,
                        variant: ReviewRoleVariant::Approve,
                    })
                    .unwrap()
                    .into(),
                )
                .unwrap(),
        )
        .await
        .unwrap()
        .status(),
        StatusCode::FORBIDDEN
    );

    let b = crate::account::INSTANCE.inner().read();
    let index = *crate::account::INSTANCE.index().get(&1).unwrap();
    match &*b[index].read() {
        Account::Verified { profile, .. } => {
            assert_eq!(profile.role, Role::Student);
            assert!(profile.requested_role.is_some());
        }
        _ => unreachable!(),
    };
}

#[serial]
#[tokio::test]
async fn reviewing_without_a_pending_request_fails() {
    reset_all();

    let app = crate::router();
    push_account(1, "perez.maria.23", Role::Student);
    let admin_token = push_account(3, "facilities.admin", Role::Admin);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/account/manage/review-role")
                .method("POST")
                .header(http::header::CONTENT_TYPE, mime::APPLICATION_JSON.as_ref())
                .header("Token", &admin_token)
                .header("AccountId", 3)
                .body(
                    serde_json::to_vec(&ReviewRoleDescriptor {
                        account_id: 1,
                        variant: ReviewRoleVariant::Approve,
                    })
                    .unwrap()
                    .into(),
                )
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
