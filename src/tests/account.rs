use super::*;

use axum::http;
use hyper::{Request, StatusCode};
use serial_test::serial;
use std::sync::atomic::Ordering;
use tower::ServiceExt;

use cira_shared::account::handle::*;

#[test]
fn student_id_format() {
    for valid in ["00-0000", "23-3302", "99-9999"] {
        assert!(crate::account::validate_student_id(valid).is_ok());
    }

    for invalid in ["", "233302", "2-3302", "233-302", "23-330", "23-33022", "ab-cdef", "23 3302"] {
        assert!(crate::account::validate_student_id(invalid).is_err());
    }
}

#[serial]
#[tokio::test]
async fn create_verify_login() {
    reset_all();

    let app = crate::router();
    let email = lettre::Address::new("delacruz.juan.23", "plv.edu.ph").unwrap();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/account/create")
                .method("POST")
                .header(http::header::CONTENT_TYPE, mime::APPLICATION_JSON.as_ref())
                .body(
                    serde_json::to_vec(&AccountCreateDescriptor {
                        email: email.clone(),
                    })
                    .unwrap()
                    .into(),
                )
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(crate::account::INSTANCE.inner().read().len(), 1);

    let code = crate::account::verify::VERIFICATION_CODE.load(Ordering::Relaxed);
    assert_ne!(code, 0);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/account/verify")
                .method("POST")
                .header(http::header::CONTENT_TYPE, mime::APPLICATION_JSON.as_ref())
                .body(
                    serde_json::to_vec(&AccountVerifyDescriptor {
                        email: email.clone(),
                        code,
                        variant: AccountVerifyVariant::Activate {
                            first_name: "Juan".to_string(),
                            last_name: "Dela Cruz".to_string(),
                            student_id: "23-3302".to_string(),
                            requested_role: None,
                            password: "password123456".to_string(),
                            password_confirmation: "password123456".to_string(),
                        },
                    })
                    .unwrap()
                    .into(),
                )
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/account/login")
                .method("POST")
                .header(http::header::CONTENT_TYPE, mime::APPLICATION_JSON.as_ref())
                .body(
                    serde_json::to_vec(&AccountLoginDescriptor {
                        email: email.clone(),
                        password: "password123456".to_string(),
                    })
                    .unwrap()
                    .into(),
                )
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let response_json: serde_json::Value =
        serde_json::from_slice(&hyper::body::to_bytes(response.into_body()).await.unwrap())
            .unwrap();
    let account_id = response_json["account_id"].as_u64().unwrap();
    let token = response_json["token"].as_str().unwrap().to_string();
    assert_eq!(response_json["role"].as_str().unwrap(), "student");

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/account/view")
                .method("POST")
                .header("Token", &token)
                .header("AccountId", account_id)
                .body(hyper::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let view: ViewAccountResult =
        serde_json::from_slice(&hyper::body::to_bytes(response.into_body()).await.unwrap())
            .unwrap();
    assert_eq!(view.id, account_id);
    assert_eq!(view.metadata.student_id, "23-3302");
}

#[serial]
#[tokio::test]
async fn create_rejects_foreign_domain() {
    reset_all();

    let app = crate::router();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/account/create")
                .method("POST")
                .header(http::header::CONTENT_TYPE, mime::APPLICATION_JSON.as_ref())
                .body(
                    serde_json::to_vec(&AccountCreateDescriptor {
                        email: lettre::Address::new("juan.delacruz", "gmail.com").unwrap(),
                    })
                    .unwrap()
                    .into(),
                )
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(crate::account::INSTANCE.inner().read().is_empty());
}

#[serial]
#[tokio::test]
async fn create_resends_code_for_pending_signup() {
    reset_all();

    let app = crate::router();
    let email = lettre::Address::new("delacruz.juan.23", "plv.edu.ph").unwrap();
    let descriptor = AccountCreateDescriptor { email };

    assert_eq!(
        app.clone()
            .oneshot(
                Request::builder()
                    .uri("/api/account/create")
                    .method("POST")
                    .header(http::header::CONTENT_TYPE, mime::APPLICATION_JSON.as_ref())
                    .body(serde_json::to_vec(&descriptor).unwrap().into())
                    .unwrap(),
            )
            .await
            .unwrap()
            .status(),
        StatusCode::OK
    );

    assert_eq!(
        app.oneshot(
            Request::builder()
                .uri("/api/account/create")
                .method("POST")
                .header(http::header::CONTENT_TYPE, mime::APPLICATION_JSON.as_ref())
                .body(serde_json::to_vec(&descriptor).unwrap().into())
                .unwrap(),
        )
        .await
        .unwrap()
        .status(),
        StatusCode::OK
    );

    assert_eq!(crate::account::INSTANCE.inner().read().len(), 1);

    let second_code = crate::account::verify::VERIFICATION_CODE.load(Ordering::Relaxed);
    match &*crate::account::INSTANCE.inner().read()[0].read() {
        crate::account::Account::Unverified(cxt) => assert_eq!(cxt.code, second_code),
        _ => unreachable!(),
    }
}

#[serial]
#[tokio::test]
async fn verify_rejects_wrong_code() {
    reset_all();

    let app = crate::router();
    let email = lettre::Address::new("delacruz.juan.23", "plv.edu.ph").unwrap();

    assert_eq!(
        app.clone()
            .oneshot(
                Request::builder()
                    .uri("/api/account/create")
                    .method("POST")
                    .header(http::header::CONTENT_TYPE, mime::APPLICATION_JSON.as_ref())
                    .body(
                        serde_json::to_vec(&AccountCreateDescriptor {
                            email: email.clone(),
                        })
                        .unwrap()
                        .into(),
                    )
                    .unwrap(),
            )
            .await
            .unwrap()
            .status(),
        StatusCode::OK
    );

    let code = crate::account::verify::VERIFICATION_CODE.load(Ordering::Relaxed);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/account/verify")
                .method("POST")
                .header(http::header::CONTENT_TYPE, mime::APPLICATION_JSON.as_ref())
                .body(
                    serde_json::to_vec(&AccountVerifyDescriptor {
                        email,
                        code: if code == 999999 { 100000 } else { code + 1 },
                        variant: AccountVerifyVariant::Activate {
                            first_name: "Juan".to_string(),
                            last_name: "Dela Cruz".to_string(),
                            student_id: "23-3302".to_string(),
                            requested_role: None,
                            password: "password123456".to_string(),
                            password_confirmation: "password123456".to_string(),
                        },
                    })
                    .unwrap()
                    .into(),
                )
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(matches!(
        &*crate::account::INSTANCE.inner().read()[0].read(),
        crate::account::Account::Unverified(_)
    ));
}

#[serial]
#[tokio::test]
async fn activate_validates_form() {
    reset_all();

    let app = crate::router();
    let email = lettre::Address::new("delacruz.juan.23", "plv.edu.ph").unwrap();

    assert_eq!(
        app.clone()
            .oneshot(
                Request::builder()
                    .uri("/api/account/create")
                    .method("POST")
                    .header(http::header::CONTENT_TYPE, mime::APPLICATION_JSON.as_ref())
                    .body(
                        serde_json::to_vec(&AccountCreateDescriptor {
                            email: email.clone(),
                        })
                        .unwrap()
                        .into(),
                    )
                    .unwrap(),
            )
            .await
            .unwrap()
            .status(),
        StatusCode::OK
    );

    let code = crate::account::verify::VERIFICATION_CODE.load(Ordering::Relaxed);

    let activate = |student_id: &str, password: &str, confirmation: &str| AccountVerifyDescriptor {
        email: email.clone(),
        code,
        variant: AccountVerifyVariant::Activate {
            first_name: "Juan".to_string(),
            last_name: "Dela Cruz".to_string(),
            student_id: student_id.to_string(),
            requested_role: None,
            password: password.to_string(),
            password_confirmation: confirmation.to_string(),
        },
    };

    for descriptor in [
        activate("233-302", "password123456", "password123456"),
        activate("23-3302", "password123456", "differentpassword"),
        activate("23-3302", "", ""),
    ] {
        assert_eq!(
            app.clone()
                .oneshot(
                    Request::builder()
                        .uri("/api/account/verify")
                        .method("POST")
                        .header(http::header::CONTENT_TYPE, mime::APPLICATION_JSON.as_ref())
                        .body(serde_json::to_vec(&descriptor).unwrap().into())
                        .unwrap(),
                )
                .await
                .unwrap()
                .status(),
            StatusCode::BAD_REQUEST
        );
    }

    assert_eq!(
        app.oneshot(
            Request::builder()
                .uri("/api/account/verify")
                .method("POST")
                .header(http::header::CONTENT_TYPE, mime::APPLICATION_JSON.as_ref())
                .body(
                    serde_json::to_vec(&activate("23-3302", "password123456", "password123456"))
                        .unwrap()
                        .into(),
                )
                .unwrap(),
        )
        .await
        .unwrap()
        .status(),
        StatusCode::OK
    );
}

#[serial]
#[tokio::test]
async fn login_rejects_wrong_password() {
    reset_all();

    let app = crate::router();
    push_account(123456, "delacruz.juan.23", Role::Student);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/account/login")
                .method("POST")
                .header(http::header::CONTENT_TYPE, mime::APPLICATION_JSON.as_ref())
                .body(
                    serde_json::to_vec(&AccountLoginDescriptor {
                        email: lettre::Address::new("delacruz.juan.23", "plv.edu.ph").unwrap(),
                        password: "wrongpassword".to_string(),
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

#[serial]
#[tokio::test]
async fn logout_deactivates_token() {
    reset_all();

    let app = crate::router();
    let account_id = 123456;
    let token = push_account(account_id, "delacruz.juan.23", Role::Student);

    assert_eq!(
        app.clone()
            .oneshot(
                Request::builder()
                    .uri("/api/account/logout")
                    .method("POST")
                    .header("Token", &token)
                    .header("AccountId", account_id)
                    .body(hyper::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
            .status(),
        StatusCode::OK
    );

    assert_eq!(
        app.oneshot(
            Request::builder()
                .uri("/api/account/view")
                .method("POST")
                .header("Token", &token)
                .header("AccountId", account_id)
                .body(hyper::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
        .status(),
        StatusCode::UNAUTHORIZED
    );
}

#[serial]
#[tokio::test]
async fn edit_profile_and_password() {
    reset_all();

    let app = crate::router();
    let account_id = 123456;
    let token = push_account(account_id, "delacruz.juan.23", Role::Student);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/account/edit")
                .method("POST")
                .header(http::header::CONTENT_TYPE, mime::APPLICATION_JSON.as_ref())
                .header("Token", &token)
                .header("AccountId", account_id)
                .body(
                    serde_json::to_vec(&AccountEditDescriptor {
                        variants: vec![
                            AccountEditVariant::FirstName("Maria".to_string()),
                            AccountEditVariant::Password {
                                old: "password123456".to_string(),
                                new: "bagongpassword1".to_string(),
                            },
                        ],
                    })
                    .unwrap()
                    .into(),
                )
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    {
        let b = crate::account::INSTANCE.inner().read();
        match &*b[0].read() {
            crate::account::Account::Verified { profile, .. } => {
                assert_eq!(profile.first_name, "Maria");
            }
            _ => unreachable!(),
        };
    }

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/account/login")
                .method("POST")
                .header(http::header::CONTENT_TYPE, mime::APPLICATION_JSON.as_ref())
                .body(
                    serde_json::to_vec(&AccountLoginDescriptor {
                        email: lettre::Address::new("delacruz.juan.23", "plv.edu.ph").unwrap(),
                        password: "bagongpassword1".to_string(),
                    })
                    .unwrap()
                    .into(),
                )
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[serial]
#[tokio::test]
async fn edit_password_requires_old_one() {
    reset_all();

    let app = crate::router();
    let account_id = 123456;
    let token = push_account(account_id, "delacruz.juan.23", Role::Student);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/account/edit")
                .method("POST")
                .header(http::header::CONTENT_TYPE, mime::APPLICATION_JSON.as_ref())
                .header("Token", &token)
                .header("AccountId", account_id)
                .body(
                    serde_json::to_vec(&AccountEditDescriptor {
                        variants: vec![AccountEditVariant::Password {
                            old: "wrongpassword".to_string(),
                            new: "bagongpassword1".to_string(),
                        }],
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

#[serial]
#[tokio::test]
async fn reset_password_with_code() {
    reset_all();

    let app = crate::router();
    let email = lettre::Address::new("reyes.ana.23", "plv.edu.ph").unwrap();
    push_account(654321, "reyes.ana.23", Role::Student);

    assert_eq!(
        app.clone()
            .oneshot(
                Request::builder()
                    .uri("/api/account/reset-password")
                    .method("POST")
                    .header(http::header::CONTENT_TYPE, mime::APPLICATION_JSON.as_ref())
                    .body(
                        serde_json::to_vec(&ResetPasswordDescriptor {
                            email: email.clone(),
                        })
                        .unwrap()
                        .into(),
                    )
                    .unwrap(),
            )
            .await
            .unwrap()
            .status(),
        StatusCode::OK
    );

    let code = crate::account::verify::VERIFICATION_CODE.load(Ordering::Relaxed);

    assert_eq!(
        app.clone()
            .oneshot(
                Request::builder()
                    .uri("/api/account/verify")
                    .method("POST")
                    .header(http::header::CONTENT_TYPE, mime::APPLICATION_JSON.as_ref())
                    .body(
                        serde_json::to_vec(&AccountVerifyDescriptor {
                            email: email.clone(),
                            code,
                            variant: AccountVerifyVariant::ResetPassword(
                                "bagongpassword1".to_string(),
                            ),
                        })
                        .unwrap()
                        .into(),
                    )
                    .unwrap(),
            )
            .await
            .unwrap()
            .status(),
        StatusCode::OK
    );

    assert_eq!(
        app.clone()
            .oneshot(
                Request::builder()
                    .uri("/api/account/login")
                    .method("POST")
                    .header(http::header::CONTENT_TYPE, mime::APPLICATION_JSON.as_ref())
                    .body(
                        serde_json::to_vec(&AccountLoginDescriptor {
                            email: email.clone(),
                            password: "password123456".to_string(),
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

    assert_eq!(
        app.oneshot(
            Request::builder()
                .uri("/api/account/login")
                .method("POST")
                .header(http::header::CONTENT_TYPE, mime::APPLICATION_JSON.as_ref())
                .body(
                    serde_json::to_vec(&AccountLoginDescriptor {
                        email,
                        password: "bagongpassword1".to_string(),
                    })
                    .unwrap()
                    .into(),
                )
                .unwrap(),
        )
        .await
        .unwrap()
        .status(),
        StatusCode::OK
    );
}
