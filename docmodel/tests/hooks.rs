mod common;

use docmodel::{bson::doc, prelude::*};
use pretty_assertions::assert_eq;
use std::sync::{Arc, Mutex};

use common::{user, users};

#[tokio::test]
async fn pre_save_hooks_rewrite_the_stored_document() {
    let mut users = users().await;
    users.pre(Operation::Save, |doc| {
        let name = doc.get_str("name").unwrap_or_default().to_string();
        doc.insert("name", format!("{name}123"));
        Ok(())
    });

    let created = users
        .create(user("Rahim", 25, "rahim@example.com"))
        .await
        .unwrap();
    assert_eq!(created.get_str("name").unwrap(), "Rahim123");

    let stored = users
        .find_by_id(created.document_id().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored, created);
}

#[tokio::test]
async fn hooks_run_in_registration_order() {
    let mut users = users().await;
    users
        .pre(Operation::Validate, |doc| {
            doc.insert("name", "first");
            Ok(())
        })
        .pre(Operation::Validate, |doc| {
            let name = doc.get_str("name").unwrap_or_default().to_string();
            doc.insert("name", format!("{name}-second"));
            Ok(())
        });

    let created = users
        .create(user("ignored", 25, "order@example.com"))
        .await
        .unwrap();

    assert_eq!(created.get_str("name").unwrap(), "first-second");
}

#[tokio::test]
async fn aborting_pre_save_leaves_nothing_behind() {
    let mut users = users().await;
    let later_ran = Arc::new(Mutex::new(false));
    let flag = Arc::clone(&later_ran);

    users
        .pre(Operation::Save, |_| Err(HookError::new("saving is disabled")))
        .pre(Operation::Save, move |_| {
            *flag.lock().unwrap() = true;
            Ok(())
        });

    let error = users
        .create(user("Rahim", 25, "rahim@example.com"))
        .await
        .unwrap_err();

    match &error {
        DocumentStoreError::HookAbort { operation, reason } => {
            assert_eq!(*operation, Operation::Save);
            assert_eq!(reason, "saving is disabled");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(error.outcome(), Outcome::Rejected);
    assert!(!*later_ran.lock().unwrap());
    assert_eq!(users.count_documents(()).await.unwrap(), 0);
}

#[tokio::test]
async fn hook_output_is_validated_again() {
    let mut users = users().await;
    users.pre(Operation::Save, |doc| {
        doc.insert("age", 3);
        Ok(())
    });

    let error = users
        .create(user("Rahim", 25, "rahim@example.com"))
        .await
        .unwrap_err();

    assert_eq!(error.validation_errors().unwrap().errors()[0].kind, FieldErrorKind::Min);
    assert_eq!(users.count_documents(()).await.unwrap(), 0);
}

#[tokio::test]
async fn hooks_cannot_change_the_identity_key() {
    let mut users = users().await;
    users.pre(Operation::Save, |doc| {
        doc.insert("_id", docmodel::uuid::Uuid::new_v4().to_string());
        Ok(())
    });

    let error = users
        .create(user("Rahim", 25, "rahim@example.com"))
        .await
        .unwrap_err();

    assert!(matches!(error, DocumentStoreError::InvalidDocument(_)));
}

#[tokio::test]
async fn post_hook_failures_are_reported_not_raised() {
    let mut users = users().await;
    let reported = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&reported);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);

    users
        .post(Operation::Save, |_| Err(HookError::new("mailer down")))
        .post(Operation::Save, move |doc| {
            log.lock().unwrap().push(doc.get_str("name").unwrap_or_default().to_string());
            Ok(())
        })
        .on_post_failure(move |failure| sink.lock().unwrap().push(failure.clone()));

    let created = users
        .create(user("Rahim", 25, "rahim@example.com"))
        .await
        .unwrap();

    assert_eq!(users.count_documents(()).await.unwrap(), 1);
    assert_eq!(*seen.lock().unwrap(), vec!["Rahim".to_string()]);

    let reported = reported.lock().unwrap();
    assert_eq!(reported.len(), 1);
    assert_eq!(reported[0].operation, Operation::Save);
    assert_eq!(reported[0].index, 0);
    assert_eq!(reported[0].error.reason(), "mailer down");
    assert!(created.document_id().is_some());
}

#[tokio::test]
async fn update_hooks_see_the_merged_document() {
    let mut users = users().await;
    users.pre(Operation::Update, |doc| {
        let name = doc.get_str("name").unwrap_or_default().to_uppercase();
        doc.insert("name", name);
        Ok(())
    });

    let created = users
        .create(user("Rahim", 25, "rahim@example.com"))
        .await
        .unwrap();

    let result = users
        .update_one(doc! { "email": "rahim@example.com" }, doc! { "age": 26 })
        .await
        .unwrap();
    assert_eq!(result, UpdateResult { matched: 1, modified: 1 });

    let stored = users
        .find_by_id(created.document_id().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.get_str("name").unwrap(), "RAHIM");
    assert_eq!(stored.get_i32("age").unwrap(), 26);
}

#[tokio::test]
async fn vetoed_deletes_keep_every_document() {
    let mut users = users().await;
    users.pre(Operation::Delete, |doc| match doc.get_str("role") {
        Ok("admin") => Err(HookError::new("admins cannot be deleted")),
        _ => Ok(()),
    });

    users
        .create_many([
            user("Rahim", 25, "rahim@example.com"),
            doc! { "name": "Karim", "age": 40, "email": "karim@example.com", "role": "admin" },
        ])
        .await
        .unwrap();

    let error = users.delete_many(()).await.unwrap_err();

    assert!(matches!(error, DocumentStoreError::HookAbort { operation: Operation::Delete, .. }));
    assert_eq!(users.count_documents(()).await.unwrap(), 2);
}
