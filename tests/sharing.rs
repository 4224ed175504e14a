mod common;

use bytes::Bytes;
use common::{count_rows, seed_user, setup};
use strongbox::models::{DeleteMode, FileRecord, PermissionLevel};
use strongbox::{FileService, SharingService, StorageError};

async fn upload_file(ctx: &common::TestCtx, owner: &str, name: &str) -> FileRecord {
    FileService::upload(
        &ctx.db,
        ctx.backend.as_ref(),
        &ctx.locks,
        &ctx.retry,
        owner,
        None,
        name,
        None,
        Bytes::from_static(b"shared content"),
    )
    .await
    .expect("upload")
}

#[tokio::test]
async fn share_grant_round_trip_with_file_name_enrichment() {
    let ctx = setup().await;
    let owner = seed_user(&ctx.db, "ada").await;
    let recipient = seed_user(&ctx.db, "grace").await;
    let file = upload_file(&ctx, &owner, "plan.xlsx").await;

    let share = SharingService::share_file(&ctx.db, &owner, &file.id, &recipient, "View")
        .await
        .expect("share");
    assert_eq!(share.file_id, file.id);
    assert_eq!(share.recipient_id, recipient);
    assert_eq!(share.permission_level(), Some(PermissionLevel::View));
    assert_eq!(share.share_link.len(), 16);

    let listed = SharingService::list_shared_with_me(&ctx.db, &recipient)
        .await
        .expect("list");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].file_name, "plan.xlsx");
    assert_eq!(listed[0].permission, "View");

    // Owner has no incoming shares.
    let none = SharingService::list_shared_with_me(&ctx.db, &owner)
        .await
        .expect("list owner");
    assert!(none.is_empty());

    // The companion permission row reflects the granted level.
    let level = SharingService::access_level_for(&ctx.db, &file.id, &recipient)
        .await
        .expect("level");
    assert_eq!(level, Some(PermissionLevel::View));
}

#[tokio::test]
async fn unrecognized_permission_level_writes_nothing() {
    let ctx = setup().await;
    let owner = seed_user(&ctx.db, "ada").await;
    let recipient = seed_user(&ctx.db, "grace").await;
    let file = upload_file(&ctx, &owner, "plan.xlsx").await;

    let result =
        SharingService::share_file(&ctx.db, &owner, &file.id, &recipient, "Delete").await;
    assert!(matches!(result, Err(StorageError::Validation { .. })));
    assert_eq!(count_rows(&ctx.db, "shared_files").await, 0);
    assert_eq!(count_rows(&ctx.db, "permissions").await, 0);
}

#[tokio::test]
async fn sharing_requires_live_file_and_known_recipient() {
    let ctx = setup().await;
    let owner = seed_user(&ctx.db, "ada").await;
    let recipient = seed_user(&ctx.db, "grace").await;
    let file = upload_file(&ctx, &owner, "plan.xlsx").await;

    let missing_file =
        SharingService::share_file(&ctx.db, &owner, "missing", &recipient, "Edit").await;
    assert!(matches!(missing_file, Err(StorageError::NotFound(_))));

    let missing_user =
        SharingService::share_file(&ctx.db, &owner, &file.id, "nobody", "Edit").await;
    assert!(matches!(missing_user, Err(StorageError::NotFound(_))));

    // A deleted file is no longer shareable.
    FileService::delete(&ctx.db, ctx.backend.as_ref(), &ctx.retry, &file.id, DeleteMode::Soft)
        .await
        .expect("delete");
    let deleted_file =
        SharingService::share_file(&ctx.db, &owner, &file.id, &recipient, "Edit").await;
    assert!(matches!(deleted_file, Err(StorageError::NotFound(_))));

    assert_eq!(count_rows(&ctx.db, "shared_files").await, 0);
}

#[tokio::test]
async fn revoke_removes_grant_and_permission() {
    let ctx = setup().await;
    let owner = seed_user(&ctx.db, "ada").await;
    let recipient = seed_user(&ctx.db, "grace").await;
    let file = upload_file(&ctx, &owner, "plan.xlsx").await;

    let share = SharingService::share_file(&ctx.db, &owner, &file.id, &recipient, "Edit")
        .await
        .expect("share");

    SharingService::revoke_share(&ctx.db, &share.id)
        .await
        .expect("revoke");

    assert_eq!(count_rows(&ctx.db, "shared_files").await, 0);
    let level = SharingService::access_level_for(&ctx.db, &file.id, &recipient)
        .await
        .expect("level");
    assert_eq!(level, None);

    // Second revoke finds nothing.
    let again = SharingService::revoke_share(&ctx.db, &share.id).await;
    assert!(matches!(again, Err(StorageError::NotFound(_))));
}

#[tokio::test]
async fn shares_of_deleted_files_drop_out_of_listings() {
    let ctx = setup().await;
    let owner = seed_user(&ctx.db, "ada").await;
    let recipient = seed_user(&ctx.db, "grace").await;
    let file = upload_file(&ctx, &owner, "plan.xlsx").await;

    SharingService::share_file(&ctx.db, &owner, &file.id, &recipient, "Comment")
        .await
        .expect("share");

    FileService::delete(&ctx.db, ctx.backend.as_ref(), &ctx.retry, &file.id, DeleteMode::Soft)
        .await
        .expect("delete");

    let listed = SharingService::list_shared_with_me(&ctx.db, &recipient)
        .await
        .expect("list");
    assert!(listed.is_empty());
}

#[tokio::test]
async fn share_links_are_unique_across_grants() {
    let ctx = setup().await;
    let owner = seed_user(&ctx.db, "ada").await;
    let file = upload_file(&ctx, &owner, "plan.xlsx").await;

    let mut links = std::collections::HashSet::new();
    for i in 0..5 {
        let recipient = seed_user(&ctx.db, &format!("user{}", i)).await;
        let share = SharingService::share_file(&ctx.db, &owner, &file.id, &recipient, "View")
            .await
            .expect("share");
        assert!(links.insert(share.share_link));
    }
}
