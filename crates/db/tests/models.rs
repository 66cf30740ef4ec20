use db::{
    DBService,
    models::{
        approval::{ApprovalStatus, FrontViewApproval},
        chat_message::{ChatMessage, CreateChatMessage, MessageType, SyncStatus},
        product::{CreateProduct, Product},
        revision::{Revision, RevisionViews},
        tech_pack::{TechPackAsset, TechPackKind},
    },
};
use uuid::Uuid;

async fn setup() -> (DBService, Product) {
    let db = DBService::new_in_memory().await.expect("in-memory db");
    let product = Product::create(
        &db.pool,
        &CreateProduct {
            owner_id: Uuid::new_v4(),
            name: "Trail Runner".to_string(),
            description: Some("Lightweight trail running shoe".to_string()),
        },
        Uuid::new_v4(),
    )
    .await
    .expect("create product");
    (db, product)
}

fn views(tag: &str) -> RevisionViews {
    RevisionViews {
        front: format!("https://cdn.test/{tag}-front.png"),
        back: format!("https://cdn.test/{tag}-back.png"),
        side: format!("https://cdn.test/{tag}-side.png"),
        top: format!("https://cdn.test/{tag}-top.png"),
        bottom: format!("https://cdn.test/{tag}-bottom.png"),
    }
}

async fn active_count(db: &DBService, product_id: Uuid) -> i64 {
    let revisions = Revision::find_live_by_product(&db.pool, product_id)
        .await
        .expect("list revisions");
    revisions.iter().filter(|r| r.is_active).count() as i64
}

#[tokio::test]
async fn revision_numbers_increase_and_exactly_one_is_active() {
    let (db, product) = setup().await;

    for (i, tag) in ["a", "b", "c"].iter().enumerate() {
        let revision = Revision::create_and_activate(&db.pool, product.id, &views(tag))
            .await
            .expect("create revision");
        assert_eq!(revision.revision_number, i as i64 + 1);
        assert!(revision.is_active);
        assert_eq!(active_count(&db, product.id).await, 1);
    }

    let active = Revision::find_active(&db.pool, product.id)
        .await
        .expect("find active")
        .expect("has active");
    assert_eq!(active.revision_number, 3);
}

#[tokio::test]
async fn rollback_swaps_the_active_flag_atomically() {
    let (db, product) = setup().await;
    Revision::create_and_activate(&db.pool, product.id, &views("a"))
        .await
        .expect("rev 1");
    Revision::create_and_activate(&db.pool, product.id, &views("b"))
        .await
        .expect("rev 2");

    let rolled_back = Revision::activate(&db.pool, product.id, 1)
        .await
        .expect("rollback");
    assert_eq!(rolled_back.revision_number, 1);
    assert!(rolled_back.is_active);
    assert_eq!(active_count(&db, product.id).await, 1);
}

#[tokio::test]
async fn activating_a_missing_revision_changes_nothing() {
    let (db, product) = setup().await;
    Revision::create_and_activate(&db.pool, product.id, &views("a"))
        .await
        .expect("rev 1");

    let result = Revision::activate(&db.pool, product.id, 9).await;
    assert!(matches!(result, Err(sqlx::Error::RowNotFound)));

    // the failed swap rolled back, revision 1 is still active
    let active = Revision::find_active(&db.pool, product.id)
        .await
        .expect("find active")
        .expect("has active");
    assert_eq!(active.revision_number, 1);
}

#[tokio::test]
async fn deleting_the_active_revision_promotes_the_newest_survivor() {
    let (db, product) = setup().await;
    for tag in ["a", "b", "c"] {
        Revision::create_and_activate(&db.pool, product.id, &views(tag))
            .await
            .expect("create revision");
    }

    Revision::soft_delete(&db.pool, product.id, 3)
        .await
        .expect("delete active");

    let active = Revision::find_active(&db.pool, product.id)
        .await
        .expect("find active")
        .expect("has active");
    assert_eq!(active.revision_number, 2);
    assert_eq!(active_count(&db, product.id).await, 1);

    let live = Revision::find_live_by_product(&db.pool, product.id)
        .await
        .expect("list");
    assert_eq!(live.len(), 2);
}

#[tokio::test]
async fn revision_numbers_stay_monotonic_past_deletions() {
    let (db, product) = setup().await;
    Revision::create_and_activate(&db.pool, product.id, &views("a"))
        .await
        .expect("rev 1");
    Revision::create_and_activate(&db.pool, product.id, &views("b"))
        .await
        .expect("rev 2");
    Revision::soft_delete(&db.pool, product.id, 2)
        .await
        .expect("delete rev 2");

    let revision = Revision::create_and_activate(&db.pool, product.id, &views("c"))
        .await
        .expect("rev 3");
    assert_eq!(revision.revision_number, 3);
}

#[test]
fn a_view_set_with_a_blank_url_is_incomplete() {
    let mut set = RevisionViews {
        front: "https://cdn.test/front.png".to_string(),
        back: "https://cdn.test/back.png".to_string(),
        side: "https://cdn.test/side.png".to_string(),
        top: "https://cdn.test/top.png".to_string(),
        bottom: "https://cdn.test/bottom.png".to_string(),
    };
    assert!(set.is_complete());
    set.top = "   ".to_string();
    assert!(!set.is_complete());
}

#[tokio::test]
async fn each_new_approval_supersedes_the_previous_one() {
    let (db, product) = setup().await;

    let first = FrontViewApproval::create_superseding(
        &db.pool,
        product.id,
        "https://cdn.test/v1.png",
        "red sneaker",
        None,
    )
    .await
    .expect("approval 1");
    assert_eq!(first.iteration_count, 1);
    assert!(first.awaiting);

    let second = FrontViewApproval::create_superseding(
        &db.pool,
        product.id,
        "https://cdn.test/v2.png",
        "red sneaker, brighter",
        None,
    )
    .await
    .expect("approval 2");
    assert_eq!(second.iteration_count, 2);

    let third = FrontViewApproval::create_superseding(
        &db.pool,
        product.id,
        "https://cdn.test/v3.png",
        "red sneaker, matte",
        None,
    )
    .await
    .expect("approval 3");
    assert_eq!(third.iteration_count, 3);

    // only the latest is live, history is preserved
    let live = FrontViewApproval::find_live(&db.pool, product.id)
        .await
        .expect("find live")
        .expect("has live");
    assert_eq!(live.id, third.id);

    let all = FrontViewApproval::find_by_product_id(&db.pool, product.id)
        .await
        .expect("history");
    assert_eq!(all.len(), 3);
    assert_eq!(all.iter().filter(|a| a.awaiting).count(), 1);
}

#[tokio::test]
async fn a_decided_approval_is_no_longer_live() {
    let (db, product) = setup().await;
    let approval = FrontViewApproval::create_superseding(
        &db.pool,
        product.id,
        "https://cdn.test/v1.png",
        "red sneaker",
        Some(r#"{"style":"sporty"}"#),
    )
    .await
    .expect("approval");

    let approved = FrontViewApproval::set_status(&db.pool, approval.id, ApprovalStatus::Approved)
        .await
        .expect("approve");
    assert_eq!(approved.status, ApprovalStatus::Approved);
    assert!(!approved.awaiting);
    assert!(approved.parsed_design_features().is_some());

    assert!(
        FrontViewApproval::find_live(&db.pool, product.id)
            .await
            .expect("find live")
            .is_none()
    );
}

#[tokio::test]
async fn transcript_keeps_insertion_order_and_counts() {
    let (db, product) = setup().await;

    for i in 0..5 {
        ChatMessage::create(
            &db.pool,
            &CreateChatMessage {
                product_id: product.id,
                message_type: MessageType::User,
                content: format!("message {i}"),
                metadata: None,
            },
        )
        .await
        .expect("insert");
    }

    let transcript = ChatMessage::find_by_product_id(&db.pool, product.id)
        .await
        .expect("transcript");
    assert_eq!(transcript.len(), 5);
    for (i, message) in transcript.iter().enumerate() {
        assert_eq!(message.content, format!("message {i}"));
        assert_eq!(message.sync_status, SyncStatus::Pending);
    }

    assert_eq!(
        ChatMessage::count_for_product(&db.pool, product.id)
            .await
            .expect("count"),
        5
    );

    let tail = ChatMessage::recent_tail(&db.pool, product.id, 2)
        .await
        .expect("tail");
    assert_eq!(tail.len(), 2);
    assert_eq!(tail[0].content, "message 3");
    assert_eq!(tail[1].content, "message 4");
}

#[tokio::test]
async fn unreconciled_rows_are_returned_oldest_first() {
    let (db, product) = setup().await;

    let mut ids = Vec::new();
    for i in 0..3 {
        let message = ChatMessage::create(
            &db.pool,
            &CreateChatMessage {
                product_id: product.id,
                message_type: MessageType::System,
                content: format!("notice {i}"),
                metadata: None,
            },
        )
        .await
        .expect("insert");
        ids.push(message.id);
    }

    ChatMessage::set_sync_status(&db.pool, ids[1], SyncStatus::Synced)
        .await
        .expect("mark synced");
    ChatMessage::set_sync_status(&db.pool, ids[2], SyncStatus::Unsynced)
        .await
        .expect("mark unsynced");

    let owed = ChatMessage::find_unreconciled(&db.pool, 10)
        .await
        .expect("owed");
    let owed_ids: Vec<Uuid> = owed.iter().map(|m| m.id).collect();
    assert_eq!(owed_ids, vec![ids[0], ids[2]]);
}

#[tokio::test]
async fn latest_tech_pack_asset_wins_per_kind() {
    let (db, product) = setup().await;

    TechPackAsset::create(
        &db.pool,
        product.id,
        TechPackKind::BaseViews,
        &["https://cdn.test/base-1.png".to_string()],
    )
    .await
    .expect("base v1");
    TechPackAsset::create(
        &db.pool,
        product.id,
        TechPackKind::BaseViews,
        &[
            "https://cdn.test/base-2a.png".to_string(),
            "https://cdn.test/base-2b.png".to_string(),
        ],
    )
    .await
    .expect("base v2");
    TechPackAsset::create(
        &db.pool,
        product.id,
        TechPackKind::Sketches,
        &["https://cdn.test/sketch-1.png".to_string()],
    )
    .await
    .expect("sketches");

    assert!(
        TechPackAsset::has_base_views(&db.pool, product.id)
            .await
            .expect("has base views")
    );

    let latest = TechPackAsset::find_latest_all(&db.pool, product.id)
        .await
        .expect("latest");
    assert_eq!(latest.len(), 2);
    let base = latest
        .iter()
        .find(|a| a.kind == TechPackKind::BaseViews)
        .expect("base entry");
    assert_eq!(base.urls().len(), 2);
}
