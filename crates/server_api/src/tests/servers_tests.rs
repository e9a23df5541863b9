use super::*;
use shared::error::ErrorCode;
use storage::Storage;

async fn setup() -> (ApiContext, Profile, Profile) {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let alice = storage
        .upsert_profile("alice", "alice", "", "")
        .await
        .expect("alice");
    let bob = storage.upsert_profile("bob", "bob", "", "").await.expect("bob");
    (ApiContext::new(storage), alice, bob)
}

#[tokio::test]
async fn create_server_requires_profile_and_name() {
    let (ctx, alice, _) = setup().await;
    let req = || CreateServerRequest {
        name: "  ".into(),
        image_url: None,
    };

    let err = create_server(&ctx, None, req()).await.expect_err("no profile");
    assert_eq!(err.code, ErrorCode::Unauthorized);

    let err = create_server(&ctx, Some(&alice), req())
        .await
        .expect_err("blank name");
    assert_eq!(err.code, ErrorCode::Validation);
}

#[tokio::test]
async fn join_server_by_invite_is_idempotent() {
    let (ctx, alice, bob) = setup().await;
    let server = create_server(
        &ctx,
        Some(&alice),
        CreateServerRequest {
            name: "club".into(),
            image_url: None,
        },
    )
    .await
    .expect("create");

    let joined = join_server(&ctx, Some(&bob), &server.invite_code)
        .await
        .expect("join");
    assert_eq!(joined.id, server.id);
    join_server(&ctx, Some(&bob), &server.invite_code)
        .await
        .expect("join again");

    let member = ctx
        .storage
        .member(&server.id, &bob.id)
        .await
        .expect("lookup")
        .expect("member");
    assert_eq!(member.role, MemberRole::Guest);

    let err = join_server(&ctx, Some(&bob), "bogus")
        .await
        .expect_err("unknown invite");
    assert_eq!(err.code, ErrorCode::NotFound);
}
