//! Checks shared by the per-engine integration suites. Every check builds
//! its own rows under random names so it can run against a database that
//! other tests are using at the same time.

#![allow(dead_code)]

use chrono::Duration;
use wishlists::db::{
    Item, ItemChanges, List, ListChanges, NewItem, NewList, NewUser, User, logical_schema,
};
use wishlists::util::{random_key, random_token};
use wishlists::WishlistStore;

pub fn unique(prefix: &str) -> String {
    format!("{prefix}-{}", random_key())
}

pub async fn new_user<S: WishlistStore>(store: &S) -> User {
    let name = unique("user");
    store
        .create_user(&NewUser::new(
            &name,
            format!("{name}@example.com"),
            "$2b$12$not-a-real-hash",
        ))
        .await
        .expect("create user")
}

pub async fn new_list<S: WishlistStore>(store: &S) -> List {
    store
        .create_list(&NewList::new(unique("list"), "things I want"))
        .await
        .expect("create list")
}

pub async fn new_item<S: WishlistStore>(store: &S, list_id: i64) -> Item {
    store
        .create_item(&NewItem {
            description: Some("size 42".to_string()),
            price: Some("19.99 EUR".to_string()),
            ..NewItem::new(list_id, unique("item"))
        })
        .await
        .expect("create item")
}

pub async fn duplicate_username_is_rejected<S: WishlistStore>(store: &S) {
    let first = new_user(store).await;

    let err = store
        .create_user(&NewUser::new(&first.username, "other@example.com", "hash"))
        .await
        .unwrap_err();
    assert!(err.is_unique_violation(), "got {err:?}");
}

pub async fn duplicate_token_is_rejected<S: WishlistStore>(store: &S) {
    let user = new_user(store).await;
    let token = random_token();
    store.create_session(user.id, &token).await.unwrap();

    let err = store.create_session(user.id, &token).await.unwrap_err();
    assert!(err.is_unique_violation(), "got {err:?}");
}

pub async fn session_for_missing_user_is_rejected<S: WishlistStore>(store: &S) {
    let err = store
        .create_session(i64::MAX, &random_token())
        .await
        .unwrap_err();
    assert!(err.is_foreign_key_violation(), "got {err:?}");
}

pub async fn item_for_missing_list_is_rejected<S: WishlistStore>(store: &S) {
    let err = store
        .create_item(&NewItem::new(i64::MAX, "orphan"))
        .await
        .unwrap_err();
    assert!(err.is_foreign_key_violation(), "got {err:?}");
}

pub async fn list_is_private_by_default<S: WishlistStore>(store: &S) {
    let list = new_list(store).await;
    assert!(list.is_private);

    let stored = store.find_list(list.id).await.unwrap().unwrap();
    assert!(stored.is_private);
}

pub async fn schema_matches_logical_model<S: WishlistStore>(store: &S) {
    let live = store.introspect().await.unwrap();
    let drift = logical_schema().diff(&live);
    assert!(drift.is_empty(), "{} drift: {drift:?}", store.engine());
}

pub async fn list_lifecycle<S: WishlistStore>(store: &S) {
    let list = store
        .create_list(&NewList::new(unique("public"), "").private(false))
        .await
        .unwrap();
    assert!(!list.is_private);
    assert_eq!(list.created_at, list.updated_at);

    let by_key = store.find_list_by_key(&list.key).await.unwrap().unwrap();
    assert_eq!(by_key, list);

    let public = store.all_public_lists().await.unwrap();
    assert!(public.iter().any(|l| l.id == list.id));

    let changes = ListChanges {
        is_private: true,
        title: "renamed".to_string(),
        ..ListChanges::from(&list)
    };
    let updated = store.update_list(list.id, &changes).await.unwrap().unwrap();
    assert_eq!(updated.title, "renamed");
    assert_eq!(updated.key, list.key);
    assert!(updated.updated_at >= list.updated_at);

    let public = store.all_public_lists().await.unwrap();
    assert!(public.iter().all(|l| l.id != list.id));

    assert!(store.delete_list(list.id).await.unwrap());
    assert!(!store.delete_list(list.id).await.unwrap());
    assert!(store.find_list(list.id).await.unwrap().is_none());
    assert!(store.update_list(list.id, &changes).await.unwrap().is_none());
}

pub async fn invalid_input_is_rejected_before_the_database<S: WishlistStore>(store: &S) {
    let err = store.create_list(&NewList::new("x", "")).await.unwrap_err();
    assert!(err.is_invalid("title"), "got {err:?}");

    let err = store
        .create_user(&NewUser::new("", "nobody@example.com", "hash"))
        .await
        .unwrap_err();
    assert!(err.is_invalid("username"), "got {err:?}");

    let err = store.update_user(1, "alice", "not-an-email").await.unwrap_err();
    assert!(err.is_invalid("email"), "got {err:?}");
}

pub async fn item_lifecycle<S: WishlistStore>(store: &S) {
    let list = new_list(store).await;
    let other = new_list(store).await;
    let first = new_item(store, list.id).await;
    let second = store
        .create_item(&NewItem::new(list.id, "no details"))
        .await
        .unwrap();
    assert_eq!(second.description, None);
    assert_eq!(second.price, None);

    let items = store.items_by_list(list.id).await.unwrap();
    assert_eq!(items, vec![first.clone(), second.clone()]);

    let moved = store
        .update_item(
            first.id,
            &ItemChanges {
                list_id: other.id,
                price: None,
                ..ItemChanges::from(&first)
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(moved.list_id, other.id);
    assert_eq!(moved.price, None);
    assert_eq!(moved.description, first.description);

    assert_eq!(store.items_by_list(list.id).await.unwrap(), vec![second.clone()]);
    assert!(store.delete_item(second.id).await.unwrap());
    assert!(store.find_item(second.id).await.unwrap().is_none());
}

pub async fn list_with_items_cannot_be_deleted<S: WishlistStore>(store: &S) {
    let list = new_list(store).await;
    let item = new_item(store, list.id).await;

    let err = store.delete_list(list.id).await.unwrap_err();
    assert!(err.is_foreign_key_violation(), "got {err:?}");

    store.delete_item(item.id).await.unwrap();
    assert!(store.delete_list(list.id).await.unwrap());
}

pub async fn user_lifecycle<S: WishlistStore>(store: &S) {
    let user = new_user(store).await;
    assert_eq!(user.password_hash, "$2b$12$not-a-real-hash");

    let found = store
        .find_user_by_username(&user.username)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found, user);

    let listed = store.all_users().await.unwrap();
    let mine = listed.iter().find(|u| u.id == user.id).unwrap();
    assert_eq!(mine.password_hash, "");

    let renamed = unique("renamed");
    let updated = store
        .update_user(user.id, &renamed, "new@example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.username, renamed);
    assert_eq!(updated.password_hash, user.password_hash);
    assert!(store.find_user_by_username(&user.username).await.unwrap().is_none());

    let taken = new_user(store).await;
    let err = store
        .update_user(user.id, &taken.username, "new@example.com")
        .await
        .unwrap_err();
    assert!(err.is_unique_violation(), "got {err:?}");

    assert!(store.delete_user(user.id).await.unwrap());
    assert!(store.find_user(user.id).await.unwrap().is_none());
}

pub async fn session_lifecycle<S: WishlistStore>(store: &S) {
    let user = new_user(store).await;
    let token = random_token();
    let session = store.create_session(user.id, &token).await.unwrap();
    assert_eq!(session.user_id, user.id);
    assert_eq!(session.token, token);

    let found = store.find_session_by_token(&token).await.unwrap().unwrap();
    assert_eq!(found, session);

    // a user with a live session cannot be deleted
    let err = store.delete_user(user.id).await.unwrap_err();
    assert!(err.is_foreign_key_violation(), "got {err:?}");

    assert!(store.delete_session_by_token(&token).await.unwrap());
    assert!(!store.delete_session_by_token(&token).await.unwrap());
    assert!(store.find_session_by_token(&token).await.unwrap().is_none());
}

pub async fn huge_session_ttl_purges_nothing<S: WishlistStore>(store: &S) {
    let user = new_user(store).await;
    let token = random_token();
    store.create_session(user.id, &token).await.unwrap();

    // reaches back past the earliest representable timestamp
    let purged = store
        .purge_sessions_older_than(Duration::days(200_000_000))
        .await
        .unwrap();
    assert_eq!(purged, 0);
    assert!(store.find_session_by_token(&token).await.unwrap().is_some());
}
