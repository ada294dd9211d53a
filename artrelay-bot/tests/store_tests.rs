//! Dedup & cache store behavior against a real SQLite file.

mod common;

use artrelay_bot::db::{self, artworks, pending, tags};
use artrelay_bot::models::Contributor;
use chrono::Utc;
use common::record;

async fn scratch_pool(dir: &tempfile::TempDir) -> sqlx::SqlitePool {
    db::init_pool(&dir.path().join("artrelay.db")).await.unwrap()
}

#[tokio::test]
async fn insert_and_cache_lookup_orders_by_page() {
    let dir = tempfile::tempdir().unwrap();
    let pool = scratch_pool(&dir).await;
    let mut conn = pool.acquire().await.unwrap();

    for page in [3, 1, 2] {
        artworks::insert(conn.as_mut(), &record("55", page)).await.unwrap();
    }

    let cached = artworks::find_cached(conn.as_mut(), "pixiv", "55").await.unwrap();
    assert_eq!(cached.len(), 3);
    assert_eq!(
        cached.iter().map(|r| r.page).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert_eq!(cached[0].title, "Hina <3");

    // Other platforms and ids stay invisible
    assert!(artworks::find_cached(conn.as_mut(), "twitter", "55")
        .await
        .unwrap()
        .is_empty());
    assert!(artworks::find_cached(conn.as_mut(), "pixiv", "56")
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn duplicate_lookup_ignores_guest_rows() {
    let dir = tempfile::tempdir().unwrap();
    let pool = scratch_pool(&dir).await;
    let mut conn = pool.acquire().await.unwrap();

    let mut guest = record("70", 1);
    guest.guest = true;
    artworks::insert(conn.as_mut(), &guest).await.unwrap();

    assert!(artworks::find_duplicate(conn.as_mut(), "pixiv", "70")
        .await
        .unwrap()
        .is_none());

    artworks::insert(conn.as_mut(), &record("70", 2)).await.unwrap();
    let duplicate = artworks::find_duplicate(conn.as_mut(), "pixiv", "70")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(duplicate.page, 2);
    assert_eq!(duplicate.user_name, "curator");
}

#[tokio::test]
async fn touch_reposted_bumps_and_promotes() {
    let dir = tempfile::tempdir().unwrap();
    let pool = scratch_pool(&dir).await;
    let mut conn = pool.acquire().await.unwrap();

    let mut guest = record("80", 1);
    guest.guest = true;
    artworks::insert(conn.as_mut(), &guest).await.unwrap();

    let reposter = Contributor::new(99, "reposter");
    let now = Utc::now();
    artworks::touch_reposted(conn.as_mut(), "pixiv", "80", &reposter, true, now)
        .await
        .unwrap();

    let rows = artworks::find_cached(conn.as_mut(), "pixiv", "80").await.unwrap();
    assert_eq!(rows[0].post_count, 2);
    assert!(!rows[0].guest, "canonical repost promotes guest rows");
    assert_eq!(rows[0].user_id, 99);
    assert!(rows[0].updated_at > rows[0].created_at);
}

#[tokio::test]
async fn preview_touch_keeps_canonical_contributor() {
    let dir = tempfile::tempdir().unwrap();
    let pool = scratch_pool(&dir).await;
    let mut conn = pool.acquire().await.unwrap();

    artworks::insert(conn.as_mut(), &record("81", 1)).await.unwrap();

    let viewer = Contributor::new(5, "viewer");
    artworks::touch_reposted(conn.as_mut(), "pixiv", "81", &viewer, false, Utc::now())
        .await
        .unwrap();

    let rows = artworks::find_cached(conn.as_mut(), "pixiv", "81").await.unwrap();
    // Non-guest row: the preview bumps the counter but not the contributor
    assert_eq!(rows[0].post_count, 2);
    assert_eq!(rows[0].user_id, 7);
}

#[tokio::test]
async fn conflicting_insert_updates_instead_of_duplicating() {
    let dir = tempfile::tempdir().unwrap();
    let pool = scratch_pool(&dir).await;
    let mut conn = pool.acquire().await.unwrap();

    artworks::insert(conn.as_mut(), &record("90", 1)).await.unwrap();
    let mut racing = record("90", 1);
    racing.user_id = 11;
    racing.user_name = "second".to_string();
    artworks::insert(conn.as_mut(), &racing).await.unwrap();

    let rows = artworks::find_cached(conn.as_mut(), "pixiv", "90").await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].user_id, 11);
    assert_eq!(rows[0].post_count, 2);
}

#[tokio::test]
async fn remote_handles_persist() {
    let dir = tempfile::tempdir().unwrap();
    let pool = scratch_pool(&dir).await;
    let mut conn = pool.acquire().await.unwrap();

    artworks::insert(conn.as_mut(), &record("95", 1)).await.unwrap();
    let mut updated = record("95", 1);
    updated.tg_file_thumb = Some("fresh-thumb".to_string());
    updated.tg_file_original = Some("fresh-doc".to_string());
    artworks::update_remote_handles(conn.as_mut(), &[updated]).await.unwrap();

    let rows = artworks::find_cached(conn.as_mut(), "pixiv", "95").await.unwrap();
    assert_eq!(rows[0].tg_file_thumb.as_deref(), Some("fresh-thumb"));
    assert_eq!(rows[0].tg_file_original.as_deref(), Some("fresh-doc"));
}

#[tokio::test]
async fn unmark_removes_all_pages() {
    let dir = tempfile::tempdir().unwrap();
    let pool = scratch_pool(&dir).await;
    let mut conn = pool.acquire().await.unwrap();

    for page in 1..=3 {
        artworks::insert(conn.as_mut(), &record("60", page)).await.unwrap();
    }
    artworks::insert(conn.as_mut(), &record("61", 1)).await.unwrap();

    let removed = artworks::unmark(conn.as_mut(), "60").await.unwrap();
    assert_eq!(removed, 3);
    assert!(artworks::find_cached(conn.as_mut(), "pixiv", "60")
        .await
        .unwrap()
        .is_empty());
    assert_eq!(
        artworks::find_cached(conn.as_mut(), "pixiv", "61").await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn canonical_pages_span_platforms_but_skip_guests() {
    let dir = tempfile::tempdir().unwrap();
    let pool = scratch_pool(&dir).await;
    let mut conn = pool.acquire().await.unwrap();

    artworks::insert(conn.as_mut(), &record("62", 1)).await.unwrap();
    let mut guest = record("62", 2);
    guest.guest = true;
    artworks::insert(conn.as_mut(), &guest).await.unwrap();

    let pages = artworks::find_canonical_pages(conn.as_mut(), "62").await.unwrap();
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].page, 1);
}

#[tokio::test]
async fn tag_audit_appends() {
    let dir = tempfile::tempdir().unwrap();
    let pool = scratch_pool(&dir).await;
    let mut conn = pool.acquire().await.unwrap();

    tags::append(
        conn.as_mut(),
        "55",
        &["#AI".to_string(), "#碧蓝档案".to_string()],
    )
    .await
    .unwrap();
    tags::append(conn.as_mut(), "55", &["#AI".to_string()]).await.unwrap();

    // Append-only: duplicates pile up by design
    assert_eq!(tags::count_for_work(conn.as_mut(), "55").await.unwrap(), 3);
}

#[tokio::test]
async fn pending_confirmations_drain_once() {
    let dir = tempfile::tempdir().unwrap();
    let pool = scratch_pool(&dir).await;
    let mut conn = pool.acquire().await.unwrap();

    pending::insert(conn.as_mut(), -100, 5, "restart").await.unwrap();
    pending::insert(conn.as_mut(), -100, 6, "restart").await.unwrap();

    let drained = pending::take_all(conn.as_mut()).await.unwrap();
    assert_eq!(drained.len(), 2);
    assert_eq!(drained[0].message_id, 5);
    assert!(pending::take_all(conn.as_mut()).await.unwrap().is_empty());
}
