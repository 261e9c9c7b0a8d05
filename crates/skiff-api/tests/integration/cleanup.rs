use crate::*;

/// Poll until the predicate holds or a few seconds pass.
async fn eventually(mut pred: impl FnMut() -> bool) -> bool {
    for _ in 0..50 {
        if pred() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    false
}

/// Last-leaver teardown: once the final client disconnects, every file with
/// the session's prefix is reclaimed, completed and in-flight alike.
#[tokio::test]
async fn last_leaver_reclaims_all_session_files() {
    let server = spawn_server().await;
    let client = reqwest::Client::new();

    let mut a = connect_ws(&server, "s3").await;
    frame_of_type(&mut a, "system").await;
    let mut b = connect_ws(&server, "s3").await;
    frame_of_type(&mut b, "system").await;

    // one finished upload, observed by both members
    let payload = pattern_bytes(800);
    start_upload(&client, &server, "s3", "x.bin", 800, "").await;
    send_chunk(&client, &server, "s3", "x.bin", 0, payload).await;
    assert_eq!(frame_of_type(&mut a, "file").await["name"], "x.bin");
    assert_eq!(frame_of_type(&mut b, "file").await["name"], "x.bin");

    // one upload abandoned halfway, its manifest still on disk
    start_upload(&client, &server, "s3", "half.bin", 3 * TEST_CHUNK_SIZE, "").await;
    send_chunk(
        &client,
        &server,
        "s3",
        "half.bin",
        0,
        pattern_bytes(TEST_CHUNK_SIZE as usize),
    )
    .await;

    let backing = server.temp.path().join("s3_x.bin");
    let half_backing = server.temp.path().join("s3_half.bin");
    let half_manifest = server.temp.path().join("s3_half.bin.json");
    assert!(backing.exists());
    assert!(half_backing.exists());
    assert!(half_manifest.exists());

    drop(a);
    // one member remains: nothing is reclaimed yet
    assert!(eventually(|| server.sessions.get("s3").is_some()).await);
    assert!(backing.exists());

    drop(b);
    assert!(
        eventually(|| !backing.exists() && !half_backing.exists() && !half_manifest.exists())
            .await,
        "session files still on disk after last leaver"
    );
    assert!(!server.sessions.contains("s3"));
}

/// The session entry disappears with its last client; a later lookup starts
/// from scratch with no replayed state.
#[tokio::test]
async fn rejoin_after_teardown_is_a_fresh_session() {
    let server = spawn_server().await;

    let mut a = connect_ws(&server, "s9").await;
    frame_of_type(&mut a, "system").await;
    send_frame(
        &mut a,
        json!({"type": "text", "sessionID": "s9", "content": "ephemeral"}),
    )
    .await;
    frame_of_type(&mut a, "text").await;
    drop(a);

    assert!(eventually(|| !server.sessions.contains("s9")).await);

    let mut again = connect_ws(&server, "s9").await;
    // replay must contain no text frame: first frames are the count and the
    // connected notice
    let first = next_frame(&mut again).await;
    assert_eq!(first["type"], "clients");
    let second = next_frame(&mut again).await;
    assert_eq!(second["type"], "system");
}
