use crate::*;

/// Two-client text echo with join replay: B arrives late and still sees the
/// snapshot, then both observe the next edit.
#[tokio::test]
async fn text_echo_reaches_everyone() {
    let server = spawn_server().await;

    let mut a = connect_ws(&server, "s1").await;
    let hello = frame_of_type(&mut a, "system").await;
    assert_eq!(hello["content"], "connected");

    send_frame(
        &mut a,
        json!({"type": "text", "sessionID": "s1", "content": "hi"}),
    )
    .await;
    let echo = frame_of_type(&mut a, "text").await;
    assert_eq!(echo["content"], "hi");

    let mut b = connect_ws(&server, "s1").await;
    let replay = frame_of_type(&mut b, "text").await;
    assert_eq!(replay["content"], "hi");

    send_frame(
        &mut a,
        json!({"type": "text", "sessionID": "s1", "content": "ho"}),
    )
    .await;
    assert_eq!(frame_of_type(&mut a, "text").await["content"], "ho");
    assert_eq!(frame_of_type(&mut b, "text").await["content"], "ho");
}

#[tokio::test]
async fn participant_count_follows_membership() {
    let server = spawn_server().await;

    let mut a = connect_ws(&server, "s1").await;
    let count = frame_of_type(&mut a, "clients").await;
    assert_eq!(count["clients"], 1);

    let mut b = connect_ws(&server, "s1").await;
    assert_eq!(frame_of_type(&mut b, "clients").await["clients"], 2);
    // the earlier member sees the bump too
    assert_eq!(frame_of_type(&mut a, "clients").await["clients"], 2);

    drop(b);
    assert_eq!(frame_of_type(&mut a, "clients").await["clients"], 1);
}

/// A peer connected during an HTTP upload gets the `file` broadcast; a peer
/// joining afterwards gets the file via replay instead.
#[tokio::test]
async fn file_broadcast_vs_join_replay() {
    let server = spawn_server().await;
    let client = reqwest::Client::new();

    let mut live = connect_ws(&server, "s3").await;
    frame_of_type(&mut live, "system").await;

    let payload = pattern_bytes(900);
    start_upload(&client, &server, "s3", "x.bin", 900, "").await;
    send_chunk(&client, &server, "s3", "x.bin", 0, payload).await;

    let broadcast = frame_of_type(&mut live, "file").await;
    assert_eq!(broadcast["name"], "x.bin");
    assert_eq!(broadcast["size"], 900);

    let mut late = connect_ws(&server, "s3").await;
    let replay = frame_of_type(&mut late, "file").await;
    assert_eq!(replay["name"], "x.bin");
    assert_eq!(replay["size"], 900);
}

/// The single-shot `file` frame writes the bytes and announces the file.
#[tokio::test]
async fn inline_file_is_stored_and_announced() {
    let server = spawn_server().await;
    let client = reqwest::Client::new();
    let payload = b"inline payload".to_vec();

    let mut a = connect_ws(&server, "s1").await;
    frame_of_type(&mut a, "system").await;
    let mut b = connect_ws(&server, "s1").await;
    frame_of_type(&mut b, "system").await;

    send_frame(
        &mut a,
        json!({
            "type": "file",
            "sessionID": "s1",
            "name": "note.txt",
            "size": payload.len(),
            "data": payload.clone(),
        }),
    )
    .await;

    let announced = frame_of_type(&mut b, "file").await;
    assert_eq!(announced["name"], "note.txt");
    assert_eq!(announced["size"], payload.len() as u64);

    let (status, downloaded) = download(&client, &server, "s1", "note.txt").await;
    assert_eq!(status, reqwest::StatusCode::OK);
    assert_eq!(downloaded, payload);
}

/// Streaming `file_chunk` path: positional writes, completion on the last
/// counted chunk, receiver entry removed afterwards.
#[tokio::test]
async fn streamed_file_chunks_reassemble() {
    let server = spawn_server().await;
    let client = reqwest::Client::new();
    let size = 2 * TEST_CHUNK_SIZE + 100;
    let payload = pattern_bytes(size as usize);

    let mut sender = connect_ws(&server, "s1").await;
    frame_of_type(&mut sender, "system").await;
    let mut peer = connect_ws(&server, "s1").await;
    frame_of_type(&mut peer, "system").await;

    for (i, slice) in payload.chunks(TEST_CHUNK_SIZE as usize).enumerate() {
        send_frame(
            &mut sender,
            json!({
                "type": "file_chunk",
                "sessionID": "s1",
                "name": "stream.bin",
                "size": size,
                "data": slice,
                "totalChunks": 3,
                "currentChunk": i,
                "isLastChunk": i == 2,
            }),
        )
        .await;
    }

    let done = frame_of_type(&mut peer, "file").await;
    assert_eq!(done["name"], "stream.bin");
    assert_eq!(done["size"], size);

    let (status, downloaded) = download(&client, &server, "s1", "stream.bin").await;
    assert_eq!(status, reqwest::StatusCode::OK);
    assert_eq!(downloaded, payload);

    let session = server.sessions.get("s1").expect("session alive");
    assert!(session.state.read().await.receiving.is_empty());
}

/// Legacy senders omit `totalChunks`; expected count falls back to the
/// declared size.
#[tokio::test]
async fn streamed_file_without_total_chunks_completes() {
    let server = spawn_server().await;
    let client = reqwest::Client::new();
    let size = TEST_CHUNK_SIZE + 40;
    let payload = pattern_bytes(size as usize);

    let mut sender = connect_ws(&server, "s1").await;
    frame_of_type(&mut sender, "system").await;

    for (i, slice) in payload.chunks(TEST_CHUNK_SIZE as usize).enumerate() {
        send_frame(
            &mut sender,
            json!({
                "type": "file_chunk",
                "sessionID": "s1",
                "name": "legacy.bin",
                "size": size,
                "data": slice,
                "totalChunks": 0,
                "currentChunk": i,
                "isLastChunk": i == 1,
            }),
        )
        .await;
    }

    let done = frame_of_type(&mut sender, "file").await;
    assert_eq!(done["name"], "legacy.bin");

    let (status, downloaded) = download(&client, &server, "s1", "legacy.bin").await;
    assert_eq!(status, reqwest::StatusCode::OK);
    assert_eq!(downloaded, payload);
}

#[tokio::test]
async fn download_of_unknown_file_is_404() {
    let server = spawn_server().await;
    let client = reqwest::Client::new();
    let (status, _) = download(&client, &server, "nowhere", "none.bin").await;
    assert_eq!(status, reqwest::StatusCode::NOT_FOUND);
}
