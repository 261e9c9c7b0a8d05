use crate::*;

#[tokio::test]
async fn create_session_generates_a_uuid() {
    let server = spawn_server().await;
    let client = reqwest::Client::new();

    let resp: Value = client
        .post(format!("{}/api/session", server.base_url))
        .json(&json!({"type": "text"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let session_id = resp["sessionID"].as_str().unwrap();
    assert_eq!(session_id.len(), 36);
    assert_eq!(session_id.matches('-').count(), 4);
    assert_eq!(resp["url"], format!("text/{session_id}"));
}

#[tokio::test]
async fn create_session_honors_a_custom_id() {
    let server = spawn_server().await;
    let client = reqwest::Client::new();

    let resp: Value = client
        .post(format!("{}/api/session", server.base_url))
        .json(&json!({"type": "file", "sessionID": "my-room"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(resp["sessionID"], "my-room");
    assert_eq!(resp["url"], "file/my-room");
}

#[tokio::test]
async fn history_starts_empty_and_picks_up_text() {
    let server = spawn_server().await;
    let client = reqwest::Client::new();

    let empty: Value = client
        .get(format!("{}/api/session/s1/history", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(empty.get("textContent").is_none());
    assert!(empty.get("fileInfo").is_none());

    let mut ws = connect_ws(&server, "s1").await;
    send_frame(
        &mut ws,
        json!({"type": "text", "sessionID": "s1", "content": "remember me"}),
    )
    .await;
    // the echo proves the server committed the snapshot
    let echo = frame_of_type(&mut ws, "text").await;
    assert_eq!(echo["content"], "remember me");

    let replayed: Value = client
        .get(format!("{}/api/session/s1/history", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(replayed["textContent"], "remember me");
}

#[tokio::test]
async fn history_reports_the_latest_file() {
    let server = spawn_server().await;
    let client = reqwest::Client::new();

    let payload = pattern_bytes(600);
    start_upload(&client, &server, "s1", "tiny.bin", 600, "").await;
    let (status, body) = send_chunk(&client, &server, "s1", "tiny.bin", 0, payload).await;
    assert_eq!(status, reqwest::StatusCode::OK);
    assert_eq!(body["completed"], true);

    let history: Value = client
        .get(format!("{}/api/session/s1/history", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history["fileInfo"]["name"], "tiny.bin");
    assert_eq!(history["fileInfo"]["size"], 600);
}
