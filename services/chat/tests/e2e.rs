//! End-to-end scenarios over real Kafka + PostgreSQL.
//!
//! Each test resets the world (consumer group, topic, schema), wires the
//! full stack, and uses the caught-up barrier after every mutation to get
//! read-after-write semantics across the asynchronous log.

#![cfg(feature = "e2e-tests")]

mod common;

use common::{reset_world, test_config, TestApp};
use serial_test::serial;

const U1: i64 = 1;
const U2: i64 = 2;
const U3: i64 = 3;

async fn fresh_app() -> TestApp {
    let config = test_config();
    reset_world(&config).await;
    TestApp::launch(config).await
}

fn unread(chat: &serde_json::Value) -> i64 {
    chat["unreadMessages"].as_i64().expect("unreadMessages")
}

#[tokio::test]
#[serial]
async fn unread_counting_across_three_users() {
    let app = fresh_app().await;
    let client = &app.client;

    let chat_id = client.create_chat(U1, "new chat 1", &[]).await;
    let msg1 = client.create_message(U1, chat_id, "new message 1").await;
    app.barrier().await;

    let u1_chat = client.chat_of(U1, chat_id).await.expect("u1 sees the chat");
    assert_eq!(unread(&u1_chat), 0, "the author has nothing unread");
    assert!(client.chat_of(U2, chat_id).await.is_none());

    client.add_participants(U1, chat_id, &[U2, U3]).await;
    app.barrier().await;
    // Newly added participants see all previous messages as unread.
    assert_eq!(unread(&client.chat_of(U2, chat_id).await.unwrap()), 1);
    assert_eq!(unread(&client.chat_of(U3, chat_id).await.unwrap()), 1);

    client.read_message(U2, chat_id, msg1).await;
    app.barrier().await;
    assert_eq!(unread(&client.chat_of(U2, chat_id).await.unwrap()), 0);
    assert_eq!(unread(&client.chat_of(U3, chat_id).await.unwrap()), 1);

    client.create_message(U1, chat_id, "new message 2").await;
    let msg3 = client.create_message(U1, chat_id, "new message 3").await;
    app.barrier().await;
    assert_eq!(unread(&client.chat_of(U2, chat_id).await.unwrap()), 2);
    assert_eq!(unread(&client.chat_of(U3, chat_id).await.unwrap()), 3);

    client.delete_message(U1, chat_id, msg3).await;
    app.barrier().await;
    assert_eq!(unread(&client.chat_of(U2, chat_id).await.unwrap()), 1);
    assert_eq!(unread(&client.chat_of(U3, chat_id).await.unwrap()), 2);

    app.shutdown().await;
}

#[tokio::test]
#[serial]
async fn pin_is_visible_only_to_the_pinner() {
    let app = fresh_app().await;
    let client = &app.client;

    let chat_id = client.create_chat(U1, "pinnable", &[U2]).await;
    app.barrier().await;

    client.pin_chat(U1, chat_id, true).await;
    app.barrier().await;

    let u1_chat = client.chat_of(U1, chat_id).await.unwrap();
    let u2_chat = client.chat_of(U2, chat_id).await.unwrap();
    assert_eq!(u1_chat["pinned"], serde_json::json!(true));
    assert_eq!(u2_chat["pinned"], serde_json::json!(false));

    app.shutdown().await;
}

#[tokio::test]
#[serial]
async fn editing_the_last_message_refreshes_the_list_preview() {
    let app = fresh_app().await;
    let client = &app.client;

    let chat_id = client.create_chat(U1, "previews", &[]).await;
    let msg1 = client.create_message(U1, chat_id, "first").await;
    let msg2 = client.create_message(U1, chat_id, "second").await;
    app.barrier().await;

    client.edit_message(U1, chat_id, msg1, "first, edited").await;
    app.barrier().await;
    let chat = client.chat_of(U1, chat_id).await.unwrap();
    assert_eq!(chat["lastMessageId"].as_i64(), Some(msg2));
    assert_eq!(chat["lastMessageContent"], serde_json::json!("second"));

    client.edit_message(U1, chat_id, msg2, "second, edited").await;
    app.barrier().await;
    let chat = client.chat_of(U1, chat_id).await.unwrap();
    assert_eq!(
        chat["lastMessageContent"],
        serde_json::json!("second, edited")
    );

    app.shutdown().await;
}

#[tokio::test]
#[serial]
async fn blog_promotion_surfaces_the_chat_and_its_comments() {
    let app = fresh_app().await;
    let client = &app.client;

    let chat_id = client.create_chat(U1, "my blog chat", &[]).await;
    let msg1 = client.create_message(U1, chat_id, "the post body").await;
    let msg2 = client.create_message(U1, chat_id, "first comment").await;
    app.barrier().await;

    assert!(client.search_blogs(U1).await.is_empty());

    client.edit_chat(U1, chat_id, "my blog chat", &[], true).await;
    app.barrier().await;
    // blog=true alone does not surface the chat; a blog post must exist.
    assert!(client.search_blogs(U1).await.is_empty());

    client.make_blog_post(U1, chat_id, msg1).await;
    app.barrier().await;

    let blogs = client.search_blogs(U1).await;
    assert_eq!(blogs.len(), 1);
    assert_eq!(blogs[0]["id"].as_i64(), Some(chat_id));
    assert_eq!(blogs[0]["title"], serde_json::json!("my blog chat"));

    let comments = client.search_comments(U1, chat_id).await;
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0]["id"].as_i64(), Some(msg2));

    app.shutdown().await;
}

#[tokio::test]
#[serial]
async fn chat_list_keyset_pagination_over_a_thousand_chats() {
    let app = fresh_app().await;
    let client = &app.client;

    for index in 1..=1000 {
        client
            .create_chat(U1, &format!("generated_chat{index}"), &[])
            .await;
    }
    app.barrier().await;

    let first_page = client.search_chats(U1, 40, None).await;
    assert_eq!(first_page.len(), 40);
    assert_eq!(
        first_page[0]["title"],
        serde_json::json!("generated_chat1000")
    );
    assert_eq!(
        first_page[39]["title"],
        serde_json::json!("generated_chat961")
    );

    let second_page = client.search_chats(U1, 40, Some(&first_page[39])).await;
    assert_eq!(second_page.len(), 40);
    assert_eq!(
        second_page[0]["title"],
        serde_json::json!("generated_chat960")
    );

    app.shutdown().await;
}

#[tokio::test]
#[serial]
async fn export_reset_import_round_trip() {
    let mut config = test_config();
    let dump = tempfile::NamedTempFile::new().expect("temp file");
    let dump_path = dump.path().to_str().unwrap().to_string();
    config.cqrs.export.file = dump_path.clone();
    config.cqrs.import.file = dump_path;

    reset_world(&config).await;
    let app = TestApp::launch(config.clone()).await;

    let chat_id = app.client.create_chat(U1, "survivor", &[U2]).await;
    let msg1 = app.client.create_message(U1, chat_id, "kept message").await;
    app.barrier().await;
    app.shutdown().await;

    murmur_chat::app::export(config.clone()).await.expect("export");
    murmur_chat::app::reset(config.clone()).await.expect("reset");
    murmur_chat::app::import(config.clone()).await.expect("import");

    // Relaunch without resetting: the projections rebuild from the
    // imported log and the fast-forward realigns the id sequences.
    let app = TestApp::launch(config).await;
    app.barrier().await;

    let chat = app.client.chat_of(U1, chat_id).await.expect("chat survived");
    assert_eq!(chat["title"], serde_json::json!("survivor"));
    let messages = app.client.search_messages(U1, chat_id).await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["id"].as_i64(), Some(msg1));

    let new_message = app
        .client
        .create_message(U1, chat_id, "post-import message")
        .await;
    assert!(
        new_message > msg1,
        "fast-forwarded counter must not reuse ids"
    );

    app.shutdown().await;
}
