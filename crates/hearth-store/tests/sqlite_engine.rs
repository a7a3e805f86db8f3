use std::sync::{Arc, Barrier};
use std::thread;

use tracing_subscriber::EnvFilter;

use hearth_core::chat::GroupSettings;
use hearth_core::profile::{AvatarUpdate, ProfileUpdate};
use hearth_core::{Engine, EngineConfig};
use hearth_shared::constants::PNG_MAGIC;
use hearth_shared::{Denial, DenialKind, Relationship, Role, User, UserId};
use hearth_store::SqliteStore;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn setup(names: &[&str]) -> (tempfile::TempDir, Engine<SqliteStore>, Vec<UserId>) {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open_at(&dir.path().join("hearth.db")).unwrap();
    let ids = names
        .iter()
        .map(|name| {
            let user = User::new(*name);
            store.insert_user(&user).unwrap();
            user.id
        })
        .collect();
    let engine = Engine::new(Arc::new(store), EngineConfig::default());
    (dir, engine, ids)
}

#[test]
fn friendship_lifecycle_persists() {
    let (_dir, engine, ids) = setup(&["alice", "bob"]);
    let (a, b) = (ids[0], ids[1]);

    let req = engine.send_friend_request(a, b).unwrap();
    assert_eq!(engine.incoming_requests(b).unwrap().len(), 1);
    engine.respond_to_friend_request(b, req.id, true).unwrap();
    assert_eq!(engine.get_relationship(b, a).unwrap(), Relationship::Friend);
    assert_eq!(engine.friends_of(a).unwrap()[0].id, b);

    let summary = engine.block(b, a).unwrap();
    assert!(summary.removed_friendship);
    assert!(!engine.can_direct_message(a, b).unwrap());
    assert_eq!(engine.blocked_users(b).unwrap().len(), 1);
}

#[test]
fn group_lifecycle_persists() {
    let (_dir, engine, ids) = setup(&["alice", "bob", "carol"]);
    let (a, b, c) = (ids[0], ids[1], ids[2]);

    let g = engine.create_group_chat(a, "Book club", &[b]).unwrap().id;
    engine.set_moderator(a, g, b, true).unwrap();
    let invite = engine.invite_member(b, g, c).unwrap();
    assert!(engine.invitable_groups(a, c).unwrap().is_empty());
    engine.respond_to_invite(c, invite.id, true).unwrap();

    let renamed = engine
        .update_group_settings(
            b,
            g,
            &GroupSettings {
                name: Some("Readers".into()),
                avatar: AvatarUpdate::Set(PNG_MAGIC.to_vec()),
            },
        )
        .unwrap();
    assert_eq!(renamed.name(), Some("Readers"));

    let summary = engine.leave_chat(a, g).unwrap();
    assert_eq!(summary.new_owner, Some(b));
    assert_eq!(
        engine.chat_membership(g).unwrap(),
        vec![(b, Role::Owner), (c, Role::Member)]
    );
    assert!(engine.chats_for(a).unwrap().is_empty());
    assert_eq!(engine.chats_for(c).unwrap().len(), 1);
}

#[test]
fn message_lifecycle_persists() {
    let (_dir, engine, ids) = setup(&["alice", "bob"]);
    let (a, b) = (ids[0], ids[1]);

    let g = engine.create_group_chat(a, "Pins", &[b]).unwrap().id;
    let m1 = engine.send_message(b, g, "first").unwrap();
    let m2 = engine.send_message(b, g, "second").unwrap();
    engine.edit_message(b, m1.id, "first!").unwrap();

    engine.pin_message(a, m1.id, true).unwrap();
    engine.pin_message(a, m2.id, true).unwrap();
    engine.delete_message(a, m2.id).unwrap();

    let messages = engine.messages(a, g).unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].content, "first!");
    assert!(messages[0].edited_at.is_some());
    assert!(messages[1].is_deleted());
    assert!(messages.iter().all(|m| !m.pinned));
    assert_eq!(engine.get_chat(g).unwrap().pinned, None);

    let err = engine.edit_message(b, m2.id, "x").unwrap_err();
    assert_eq!(err.kind(), Some(DenialKind::InvalidState));
}

#[test]
fn profile_and_identity() {
    let (_dir, engine, ids) = setup(&["alice"]);
    let a = ids[0];

    assert_eq!(engine.resolve_actor("alice").unwrap(), a);
    let err = engine.resolve_actor("mallory").unwrap_err();
    assert_eq!(err.denial(), Some(&Denial::UnknownPrincipal));

    let user = engine
        .update_profile(
            a,
            &ProfileUpdate {
                display_name: Some("Alice".into()),
                avatar: AvatarUpdate::Keep,
            },
        )
        .unwrap();
    assert_eq!(engine.get_user(a).unwrap(), user);
}

#[test]
fn concurrent_sends_keep_order() {
    let (_dir, engine, ids) = setup(&["alice", "bob"]);
    let (a, b) = (ids[0], ids[1]);
    let chat = engine.open_direct_chat(a, b).unwrap().id;

    let barrier = Barrier::new(2);
    thread::scope(|s| {
        for actor in [a, b] {
            let engine = &engine;
            let barrier = &barrier;
            s.spawn(move || {
                barrier.wait();
                for i in 0..10 {
                    // heavy contention may still exhaust the retry budget
                    let mut attempt = engine.send_message(actor, chat, &format!("{i}"));
                    while let Err(e) = &attempt {
                        assert_eq!(e.kind(), Some(DenialKind::Conflict));
                        attempt = engine.send_message(actor, chat, &format!("{i}"));
                    }
                }
            });
        }
    });

    let messages = engine.messages(a, chat).unwrap();
    assert_eq!(messages.len(), 20);
    assert!(messages.windows(2).all(|w| w[0].sent_at < w[1].sent_at));
}
