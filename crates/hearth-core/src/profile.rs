//! Profile edits: display name and avatar.

use hearth_shared::avatar;
use hearth_shared::events::{ChangeKind, EntityId, EntityKind};
use hearth_shared::{Denial, User, UserId};

use crate::plan::{Ctx, Plan};
use crate::store::{Snapshot, WriteOp};

/// What to do with an avatar slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AvatarUpdate {
    #[default]
    Keep,
    Set(Vec<u8>),
    Clear,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub avatar: AvatarUpdate,
}

pub fn update_profile(
    snap: &Snapshot,
    ctx: Ctx<'_>,
    actor: UserId,
    update: &ProfileUpdate,
) -> Result<Plan<User>, Denial> {
    let mut user = snap.user(actor)?.clone();

    if let Some(name) = &update.display_name {
        let name = name.trim();
        if name.is_empty() {
            return Err(Denial::InvalidName("display name is empty".into()));
        }
        let len = name.chars().count();
        if len > ctx.config.max_display_name_len {
            return Err(Denial::InvalidName(format!(
                "{len} chars (max {})",
                ctx.config.max_display_name_len
            )));
        }
        user.display_name = Some(name.to_string());
    }

    match &update.avatar {
        AvatarUpdate::Keep => {}
        AvatarUpdate::Clear => user.avatar = None,
        AvatarUpdate::Set(bytes) => {
            avatar::validate(bytes, ctx.config.max_avatar_bytes)?;
            user.avatar = Some(bytes.clone());
        }
    }

    let mut plan = Plan::new(user.clone());
    if snap.users.get(&actor) != Some(&user) {
        let id = user.id;
        plan.write(WriteOp::PutUser(user))
            .event(EntityKind::User, EntityId::User(id), ChangeKind::Updated);
    }
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use chrono::Utc;
    use hearth_shared::constants::PNG_MAGIC;

    fn setup() -> (Snapshot, UserId, EngineConfig) {
        let mut snap = Snapshot::default();
        let user = User::new("alice");
        let id = user.id;
        snap.users.insert(id, user);
        (snap, id, EngineConfig::default())
    }

    #[test]
    fn display_name_is_trimmed_and_bounded() {
        let (snap, id, config) = setup();
        let ctx = Ctx {
            now: Utc::now(),
            config: &config,
        };

        let plan = update_profile(
            &snap,
            ctx,
            id,
            &ProfileUpdate {
                display_name: Some("  Alice  ".into()),
                avatar: AvatarUpdate::Keep,
            },
        )
        .unwrap();
        assert_eq!(plan.value.display_name.as_deref(), Some("Alice"));
        assert_eq!(plan.ops.len(), 1);

        let too_long = ProfileUpdate {
            display_name: Some("x".repeat(config.max_display_name_len + 1)),
            avatar: AvatarUpdate::Keep,
        };
        assert!(matches!(
            update_profile(&snap, ctx, id, &too_long),
            Err(Denial::InvalidName(_))
        ));
    }

    #[test]
    fn avatar_must_be_png_or_jpeg() {
        let (snap, id, config) = setup();
        let ctx = Ctx {
            now: Utc::now(),
            config: &config,
        };

        let csv = ProfileUpdate {
            display_name: None,
            avatar: AvatarUpdate::Set(b"a,b,c".to_vec()),
        };
        assert!(matches!(
            update_profile(&snap, ctx, id, &csv),
            Err(Denial::InvalidAvatar(_))
        ));

        let png = ProfileUpdate {
            display_name: None,
            avatar: AvatarUpdate::Set(PNG_MAGIC.to_vec()),
        };
        let plan = update_profile(&snap, ctx, id, &png).unwrap();
        assert!(plan.value.avatar_data_url().is_some());
    }

    #[test]
    fn unchanged_profile_writes_nothing() {
        let (snap, id, config) = setup();
        let ctx = Ctx {
            now: Utc::now(),
            config: &config,
        };
        let plan = update_profile(&snap, ctx, id, &ProfileUpdate::default()).unwrap();
        assert!(plan.is_noop());
    }
}
