use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};
use teloxide::{types::User, utils::command::BotCommands};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum State {
    #[default]
    Start,
    ReceiveTutorCode,
}

#[derive(Clone, Debug, BotCommands)]
#[command(rename_rule = "lowercase", description = "Справка по командам бота:")]
pub enum Command {
    #[command(description = "начать работу и выбрать роль")]
    Start,
    #[command(description = "показать эту справку")]
    Help,
    #[command(description = "показать вашу регистрацию")]
    Status,
    #[command(description = "список ваших студентов (для преподавателей)")]
    Students,
    #[command(description = "отменить ввод кода преподавателя")]
    Cancel,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Unset,
    Tutor,
    Student,
}

impl Role {
    pub fn is_set(self) -> bool {
        self != Role::Unset
    }

    pub fn title(self) -> &'static str {
        match self {
            Role::Unset => "не выбрана",
            Role::Tutor => "преподаватель",
            Role::Student => "студент",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.title())
    }
}

/// Who sent the update, reduced to what the store keeps.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Actor {
    pub id: i64,
    pub display_name: Option<String>,
}

impl Actor {
    pub fn new(id: i64, display_name: Option<&str>) -> Self {
        Actor {
            id,
            display_name: display_name.map(str::to_owned),
        }
    }

    pub fn from_user(user: &User) -> Self {
        Actor::new(user.id.0 as i64, user.username.as_deref())
    }
}

/// One row of the `users` collection.
///
/// `link_code` is the issued code for a tutor and the tutor's code for a
/// student; it is never empty once `role` is set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub actor_id: i64,
    pub display_name: Option<String>,
    #[serde(default)]
    pub role: Role,
    pub link_code: Option<String>,
    pub registered_at: DateTime,
}

impl IdentityRecord {
    pub fn registered(actor: &Actor, role: Role, link_code: String) -> Self {
        IdentityRecord {
            actor_id: actor.id,
            display_name: actor.display_name.clone(),
            role,
            link_code: Some(link_code),
            registered_at: DateTime::now(),
        }
    }

    pub fn label(&self) -> String {
        match &self.display_name {
            Some(name) => format!("@{name}"),
            None => format!("id {}", self.actor_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_parse_lowercase() {
        assert!(matches!(
            Command::parse("/status", "tutor_bot"),
            Ok(Command::Status)
        ));
        assert!(matches!(
            Command::parse("/students@tutor_bot", "tutor_bot"),
            Ok(Command::Students)
        ));
        assert!(Command::parse("/unknown", "tutor_bot").is_err());
    }

    #[test]
    fn role_is_stored_lowercase() {
        let actor = Actor::new(7, Some("anna"));
        let record = IdentityRecord::registered(&actor, Role::Tutor, "ABC123".into());
        let doc = mongodb::bson::to_document(&record).unwrap();
        assert_eq!(doc.get_str("role").unwrap(), "tutor");
        assert_eq!(doc.get_i64("actor_id").unwrap(), 7);
        assert_eq!(doc.get_str("link_code").unwrap(), "ABC123");
    }

    #[test]
    fn missing_role_reads_as_unset() {
        let doc = mongodb::bson::doc! {
            "actor_id": 1_i64,
            "display_name": mongodb::bson::Bson::Null,
            "link_code": mongodb::bson::Bson::Null,
            "registered_at": DateTime::now(),
        };
        let record: IdentityRecord = mongodb::bson::from_document(doc).unwrap();
        assert_eq!(record.role, Role::Unset);
        assert!(!record.role.is_set());
    }

    #[test]
    fn label_prefers_username() {
        let named = IdentityRecord::registered(&Actor::new(1, Some("bob")), Role::Student, "X".into());
        let anonymous = IdentityRecord::registered(&Actor::new(2, None), Role::Student, "X".into());
        assert_eq!(named.label(), "@bob");
        assert_eq!(anonymous.label(), "id 2");
    }
}
