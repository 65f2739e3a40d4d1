//! Registration flow: role selection, tutor code submission and lookups.
//!
//! Every operation takes the store explicitly and retries a store call once
//! when it reports itself unavailable.

use std::str::FromStr;

use rand::Rng;
use thiserror::Error;

use crate::{
    funcs::{retry_once, IdentityStore, StoreError},
    misc::{Actor, IdentityRecord, Role},
};

pub const LINK_CODE_LEN: usize = 6;
const LINK_CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const LINK_CODE_ATTEMPTS: usize = 8;

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("actor {0} is not registered")]
    NotFound(i64),
    #[error("unrecognized role choice `{0}`")]
    InvalidRoleChoice(String),
    #[error("actor is already registered as {0}")]
    AlreadyRegistered(Role),
    #[error("no tutor uses link code `{0}`")]
    UnknownLinkCode(String),
    #[error("actor {0} is not a tutor")]
    NotATutor(i64),
    #[error("could not issue a free link code")]
    CodeSpaceExhausted,
    #[error(transparent)]
    StoreUnavailable(#[from] StoreError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoleChoice {
    Tutor,
    Student,
}

/// Inline keyboard payloads the bot understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallbackAction {
    SelectRole(RoleChoice),
    Status,
}

impl CallbackAction {
    pub const ROLE_TUTOR: &'static str = "role_tutor";
    pub const ROLE_STUDENT: &'static str = "role_student";
    pub const STATUS: &'static str = "status";
}

impl FromStr for CallbackAction {
    type Err = FlowError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        match data {
            Self::ROLE_TUTOR => Ok(CallbackAction::SelectRole(RoleChoice::Tutor)),
            Self::ROLE_STUDENT => Ok(CallbackAction::SelectRole(RoleChoice::Student)),
            Self::STATUS => Ok(CallbackAction::Status),
            other => Err(FlowError::InvalidRoleChoice(other.to_owned())),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Selection {
    Tutor(IdentityRecord),
    AwaitingCode,
}

pub fn generate_link_code() -> String {
    let mut rng = rand::thread_rng();
    (0..LINK_CODE_LEN)
        .map(|_| LINK_CODE_CHARSET[rng.gen_range(0..LINK_CODE_CHARSET.len())] as char)
        .collect()
}

pub fn normalize_code(input: &str) -> String {
    input.trim().to_uppercase()
}

pub async fn get_status(store: &dyn IdentityStore, actor_id: i64) -> Result<IdentityRecord, FlowError> {
    match retry_once(|| store.find(actor_id)).await? {
        Some(record) if record.role.is_set() => Ok(record),
        _ => Err(FlowError::NotFound(actor_id)),
    }
}

async fn ensure_unregistered(store: &dyn IdentityStore, actor_id: i64) -> Result<(), FlowError> {
    match get_status(store, actor_id).await {
        Ok(record) => Err(FlowError::AlreadyRegistered(record.role)),
        Err(FlowError::NotFound(_)) => Ok(()),
        Err(e) => Err(e),
    }
}

async fn issue_link_code(store: &dyn IdentityStore) -> Result<String, FlowError> {
    for _ in 0..LINK_CODE_ATTEMPTS {
        let code = generate_link_code();
        if retry_once(|| store.find_tutor_by_code(&code)).await?.is_none() {
            return Ok(code);
        }
        log::debug!("Link code {code} already taken, drawing another");
    }
    Err(FlowError::CodeSpaceExhausted)
}

async fn persist(store: &dyn IdentityStore, record: IdentityRecord) -> Result<IdentityRecord, FlowError> {
    if retry_once(|| store.register(&record)).await? {
        log::info!(
            "Registered actor {} as {:?}",
            record.actor_id,
            record.role
        );
        return Ok(record);
    }
    // Lost a race against another registration of the same actor.
    let winner = get_status(store, record.actor_id).await?;
    Err(FlowError::AlreadyRegistered(winner.role))
}

pub async fn select_role(
    store: &dyn IdentityStore,
    actor: &Actor,
    choice: RoleChoice,
) -> Result<Selection, FlowError> {
    ensure_unregistered(store, actor.id).await?;
    match choice {
        RoleChoice::Tutor => {
            let code = issue_link_code(store).await?;
            let record = IdentityRecord::registered(actor, Role::Tutor, code);
            persist(store, record).await.map(Selection::Tutor)
        }
        RoleChoice::Student => Ok(Selection::AwaitingCode),
    }
}

/// Links a student to the tutor owning `code`; returns the student record and
/// the tutor it was linked with.
pub async fn submit_code(
    store: &dyn IdentityStore,
    actor: &Actor,
    code: &str,
) -> Result<(IdentityRecord, IdentityRecord), FlowError> {
    ensure_unregistered(store, actor.id).await?;
    let code = normalize_code(code);
    let tutor = retry_once(|| store.find_tutor_by_code(&code))
        .await?
        .ok_or_else(|| FlowError::UnknownLinkCode(code.clone()))?;
    let record = IdentityRecord::registered(actor, Role::Student, code);
    let student = persist(store, record).await?;
    Ok((student, tutor))
}

pub async fn list_students(
    store: &dyn IdentityStore,
    actor_id: i64,
) -> Result<Vec<IdentityRecord>, FlowError> {
    let record = get_status(store, actor_id).await?;
    match (record.role, record.link_code) {
        (Role::Tutor, Some(code)) => Ok(retry_once(|| store.students_of(&code)).await?),
        _ => Err(FlowError::NotATutor(actor_id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::funcs::MemStore;

    const ACTOR: i64 = 123456789;

    fn actor(id: i64) -> Actor {
        Actor::new(id, Some("test_user"))
    }

    async fn register_tutor(store: &MemStore, id: i64) -> IdentityRecord {
        match select_role(store, &actor(id), RoleChoice::Tutor).await.unwrap() {
            Selection::Tutor(record) => record,
            Selection::AwaitingCode => panic!("tutor must not wait for a code"),
        }
    }

    #[test]
    fn callback_payloads_parse() {
        assert_eq!(
            "role_tutor".parse::<CallbackAction>().unwrap(),
            CallbackAction::SelectRole(RoleChoice::Tutor)
        );
        assert_eq!(
            "role_student".parse::<CallbackAction>().unwrap(),
            CallbackAction::SelectRole(RoleChoice::Student)
        );
        assert_eq!("status".parse::<CallbackAction>().unwrap(), CallbackAction::Status);
        assert!(matches!(
            "role_admin".parse::<CallbackAction>(),
            Err(FlowError::InvalidRoleChoice(data)) if data == "role_admin"
        ));
    }

    #[test]
    fn link_codes_use_charset() {
        for _ in 0..50 {
            let code = generate_link_code();
            assert_eq!(code.len(), LINK_CODE_LEN);
            assert!(code.bytes().all(|b| LINK_CODE_CHARSET.contains(&b)));
        }
        assert_eq!(normalize_code("  abc123\n"), "ABC123");
    }

    #[tokio::test]
    async fn unregistered_actor_is_not_found() {
        let store = MemStore::new();
        for id in [1, ACTOR, i64::MAX] {
            assert!(matches!(
                get_status(&store, id).await,
                Err(FlowError::NotFound(found)) if found == id
            ));
        }
    }

    #[tokio::test]
    async fn tutor_gets_code_and_status() {
        let store = MemStore::new();
        let record = register_tutor(&store, ACTOR).await;
        let status = get_status(&store, ACTOR).await.unwrap();
        assert_eq!(status.role, Role::Tutor);
        assert_eq!(status.link_code, record.link_code);
        assert!(!status.link_code.unwrap().is_empty());
    }

    #[tokio::test]
    async fn student_registers_after_code() {
        let store = MemStore::new();
        let tutor = register_tutor(&store, 1).await;
        let code = tutor.link_code.clone().unwrap();

        let selection = select_role(&store, &actor(ACTOR), RoleChoice::Student).await.unwrap();
        assert_eq!(selection, Selection::AwaitingCode);
        assert!(get_status(&store, ACTOR).await.is_err());

        let (student, linked) = submit_code(&store, &actor(ACTOR), &code.to_lowercase())
            .await
            .unwrap();
        assert_eq!(linked.actor_id, 1);
        assert_eq!(student.link_code.as_deref(), Some(code.as_str()));
        assert_eq!(get_status(&store, ACTOR).await.unwrap().role, Role::Student);
    }

    #[tokio::test]
    async fn unknown_code_registers_nothing() {
        let store = MemStore::new();
        let err = submit_code(&store, &actor(ACTOR), "nope00").await.unwrap_err();
        assert!(matches!(err, FlowError::UnknownLinkCode(code) if code == "NOPE00"));
        assert!(matches!(
            get_status(&store, ACTOR).await,
            Err(FlowError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn second_role_is_refused() {
        let store = MemStore::new();
        register_tutor(&store, ACTOR).await;
        for choice in [RoleChoice::Tutor, RoleChoice::Student] {
            let err = select_role(&store, &actor(ACTOR), choice).await.unwrap_err();
            assert!(matches!(err, FlowError::AlreadyRegistered(Role::Tutor)));
        }
    }

    #[tokio::test]
    async fn tutor_lists_linked_students() {
        let store = MemStore::new();
        let tutor = register_tutor(&store, 1).await;
        let code = tutor.link_code.unwrap();
        submit_code(&store, &actor(2), &code).await.unwrap();
        submit_code(&store, &actor(3), &code).await.unwrap();
        let other = register_tutor(&store, 4).await;
        submit_code(&store, &actor(5), &other.link_code.unwrap()).await.unwrap();

        let students = list_students(&store, 1).await.unwrap();
        let ids: Vec<i64> = students.iter().map(|s| s.actor_id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&2) && ids.contains(&3));

        assert!(matches!(
            list_students(&store, 2).await,
            Err(FlowError::NotATutor(2))
        ));
    }

    #[tokio::test]
    async fn transient_failure_is_retried() {
        let store = MemStore::new();
        store.fail_next(1);
        assert!(matches!(
            get_status(&store, ACTOR).await,
            Err(FlowError::NotFound(_))
        ));

        store.fail_next(2);
        assert!(matches!(
            get_status(&store, ACTOR).await,
            Err(FlowError::StoreUnavailable(_))
        ));
    }
}
