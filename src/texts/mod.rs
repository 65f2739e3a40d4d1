use teloxide::utils::command::BotCommands;

use crate::{
    flow::FlowError,
    misc::{Command, IdentityRecord, Role},
};

pub const WELCOME: &str =
    "Добро пожаловать! Этот бот связывает преподавателей и студентов.\n\nВыберите свою роль:";
pub const ASK_TUTOR_CODE: &str = "Вы выбрали роль студента.\nВведите код преподавателя:";
pub const NOT_REGISTERED: &str =
    "Вы ещё не зарегистрированы. Отправьте /start, чтобы выбрать роль.";
pub const CODE_EXPECTED: &str = "Пришлите код преподавателя текстом или отправьте /cancel.";
pub const CANCELLED: &str = "Ввод кода отменён. Отправьте /start, чтобы выбрать роль заново.";
pub const NOTHING_TO_CANCEL: &str = "Сейчас нечего отменять.";
pub const NOT_A_TUTOR: &str = "Список студентов доступен только преподавателям.";
pub const NO_STUDENTS: &str = "К вам пока не присоединился ни один студент.";
pub const INVALID_ROLE: &str = "Неизвестный выбор роли. Отправьте /start и выберите роль кнопкой.";
pub const TEMPORARY_FAILURE: &str = "Сервис временно недоступен. Попробуйте позже.";

pub const BUTTON_TUTOR: &str = "Я преподаватель";
pub const BUTTON_STUDENT: &str = "Я студент";
pub const BUTTON_STATUS: &str = "Мой статус";

pub fn help() -> String {
    Command::descriptions().to_string()
}

pub fn welcome_back(record: &IdentityRecord) -> String {
    format!(
        "Добро пожаловать обратно! Вы зарегистрированы как {}.",
        record.role
    )
}

pub fn tutor_registered(record: &IdentityRecord) -> String {
    format!(
        "Вы зарегистрированы как преподаватель!\nВаш код преподавателя: {}\nПередайте его своим студентам.",
        record.link_code.as_deref().unwrap_or_default()
    )
}

pub fn student_registered(tutor: &IdentityRecord) -> String {
    format!(
        "Вы зарегистрированы как студент!\nВаш преподаватель: {}",
        tutor.label()
    )
}

fn registration_date(record: &IdentityRecord) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp_millis(record.registered_at.timestamp_millis())
        .map(|at| at.format("%d.%m.%Y").to_string())
        .unwrap_or_else(|| String::from("неизвестна"))
}

pub fn status(record: &IdentityRecord) -> String {
    let mut text = format!(
        "Твой ID: {}\nИмя: {}\nРоль: {}",
        record.actor_id,
        record.label(),
        record.role
    );
    if let Some(code) = &record.link_code {
        let caption = match record.role {
            Role::Tutor => "Ваш код преподавателя",
            _ => "Код преподавателя",
        };
        text.push_str(&format!("\n{caption}: {code}"));
    }
    text.push_str(&format!("\nДата регистрации: {}", registration_date(record)));
    text
}

pub fn students(list: &[IdentityRecord]) -> String {
    if list.is_empty() {
        return NO_STUDENTS.to_string();
    }
    let mut text = format!("Ваши студенты ({}):", list.len());
    for (i, student) in list.iter().enumerate() {
        text.push_str(&format!("\n{}. {}", i + 1, student.label()));
    }
    text
}

/// User-facing text for a failed flow operation. Store details stay in the log.
pub fn failure(err: &FlowError) -> String {
    match err {
        FlowError::NotFound(_) => NOT_REGISTERED.to_string(),
        FlowError::InvalidRoleChoice(_) => INVALID_ROLE.to_string(),
        FlowError::AlreadyRegistered(role) => format!("Вы уже зарегистрированы как {role}."),
        FlowError::UnknownLinkCode(code) => format!(
            "Преподаватель с кодом {code} не найден. Проверьте код и попробуйте ещё раз или отправьте /cancel."
        ),
        FlowError::NotATutor(_) => NOT_A_TUTOR.to_string(),
        FlowError::CodeSpaceExhausted | FlowError::StoreUnavailable(_) => {
            TEMPORARY_FAILURE.to_string()
        }
    }
}
