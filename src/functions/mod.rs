use teloxide::{
    dispatching::{
        dialogue::{self, ErasedStorage},
        UpdateHandler,
    },
    prelude::*,
    types::{InlineKeyboardButton, InlineKeyboardMarkup},
};

use crate::{
    flow::{self, CallbackAction, FlowError, Selection},
    funcs::{IdentityStore, SharedStore},
    misc::{Actor, Command, State},
    texts,
};

pub type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;
pub type DialogueStorage = ErasedStorage<State>;
pub type CurrentDialogue = Dialogue<State, DialogueStorage>;

/// What the bot answers and where the dialogue goes next.
#[derive(Clone, Debug, PartialEq)]
pub struct Reply {
    pub text: String,
    pub keyboard: Option<InlineKeyboardMarkup>,
    pub next: Option<State>,
}

impl Reply {
    fn text(text: impl Into<String>) -> Self {
        Reply {
            text: text.into(),
            keyboard: None,
            next: None,
        }
    }

    fn keyboard(mut self, keyboard: InlineKeyboardMarkup) -> Self {
        self.keyboard = Some(keyboard);
        self
    }

    fn then(mut self, state: State) -> Self {
        self.next = Some(state);
        self
    }

    fn failed(err: FlowError) -> Self {
        match &err {
            FlowError::StoreUnavailable(_) | FlowError::CodeSpaceExhausted => {
                log::error!("Request failed: {err}")
            }
            _ => log::debug!("Request refused: {err}"),
        }
        Reply::text(texts::failure(&err))
    }
}

pub fn role_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback(texts::BUTTON_TUTOR, CallbackAction::ROLE_TUTOR),
        InlineKeyboardButton::callback(texts::BUTTON_STUDENT, CallbackAction::ROLE_STUDENT),
    ]])
}

pub fn status_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        texts::BUTTON_STATUS,
        CallbackAction::STATUS,
    )]])
}

pub async fn start_reply(store: &dyn IdentityStore, actor: &Actor) -> Reply {
    match flow::get_status(store, actor.id).await {
        Ok(record) => Reply::text(texts::welcome_back(&record))
            .keyboard(status_keyboard())
            .then(State::Start),
        Err(FlowError::NotFound(_)) => Reply::text(texts::WELCOME)
            .keyboard(role_keyboard())
            .then(State::Start),
        Err(e) => Reply::failed(e),
    }
}

pub fn help_reply() -> Reply {
    Reply::text(texts::help())
}

pub async fn status_reply(store: &dyn IdentityStore, actor_id: i64) -> Reply {
    match flow::get_status(store, actor_id).await {
        Ok(record) => Reply::text(texts::status(&record)),
        Err(e) => Reply::failed(e),
    }
}

pub async fn students_reply(store: &dyn IdentityStore, actor_id: i64) -> Reply {
    match flow::list_students(store, actor_id).await {
        Ok(students) => Reply::text(texts::students(&students)),
        Err(e) => Reply::failed(e),
    }
}

pub fn cancel_reply(state: &State) -> Reply {
    match state {
        State::ReceiveTutorCode => Reply::text(texts::CANCELLED).then(State::Start),
        State::Start => Reply::text(texts::NOTHING_TO_CANCEL),
    }
}

pub async fn callback_reply(store: &dyn IdentityStore, actor: &Actor, data: &str) -> Reply {
    let action = match data.parse::<CallbackAction>() {
        Ok(action) => action,
        Err(e) => return Reply::failed(e),
    };
    match action {
        CallbackAction::Status => status_reply(store, actor.id).await,
        CallbackAction::SelectRole(choice) => match flow::select_role(store, actor, choice).await {
            Ok(Selection::Tutor(record)) => {
                Reply::text(texts::tutor_registered(&record)).keyboard(status_keyboard())
            }
            Ok(Selection::AwaitingCode) => {
                Reply::text(texts::ASK_TUTOR_CODE).then(State::ReceiveTutorCode)
            }
            Err(e) => Reply::failed(e),
        },
    }
}

pub async fn code_reply(store: &dyn IdentityStore, actor: &Actor, text: Option<&str>) -> Reply {
    let Some(code) = text else {
        return Reply::text(texts::CODE_EXPECTED);
    };
    match flow::submit_code(store, actor, code).await {
        Ok((_, tutor)) => Reply::text(texts::student_registered(&tutor))
            .keyboard(status_keyboard())
            .then(State::Start),
        Err(e @ FlowError::AlreadyRegistered(_)) => Reply::failed(e).then(State::Start),
        Err(e) => Reply::failed(e),
    }
}

async fn send(bot: &Bot, dialogue: &CurrentDialogue, reply: Reply) -> HandlerResult {
    if let Some(state) = reply.next {
        dialogue.update(state).await?;
    }
    let mut request = bot.send_message(dialogue.chat_id(), reply.text);
    if let Some(keyboard) = reply.keyboard {
        request = request.reply_markup(keyboard);
    }
    request.await?;
    Ok(())
}

async fn command_handler(
    bot: Bot,
    msg: Message,
    dialogue: CurrentDialogue,
    cmd: Command,
    store: SharedStore,
) -> HandlerResult {
    let Some(user) = msg.from() else {
        log::warn!("Command without sender in chat {}", msg.chat.id);
        return Ok(());
    };
    let actor = Actor::from_user(user);
    let reply = match cmd {
        Command::Start => start_reply(store.as_ref(), &actor).await,
        Command::Help => help_reply(),
        Command::Status => status_reply(store.as_ref(), actor.id).await,
        Command::Students => students_reply(store.as_ref(), actor.id).await,
        Command::Cancel => cancel_reply(&dialogue.get_or_default().await?),
    };
    send(&bot, &dialogue, reply).await
}

async fn receive_tutor_code(
    bot: Bot,
    msg: Message,
    dialogue: CurrentDialogue,
    store: SharedStore,
) -> HandlerResult {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let reply = code_reply(store.as_ref(), &Actor::from_user(user), msg.text()).await;
    send(&bot, &dialogue, reply).await
}

async fn callback_handler(
    bot: Bot,
    q: CallbackQuery,
    dialogue: CurrentDialogue,
    store: SharedStore,
) -> HandlerResult {
    bot.answer_callback_query(q.id.clone()).await?;
    let actor = Actor::from_user(&q.from);
    let reply = callback_reply(store.as_ref(), &actor, q.data.as_deref().unwrap_or_default()).await;
    let Some(message) = q.message else {
        return send(&bot, &dialogue, reply).await;
    };
    if let Some(state) = reply.next {
        dialogue.update(state).await?;
    }
    let mut edit = bot.edit_message_text(message.chat.id, message.id, reply.text);
    if let Some(keyboard) = reply.keyboard {
        edit = edit.reply_markup(keyboard);
    }
    edit.await?;
    Ok(())
}

pub fn schema() -> UpdateHandler<Box<dyn std::error::Error + Send + Sync + 'static>> {
    use dptree::case;

    let message_handler = Update::filter_message()
        .branch(teloxide::filter_command::<Command, _>().endpoint(command_handler))
        .branch(case![State::ReceiveTutorCode].endpoint(receive_tutor_code));

    let callback_query_handler = Update::filter_callback_query().endpoint(callback_handler);

    dialogue::enter::<Update, DialogueStorage, State, _>()
        .branch(message_handler)
        .branch(callback_query_handler)
}
